use tracing_subscriber::EnvFilter;

use vivint_gateway::{app, AppState, SessionStore, Settings};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    if let Err(err) = run().await {
        tracing::error!(error = %err, "gateway failed to start");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let settings = Settings::load()?;
    let bind_addr = settings.bind_addr.clone();

    tracing::info!(kv = %settings.redis_url(), "connecting to the session store");
    let kv = SessionStore::connect(&settings.redis_url()).await?;

    let state = AppState::new(settings, kv);
    let router = app(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(%bind_addr, "gateway listening");
    axum::serve(listener, router).await?;
    Ok(())
}
