use std::sync::Arc;

use crate::config::Settings;
use crate::kv::SessionStore;
use crate::tokens::TokenService;

/// Shared state handed to every route handler.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub kv: SessionStore,
    pub tokens: TokenService,
    /// Plain client for proxying snapshot bytes (follows redirects,
    /// unlike the Sky transport).
    pub http: reqwest::Client,
}

impl AppState {
    pub fn new(settings: Settings, kv: SessionStore) -> Self {
        let tokens = TokenService::new(
            &settings.server_secret,
            settings.access_ttl(),
            settings.refresh_ttl(),
        );
        Self {
            settings: Arc::new(settings),
            kv,
            tokens,
            http: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(15))
                .build()
                .expect("reqwest client"),
        }
    }
}
