// ── Gateway settings ──
//
// Everything comes from the environment (figment Env provider over
// serialized defaults). The gateway keeps no config files; deployments
// set `SERVER_SECRET` and the KV coordinates.

use std::time::Duration;

use figment::providers::{Env, Serialized};
use figment::Figment;
use serde::{Deserialize, Serialize};

use vivint_api::ApiEndpoints;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// HMAC key for the gateway's own JWTs. MUST be overridden in
    /// production.
    pub server_secret: String,
    pub bind_addr: String,
    pub access_token_expire_minutes: u64,
    pub refresh_token_expire_days: u64,

    // KV store coordinates.
    pub kv_host: String,
    pub kv_port: u16,
    pub kv_db: i64,
    pub kv_password: Option<String>,

    /// Comma-separated CORS origins; `*` allows any.
    pub allowed_origins: String,

    /// Upstream overrides (tests point these at a mock server).
    pub upstream_api_url: Option<String>,
    pub upstream_auth_url: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_secret: "change-me".into(),
            bind_addr: "0.0.0.0:8000".into(),
            access_token_expire_minutes: 30,
            refresh_token_expire_days: 7,
            kv_host: "127.0.0.1".into(),
            kv_port: 6379,
            kv_db: 0,
            kv_password: None,
            allowed_origins: "*".into(),
            upstream_api_url: None,
            upstream_auth_url: None,
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self, figment::Error> {
        Figment::from(Serialized::defaults(Settings::default()))
            .merge(Env::raw())
            .extract()
    }

    pub fn redis_url(&self) -> String {
        match &self.kv_password {
            Some(password) => format!(
                "redis://:{password}@{}:{}/{}",
                self.kv_host, self.kv_port, self.kv_db
            ),
            None => format!("redis://{}:{}/{}", self.kv_host, self.kv_port, self.kv_db),
        }
    }

    pub fn access_ttl(&self) -> Duration {
        Duration::from_secs(self.access_token_expire_minutes * 60)
    }

    pub fn refresh_ttl(&self) -> Duration {
        Duration::from_secs(self.refresh_token_expire_days * 24 * 60 * 60)
    }

    /// Where per-request upstream clients point.
    pub fn upstream_endpoints(&self) -> ApiEndpoints {
        let mut endpoints = ApiEndpoints::default();
        if let Some(api) = &self.upstream_api_url {
            endpoints.api_base = api.clone();
        }
        if let Some(auth) = &self.upstream_auth_url {
            endpoints.auth_base = auth.clone();
        }
        endpoints
    }

    pub fn origins(&self) -> Vec<String> {
        self.allowed_origins
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redis_url_with_and_without_password() {
        let mut settings = Settings::default();
        assert_eq!(settings.redis_url(), "redis://127.0.0.1:6379/0");

        settings.kv_password = Some("hunter2".into());
        settings.kv_db = 2;
        assert_eq!(settings.redis_url(), "redis://:hunter2@127.0.0.1:6379/2");
    }

    #[test]
    fn origin_list_splits_and_trims() {
        let settings = Settings {
            allowed_origins: "https://a.example, https://b.example".into(),
            ..Settings::default()
        };
        assert_eq!(
            settings.origins(),
            vec!["https://a.example", "https://b.example"]
        );
    }

    #[test]
    fn ttl_arithmetic() {
        let settings = Settings::default();
        assert_eq!(settings.access_ttl(), Duration::from_secs(30 * 60));
        assert_eq!(settings.refresh_ttl(), Duration::from_secs(7 * 24 * 3600));
    }
}
