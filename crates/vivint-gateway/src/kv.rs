// ── KV-backed session store ──
//
// The only shared mutable state across users. All writes are per-key;
// entries expire by TTL. Redis in production; the in-memory variant
// drives tests through the same interface.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use redis::AsyncCommands;
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;
use vivint_api::transport::SessionCookie;

/// Upstream refresh tokens outlive everything else.
pub const VIVINT_REFRESH_TOKEN_TTL: Duration = Duration::from_secs(90 * 24 * 60 * 60);
/// An MFA login must be completed within this window.
pub const MFA_SESSION_TTL: Duration = Duration::from_secs(5 * 60);

pub fn vivint_refresh_key(username: &str) -> String {
    format!("user:{username}:vivint_refresh_token")
}

pub fn api_refresh_key(username: &str) -> String {
    format!("user:{username}:api_refresh_token")
}

pub fn mfa_session_key(mfa_session_id: &str) -> String {
    format!("mfa_session:{mfa_session_id}:session_data")
}

/// State preserved across an MFA round trip: enough to rebuild the
/// upstream client mid-login in any gateway worker.
#[derive(Debug, Serialize, Deserialize)]
pub struct MfaSessionBlob {
    pub username: String,
    pub password: String,
    pub cookies: Vec<SessionCookie>,
    pub pkce_verifier: Option<String>,
}

#[derive(Clone)]
pub enum SessionStore {
    Redis(redis::aio::ConnectionManager),
    Memory(Arc<Mutex<HashMap<String, (String, Option<Instant>)>>>),
}

impl SessionStore {
    /// Connect to Redis, building the process-wide connection manager.
    pub async fn connect(url: &str) -> Result<Self, GatewayError> {
        let client = redis::Client::open(url)?;
        let manager = client.get_connection_manager().await?;
        Ok(Self::Redis(manager))
    }

    /// In-memory store with the same TTL semantics (tests).
    pub fn memory() -> Self {
        Self::Memory(Arc::new(Mutex::new(HashMap::new())))
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>, GatewayError> {
        match self {
            Self::Redis(manager) => {
                let mut conn = manager.clone();
                Ok(conn.get(key).await?)
            }
            Self::Memory(map) => {
                let mut map = map.lock().expect("session store lock poisoned");
                match map.get(key) {
                    Some((_, Some(expires))) if *expires <= Instant::now() => {
                        map.remove(key);
                        Ok(None)
                    }
                    Some((value, _)) => Ok(Some(value.clone())),
                    None => Ok(None),
                }
            }
        }
    }

    pub async fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), GatewayError> {
        match self {
            Self::Redis(manager) => {
                let mut conn = manager.clone();
                match ttl {
                    Some(ttl) => {
                        let _: () = conn.set_ex(key, value, ttl.as_secs()).await?;
                    }
                    None => {
                        let _: () = conn.set(key, value).await?;
                    }
                }
                Ok(())
            }
            Self::Memory(map) => {
                let expires = ttl.map(|ttl| Instant::now() + ttl);
                map.lock()
                    .expect("session store lock poisoned")
                    .insert(key.to_owned(), (value.to_owned(), expires));
                Ok(())
            }
        }
    }

    pub async fn delete(&self, key: &str) -> Result<(), GatewayError> {
        match self {
            Self::Redis(manager) => {
                let mut conn = manager.clone();
                let _: () = conn.del(key).await?;
                Ok(())
            }
            Self::Memory(map) => {
                map.lock()
                    .expect("session store lock poisoned")
                    .remove(key);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_set_get_delete() {
        let store = SessionStore::memory();
        store.set("k", "v", None).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));

        store.delete("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn memory_store_honors_ttl() {
        let store = SessionStore::memory();
        store
            .set("k", "v", Some(Duration::from_millis(20)))
            .await
            .unwrap();
        assert!(store.get("k").await.unwrap().is_some());

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[test]
    fn key_scheme() {
        assert_eq!(
            vivint_refresh_key("jane"),
            "user:jane:vivint_refresh_token"
        );
        assert_eq!(api_refresh_key("jane"), "user:jane:api_refresh_token");
        assert_eq!(
            mfa_session_key("abc-123"),
            "mfa_session:abc-123:session_data"
        );
    }

    #[test]
    fn mfa_blob_round_trips() {
        let blob = MfaSessionBlob {
            username: "jane".into(),
            password: "pw".into(),
            cookies: vec![SessionCookie {
                name: "v_sid".into(),
                value: "s".into(),
                domain: "vivint.com".into(),
                path: "/".into(),
            }],
            pkce_verifier: Some("verifier".into()),
        };
        let encoded = serde_json::to_string(&blob).unwrap();
        let decoded: MfaSessionBlob = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded.username, "jane");
        assert_eq!(decoded.cookies.len(), 1);
        assert_eq!(decoded.pkce_verifier.as_deref(), Some("verifier"));
    }
}
