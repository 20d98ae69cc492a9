// ── Local token service ──
//
// The gateway issues its own HS256 JWTs, distinct from the upstream
// tokens carried inside them. Access tokens bind the session to the
// upstream refresh token current at issue time, so rotating the
// upstream session implicitly revokes outstanding access tokens (the
// KV comparison in `auth.rs` enforces it).

use std::time::Duration;

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

pub const TOKEN_TYPE_ACCESS: &str = "access";
pub const TOKEN_TYPE_REFRESH: &str = "refresh";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vivint_refresh_token: Option<String>,
    /// Unique id. Refresh tokens are compared by value against the KV
    /// store, so two issued in the same second must still differ.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
    pub exp: i64,
}

#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenService {
    pub fn new(secret: &str, access_ttl: Duration, refresh_ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            access_ttl,
            refresh_ttl,
        }
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    /// Issue an access token carrying the current upstream refresh token.
    pub fn issue_access(
        &self,
        username: &str,
        vivint_refresh_token: &str,
    ) -> Result<String, GatewayError> {
        self.issue(Claims {
            sub: username.to_owned(),
            token_type: TOKEN_TYPE_ACCESS.to_owned(),
            vivint_refresh_token: Some(vivint_refresh_token.to_owned()),
            jti: None,
            exp: expiry(self.access_ttl),
        })
    }

    pub fn issue_refresh(&self, username: &str) -> Result<String, GatewayError> {
        self.issue(Claims {
            sub: username.to_owned(),
            token_type: TOKEN_TYPE_REFRESH.to_owned(),
            vivint_refresh_token: None,
            jti: Some(uuid::Uuid::new_v4().to_string()),
            exp: expiry(self.refresh_ttl),
        })
    }

    fn issue(&self, claims: Claims) -> Result<String, GatewayError> {
        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|err| GatewayError::Internal(format!("failed to sign token: {err}")))
    }

    /// Verify signature and expiry; callers check `token_type`.
    pub fn decode(&self, token: &str) -> Result<Claims, GatewayError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|_| GatewayError::Auth("could not validate credentials".into()))
    }
}

fn expiry(ttl: Duration) -> i64 {
    chrono::Utc::now().timestamp() + ttl.as_secs() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> TokenService {
        TokenService::new(
            "test-secret",
            Duration::from_secs(1800),
            Duration::from_secs(7 * 24 * 3600),
        )
    }

    #[test]
    fn access_token_round_trips_claims() {
        let service = service();
        let token = service.issue_access("jane", "upstream-rt").unwrap();
        let claims = service.decode(&token).unwrap();

        assert_eq!(claims.sub, "jane");
        assert_eq!(claims.token_type, TOKEN_TYPE_ACCESS);
        assert_eq!(claims.vivint_refresh_token.as_deref(), Some("upstream-rt"));
        assert!(claims.exp > chrono::Utc::now().timestamp());
    }

    #[test]
    fn refresh_token_carries_no_upstream_token() {
        let service = service();
        let token = service.issue_refresh("jane").unwrap();
        let claims = service.decode(&token).unwrap();

        assert_eq!(claims.token_type, TOKEN_TYPE_REFRESH);
        assert!(claims.vivint_refresh_token.is_none());
    }

    #[test]
    fn refresh_tokens_issued_back_to_back_differ() {
        let service = service();
        let first = service.issue_refresh("jane").unwrap();
        let second = service.issue_refresh("jane").unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = service().issue_refresh("jane").unwrap();
        let other = TokenService::new(
            "different-secret",
            Duration::from_secs(1800),
            Duration::from_secs(3600),
        );
        assert!(other.decode(&token).is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let service = TokenService::new(
            "test-secret",
            Duration::from_secs(0),
            Duration::from_secs(0),
        );
        let token = service.issue_access("jane", "rt").unwrap();
        // exp == now, leeway 0: already invalid.
        std::thread::sleep(Duration::from_millis(1100));
        assert!(service.decode(&token).is_err());
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(service().decode("not-a-jwt").is_err());
    }
}
