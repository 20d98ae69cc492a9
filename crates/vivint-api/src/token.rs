// OAuth token bundle returned by the Sky auth host.
//
// The id token's signature is deliberately not verified: the upstream
// service is trusted and the gateway only replays the access token as an
// opaque bearer. Expiry is the only claim we act on.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Leeway subtracted from the id token's expiry: the session is treated
/// as expired 30 seconds early so in-flight requests never race the
/// actual cutoff.
pub const EXPIRY_SKEW_SECS: i64 = 30;

/// Token set from a successful password login or refresh grant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthTokens {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
    /// Whatever else the grant returned (`token_type`, `expires_in`, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AuthTokens {
    /// Decode a token response body. Unknown keys survive in `extra`.
    pub fn from_response(body: &Value) -> Option<Self> {
        serde_json::from_value(body.clone()).ok()
    }

    /// Returns `true` iff an id token is present and its expiry, less the
    /// given skew, is still in the future.
    pub fn is_valid(&self, skew_secs: i64) -> bool {
        let Some(id_token) = self.id_token.as_deref() else {
            return false;
        };
        let Some(claims) = decode_unverified(id_token) else {
            return false;
        };
        let Some(exp) = claims.get("exp").and_then(Value::as_i64) else {
            return false;
        };
        exp - skew_secs > chrono::Utc::now().timestamp()
    }
}

/// Decode a compact JWS payload without verifying its signature.
///
/// Returns `None` for anything that does not look like a three-part JWT
/// with a base64url JSON payload.
pub fn decode_unverified(jwt: &str) -> Option<Value> {
    let mut parts = jwt.split('.');
    let _header = parts.next()?;
    let payload = parts.next()?;
    let _signature = parts.next()?;
    if parts.next().is_some() {
        return None;
    }
    let bytes = URL_SAFE_NO_PAD.decode(payload).ok()?;
    serde_json::from_slice(&bytes).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Build an unsigned JWT carrying the given claims.
    fn fake_jwt(claims: &Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims).unwrap());
        format!("{header}.{payload}.sig")
    }

    fn tokens_with_exp(exp: i64) -> AuthTokens {
        AuthTokens {
            access_token: "at".into(),
            refresh_token: Some("rt".into()),
            id_token: Some(fake_jwt(&json!({ "exp": exp, "sub": "user" }))),
            extra: Map::new(),
        }
    }

    #[test]
    fn decode_unverified_extracts_claims() {
        let jwt = fake_jwt(&json!({ "exp": 123, "sub": "abc" }));
        let claims = decode_unverified(&jwt).unwrap();
        assert_eq!(claims["exp"], 123);
        assert_eq!(claims["sub"], "abc");
    }

    #[test]
    fn decode_unverified_rejects_garbage() {
        assert!(decode_unverified("not-a-jwt").is_none());
        assert!(decode_unverified("a.b").is_none());
        assert!(decode_unverified("a.!!!.c").is_none());
        assert!(decode_unverified("a.b.c.d").is_none());
    }

    #[test]
    fn token_far_from_expiry_is_valid() {
        let tokens = tokens_with_exp(chrono::Utc::now().timestamp() + 3600);
        assert!(tokens.is_valid(EXPIRY_SKEW_SECS));
    }

    #[test]
    fn token_inside_skew_window_is_invalid() {
        // Expires in 10s; with a 30s skew that counts as expired.
        let tokens = tokens_with_exp(chrono::Utc::now().timestamp() + 10);
        assert!(!tokens.is_valid(EXPIRY_SKEW_SECS));
    }

    #[test]
    fn token_without_id_jwt_is_invalid() {
        let tokens = AuthTokens {
            access_token: "at".into(),
            refresh_token: None,
            id_token: None,
            extra: Map::new(),
        };
        assert!(!tokens.is_valid(EXPIRY_SKEW_SECS));
    }

    #[test]
    fn token_response_round_trip() {
        let body = json!({
            "access_token": "at",
            "refresh_token": "rt",
            "id_token": "id",
            "token_type": "Bearer",
            "expires_in": 1800
        });
        let tokens = AuthTokens::from_response(&body).unwrap();
        assert_eq!(tokens.access_token, "at");
        assert_eq!(tokens.refresh_token.as_deref(), Some("rt"));
        assert_eq!(tokens.extra["expires_in"], 1800);
    }
}
