// ── Access-token validation and the per-request upstream factory ──
//
// Every protected request revalidates the local JWT against the KV
// store, then builds a short-lived upstream account from the stored
// refresh token. There is no shared upstream client across requests:
// simultaneous actions from one user are independent upstream sessions
// reusing the same stored refresh token.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use secrecy::SecretString;

use crate::error::GatewayError;
use crate::kv::{vivint_refresh_key, MfaSessionBlob};
use crate::state::AppState;
use crate::tokens::TOKEN_TYPE_ACCESS;
use vivint_api::models::AuthUserData;
use vivint_core::{Account, AccountConfig};

/// The authenticated local user for this request.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub username: String,
}

/// Validate an access token: signature, expiry, `token_type`, and the
/// KV-bound upstream refresh token. A mismatch means the upstream
/// session rotated since issue — the token is implicitly revoked.
pub async fn validate_access(state: &AppState, token: &str) -> Result<AuthContext, GatewayError> {
    let claims = state.tokens.decode(token)?;
    if claims.token_type != TOKEN_TYPE_ACCESS {
        return Err(GatewayError::Auth("could not validate credentials".into()));
    }
    let Some(claim_refresh) = claims.vivint_refresh_token else {
        return Err(GatewayError::Auth("could not validate credentials".into()));
    };

    let stored = state.kv.get(&vivint_refresh_key(&claims.sub)).await?;
    match stored {
        Some(stored) if stored == claim_refresh => Ok(AuthContext {
            username: claims.sub,
        }),
        _ => Err(GatewayError::Auth("could not validate credentials".into())),
    }
}

impl FromRequestParts<AppState> for AuthContext {
    type Rejection = GatewayError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| GatewayError::Auth("missing authorization header".into()))?;
        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| GatewayError::Auth("invalid authorization scheme".into()))?;
        validate_access(state, token).await
    }
}

/// Build a single-use upstream account for this user from the stored
/// refresh token and connect it with the full device graph loaded.
///
/// The caller MUST disconnect the account when done, on every path.
pub async fn upstream_account(
    state: &AppState,
    username: &str,
) -> Result<(Account, AuthUserData), GatewayError> {
    let refresh_token = state
        .kv
        .get(&vivint_refresh_key(username))
        .await?
        .ok_or_else(|| GatewayError::Auth("session expired, please log in again".into()))?;

    let account = Account::new(AccountConfig {
        username: username.to_owned(),
        refresh_token: Some(refresh_token),
        endpoints: state.settings.upstream_endpoints(),
        ..AccountConfig::default()
    })
    .map_err(|err| GatewayError::Internal(err.to_string()))?;

    match account.connect(true, false).await {
        Ok(authuser) => Ok((account, authuser)),
        Err(err) => {
            tracing::info!(username, error = %err, "upstream connect failed");
            account.disconnect().await;
            Err(GatewayError::Auth(
                "session expired, please log in again".into(),
            ))
        }
    }
}

/// Rebuild the mid-login upstream account stored in an MFA session blob
/// (cookies + PKCE verifier included).
pub fn account_from_mfa_blob(
    state: &AppState,
    blob: &MfaSessionBlob,
) -> Result<Account, GatewayError> {
    Account::new(AccountConfig {
        username: blob.username.clone(),
        password: Some(SecretString::from(blob.password.clone())),
        cookies: blob.cookies.clone(),
        code_verifier: blob.pkce_verifier.clone(),
        endpoints: state.settings.upstream_endpoints(),
        ..AccountConfig::default()
    })
    .map_err(|err| GatewayError::Internal(err.to_string()))
}
