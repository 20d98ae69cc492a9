// ── /auth routes ──
//
// Login prefers the stored upstream refresh token so users aren't
// MFA-prompted every session; the PKCE password flow is the fallback.
// An interrupted MFA login lives entirely in KV so any worker can
// resume it.

use axum::extract::State;
use axum::{Form, Json};
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::GatewayError;
use crate::kv::{
    api_refresh_key, mfa_session_key, vivint_refresh_key, MfaSessionBlob, MFA_SESSION_TTL,
    VIVINT_REFRESH_TOKEN_TTL,
};
use crate::responses::TokenResponse;
use crate::state::AppState;
use crate::tokens::TOKEN_TYPE_REFRESH;
use crate::upstream::account_from_mfa_blob;
use secrecy::SecretString;
use vivint_api::Error as SkyError;
use vivint_core::{Account, AccountConfig};

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyMfaRequest {
    pub mfa_session_id: String,
    pub mfa_code: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

/// Issue local access+refresh tokens for an established upstream
/// session, persisting both refresh tokens in KV.
async fn issue_tokens(
    state: &AppState,
    username: &str,
    account: &Account,
) -> Result<TokenResponse, GatewayError> {
    let vivint_refresh = account.refresh_token().ok_or_else(|| {
        GatewayError::Inconsistent("upstream session has no refresh token".into())
    })?;

    state
        .kv
        .set(
            &vivint_refresh_key(username),
            &vivint_refresh,
            Some(VIVINT_REFRESH_TOKEN_TTL),
        )
        .await?;

    let access_token = state.tokens.issue_access(username, &vivint_refresh)?;
    let refresh_token = state.tokens.issue_refresh(username)?;

    state
        .kv
        .set(
            &api_refresh_key(username),
            &refresh_token,
            Some(state.tokens.refresh_ttl()),
        )
        .await?;

    Ok(TokenResponse::bearer(access_token, refresh_token))
}

/// POST /auth/login
pub async fn login(
    State(state): State<AppState>,
    Form(form): Form<LoginForm>,
) -> Result<Json<TokenResponse>, GatewayError> {
    let username = form.username;

    // 1. Try the stored upstream refresh token first.
    let stored = state.kv.get(&vivint_refresh_key(&username)).await?;
    if let Some(refresh_token) = stored {
        let account = Account::new(AccountConfig {
            username: username.clone(),
            refresh_token: Some(refresh_token),
            endpoints: state.settings.upstream_endpoints(),
            ..AccountConfig::default()
        })
        .map_err(|err| GatewayError::Internal(err.to_string()))?;

        match account.connect(false, false).await {
            Ok(_) => {
                info!(username, "refresh-token login succeeded");
                let tokens = issue_tokens(&state, &username, &account).await;
                account.disconnect().await;
                return tokens.map(Json);
            }
            Err(err) => {
                info!(username, error = %err, "stored refresh token rejected, falling back to password login");
                account.disconnect().await;
            }
        }
    }

    // 2. Password + PKCE login (may raise an MFA gate).
    let account = Account::new(AccountConfig {
        username: username.clone(),
        password: Some(SecretString::from(form.password.clone())),
        endpoints: state.settings.upstream_endpoints(),
        ..AccountConfig::default()
    })
    .map_err(|err| GatewayError::Internal(err.to_string()))?;

    let result = match account.connect(false, false).await {
        Ok(_) => {
            info!(username, "password login succeeded");
            issue_tokens(&state, &username, &account).await.map(Json)
        }
        Err(SkyError::MfaRequired { .. }) => {
            let mfa_session_id = Uuid::new_v4().to_string();
            info!(username, mfa_session_id, "MFA required, persisting session blob");

            let blob = MfaSessionBlob {
                username: username.clone(),
                password: form.password,
                cookies: account.api().session_cookies(),
                pkce_verifier: account.api().code_verifier(),
            };
            let encoded = serde_json::to_string(&blob)
                .map_err(|err| GatewayError::Internal(err.to_string()))?;
            state
                .kv
                .set(
                    &mfa_session_key(&mfa_session_id),
                    &encoded,
                    Some(MFA_SESSION_TTL),
                )
                .await?;

            Err(GatewayError::MfaRequired { mfa_session_id })
        }
        Err(err) if err.is_auth() => {
            warn!(username, error = %err, "password login rejected");
            Err(GatewayError::Auth("incorrect username or password".into()))
        }
        Err(err) => Err(GatewayError::Upstream(err.to_string())),
    };

    account.disconnect().await;
    result
}

/// POST /auth/verify-mfa
///
/// The MFA session blob is deleted on every outcome; a failed code
/// requires a fresh login.
pub async fn verify_mfa(
    State(state): State<AppState>,
    Json(request): Json<VerifyMfaRequest>,
) -> Result<Json<TokenResponse>, GatewayError> {
    let session_key = mfa_session_key(&request.mfa_session_id);

    let Some(encoded) = state.kv.get(&session_key).await? else {
        return Err(GatewayError::BadRequest(
            "MFA session not found or expired".into(),
        ));
    };
    let blob: MfaSessionBlob = serde_json::from_str(&encoded)
        .map_err(|_| GatewayError::Internal("failed to restore session state".into()))?;

    let account = account_from_mfa_blob(&state, &blob)?;

    let result = match account.verify_mfa(&request.mfa_code).await {
        Ok(()) => {
            info!(username = blob.username, "MFA verification succeeded");
            issue_tokens(&state, &blob.username, &account).await.map(Json)
        }
        Err(err) if err.is_auth() => {
            warn!(username = blob.username, error = %err, "MFA verification failed");
            Err(GatewayError::Auth("MFA code is incorrect or expired".into()))
        }
        Err(err) => Err(GatewayError::Upstream(err.to_string())),
    };

    state.kv.delete(&session_key).await?;
    account.disconnect().await;
    result
}

/// POST /auth/refresh-token
///
/// Rotation: each refresh token is single-use. A mismatch against the
/// stored value defensively revokes the stored token.
pub async fn refresh_token(
    State(state): State<AppState>,
    Json(request): Json<RefreshTokenRequest>,
) -> Result<Json<TokenResponse>, GatewayError> {
    let claims = state.tokens.decode(&request.refresh_token)?;
    if claims.token_type != TOKEN_TYPE_REFRESH {
        return Err(GatewayError::Auth("could not validate credentials".into()));
    }
    let username = claims.sub;

    let stored_key = api_refresh_key(&username);
    let Some(stored) = state.kv.get(&stored_key).await? else {
        return Err(GatewayError::Auth(
            "refresh token not found, expired, or already used".into(),
        ));
    };
    if stored != request.refresh_token {
        warn!(username, "refresh token mismatch, revoking stored token");
        state.kv.delete(&stored_key).await?;
        return Err(GatewayError::Auth("could not validate credentials".into()));
    }

    let vivint_refresh = state
        .kv
        .get(&vivint_refresh_key(&username))
        .await?
        .ok_or_else(|| {
            GatewayError::Inconsistent("essential session data missing".into())
        })?;

    let access_token = state.tokens.issue_access(&username, &vivint_refresh)?;
    let new_refresh = state.tokens.issue_refresh(&username)?;
    state
        .kv
        .set(&stored_key, &new_refresh, Some(state.tokens.refresh_ttl()))
        .await?;

    Ok(Json(TokenResponse::bearer(access_token, new_refresh)))
}
