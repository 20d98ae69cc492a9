use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use vivint_api::Error as SkyError;

/// Gateway-facing error kinds, each mapping to one HTTP status.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Local token invalid, or the upstream session can no longer be
    /// established for this user.
    #[error("{0}")]
    Auth(String),

    /// The upstream raised an MFA gate during login; the client should
    /// call `/auth/verify-mfa` with the session id.
    #[error("MFA required")]
    MfaRequired { mfa_session_id: String },

    /// Caller error or upstream business refusal.
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    /// Upstream transport, TLS, or auth failure outside login.
    #[error("upstream error: {0}")]
    Upstream(String),

    /// KV state that must exist is missing.
    #[error("inconsistent session state: {0}")]
    Inconsistent(String),

    #[error("KV store error: {0}")]
    Kv(#[from] redis::RedisError),

    #[error("{0}")]
    Internal(String),
}

impl GatewayError {
    /// Classification for device/panel action endpoints: business
    /// refusals and unsupported features are the caller's problem (400),
    /// anything transport- or auth-shaped is a bad gateway (502).
    pub fn from_action(err: SkyError) -> Self {
        match err {
            SkyError::Api { message } => Self::BadRequest(message),
            SkyError::NotSupported(what) => Self::BadRequest(format!("not supported: {what}")),
            other => Self::Upstream(other.to_string()),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Auth(_) => StatusCode::UNAUTHORIZED,
            Self::MfaRequired { .. } | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Inconsistent(_) | Self::Kv(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            GatewayError::MfaRequired { mfa_session_id } => json!({
                "message": "MFA_REQUIRED",
                "mfa_session_id": mfa_session_id,
            }),
            GatewayError::Kv(err) => {
                tracing::error!(error = %err, "KV store failure");
                json!({ "message": "internal server error" })
            }
            other => json!({ "message": other.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}
