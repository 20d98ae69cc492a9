use thiserror::Error;

/// Top-level error type for the `vivint-api` crate.
///
/// Covers every failure mode across the REST, gRPC, and realtime surfaces.
/// `vivint-gateway` maps these into HTTP statuses for local clients.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// Login or token grant failed on the auth host.
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    /// The upstream signalled a multi-factor gate. The login can be
    /// resumed with [`crate::SkyClient::verify_mfa`].
    #[error("Multi-factor authentication required")]
    MfaRequired { message: String },

    // ── API ─────────────────────────────────────────────────────────
    /// Explicit failure from the Sky API (4xx off the auth host, or an
    /// endpoint reporting it could not perform the operation).
    #[error("Sky API error: {message}")]
    Api { message: String },

    /// Operation not available for this device variant.
    #[error("Unsupported operation: {0}")]
    NotSupported(&'static str),

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, TLS, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Response status outside the classified set (5xx and friends).
    #[error("Unexpected status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    // ── gRPC ────────────────────────────────────────────────────────
    /// gRPC channel or call failure.
    #[error("gRPC error: {0}")]
    Grpc(String),

    // ── Realtime ────────────────────────────────────────────────────
    /// Push channel failure.
    #[error("Realtime stream error: {0}")]
    Stream(String),
}

impl Error {
    /// Returns `true` if this error came from the auth layer and a fresh
    /// login might resolve it.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Authentication { .. } | Self::MfaRequired { .. })
    }

    /// Returns `true` for transport-class failures (network, TLS,
    /// unexpected status) that map to a 502 at the gateway.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Transport(_)
                | Self::InvalidUrl(_)
                | Self::UnexpectedStatus { .. }
                | Self::Deserialization { .. }
                | Self::Grpc(_)
                | Self::Stream(_)
        )
    }

    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::UnexpectedStatus { status, .. } => *status >= 500,
            Self::Stream(_) => true,
            _ => false,
        }
    }
}
