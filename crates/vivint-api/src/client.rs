// Sky API HTTP client
//
// Wraps `reqwest::Client` with bearer injection, the MFA gate, response
// classification, and one implicit re-auth on 401. Endpoint methods live
// in `auth.rs` and `endpoints.rs` as inherent impls so this module stays
// focused on transport mechanics.

use std::sync::{Arc, Mutex};

use reqwest::header::{HeaderMap, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use secrecy::SecretString;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::error::Error;
use crate::token::{AuthTokens, EXPIRY_SKEW_SECS};
use crate::transport::{SessionCookie, SessionCookieJar, TransportConfig};

/// Production REST base (paths are joined under `/api`).
pub const API_ENDPOINT: &str = "https://www.vivintsky.com/api";
/// Production auth host.
pub const AUTH_ENDPOINT: &str = "https://id.vivint.com";
/// Production gRPC endpoint.
pub const GRPC_ENDPOINT: &str = "https://grpc.vivintsky.com:50051";

/// OAuth client id registered for PKCE logins.
pub const OAUTH_CLIENT_ID: &str = "ios";
/// App-scheme redirect the auth host bounces completed logins to.
pub const OAUTH_REDIRECT_URI: &str = "vivint://app/oauth_redirect";
/// Scopes requested at login.
pub const OAUTH_SCOPE: &str = "openid email devices email_verified";

/// Where the client talks. Defaults to production; tests point this at a
/// mock server.
#[derive(Debug, Clone)]
pub struct ApiEndpoints {
    pub api_base: String,
    pub auth_base: String,
    pub grpc: String,
}

impl Default for ApiEndpoints {
    fn default() -> Self {
        Self {
            api_base: API_ENDPOINT.to_owned(),
            auth_base: AUTH_ENDPOINT.to_owned(),
            grpc: GRPC_ENDPOINT.to_owned(),
        }
    }
}

/// Which kind of second factor the upstream asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MfaType {
    /// SMS / emailed code, verified at `/idp/api/validate`.
    #[default]
    Code,
    /// Authenticator app code, verified at `/idp/api/submit`.
    Mfa,
}

impl MfaType {
    pub(crate) fn verify_path(self) -> &'static str {
        match self {
            Self::Code => "/idp/api/validate",
            Self::Mfa => "/idp/api/submit",
        }
    }

    pub(crate) fn body_key(self) -> &'static str {
        match self {
            Self::Code => "code",
            Self::Mfa => "mfa",
        }
    }
}

/// Everything needed to construct a [`SkyClient`].
#[derive(Default)]
pub struct SkyConfig {
    pub username: String,
    pub password: Option<SecretString>,
    pub refresh_token: Option<String>,
    /// Cookies from a previous session (MFA resume).
    pub cookies: Vec<SessionCookie>,
    /// PKCE verifier from a previous session (MFA resume).
    pub code_verifier: Option<String>,
    pub endpoints: ApiEndpoints,
    pub transport: TransportConfig,
}

#[derive(Default)]
pub(crate) struct AuthState {
    pub(crate) tokens: Option<AuthTokens>,
    pub(crate) refresh_token: Option<String>,
    pub(crate) mfa_pending: bool,
    pub(crate) mfa_type: MfaType,
    pub(crate) code_verifier: Option<String>,
}

/// Request body shapes the Sky API understands.
#[derive(Debug, Clone)]
pub enum Body {
    Json(Value),
    Form(Vec<(String, String)>),
}

impl Body {
    /// The MFA gate lets through only bodies that look like an MFA
    /// submission: a JSON object carrying a `code` key.
    fn is_mfa_submission(&self) -> bool {
        matches!(self, Body::Json(Value::Object(map)) if map.contains_key("code"))
    }
}

struct Inner {
    http: reqwest::Client,
    cookies: Arc<SessionCookieJar>,
    endpoints: ApiEndpoints,
    username: String,
    password: Option<SecretString>,
    state: Mutex<AuthState>,
}

/// Client for the Vivint Sky cloud.
///
/// Cheaply cloneable; all clones share one cookie jar and one auth state.
/// Auth flows live in `auth.rs`, REST endpoints in `endpoints.rs`, and
/// gRPC calls in `grpc.rs`.
#[derive(Clone)]
pub struct SkyClient {
    inner: Arc<Inner>,
}

impl SkyClient {
    pub fn new(config: SkyConfig) -> Result<Self, Error> {
        let cookies = Arc::new(SessionCookieJar::from_cookies(&config.cookies));
        let http = config.transport.build_client(Arc::clone(&cookies))?;

        Ok(Self {
            inner: Arc::new(Inner {
                http,
                cookies,
                endpoints: config.endpoints,
                username: config.username,
                password: config.password,
                state: Mutex::new(AuthState {
                    refresh_token: config.refresh_token,
                    code_verifier: config.code_verifier,
                    ..AuthState::default()
                }),
            }),
        })
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn username(&self) -> &str {
        &self.inner.username
    }

    pub(crate) fn password(&self) -> Option<&SecretString> {
        self.inner.password.as_ref()
    }

    pub(crate) fn endpoints(&self) -> &ApiEndpoints {
        &self.inner.endpoints
    }

    /// The refresh token from the newest grant, falling back to the one
    /// the client was constructed with.
    pub fn refresh_token(&self) -> Option<String> {
        let state = self.lock_state();
        state
            .tokens
            .as_ref()
            .and_then(|t| t.refresh_token.clone())
            .or_else(|| state.refresh_token.clone())
    }

    /// The current access token, if a session is held.
    pub fn access_token(&self) -> Option<String> {
        self.lock_state().tokens.as_ref().map(|t| t.access_token.clone())
    }

    /// The PKCE verifier for the in-flight login, if any.
    pub fn code_verifier(&self) -> Option<String> {
        self.lock_state().code_verifier.clone()
    }

    /// Serializable snapshot of the session cookies (MFA resume).
    pub fn session_cookies(&self) -> Vec<SessionCookie> {
        self.inner.cookies.export()
    }

    /// Returns `true` while an MFA challenge is outstanding.
    pub fn mfa_pending(&self) -> bool {
        self.lock_state().mfa_pending
    }

    /// Returns `true` if the held id token is still inside its validity
    /// window (30s skew).
    pub fn is_session_valid(&self) -> bool {
        self.lock_state()
            .tokens
            .as_ref()
            .is_some_and(|t| t.is_valid(EXPIRY_SKEW_SECS))
    }

    /// Drop the session tokens. The cookie jar is left intact so an MFA
    /// round trip can still complete.
    pub fn clear_session(&self) {
        let mut state = self.lock_state();
        state.tokens = None;
        state.mfa_pending = false;
    }

    pub(crate) fn lock_state(&self) -> std::sync::MutexGuard<'_, AuthState> {
        self.inner.state.lock().expect("auth state lock poisoned")
    }

    // ── Request helpers ──────────────────────────────────────────────

    pub(crate) async fn get(&self, target: &str) -> Result<Value, Error> {
        self.call(Method::GET, target, None, &[], None).await
    }

    pub(crate) async fn get_with(
        &self,
        target: &str,
        headers: Option<HeaderMap>,
        query: &[(&str, String)],
    ) -> Result<Value, Error> {
        self.call(Method::GET, target, headers, query, None).await
    }

    pub(crate) async fn post(
        &self,
        target: &str,
        query: &[(&str, String)],
        body: Option<Body>,
    ) -> Result<Value, Error> {
        self.call(Method::POST, target, None, query, body).await
    }

    pub(crate) async fn put(
        &self,
        target: &str,
        headers: Option<HeaderMap>,
        body: Option<Body>,
    ) -> Result<Value, Error> {
        self.call(Method::PUT, target, headers, &[], body).await
    }

    /// Perform a request with bearer injection, the MFA gate, response
    /// classification, and one implicit re-auth on 401.
    ///
    /// Low-level escape hatch: `target` is either a path relative to the
    /// API base or a fully qualified URL (used as-is for the auth host).
    pub async fn call(
        &self,
        method: Method,
        target: &str,
        headers: Option<HeaderMap>,
        query: &[(&str, String)],
        body: Option<Body>,
    ) -> Result<Value, Error> {
        let on_auth_host = target.starts_with(&self.inner.endpoints.auth_base);

        if !on_auth_host && !self.is_session_valid() {
            self.ensure_session().await?;
        }

        let is_mfa_submission = body.as_ref().is_some_and(Body::is_mfa_submission);
        if self.mfa_pending() && !is_mfa_submission {
            return Err(Error::MfaRequired {
                message: "mfa_required".into(),
            });
        }

        let url = if target.starts_with("http") {
            target.to_owned()
        } else {
            format!("{}/{}", self.inner.endpoints.api_base, target)
        };

        let mut reauthed = false;
        loop {
            let mut request = self.inner.http.request(method.clone(), &url);
            if let Some(ref headers) = headers {
                request = request.headers(headers.clone());
            }
            if !query.is_empty() {
                request = request.query(query);
            }
            if !on_auth_host {
                if let Some(access) = self.access_token() {
                    request = request.bearer_auth(access);
                }
            }
            request = match &body {
                Some(Body::Json(value)) => request.json(value),
                Some(Body::Form(pairs)) => request.form(pairs),
                None => request,
            };

            debug!(%method, %url, "Sky API call");
            let response = request.send().await.map_err(Error::Transport)?;
            let status = response.status();

            // One implicit re-auth, then retry the original call once.
            if status == StatusCode::UNAUTHORIZED && !on_auth_host && !reauthed {
                warn!(%url, "401 from Sky API, re-authenticating");
                self.clear_session();
                self.ensure_session().await?;
                reauthed = true;
                continue;
            }

            return self.classify(response, on_auth_host, is_mfa_submission).await;
        }
    }

    /// Map a response into a JSON value or an error, per status class.
    async fn classify(
        &self,
        response: reqwest::Response,
        on_auth_host: bool,
        is_mfa_submission: bool,
    ) -> Result<Value, Error> {
        let status = response.status();
        let is_json = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("application/json"));
        let location = response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);

        if status == StatusCode::FOUND {
            return Ok(json!({ "location": location }));
        }

        let text = response.text().await.map_err(Error::Transport)?;

        if status == StatusCode::OK {
            if !is_json {
                return Ok(json!({ "message": text }));
            }
            return serde_json::from_str(&text).map_err(|e| Error::Deserialization {
                message: e.to_string(),
                body: text,
            });
        }

        if matches!(
            status,
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
        ) {
            let body: Value = serde_json::from_str(&text).unwrap_or(Value::Null);
            let message = extract_error_message(&body);

            if message.as_deref() == Some("mfa_required")
                || looks_mfa_shaped(&body)
                || is_mfa_submission
            {
                self.note_mfa_challenge(&body);
                return Err(Error::MfaRequired {
                    message: message.unwrap_or_else(|| "mfa_required".into()),
                });
            }

            let message = message.unwrap_or_else(|| format!("HTTP {status}"));
            return Err(if on_auth_host {
                Error::Authentication { message }
            } else {
                Error::Api { message }
            });
        }

        Err(Error::UnexpectedStatus {
            status: status.as_u16(),
            body: text,
        })
    }

    /// Record that the upstream raised an MFA gate, remembering which
    /// factor kind it asked for.
    pub(crate) fn note_mfa_challenge(&self, body: &Value) {
        let mut state = self.lock_state();
        state.mfa_pending = true;
        if body.get("mfa").is_some() {
            state.mfa_type = MfaType::Mfa;
        } else if body.get("validate").is_some() {
            state.mfa_type = MfaType::Code;
        }
    }

    pub(crate) fn store_tokens(&self, tokens: AuthTokens) {
        let mut state = self.lock_state();
        if let Some(rt) = tokens.refresh_token.clone() {
            state.refresh_token = Some(rt);
        }
        state.tokens = Some(tokens);
    }
}

/// Pull the human-readable message out of an error body: `message`, else
/// `error` (optionally joined with `error_description`).
fn extract_error_message(body: &Value) -> Option<String> {
    if let Some(message) = body.get("message").and_then(Value::as_str) {
        return Some(message.to_owned());
    }
    let error = body.get("error").and_then(Value::as_str)?;
    Some(match body.get("error_description").and_then(Value::as_str) {
        Some(description) => format!("{error}: {description}"),
        None => error.to_owned(),
    })
}

/// A body "looks MFA-shaped" when it carries one of the challenge keys.
fn looks_mfa_shaped(body: &Value) -> bool {
    body.get("validate").is_some() || body.get("mfa").is_some()
}
