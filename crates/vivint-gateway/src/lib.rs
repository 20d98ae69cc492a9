//! Multi-tenant HTTP+WebSocket gateway in front of the Vivint Sky cloud.
//!
//! Authenticates end users upstream (PKCE login with MFA handoff),
//! issues its own access/refresh JWTs bound to the upstream session via
//! the KV store, builds a short-lived upstream client per request, and
//! relays realtime pushes to WebSocket clients with filtering and
//! backpressure.

pub mod config;
pub mod error;
pub mod kv;
pub mod responses;
pub mod routes;
pub mod state;
pub mod tokens;
pub mod upstream;

pub use config::Settings;
pub use error::GatewayError;
pub use kv::SessionStore;
pub use routes::app;
pub use state::AppState;
pub use tokens::TokenService;
