//! Async Rust client for the Vivint Sky cloud.
//!
//! This crate provides the transport layer for the Sky API:
//!
//! - **REST** ([`SkyClient`]) — bearer-authenticated JSON endpoints under
//!   the API host, plus the OAuth/PKCE flows on the auth host. The client
//!   classifies responses, gates requests while an MFA challenge is
//!   outstanding, and re-authenticates once on 401.
//! - **gRPC** — a handful of camera operations over a TLS channel whose
//!   lifetime equals the call, authenticated by `("token", ...)` metadata.
//! - **Realtime** ([`SkyStream`]) — the hosted pub/sub channel that feeds
//!   the device graph in `vivint-core`.
//!
//! Higher-level consumers compose these behind an
//! `Account` facade and materialize typed site/panel/device trees.

pub mod auth;
pub mod client;
pub mod endpoints;
pub mod error;
pub mod grpc;
pub mod models;
pub mod pkce;
pub mod realtime;
pub mod token;
pub mod transport;

pub use client::{ApiEndpoints, Body, MfaType, SkyClient, SkyConfig};
pub use client::{API_ENDPOINT, AUTH_ENDPOINT, GRPC_ENDPOINT};
pub use error::Error;
pub use realtime::{MessageCallback, SkyStream, PN_CHANNEL, PN_SUBSCRIBE_KEY};
pub use token::AuthTokens;
pub use transport::{SessionCookie, SessionCookieJar, TransportConfig};
