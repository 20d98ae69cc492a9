// Shared transport configuration for building reqwest::Client instances.
//
// The Sky client needs two things a stock reqwest client doesn't give us:
// a cookie jar whose contents can be exported (MFA resume serializes the
// auth-host cookies into the session store) and a no-follow redirect
// policy (302 responses are classified, never followed).

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::HeaderValue;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::Error;

/// A single session cookie in exportable form.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
}

/// Cookie jar that records every cookie it receives so the session can be
/// serialized and later rebuilt in a different process.
///
/// Matching and header construction are delegated to [`reqwest::cookie::Jar`];
/// this type only keeps a parallel `(domain, name) -> cookie` map for export.
#[derive(Default)]
pub struct SessionCookieJar {
    inner: Jar,
    seen: Mutex<HashMap<(String, String), SessionCookie>>,
}

impl SessionCookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a jar from previously exported cookies.
    pub fn from_cookies(cookies: &[SessionCookie]) -> Self {
        let jar = Self::new();
        for cookie in cookies {
            jar.insert(cookie.clone());
        }
        jar
    }

    /// Insert a cookie directly (used when restoring an MFA session).
    pub fn insert(&self, cookie: SessionCookie) {
        if let Ok(url) = Url::parse(&format!("https://{}{}", cookie.domain, cookie.path)) {
            let header = format!(
                "{}={}; Domain={}; Path={}",
                cookie.name, cookie.value, cookie.domain, cookie.path
            );
            self.inner.add_cookie_str(&header, &url);
        }
        self.seen
            .lock()
            .expect("cookie jar lock poisoned")
            .insert((cookie.domain.clone(), cookie.name.clone()), cookie);
    }

    /// Snapshot of every cookie observed on this session.
    pub fn export(&self) -> Vec<SessionCookie> {
        let mut cookies: Vec<SessionCookie> = self
            .seen
            .lock()
            .expect("cookie jar lock poisoned")
            .values()
            .cloned()
            .collect();
        cookies.sort_by(|a, b| (&a.domain, &a.name).cmp(&(&b.domain, &b.name)));
        cookies
    }

    fn record(&self, header: &str, url: &Url) {
        let Some(cookie) = parse_set_cookie(header, url) else {
            return;
        };
        self.seen
            .lock()
            .expect("cookie jar lock poisoned")
            .insert((cookie.domain.clone(), cookie.name.clone()), cookie);
    }
}

impl CookieStore for SessionCookieJar {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &Url) {
        let headers: Vec<&HeaderValue> = cookie_headers.collect();
        for header in &headers {
            if let Ok(raw) = header.to_str() {
                self.record(raw, url);
            }
        }
        self.inner.set_cookies(&mut headers.into_iter(), url);
    }

    fn cookies(&self, url: &Url) -> Option<HeaderValue> {
        self.inner.cookies(url)
    }
}

/// Parse the interesting parts of a `Set-Cookie` header. Attributes other
/// than `Domain` and `Path` are not needed for session resume.
fn parse_set_cookie(header: &str, url: &Url) -> Option<SessionCookie> {
    let mut parts = header.split(';');
    let pair = parts.next()?.trim();
    let (name, value) = pair.split_once('=')?;
    if name.is_empty() {
        return None;
    }

    let mut domain = url.host_str().unwrap_or_default().to_owned();
    let mut path = "/".to_owned();
    for attr in parts {
        let attr = attr.trim();
        if let Some((key, val)) = attr.split_once('=') {
            match key.trim().to_ascii_lowercase().as_str() {
                "domain" => domain = val.trim().trim_start_matches('.').to_owned(),
                "path" => path = val.trim().to_owned(),
                _ => {}
            }
        }
    }

    Some(SessionCookie {
        name: name.trim().to_owned(),
        value: value.trim().to_owned(),
        domain,
        path,
    })
}

/// Transport settings shared by every Sky client.
#[derive(Clone)]
pub struct TransportConfig {
    pub timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
        }
    }
}

impl TransportConfig {
    /// Build a `reqwest::Client` wired to the given cookie jar.
    ///
    /// Redirects are never followed: the transport layer classifies 302
    /// responses itself (the OAuth and thumbnail flows read `Location`).
    pub fn build_client(&self, jar: Arc<SessionCookieJar>) -> Result<reqwest::Client, Error> {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(concat!("vivint-gateway/", env!("CARGO_PKG_VERSION")))
            .redirect(reqwest::redirect::Policy::none())
            .cookie_provider(jar)
            .build()
            .map_err(Error::Transport)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_set_cookie_with_attributes() {
        let url = Url::parse("https://id.vivint.com/idp/api/submit").unwrap();
        let cookie =
            parse_set_cookie("v_sid=abc123; Domain=.vivint.com; Path=/; HttpOnly", &url).unwrap();
        assert_eq!(cookie.name, "v_sid");
        assert_eq!(cookie.value, "abc123");
        assert_eq!(cookie.domain, "vivint.com");
        assert_eq!(cookie.path, "/");
    }

    #[test]
    fn parse_set_cookie_defaults_to_request_host() {
        let url = Url::parse("https://id.vivint.com/oauth2/auth").unwrap();
        let cookie = parse_set_cookie("state=xyz", &url).unwrap();
        assert_eq!(cookie.domain, "id.vivint.com");
        assert_eq!(cookie.path, "/");
    }

    #[test]
    fn export_round_trips_through_restore() {
        let jar = SessionCookieJar::new();
        jar.insert(SessionCookie {
            name: "v_sid".into(),
            value: "s1".into(),
            domain: "vivint.com".into(),
            path: "/".into(),
        });
        jar.insert(SessionCookie {
            name: "csrf".into(),
            value: "t1".into(),
            domain: "id.vivint.com".into(),
            path: "/idp".into(),
        });

        let exported = jar.export();
        assert_eq!(exported.len(), 2);

        let restored = SessionCookieJar::from_cookies(&exported);
        assert_eq!(restored.export(), exported);
    }

    #[test]
    fn malformed_set_cookie_is_ignored() {
        let url = Url::parse("https://id.vivint.com/").unwrap();
        assert!(parse_set_cookie("no-equals-sign", &url).is_none());
        assert!(parse_set_cookie("=value-without-name", &url).is_none());
    }
}
