//! Realtime push channel.
//!
//! The Sky cloud publishes state changes over a hosted pub/sub service.
//! Each user gets a broadcast-channel suffix in their auth payload; the
//! subscription key is `"PlatformChannel#<suffix>"` and the client
//! identifies itself as `"pn-<UPPERCASE user id>"`.
//!
//! The subscription is a background long-poll task. One task per
//! subscription means messages reach the callback in receive order.
//! Delivery is at-least-once: graph mutations are merge-idempotent, but
//! entity listeners may observe duplicate updates. Channel errors are
//! logged and end the task — reconnection is the caller's decision (the
//! local WebSocket relay closes the client, forcing a fresh login).

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};
use url::Url;

use crate::error::Error;
use crate::models::AuthUserData;

/// Subscribe key for the Sky platform channel service.
pub const PN_SUBSCRIBE_KEY: &str = "sub-c-6fb03d68-6a78-11e2-ae8f-12313f022c90";
/// Fixed channel prefix; joined with the user's broadcast channel.
pub const PN_CHANNEL: &str = "PlatformChannel";
/// Production origin of the channel service.
pub const PN_ORIGIN: &str = "https://ps.pndsn.com";

/// Callback invoked for every push message, in receive order.
pub type MessageCallback = Arc<dyn Fn(Value) + Send + Sync>;

/// Handle to the realtime push channel.
pub struct SkyStream {
    origin: String,
    http: reqwest::Client,
    task: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl Default for SkyStream {
    fn default() -> Self {
        Self::new()
    }
}

impl SkyStream {
    pub fn new() -> Self {
        Self::with_origin(PN_ORIGIN.to_owned())
    }

    /// Point the stream at a different origin (tests).
    pub fn with_origin(origin: String) -> Self {
        Self {
            origin,
            // Long-poll requests are held open by the service; the read
            // timeout must comfortably exceed its ~280s hold time.
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(320))
                .build()
                .expect("reqwest client"),
            task: Mutex::new(None),
        }
    }

    /// No-op: the channel is established at `subscribe`.
    pub async fn connect(&self) -> Result<(), Error> {
        Ok(())
    }

    /// Start the subscription for the given auth user.
    ///
    /// If the payload has no users, no broadcast channel, or no user id,
    /// this logs and returns without starting anything — no partial
    /// state. A second call replaces the previous subscription.
    pub async fn subscribe(&self, auth_user: &AuthUserData, callback: MessageCallback) {
        let Some(user) = auth_user.primary_user() else {
            error!("no users present in auth-user data; cannot subscribe");
            return;
        };
        let Some(channel_suffix) = user.message_broadcast_channel.clone() else {
            error!("missing message broadcast channel; skipping subscribe");
            return;
        };
        if user.id.is_empty() {
            error!("missing user id; skipping subscribe");
            return;
        }

        let channel = format!("{PN_CHANNEL}#{channel_suffix}");
        let client_id = format!("pn-{}", user.id.to_uppercase());

        self.disconnect().await;

        let cancel = CancellationToken::new();
        let task = tokio::spawn(subscribe_loop(
            self.http.clone(),
            self.origin.clone(),
            channel,
            client_id,
            callback,
            cancel.clone(),
        ));

        *self.task.lock().expect("stream task lock poisoned") = Some((cancel, task));
    }

    /// Stop the subscription and wait for the task's graceful shutdown.
    /// Idempotent.
    pub async fn disconnect(&self) {
        let taken = self.task.lock().expect("stream task lock poisoned").take();
        if let Some((cancel, task)) = taken {
            cancel.cancel();
            let _ = task.await;
        }
    }
}

/// Long-poll loop: fetch → dispatch in order → repeat with the returned
/// timetoken. Errors end the loop; cancellation sends a best-effort
/// leave.
async fn subscribe_loop(
    http: reqwest::Client,
    origin: String,
    channel: String,
    client_id: String,
    callback: MessageCallback,
    cancel: CancellationToken,
) {
    let mut timetoken = "0".to_owned();

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                send_leave(&http, &origin, &channel, &client_id).await;
                debug!(%channel, "realtime subscription closed");
                return;
            }
            result = poll_once(&http, &origin, &channel, &client_id, &timetoken) => {
                match result {
                    Ok((next, messages)) => {
                        timetoken = next;
                        for message in messages {
                            callback(message);
                        }
                    }
                    Err(err) => {
                        error!(%channel, error = %err, "realtime channel failed");
                        return;
                    }
                }
            }
        }
    }
}

/// One subscribe request. Returns the next timetoken and the message
/// payloads, oldest first.
async fn poll_once(
    http: &reqwest::Client,
    origin: &str,
    channel: &str,
    client_id: &str,
    timetoken: &str,
) -> Result<(String, Vec<Value>), Error> {
    let mut url = Url::parse(origin).map_err(Error::InvalidUrl)?;
    url.path_segments_mut()
        .map_err(|()| Error::Stream("invalid channel origin".into()))?
        .extend(["v2", "subscribe", PN_SUBSCRIBE_KEY, channel, "0"]);
    url.query_pairs_mut()
        .append_pair("uuid", client_id)
        .append_pair("tt", timetoken);

    let response = http.get(url).send().await.map_err(Error::Transport)?;
    let status = response.status();
    if !status.is_success() {
        return Err(Error::Stream(format!("subscribe returned {status}")));
    }
    let body: Value = response.json().await.map_err(Error::Transport)?;

    let next = body
        .pointer("/t/t")
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| Error::Stream("subscribe response missing timetoken".into()))?;

    let messages = body
        .get("m")
        .and_then(Value::as_array)
        .map(|envelopes| {
            envelopes
                .iter()
                .filter_map(|envelope| envelope.get("d").cloned())
                .collect()
        })
        .unwrap_or_default();

    Ok((next, messages))
}

async fn send_leave(http: &reqwest::Client, origin: &str, channel: &str, client_id: &str) {
    let Ok(mut url) = Url::parse(origin) else {
        return;
    };
    if url
        .path_segments_mut()
        .map(|mut segments| {
            segments.extend([
                "v2",
                "presence",
                "sub-key",
                PN_SUBSCRIBE_KEY,
                "channel",
                channel,
                "leave",
            ]);
        })
        .is_err()
    {
        return;
    }
    url.query_pairs_mut().append_pair("uuid", client_id);
    let _ = http.get(url).send().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn channel_name_joins_prefix_and_suffix() {
        assert_eq!(format!("{PN_CHANNEL}#abc"), "PlatformChannel#abc");
    }

    #[tokio::test]
    async fn subscribe_without_users_is_a_no_op() {
        let stream = SkyStream::new();
        let auth_user: AuthUserData = serde_json::from_value(json!({ "u": [] })).unwrap();
        stream
            .subscribe(&auth_user, Arc::new(|_message| {}))
            .await;
        assert!(stream.task.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn subscribe_without_broadcast_channel_is_a_no_op() {
        let stream = SkyStream::new();
        let auth_user: AuthUserData =
            serde_json::from_value(json!({ "u": [{ "_id": "abc" }] })).unwrap();
        stream
            .subscribe(&auth_user, Arc::new(|_message| {}))
            .await;
        assert!(stream.task.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn disconnect_twice_is_a_no_op() {
        let stream = SkyStream::new();
        stream.disconnect().await;
        stream.disconnect().await;
    }
}
