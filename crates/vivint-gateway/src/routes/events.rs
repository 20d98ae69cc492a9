// ── /ws/events — realtime relay ──
//
// Browser WebSockets cannot set headers, so the access token rides in
// the `token` query parameter. Each connection gets its own upstream
// account and realtime subscription; pushes are classified, filtered,
// and fanned out through a bounded queue. A slow client is closed
// rather than allowed to back up the upstream pipeline.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::state::AppState;
use crate::upstream::{upstream_account, validate_access};
use vivint_core::MessageTap;

/// Queue capacity per client; overflow closes the socket.
const EVENT_QUEUE_CAPACITY: usize = 1000;
/// Idle period after which a heartbeat is sent.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
/// How long teardown will keep forwarding already-queued events.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(3);

/// Close codes: policy violation (bad token) and internal error (slow
/// client / upstream failure).
const CLOSE_POLICY_VIOLATION: u16 = 1008;
const CLOSE_INTERNAL_ERROR: u16 = 1011;

#[derive(Debug, Clone, Deserialize)]
pub struct WsParams {
    pub token: String,
    pub system_id: Option<i64>,
    pub device_id: Option<i64>,
}

pub async fn ws_events(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, params, state))
}

async fn close_with(mut socket: WebSocket, code: u16, reason: &'static str) {
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code,
            reason: reason.into(),
        })))
        .await;
}

async fn handle_socket(mut socket: WebSocket, params: WsParams, state: AppState) {
    // The upgrade has to complete before a close frame can carry a
    // code, so auth happens first thing on the open socket.
    let auth = match validate_access(&state, &params.token).await {
        Ok(auth) => auth,
        Err(_) => {
            close_with(socket, CLOSE_POLICY_VIOLATION, "invalid token").await;
            return;
        }
    };

    let (account, authuser) = match upstream_account(&state, &auth.username).await {
        Ok(pair) => pair,
        Err(err) => {
            info!(username = auth.username, error = %err, "upstream unavailable for relay");
            close_with(socket, CLOSE_INTERNAL_ERROR, "upstream unavailable").await;
            return;
        }
    };

    info!(username = auth.username, "websocket relay connected");

    let (tx, mut rx) = mpsc::channel::<Value>(EVENT_QUEUE_CAPACITY);
    let overflow = CancellationToken::new();

    let filters = EventFilters {
        system_id: params.system_id,
        device_id: params.device_id,
    };
    account.add_message_tap(build_tap(tx, overflow.clone(), filters));

    if let Err(err) = account.subscribe_for_realtime_updates(&authuser).await {
        info!(username = auth.username, error = %err, "realtime subscribe failed");
        account.disconnect().await;
        close_with(socket, CLOSE_INTERNAL_ERROR, "realtime unavailable").await;
        return;
    }

    let mut slow_client = false;
    loop {
        tokio::select! {
            biased;
            _ = overflow.cancelled() => {
                slow_client = true;
                break;
            }
            incoming = socket.recv() => {
                match incoming {
                    None | Some(Err(_)) | Some(Ok(Message::Close(_))) => break,
                    // Pings are answered by axum; other client frames
                    // are ignored.
                    Some(Ok(_)) => {}
                }
            }
            queued = tokio::time::timeout(HEARTBEAT_INTERVAL, rx.recv()) => {
                match queued {
                    Err(_) => {
                        let ping = json!({ "event_name": "ping" });
                        if socket.send(Message::Text(ping.to_string().into())).await.is_err() {
                            break;
                        }
                    }
                    Ok(Some(event)) => {
                        if socket.send(Message::Text(event.to_string().into())).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                }
            }
        }
    }

    // Teardown: stop the upstream first, then drain what's already
    // queued (best effort, bounded), then close.
    account.disconnect().await;

    if slow_client {
        debug!(username = auth.username, "closing slow websocket client");
        close_with(socket, CLOSE_INTERNAL_ERROR, "client too slow").await;
        return;
    }

    let drain_deadline = tokio::time::Instant::now() + DRAIN_TIMEOUT;
    while let Ok(Some(event)) = tokio::time::timeout_at(drain_deadline, rx.recv()).await {
        if socket.send(Message::Text(event.to_string().into())).await.is_err() {
            break;
        }
    }
    let _ = socket.send(Message::Close(None)).await;
    info!(username = auth.username, "websocket relay closed");
}

#[derive(Debug, Clone, Copy)]
struct EventFilters {
    system_id: Option<i64>,
    device_id: Option<i64>,
}

/// Classify + filter + enqueue. A full queue (or vanished consumer)
/// cancels the connection rather than backing up the upstream pipeline.
fn build_tap(
    tx: mpsc::Sender<Value>,
    overflow: CancellationToken,
    filters: EventFilters,
) -> MessageTap {
    Arc::new(move |message| {
        let Some(event) = classify_event(message, &filters) else {
            return;
        };
        if tx.try_send(event).is_err() {
            overflow.cancel();
        }
    })
}

/// Turn a raw push into the relay's event envelope, applying the
/// optional system/device filters. Returns `None` for messages that
/// should not reach this client.
fn classify_event(message: &Value, filters: &EventFilters) -> Option<Value> {
    let obj = message.as_object()?;
    let message_type = obj.get("t").and_then(Value::as_str)?;
    let operation = obj.get("op").and_then(Value::as_str);
    let event_name = match operation {
        Some(op) => format!("{message_type}:{op}"),
        None => message_type.to_owned(),
    };

    let panel_id = obj.get("panid").and_then(Value::as_i64);
    let device_ids: Vec<i64> = message
        .pointer("/da/d")
        .and_then(Value::as_array)
        .map(|devices| {
            devices
                .iter()
                .filter_map(|d| d.get("_id").and_then(Value::as_i64))
                .collect()
        })
        .unwrap_or_default();

    if let Some(want) = filters.system_id {
        if panel_id != Some(want) {
            return None;
        }
    }
    if let Some(want) = filters.device_id {
        if !device_ids.contains(&want) {
            return None;
        }
    }

    Some(json!({
        "event_name": event_name,
        "panel_id": panel_id,
        "device_id": device_ids.first(),
        "raw": message,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    const NO_FILTERS: EventFilters = EventFilters {
        system_id: None,
        device_id: None,
    };

    #[test]
    fn event_name_joins_type_and_op() {
        let event = classify_event(
            &json!({ "t": "account_partition", "op": "u", "panid": 123 }),
            &NO_FILTERS,
        )
        .unwrap();
        assert_eq!(event["event_name"], "account_partition:u");
        assert_eq!(event["panel_id"], 123);
    }

    #[test]
    fn event_name_without_op_is_bare_type() {
        let event =
            classify_event(&json!({ "t": "account_system", "panid": 1 }), &NO_FILTERS).unwrap();
        assert_eq!(event["event_name"], "account_system");
    }

    #[test]
    fn untyped_messages_are_dropped() {
        assert!(classify_event(&json!({ "panid": 1 }), &NO_FILTERS).is_none());
        assert!(classify_event(&json!("not an object"), &NO_FILTERS).is_none());
    }

    #[test]
    fn system_filter_matches_panel_id() {
        let filters = EventFilters {
            system_id: Some(123),
            device_id: None,
        };
        assert!(classify_event(
            &json!({ "t": "account_partition", "panid": 123 }),
            &filters
        )
        .is_some());
        assert!(classify_event(
            &json!({ "t": "account_partition", "panid": 999 }),
            &filters
        )
        .is_none());
    }

    #[test]
    fn device_filter_matches_any_device_in_payload() {
        let filters = EventFilters {
            system_id: None,
            device_id: Some(42),
        };
        let message = json!({
            "t": "account_partition", "op": "u", "panid": 123,
            "da": { "d": [{ "_id": 7 }, { "_id": 42 }] }
        });
        let event = classify_event(&message, &filters).unwrap();
        assert_eq!(event["device_id"], 7);

        let miss = json!({
            "t": "account_partition", "panid": 123,
            "da": { "d": [{ "_id": 7 }] }
        });
        assert!(classify_event(&miss, &filters).is_none());
    }

    #[test]
    fn raw_message_rides_along() {
        let message = json!({ "t": "account_system", "op": "u", "panid": 5, "da": {} });
        let event = classify_event(&message, &NO_FILTERS).unwrap();
        assert_eq!(event["raw"], message);
    }

    #[tokio::test]
    async fn queue_overflow_cancels_the_connection() {
        let (tx, mut rx) = mpsc::channel(2);
        let overflow = CancellationToken::new();
        let tap = build_tap(tx, overflow.clone(), NO_FILTERS);

        let message = json!({ "t": "account_partition", "op": "u", "panid": 1, "da": {} });
        tap(&message);
        tap(&message);
        assert!(!overflow.is_cancelled());

        // Third message finds the queue full: the connection dies, the
        // pipeline doesn't.
        tap(&message);
        assert!(overflow.is_cancelled());
        assert!(rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn filtered_messages_do_not_consume_queue_capacity() {
        let (tx, _rx) = mpsc::channel(1);
        let overflow = CancellationToken::new();
        let filters = EventFilters {
            system_id: Some(123),
            device_id: None,
        };
        let tap = build_tap(tx, overflow.clone(), filters);

        for _ in 0..5 {
            tap(&json!({ "t": "account_partition", "panid": 999 }));
        }
        assert!(!overflow.is_cancelled());
    }
}
