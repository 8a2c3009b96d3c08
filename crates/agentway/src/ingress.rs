// SPDX-FileCopyrightText: 2026 Agentway Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Event ingress: a small HTTP server receiving the chat platform's event
//! callbacks and translating them into typed [`ChatEvent`]s.
//!
//! Handles the `url_verification` handshake and `event_callback`
//! envelopes. Anything the gateway does not react to decodes to `None`
//! and is acknowledged without effect.

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use agentway_core::types::{ChatEvent, MessageEvent, RemoteFile};
use agentway_core::AgentwayError;

#[derive(Clone)]
struct IngressState {
    events_tx: mpsc::Sender<ChatEvent>,
}

/// Serve the event-callback endpoint until `cancel` fires.
pub async fn run_ingress(
    host: &str,
    port: u16,
    events_tx: mpsc::Sender<ChatEvent>,
    cancel: CancellationToken,
) -> Result<(), AgentwayError> {
    let state = IngressState { events_tx };
    let app = Router::new()
        .route("/slack/events", post(handle_callback))
        .with_state(state);

    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| AgentwayError::Chat {
            message: format!("failed to bind ingress to {addr}: {e}"),
            source: Some(Box::new(e)),
        })?;

    info!(addr = %addr, "event ingress listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .map_err(|e| AgentwayError::Chat {
            message: format!("ingress server error: {e}"),
            source: Some(Box::new(e)),
        })
}

async fn handle_callback(
    State(state): State<IngressState>,
    Json(body): Json<Value>,
) -> Json<Value> {
    match body.get("type").and_then(Value::as_str) {
        Some("url_verification") => {
            let challenge = body.get("challenge").cloned().unwrap_or(Value::Null);
            Json(json!({ "challenge": challenge }))
        }
        Some("event_callback") => {
            if let Some(event) = body.get("event").and_then(decode_event) {
                if state.events_tx.send(event).await.is_err() {
                    warn!("event channel closed, dropping inbound event");
                }
            }
            Json(json!({ "ok": true }))
        }
        other => {
            debug!(envelope = ?other, "ignoring unknown callback envelope");
            Json(json!({ "ok": true }))
        }
    }
}

/// Decode one platform event into a [`ChatEvent`], or `None` for shapes
/// the gateway ignores.
pub fn decode_event(event: &Value) -> Option<ChatEvent> {
    if event.get("type").and_then(Value::as_str) != Some("message") {
        return None;
    }
    let channel_id = event.get("channel").and_then(Value::as_str)?.to_string();

    match event.get("subtype").and_then(Value::as_str) {
        Some("message_deleted") => Some(ChatEvent::MessageDeleted {
            channel_id,
            deleted_ts: event.get("deleted_ts").and_then(Value::as_str)?.to_string(),
        }),
        Some("message_changed") => {
            let inner = event.get("message")?;
            Some(ChatEvent::MessageChanged {
                channel_id,
                ts: inner.get("ts").and_then(Value::as_str)?.to_string(),
                new_text: inner
                    .get("text")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            })
        }
        // Plain messages and file shares carry prompts; every other
        // subtype (joins, topic changes, bot chatter) is noise.
        None | Some("file_share") => {
            let from_bot = event.get("bot_id").and_then(Value::as_str).is_some()
                || event.get("subtype").and_then(Value::as_str) == Some("bot_message");
            Some(ChatEvent::Message(MessageEvent {
                channel_id,
                user_id: event
                    .get("user")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                text: event
                    .get("text")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                ts: event.get("ts").and_then(Value::as_str)?.to_string(),
                thread_ts: event
                    .get("thread_ts")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                files: decode_files(event.get("files")),
                from_bot,
            }))
        }
        Some(_) => None,
    }
}

fn decode_files(files: Option<&Value>) -> Vec<RemoteFile> {
    let Some(files) = files.and_then(Value::as_array) else {
        return Vec::new();
    };
    files
        .iter()
        .filter_map(|f| {
            Some(RemoteFile {
                id: f.get("id").and_then(Value::as_str)?.to_string(),
                name: f
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or("file")
                    .to_string(),
                mimetype: f
                    .get("mimetype")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                size: f.get("size").and_then(Value::as_u64).unwrap_or(0),
                url_private_download: f
                    .get("url_private_download")
                    .and_then(Value::as_str)?
                    .to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn plain_message_decodes() {
        let event = json!({
            "type": "message",
            "channel": "C001",
            "user": "U001",
            "text": "hello",
            "ts": "1.000",
        });
        match decode_event(&event) {
            Some(ChatEvent::Message(msg)) => {
                assert_eq!(msg.channel_id, "C001");
                assert_eq!(msg.text, "hello");
                assert!(!msg.from_bot);
                assert!(msg.thread_ts.is_none());
            }
            other => panic!("unexpected decode: {other:?}"),
        }
    }

    #[test]
    fn bot_messages_are_flagged() {
        let event = json!({
            "type": "message",
            "channel": "C001",
            "bot_id": "B001",
            "text": "beep",
            "ts": "1.000",
        });
        match decode_event(&event) {
            Some(ChatEvent::Message(msg)) => assert!(msg.from_bot),
            other => panic!("unexpected decode: {other:?}"),
        }
    }

    #[test]
    fn deletion_and_edit_subtypes_decode() {
        let deleted = json!({
            "type": "message",
            "subtype": "message_deleted",
            "channel": "C001",
            "deleted_ts": "1.000",
        });
        assert!(matches!(
            decode_event(&deleted),
            Some(ChatEvent::MessageDeleted { .. })
        ));

        let changed = json!({
            "type": "message",
            "subtype": "message_changed",
            "channel": "C001",
            "message": { "ts": "1.000", "text": "new text" },
        });
        match decode_event(&changed) {
            Some(ChatEvent::MessageChanged { ts, new_text, .. }) => {
                assert_eq!(ts, "1.000");
                assert_eq!(new_text, "new text");
            }
            other => panic!("unexpected decode: {other:?}"),
        }
    }

    #[test]
    fn irrelevant_subtypes_are_dropped() {
        for subtype in ["channel_join", "channel_topic", "bot_add"] {
            let event = json!({
                "type": "message",
                "subtype": subtype,
                "channel": "C001",
                "ts": "1.000",
            });
            assert!(decode_event(&event).is_none(), "subtype {subtype}");
        }
        let not_message = json!({ "type": "reaction_added", "channel": "C001" });
        assert!(decode_event(&not_message).is_none());
    }

    #[test]
    fn file_share_carries_attachments() {
        let event = json!({
            "type": "message",
            "subtype": "file_share",
            "channel": "C001",
            "user": "U001",
            "text": "",
            "ts": "1.000",
            "files": [{
                "id": "F001",
                "name": "shot.png",
                "mimetype": "image/png",
                "size": 1234,
                "url_private_download": "https://files/shot.png",
            }],
        });
        match decode_event(&event) {
            Some(ChatEvent::Message(msg)) => {
                assert_eq!(msg.files.len(), 1);
                assert_eq!(msg.files[0].mimetype, "image/png");
                assert_eq!(msg.files[0].size, 1234);
            }
            other => panic!("unexpected decode: {other:?}"),
        }
    }
}
