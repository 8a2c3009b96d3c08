// SPDX-FileCopyrightText: 2026 Agentway Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared across the Agentway workspace.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Maximum characters per posted chat message.
pub const MAX_MESSAGE_LENGTH: usize = 3900;

/// Responses longer than this are delivered as a file upload instead.
pub const FILE_THRESHOLD: usize = 12_000;

/// Largest image attachment we will download (bytes).
pub const IMAGE_SIZE_LIMIT: u64 = 5 * 1024 * 1024;

/// Throttle interval for the edit-in-place streaming responder.
pub const STREAM_UPDATE_INTERVAL_MS: u64 = 500;

/// Global cap on concurrently running agent processes.
pub const MAX_CONCURRENT_PROCESSES: usize = 8;

/// Hard ceiling on a single agent run, independent of the idle timer.
pub const ABSOLUTE_TIMEOUT_SECS: u64 = 12 * 60 * 60;

/// A unit of pending work, persisted to the durable queue on ingress and
/// removed only after the agent turn for it terminates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedMessage {
    /// Opaque channel identifier.
    pub channel_id: String,
    /// Opaque user identifier (informational only).
    pub user_id: String,
    /// Prompt text; may be empty when image attachments are present.
    pub text: String,
    /// Platform message identifier, unique per channel.
    pub ts: String,
    /// Thread root to reply into.
    pub thread_ts: String,
    /// ISO 8601 enqueue timestamp; the queue's sort key.
    pub queued_at: String,
    /// Local paths of downloaded image attachments, in upload order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub image_paths: Vec<PathBuf>,
}

/// How agent output is delivered back into the thread.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
pub enum ResponseMode {
    /// Post the complete response once the agent finishes.
    #[serde(rename = "batch")]
    #[strum(serialize = "batch")]
    Batch,
    /// Post one message and edit it in place on a throttle.
    #[serde(rename = "stream-update")]
    #[strum(serialize = "stream-update")]
    StreamUpdate,
    /// Use the platform's native chat-stream API.
    #[serde(rename = "stream-native")]
    #[strum(serialize = "stream-native")]
    StreamNative,
}

/// Whether each message spawns a fresh agent or feeds a long-lived one.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
pub enum ProcessMode {
    /// One agent process per message; exits after its response.
    #[serde(rename = "oneshot")]
    #[strum(serialize = "oneshot")]
    Oneshot,
    /// A long-lived agent serving many turns over stdin.
    #[serde(rename = "persistent")]
    #[strum(serialize = "persistent")]
    Persistent,
}

/// Effective runtime parameters for one channel, computed by overlaying the
/// channel's overrides on the workspace defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedChannelConfig {
    pub channel_id: String,
    /// Display label used in `!ps` output and kill confirmations.
    pub name: String,
    /// Agent working directory bound to this channel.
    pub folder: String,
    /// Model selector passed through to the agent.
    pub model: String,
    /// Appended system prompt (already `CONFIG_PATH`-expanded).
    pub system_prompt: String,
    /// Idle timeout for agent runs, in milliseconds.
    pub timeout_ms: u64,
    pub response_mode: ResponseMode,
    pub process_mode: ProcessMode,
}

/// Snapshot of one live agent invocation, as reported by `!ps`.
#[derive(Debug, Clone)]
pub struct ActiveProcess {
    pub channel_id: String,
    pub session_id: String,
    pub mode: ProcessMode,
    pub started_at: DateTime<Utc>,
    /// First ≤ 80 chars of the most recent prompt.
    pub last_prompt: String,
    /// Completed turns (persistent) or 1 (oneshot).
    pub message_count: u64,
    pub total_cost: f64,
    pub total_tokens: u64,
    /// True iff a turn is in flight. Always true for oneshot entries.
    pub is_active: bool,
}

/// A file attachment referenced by an inbound chat message.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteFile {
    /// Platform-assigned unique file id.
    pub id: String,
    pub name: String,
    pub mimetype: String,
    pub size: u64,
    /// Authenticated download URL.
    pub url_private_download: String,
}

/// An inbound message event, after platform decoding.
#[derive(Debug, Clone)]
pub struct MessageEvent {
    pub channel_id: String,
    pub user_id: String,
    pub text: String,
    pub ts: String,
    /// Present when the message was posted inside a thread.
    pub thread_ts: Option<String>,
    pub files: Vec<RemoteFile>,
    /// True for messages authored by bots (including ourselves).
    pub from_bot: bool,
}

impl MessageEvent {
    /// The thread root replies should target: the enclosing thread if any,
    /// otherwise the message itself.
    pub fn reply_thread(&self) -> &str {
        self.thread_ts.as_deref().unwrap_or(&self.ts)
    }
}

/// Chat ingress events the scheduler reacts to.
#[derive(Debug, Clone)]
pub enum ChatEvent {
    Message(MessageEvent),
    /// A queued-but-unprocessed message was edited by the user.
    MessageChanged {
        channel_id: String,
        ts: String,
        new_text: String,
    },
    /// A message was deleted; pending queue entries for it vanish.
    MessageDeleted {
        channel_id: String,
        deleted_ts: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn response_mode_round_trips_through_strings() {
        for mode in [
            ResponseMode::Batch,
            ResponseMode::StreamUpdate,
            ResponseMode::StreamNative,
        ] {
            let s = mode.to_string();
            assert_eq!(ResponseMode::from_str(&s).unwrap(), mode);
        }
        assert_eq!(
            ResponseMode::from_str("stream-update").unwrap(),
            ResponseMode::StreamUpdate
        );
    }

    #[test]
    fn process_mode_serde_uses_kebab_names() {
        let json = serde_json::to_string(&ProcessMode::Persistent).unwrap();
        assert_eq!(json, "\"persistent\"");
        let parsed: ProcessMode = serde_json::from_str("\"oneshot\"").unwrap();
        assert_eq!(parsed, ProcessMode::Oneshot);
    }

    #[test]
    fn queued_message_serde_round_trip() {
        let msg = QueuedMessage {
            channel_id: "C001".into(),
            user_id: "U123".into(),
            text: "hello".into(),
            ts: "1700000000.000100".into(),
            thread_ts: "1700000000.000100".into(),
            queued_at: "2026-01-01T00:00:00Z".into(),
            image_paths: vec![],
        };
        let json = serde_json::to_string(&msg).unwrap();
        // Empty image list is omitted entirely.
        assert!(!json.contains("image_paths"));
        let back: QueuedMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn reply_thread_prefers_enclosing_thread() {
        let mut event = MessageEvent {
            channel_id: "C001".into(),
            user_id: "U123".into(),
            text: "hi".into(),
            ts: "2.000".into(),
            thread_ts: Some("1.000".into()),
            files: vec![],
            from_bot: false,
        };
        assert_eq!(event.reply_thread(), "1.000");
        event.thread_ts = None;
        assert_eq!(event.reply_thread(), "2.000");
    }
}
