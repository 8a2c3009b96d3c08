// SPDX-FileCopyrightText: 2026 Agentway Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Native chat-stream responder.
//!
//! Posts a thinking placeholder the moment the turn starts, replaces it
//! with a platform-native stream on the first delta, and forwards each
//! delta as a native-markdown append.

use std::sync::Arc;

use tracing::{debug, warn};

use agentway_core::types::FILE_THRESHOLD;
use agentway_core::{AgentwayError, ChatClient, ChatStream};

use super::RESPONSE_FILENAME;

/// Placeholder shown before the agent produces any output.
pub const THINKING_PLACEHOLDER: &str = ":thinking_face: _thinking..._";

/// Streams via the platform's native chat-stream API.
pub struct NativeStreamResponder {
    client: Arc<dyn ChatClient>,
    channel: String,
    thread_ts: String,
    placeholder_ts: Option<String>,
    stream: Option<Box<dyn ChatStream>>,
    saw_delta: bool,
    final_text: String,
}

impl NativeStreamResponder {
    /// Post the placeholder and return the responder.
    pub async fn start(
        client: Arc<dyn ChatClient>,
        channel: &str,
        thread_ts: &str,
    ) -> Result<Self, AgentwayError> {
        let placeholder_ts = client
            .post_message(channel, Some(thread_ts), THINKING_PLACEHOLDER)
            .await?;
        Ok(Self {
            client,
            channel: channel.to_string(),
            thread_ts: thread_ts.to_string(),
            placeholder_ts: Some(placeholder_ts),
            stream: None,
            saw_delta: false,
            final_text: String::new(),
        })
    }

    pub async fn on_text_delta(&mut self, text: &str) {
        if self.stream.is_none() {
            // Buffer size 1 makes the stream surface instantly.
            match self.client.chat_stream(&self.channel, &self.thread_ts, 1).await {
                Ok(stream) => {
                    self.stream = Some(stream);
                    if let Some(ts) = self.placeholder_ts.take() {
                        if let Err(e) = self.client.delete_message(&self.channel, &ts).await {
                            debug!(channel = %self.channel, error = %e, "placeholder delete failed");
                        }
                    }
                }
                Err(e) => {
                    warn!(channel = %self.channel, error = %e, "opening native stream failed");
                    return;
                }
            }
        }
        self.saw_delta = true;
        if let Some(stream) = self.stream.as_mut() {
            if let Err(e) = stream.append(text).await {
                warn!(channel = %self.channel, error = %e, "native stream append failed");
            }
        }
    }

    pub async fn finish(&mut self, final_text: &str) -> Result<(), AgentwayError> {
        self.final_text = final_text.to_string();

        if let Some(mut stream) = self.stream.take() {
            stream.stop().await?;
        }

        if !self.saw_delta {
            if let Some(ts) = self.placeholder_ts.take() {
                if let Err(e) = self.client.delete_message(&self.channel, &ts).await {
                    debug!(channel = %self.channel, error = %e, "placeholder delete failed");
                }
            }
        }

        if final_text.len() > FILE_THRESHOLD {
            self.client
                .file_upload(
                    &self.channel,
                    Some(&self.thread_ts),
                    final_text,
                    RESPONSE_FILENAME,
                    "Response",
                )
                .await?;
        }
        Ok(())
    }

    /// The native stream owns its message identity; none is exposed.
    pub fn message_ts(&self) -> Option<&str> {
        None
    }

    pub fn final_text(&self) -> &str {
        &self.final_text
    }
}
