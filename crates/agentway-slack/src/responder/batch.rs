// SPDX-FileCopyrightText: 2026 Agentway Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Batch responder: nothing is posted until the agent finishes.

use std::sync::Arc;

use tracing::debug;

use agentway_core::types::FILE_THRESHOLD;
use agentway_core::{AgentwayError, ChatClient};

use crate::mrkdwn::markdown_to_mrkdwn;
use crate::split::split_message;

use super::RESPONSE_FILENAME;

/// Posts the whole response on completion, split into threaded chunks, or
/// as a file upload when it exceeds the file threshold.
pub struct BatchResponder {
    client: Arc<dyn ChatClient>,
    channel: String,
    thread_ts: String,
    first_ts: Option<String>,
    final_text: String,
}

impl BatchResponder {
    pub fn new(client: Arc<dyn ChatClient>, channel: &str, thread_ts: &str) -> Self {
        Self {
            client,
            channel: channel.to_string(),
            thread_ts: thread_ts.to_string(),
            first_ts: None,
            final_text: String::new(),
        }
    }

    /// Deltas are ignored; batch delivery waits for the final text.
    pub fn on_text_delta(&mut self, _text: &str) {}

    pub async fn finish(&mut self, final_text: &str) -> Result<(), AgentwayError> {
        self.final_text = final_text.to_string();
        if final_text.is_empty() {
            debug!(channel = %self.channel, "batch responder finishing with empty response");
            return Ok(());
        }

        let translated = markdown_to_mrkdwn(final_text);

        if translated.len() > FILE_THRESHOLD {
            self.client
                .file_upload(
                    &self.channel,
                    Some(&self.thread_ts),
                    final_text,
                    RESPONSE_FILENAME,
                    "Response",
                )
                .await?;
            return Ok(());
        }

        for chunk in split_message(&translated) {
            let ts = self
                .client
                .post_message(&self.channel, Some(&self.thread_ts), &chunk)
                .await?;
            if self.first_ts.is_none() {
                self.first_ts = Some(ts);
            }
        }
        Ok(())
    }

    pub fn message_ts(&self) -> Option<&str> {
        self.first_ts.as_deref()
    }

    pub fn final_text(&self) -> &str {
        &self.final_text
    }
}
