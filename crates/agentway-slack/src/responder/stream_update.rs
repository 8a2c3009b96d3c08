// SPDX-FileCopyrightText: 2026 Agentway Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Edit-throttled streaming responder.
//!
//! The first delta posts a threaded message and starts a ticker; each tick
//! re-renders the accumulated text and edits the message in place, at most
//! once per interval. Completion flushes a final edit without the writing
//! indicator and handles overflow into follow-up chunks or a file upload.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use agentway_core::types::{FILE_THRESHOLD, MAX_MESSAGE_LENGTH, STREAM_UPDATE_INTERVAL_MS};
use agentway_core::{AgentwayError, ChatClient};

use crate::mrkdwn::markdown_to_mrkdwn;
use crate::split::{floor_char_boundary, split_message};

use super::{RESPONSE_FILENAME, STREAMING_SUFFIX, WRITING_INDICATOR};

struct Inner {
    client: Arc<dyn ChatClient>,
    channel: String,
    thread_ts: String,
    state: Mutex<StreamState>,
}

#[derive(Default)]
struct StreamState {
    full_text: String,
    /// Length of `full_text` at the last flush; a tick with no growth skips
    /// the edit.
    flushed_len: usize,
    message_ts: Option<String>,
    finished: bool,
}

/// Streams by editing a single message in place on a throttle.
pub struct StreamUpdateResponder {
    inner: Arc<Inner>,
    ticker: Option<JoinHandle<()>>,
    cancel: CancellationToken,
    /// Mirror of the streamed message's ts for the identity accessor.
    primary_ts: Option<String>,
    final_text: String,
}

impl StreamUpdateResponder {
    pub fn new(client: Arc<dyn ChatClient>, channel: &str, thread_ts: &str) -> Self {
        Self {
            inner: Arc::new(Inner {
                client,
                channel: channel.to_string(),
                thread_ts: thread_ts.to_string(),
                state: Mutex::new(StreamState::default()),
            }),
            ticker: None,
            cancel: CancellationToken::new(),
            primary_ts: None,
            final_text: String::new(),
        }
    }

    pub async fn on_text_delta(&mut self, text: &str) {
        let mut state = self.inner.state.lock().await;
        state.full_text.push_str(text);

        if state.message_ts.is_none() {
            // First delta: post the initial message and arm the ticker.
            let rendered = render(&state.full_text, true);
            match self
                .inner
                .client
                .post_message(&self.inner.channel, Some(&self.inner.thread_ts), &rendered)
                .await
            {
                Ok(ts) => {
                    state.flushed_len = state.full_text.len();
                    state.message_ts = Some(ts.clone());
                    self.primary_ts = Some(ts);
                    self.ticker = Some(spawn_ticker(self.inner.clone(), self.cancel.clone()));
                }
                Err(e) => {
                    warn!(channel = %self.inner.channel, error = %e, "initial stream post failed");
                }
            }
        }
    }

    pub async fn finish(&mut self, final_text: &str) -> Result<(), AgentwayError> {
        self.final_text = final_text.to_string();
        self.cancel.cancel();
        if let Some(ticker) = self.ticker.take() {
            let _ = ticker.await;
        }

        let mut state = self.inner.state.lock().await;
        state.finished = true;
        let message_ts = state.message_ts.clone();
        drop(state);

        let translated = markdown_to_mrkdwn(final_text);

        if translated.len() > FILE_THRESHOLD {
            // Replace the streamed message with a file upload.
            if let Some(ts) = &message_ts {
                if let Err(e) = self.inner.client.delete_message(&self.inner.channel, ts).await {
                    debug!(channel = %self.inner.channel, error = %e, "streamed message delete failed");
                }
            }
            self.inner
                .client
                .file_upload(
                    &self.inner.channel,
                    Some(&self.inner.thread_ts),
                    final_text,
                    RESPONSE_FILENAME,
                    "Response",
                )
                .await?;
            return Ok(());
        }

        if translated.len() > MAX_MESSAGE_LENGTH {
            let chunks = split_message(&translated);
            let mut chunks = chunks.into_iter();
            if let Some(first) = chunks.next() {
                match &message_ts {
                    Some(ts) => {
                        self.inner
                            .client
                            .update_message(&self.inner.channel, ts, &first)
                            .await?
                    }
                    None => {
                        self.inner
                            .client
                            .post_message(&self.inner.channel, Some(&self.inner.thread_ts), &first)
                            .await
                            .map(|_| ())?
                    }
                }
            }
            for chunk in chunks {
                self.inner
                    .client
                    .post_message(&self.inner.channel, Some(&self.inner.thread_ts), &chunk)
                    .await?;
            }
            return Ok(());
        }

        if translated.is_empty() {
            return Ok(());
        }

        // Final flush, indicator omitted.
        match &message_ts {
            Some(ts) => {
                self.inner
                    .client
                    .update_message(&self.inner.channel, ts, &translated)
                    .await?
            }
            None => {
                // No delta ever arrived (e.g. a result-only turn): post once.
                let ts = self
                    .inner
                    .client
                    .post_message(&self.inner.channel, Some(&self.inner.thread_ts), &translated)
                    .await?;
                self.primary_ts = Some(ts);
            }
        }
        Ok(())
    }

    pub fn message_ts(&self) -> Option<&str> {
        self.primary_ts.as_deref()
    }

    pub fn final_text(&self) -> &str {
        &self.final_text
    }
}

/// Render the accumulated text for an in-place edit.
///
/// Truncation reserves room for the streaming suffix; the writing indicator
/// is appended only while deltas are still arriving.
fn render(text: &str, streaming: bool) -> String {
    let translated = markdown_to_mrkdwn(text);
    let budget = MAX_MESSAGE_LENGTH - STREAMING_SUFFIX.len();
    let mut out = if translated.len() > budget {
        let cut = floor_char_boundary(&translated, budget);
        format!("{}{}", &translated[..cut], STREAMING_SUFFIX)
    } else {
        translated
    };
    if streaming {
        out.push_str(WRITING_INDICATOR);
    }
    out
}

fn spawn_ticker(inner: Arc<Inner>, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(Duration::from_millis(STREAM_UPDATE_INTERVAL_MS));
        interval.tick().await; // the first tick completes immediately
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    let mut state = inner.state.lock().await;
                    if state.finished {
                        break;
                    }
                    if state.full_text.len() == state.flushed_len {
                        continue;
                    }
                    let Some(ts) = state.message_ts.clone() else {
                        continue;
                    };
                    let rendered = render(&state.full_text, true);
                    state.flushed_len = state.full_text.len();
                    if let Err(e) = inner
                        .client
                        .update_message(&inner.channel, &ts, &rendered)
                        .await
                    {
                        warn!(channel = %inner.channel, error = %e, "stream update failed");
                    }
                }
            }
        }
    })
}
