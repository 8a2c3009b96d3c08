// SPDX-FileCopyrightText: 2026 Agentway Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The response pipeline: three delivery strategies behind one enum.
//!
//! A responder is constructed per turn with the client, channel, and thread
//! root. Text deltas flow in while the agent runs; `finish` delivers the
//! final text. Dispatch is by exhaustive match; the set of modes is closed.

mod batch;
mod stream_native;
mod stream_update;

use std::sync::Arc;

pub use batch::BatchResponder;
pub use stream_native::NativeStreamResponder;
pub use stream_update::StreamUpdateResponder;

use agentway_core::types::ResponseMode;
use agentway_core::{AgentwayError, ChatClient};

/// Name of the file used when a response overflows into an upload.
pub const RESPONSE_FILENAME: &str = "response.md";

/// Suffix appended when a streamed message is truncated mid-run.
pub const STREAMING_SUFFIX: &str = "\n_[streaming...]_";

/// Indicator appended to a streamed message while text is still arriving.
pub const WRITING_INDICATOR: &str = " :writing_hand:";

/// One per-turn responder, selected by the channel's response mode.
pub enum Responder {
    Batch(BatchResponder),
    StreamUpdate(StreamUpdateResponder),
    StreamNative(NativeStreamResponder),
}

impl Responder {
    /// Construct the responder for a mode and perform its start-of-turn
    /// side effects (the native responder posts its placeholder here).
    pub async fn start(
        mode: ResponseMode,
        client: Arc<dyn ChatClient>,
        channel: &str,
        thread_ts: &str,
    ) -> Result<Self, AgentwayError> {
        match mode {
            ResponseMode::Batch => Ok(Responder::Batch(BatchResponder::new(
                client, channel, thread_ts,
            ))),
            ResponseMode::StreamUpdate => Ok(Responder::StreamUpdate(
                StreamUpdateResponder::new(client, channel, thread_ts),
            )),
            ResponseMode::StreamNative => Ok(Responder::StreamNative(
                NativeStreamResponder::start(client, channel, thread_ts).await?,
            )),
        }
    }

    /// Whether this responder consumes streaming deltas at all. The batch
    /// responder does not, which lets oneshot runs use batch JSON output.
    pub fn wants_deltas(&self) -> bool {
        !matches!(self, Responder::Batch(_))
    }

    /// Feed one text delta. Errors are absorbed: a failed intermediate
    /// update must not abort the agent turn.
    pub async fn on_text_delta(&mut self, text: &str) {
        match self {
            Responder::Batch(r) => r.on_text_delta(text),
            Responder::StreamUpdate(r) => r.on_text_delta(text).await,
            Responder::StreamNative(r) => r.on_text_delta(text).await,
        }
    }

    /// Deliver the final response text and tear down any streaming state.
    pub async fn finish(&mut self, final_text: &str) -> Result<(), AgentwayError> {
        match self {
            Responder::Batch(r) => r.finish(final_text).await,
            Responder::StreamUpdate(r) => r.finish(final_text).await,
            Responder::StreamNative(r) => r.finish(final_text).await,
        }
    }

    /// Identity of the primary delivered message, when one exists.
    pub fn message_ts(&self) -> Option<&str> {
        match self {
            Responder::Batch(r) => r.message_ts(),
            Responder::StreamUpdate(r) => r.message_ts(),
            Responder::StreamNative(r) => r.message_ts(),
        }
    }

    /// The final delivered text (set by `finish`).
    pub fn final_text(&self) -> &str {
        match self {
            Responder::Batch(r) => r.final_text(),
            Responder::StreamUpdate(r) => r.final_text(),
            Responder::StreamNative(r) => r.final_text(),
        }
    }
}
