// SPDX-FileCopyrightText: 2026 Agentway Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Slack-facing surface of the gateway: Markdown → mrkdwn translation,
//! message splitting, the three response-pipeline strategies, reaction
//! choreography, and the Web-API [`ChatClient`] implementation.
//!
//! [`ChatClient`]: agentway_core::ChatClient

pub mod client;
pub mod mrkdwn;
pub mod reactions;
pub mod responder;
pub mod split;

pub use client::SlackClient;
pub use mrkdwn::markdown_to_mrkdwn;
pub use responder::{
    BatchResponder, NativeStreamResponder, Responder, StreamUpdateResponder,
};
pub use split::split_message;
