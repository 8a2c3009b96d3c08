// SPDX-FileCopyrightText: 2026 Agentway Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reaction choreography on ingress messages.
//!
//! The visible reaction is the user's only progress indicator, so the next
//! reaction is always added before the previous one is removed: a remove
//! that briefly leaves the message bare reads as a dropped request.
//! All calls are best-effort; reaction failures never fail a turn.

use std::sync::Arc;

use tracing::debug;

use agentway_core::ChatClient;

/// Message accepted and queued.
pub const INBOX: &str = "inbox_tray";
/// Agent run in progress.
pub const HOURGLASS: &str = "hourglass_flowing_sand";
/// Response delivered.
pub const CHECKMARK: &str = "white_check_mark";
/// Turn failed; a threaded warning carries the detail.
pub const FAILED: &str = "x";

/// Add a reaction, logging (not propagating) failures.
pub async fn add(client: &Arc<dyn ChatClient>, channel: &str, ts: &str, name: &str) {
    if let Err(e) = client.reaction_add(channel, ts, name).await {
        debug!(channel = %channel, ts = %ts, reaction = %name, error = %e, "reaction add failed");
    }
}

/// Remove a reaction, logging (not propagating) failures.
pub async fn remove(client: &Arc<dyn ChatClient>, channel: &str, ts: &str, name: &str) {
    if let Err(e) = client.reaction_remove(channel, ts, name).await {
        debug!(channel = %channel, ts = %ts, reaction = %name, error = %e, "reaction remove failed");
    }
}

/// Transition from one reaction to the next: add first, then remove.
pub async fn transition(
    client: &Arc<dyn ChatClient>,
    channel: &str,
    ts: &str,
    next: &str,
    previous: &str,
) {
    add(client, channel, ts, next).await;
    remove(client, channel, ts, previous).await;
}
