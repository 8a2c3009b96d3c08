// SPDX-FileCopyrightText: 2026 Agentway Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chunk splitting for messages exceeding the platform's length limit.

use agentway_core::types::MAX_MESSAGE_LENGTH;

/// Split `text` into chunks of at most [`MAX_MESSAGE_LENGTH`] characters.
///
/// Each split prefers the last newline inside the window, but only when it
/// lands in the second half; otherwise the chunk is cut hard at the limit.
/// Whitespace at the head of the remainder is stripped after every split.
pub fn split_message(text: &str) -> Vec<String> {
    split_message_at(text, MAX_MESSAGE_LENGTH)
}

/// [`split_message`] with an explicit limit, for tests and callers that
/// reserve suffix room.
pub fn split_message_at(text: &str, max: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut remaining = text;
    while remaining.len() > max {
        let window_end = floor_char_boundary(remaining, max);
        let window = &remaining[..window_end];
        let split = match window.rfind('\n') {
            Some(pos) if pos >= max / 2 => pos,
            _ => window_end,
        };
        chunks.push(remaining[..split].to_string());
        remaining = remaining[split..].trim_start();
    }
    chunks.push(remaining.to_string());
    chunks
}

/// Largest index ≤ `idx` that falls on a char boundary.
pub(crate) fn floor_char_boundary(s: &str, idx: usize) -> usize {
    if idx >= s.len() {
        return s.len();
    }
    let mut idx = idx;
    while !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}
