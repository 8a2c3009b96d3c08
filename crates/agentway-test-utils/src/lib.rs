// SPDX-FileCopyrightText: 2026 Agentway Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test doubles for the chat surface.
//!
//! `MockChat` implements `ChatClient` and `FileFetcher` with captured
//! outbound calls for assertion in tests.

mod mock_chat;

pub use mock_chat::{
    MockChat, MockStreamRecord, PostedMessage, ReactionEvent, UpdatedMessage, Upload,
};
