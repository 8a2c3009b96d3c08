// SPDX-FileCopyrightText: 2026 Agentway Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Trait definitions for the gateway's external seams.

pub mod chat;

pub use chat::{ChatClient, ChatStream, FileFetcher};
