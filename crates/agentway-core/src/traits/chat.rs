// SPDX-FileCopyrightText: 2026 Agentway Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chat platform surface.
//!
//! The gateway never talks to the chat SDK directly; every outbound call
//! goes through [`ChatClient`]. Responders, the scheduler, and the command
//! interpreter are all written against this trait so tests can substitute
//! a mock and the platform client stays swappable.

use async_trait::async_trait;

use crate::error::AgentwayError;

/// Outbound chat operations the gateway depends on.
///
/// `ts` values are the platform's opaque message identifiers, unique per
/// channel. All methods suspend; reaction calls are best-effort at the call
/// sites that treat them so.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Post a message, optionally threaded. Returns the new message's `ts`.
    async fn post_message(
        &self,
        channel: &str,
        thread_ts: Option<&str>,
        text: &str,
    ) -> Result<String, AgentwayError>;

    /// Replace the text of an existing message.
    async fn update_message(
        &self,
        channel: &str,
        ts: &str,
        text: &str,
    ) -> Result<(), AgentwayError>;

    /// Delete a message.
    async fn delete_message(&self, channel: &str, ts: &str) -> Result<(), AgentwayError>;

    /// Add a named emoji reaction to a message.
    async fn reaction_add(
        &self,
        channel: &str,
        ts: &str,
        name: &str,
    ) -> Result<(), AgentwayError>;

    /// Remove a named emoji reaction from a message.
    async fn reaction_remove(
        &self,
        channel: &str,
        ts: &str,
        name: &str,
    ) -> Result<(), AgentwayError>;

    /// Upload text content as a file attachment into a thread.
    async fn file_upload(
        &self,
        channel: &str,
        thread_ts: Option<&str>,
        content: &str,
        filename: &str,
        title: &str,
    ) -> Result<(), AgentwayError>;

    /// Open a native chat stream into a thread.
    ///
    /// `buffer_size` is a hint for how many appends the platform may coalesce
    /// before rendering; 1 makes the stream surface immediately.
    async fn chat_stream(
        &self,
        channel: &str,
        thread_ts: &str,
        buffer_size: u32,
    ) -> Result<Box<dyn ChatStream>, AgentwayError>;
}

/// Handle for an open native chat stream.
#[async_trait]
pub trait ChatStream: Send {
    /// Append a markdown fragment to the stream.
    async fn append(&mut self, markdown_text: &str) -> Result<(), AgentwayError>;

    /// Finalize the stream. No appends may follow.
    async fn stop(&mut self) -> Result<(), AgentwayError>;
}

/// Authenticated retrieval of platform-hosted files (image attachments).
#[async_trait]
pub trait FileFetcher: Send + Sync {
    /// Download the file behind a private URL.
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, AgentwayError>;
}
