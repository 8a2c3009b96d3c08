// SPDX-FileCopyrightText: 2026 Agentway Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Agentway gateway.

use thiserror::Error;

/// The primary error type used across all Agentway crates.
#[derive(Debug, Error)]
pub enum AgentwayError {
    /// Configuration errors (unreadable file, invalid YAML/JSON, unknown channel).
    #[error("configuration error: {0}")]
    Config(String),

    /// Durable queue I/O errors (unwritable directory, serialization failure).
    #[error("queue error: {message}")]
    Queue {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Chat platform errors (failed post/update/delete/reaction/upload).
    #[error("chat error: {message}")]
    Chat {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The agent binary could not be started.
    #[error("Failed to spawn claude: {message}")]
    Spawn { message: String },

    /// The agent exited with a non-zero status.
    #[error("Claude exited with code {code}: {stderr}")]
    AgentExit { code: i32, stderr: String },

    /// No stdout/stderr activity within the channel's idle window.
    #[error("idle timeout: no agent output for {timeout_ms} ms")]
    IdleTimeout { timeout_ms: u64 },

    /// The 12-hour absolute run cap fired.
    #[error("absolute timeout: agent run exceeded the 12 h cap")]
    AbsoluteTimeout,

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AgentwayError {
    /// Shorthand for a chat error with no underlying source.
    pub fn chat(message: impl Into<String>) -> Self {
        AgentwayError::Chat {
            message: message.into(),
            source: None,
        }
    }

    /// Shorthand for a queue error wrapping an I/O failure.
    pub fn queue(message: impl Into<String>, source: std::io::Error) -> Self {
        AgentwayError::Queue {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}
