// SPDX-FileCopyrightText: 2026 Agentway Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Agentway gateway.
//!
//! Provides the shared error type, the domain types flowing between the
//! queue, supervisor, responders, and scheduler, and the [`ChatClient`]
//! trait that abstracts the chat platform.

pub mod error;
pub mod traits;
pub mod types;

pub use error::AgentwayError;
pub use traits::{ChatClient, ChatStream, FileFetcher};
pub use types::{
    ActiveProcess, ChatEvent, MessageEvent, ProcessMode, QueuedMessage, RemoteFile,
    ResolvedChannelConfig, ResponseMode,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_variants_construct() {
        let _config = AgentwayError::Config("test".into());
        let _queue = AgentwayError::Queue {
            message: "test".into(),
            source: None,
        };
        let _chat = AgentwayError::chat("test");
        let _spawn = AgentwayError::Spawn {
            message: "test".into(),
        };
        let _exit = AgentwayError::AgentExit {
            code: 1,
            stderr: "test".into(),
        };
        let _idle = AgentwayError::IdleTimeout { timeout_ms: 1000 };
        let _absolute = AgentwayError::AbsoluteTimeout;
        let _internal = AgentwayError::Internal("test".into());
    }

    #[test]
    fn constants_match_platform_limits() {
        assert_eq!(types::MAX_MESSAGE_LENGTH, 3900);
        assert_eq!(types::FILE_THRESHOLD, 12_000);
        assert_eq!(types::MAX_CONCURRENT_PROCESSES, 8);
        assert_eq!(types::ABSOLUTE_TIMEOUT_SECS, 43_200);
    }
}
