// SPDX-FileCopyrightText: 2026 Agentway Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Agent integration: deterministic session identity, wire-format parsing,
//! command-line assembly, and the process supervisor for oneshot and
//! persistent `claude` runs.

pub mod events;
pub mod launch;
pub mod session;
pub mod supervisor;

pub use events::{parse_stream_line, AgentEvent, LineBuffer};
pub use launch::{build_launch, LaunchKind, LaunchSpec, OutputFormat};
pub use session::{artifact_paths, clear_artifacts, derive_session_id, SessionArtifacts};
pub use supervisor::{DeltaSender, Supervisor, TurnOutcome};
