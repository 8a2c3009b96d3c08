// SPDX-FileCopyrightText: 2026 Agentway Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Deterministic session identity and on-disk session artifacts.
//!
//! The session id is a pure function of (channel, folder): the same channel
//! bound to the same directory always resumes the same agent session, even
//! across gateway restarts. The id is never stored, always recomputed.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use uuid::Uuid;

/// Namespace for session-id derivation. Fixed: changing it would orphan
/// every existing on-disk session.
const SESSION_NAMESPACE: Uuid = Uuid::from_bytes([
    0x6b, 0xa7, 0xb8, 0x10, 0x9d, 0xad, 0x11, 0xd1, 0x80, 0xb4, 0x00, 0xc0, 0x4f, 0xd4, 0x30,
    0xc8,
]);

/// Derive the session id for a channel/folder binding.
pub fn derive_session_id(channel_id: &str, folder: &str) -> Uuid {
    Uuid::new_v5(
        &SESSION_NAMESPACE,
        format!("{channel_id}:{folder}").as_bytes(),
    )
}

/// The three on-disk artifacts the agent maintains per session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionArtifacts {
    /// Conversation log: `~/.claude/projects/<encoded>/<id>.jsonl`.
    pub log_file: PathBuf,
    /// Session working directory next to the log.
    pub session_dir: PathBuf,
    /// Todo state: `~/.claude/todos/<id>-agent-<id>.json`.
    pub todo_file: PathBuf,
}

/// Encode a folder path for use as a directory name: every path separator
/// becomes `-` (a leading separator becomes a leading `-`).
pub fn encode_folder(folder: &str) -> String {
    folder.replace(std::path::MAIN_SEPARATOR, "-")
}

/// Resolve the artifact paths for a session under the given home directory.
pub fn artifact_paths_in(home: &Path, session_id: &Uuid, folder: &str) -> SessionArtifacts {
    let project_dir = home.join(".claude").join("projects").join(encode_folder(folder));
    SessionArtifacts {
        log_file: project_dir.join(format!("{session_id}.jsonl")),
        session_dir: project_dir.join(session_id.to_string()),
        todo_file: home
            .join(".claude")
            .join("todos")
            .join(format!("{session_id}-agent-{session_id}.json")),
    }
}

/// Resolve the artifact paths under the current user's home directory.
pub fn artifact_paths(session_id: &Uuid, folder: &str) -> SessionArtifacts {
    let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("/"));
    artifact_paths_in(&home, session_id, folder)
}

/// Remove all three artifacts for a session.
///
/// Used to recover from "already in use" collisions. Individual not-found
/// or locked errors are ignored; clearing is idempotent and best-effort.
pub async fn clear_artifacts(session_id: &Uuid, folder: &str) {
    let artifacts = artifact_paths(session_id, folder);

    for file in [&artifacts.log_file, &artifacts.todo_file] {
        match tokio::fs::remove_file(file).await {
            Ok(()) => debug!(path = %file.display(), "removed session artifact"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %file.display(), error = %e, "failed to remove session artifact"),
        }
    }

    match tokio::fs::remove_dir_all(&artifacts.session_dir).await {
        Ok(()) => debug!(path = %artifacts.session_dir.display(), "removed session directory"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(
            path = %artifacts.session_dir.display(),
            error = %e,
            "failed to remove session directory"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_is_stable_across_calls() {
        let a = derive_session_id("C123", "/work/project");
        let b = derive_session_id("C123", "/work/project");
        assert_eq!(a, b);
    }

    #[test]
    fn session_id_varies_with_inputs() {
        let base = derive_session_id("C123", "/work/project");
        assert_ne!(base, derive_session_id("C124", "/work/project"));
        assert_ne!(base, derive_session_id("C123", "/work/other"));
    }

    #[test]
    fn session_id_regression_anchor() {
        let id = derive_session_id("C0AHAGEQY8Y", "/Users/tamas/dev/ktamas77/claudeway");
        assert_eq!(id.to_string(), "808dcec8-994d-5b57-8aa6-c6beeaf1fd39");
    }

    #[test]
    fn folder_encoding_replaces_separators() {
        assert_eq!(encode_folder("/work/project"), "-work-project");
        assert_eq!(encode_folder("relative/path"), "relative-path");
    }

    #[test]
    fn artifact_paths_layout() {
        let id = derive_session_id("C1", "/p");
        let artifacts = artifact_paths_in(Path::new("/home/u"), &id, "/p");
        assert_eq!(
            artifacts.log_file,
            PathBuf::from(format!("/home/u/.claude/projects/-p/{id}.jsonl"))
        );
        assert_eq!(
            artifacts.session_dir,
            PathBuf::from(format!("/home/u/.claude/projects/-p/{id}"))
        );
        assert_eq!(
            artifacts.todo_file,
            PathBuf::from(format!("/home/u/.claude/todos/{id}-agent-{id}.json"))
        );
    }

    #[tokio::test]
    async fn clear_artifacts_is_idempotent() {
        // Nothing exists for this made-up binding; clearing must not error.
        let id = derive_session_id("C-test-nonexistent", "/tmp/agentway-test-nonexistent");
        clear_artifacts(&id, "/tmp/agentway-test-nonexistent").await;
        clear_artifacts(&id, "/tmp/agentway-test-nonexistent").await;
    }
}
