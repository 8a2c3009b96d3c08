// SPDX-FileCopyrightText: 2026 Agentway Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Agent command-line assembly and spawn environment.
//!
//! The flag order is part of the agent's CLI contract and is preserved
//! exactly: `-p`, output format, streaming flags, persistent-mode input
//! flags, model, session flag, appended system prompt, permission skip,
//! optional MCP config, and finally the positional prompt (oneshot only).

use std::path::{Path, PathBuf};

use uuid::Uuid;

use agentway_core::types::ResolvedChannelConfig;

/// Name of the agent binary, resolved via `PATH`.
pub const AGENT_PROGRAM: &str = "claude";

/// Environment variable the agent sets in its own children; its presence
/// makes a spawn refuse as a nested invocation, so it is always unset.
pub const NESTED_GUARD_VAR: &str = "CLAUDECODE";

/// Prompt suffix announcing attached image files (oneshot only).
pub const IMAGE_SUFFIX_HEADER: &str =
    "[Attached image files — use your Read tool to view them]";

/// Output format requested from the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// One JSON document on exit; used for oneshot runs that nothing streams.
    Json,
    /// Newline-delimited JSON event stream.
    StreamJson,
}

/// What kind of run is being launched.
#[derive(Debug, Clone)]
pub enum LaunchKind {
    /// Single prompt passed as the final positional argument.
    Oneshot {
        prompt: String,
        image_paths: Vec<PathBuf>,
        output: OutputFormat,
    },
    /// Long-lived process fed turns over stdin.
    Persistent,
}

/// A fully assembled agent invocation.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    /// Pipe stdin (persistent) or ignore it (oneshot).
    pub piped_stdin: bool,
}

/// Assemble the argument vector for an agent run.
///
/// `resume` selects `--resume` over `--session-id`; the caller decides it
/// from whether the session log file already exists. `mcp_config` is the
/// gateway's own `mcp.json`, forwarded when present.
pub fn build_launch(
    config: &ResolvedChannelConfig,
    session_id: &Uuid,
    resume: bool,
    kind: &LaunchKind,
    mcp_config: Option<&Path>,
) -> LaunchSpec {
    let mut args: Vec<String> = vec!["-p".into()];

    let output = match kind {
        LaunchKind::Oneshot { output, .. } => *output,
        LaunchKind::Persistent => OutputFormat::StreamJson,
    };

    args.push("--output-format".into());
    match output {
        OutputFormat::Json => args.push("json".into()),
        OutputFormat::StreamJson => {
            args.push("stream-json".into());
            args.push("--verbose".into());
            args.push("--include-partial-messages".into());
        }
    }

    if matches!(kind, LaunchKind::Persistent) {
        args.push("--input-format".into());
        args.push("stream-json".into());
        args.push("--replay-user-messages".into());
    }

    args.push("--model".into());
    args.push(config.model.clone());

    if resume {
        args.push("--resume".into());
    } else {
        args.push("--session-id".into());
    }
    args.push(session_id.to_string());

    if !config.system_prompt.is_empty() {
        args.push("--append-system-prompt".into());
        args.push(config.system_prompt.clone());
    }

    args.push("--dangerously-skip-permissions".into());

    if let Some(path) = mcp_config {
        args.push("--mcp-config".into());
        args.push(path.to_string_lossy().into_owned());
    }

    if let LaunchKind::Oneshot {
        prompt,
        image_paths,
        ..
    } = kind
    {
        args.push(prompt_with_images(prompt, image_paths));
    }

    LaunchSpec {
        program: AGENT_PROGRAM.to_string(),
        args,
        cwd: PathBuf::from(&config.folder),
        piped_stdin: matches!(kind, LaunchKind::Persistent),
    }
}

/// Extend a prompt with the attached-image trailer.
fn prompt_with_images(prompt: &str, image_paths: &[PathBuf]) -> String {
    if image_paths.is_empty() {
        return prompt.to_string();
    }
    let listing = image_paths
        .iter()
        .map(|p| p.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("\n");
    format!("{prompt}\n\n{IMAGE_SUFFIX_HEADER}\n{listing}")
}

/// Apply the common spawn environment rules to a command.
///
/// Unsets the nested-invocation guard and synthesizes `HOME` from `USER`
/// when the parent environment lacks one.
pub fn apply_spawn_env(cmd: &mut tokio::process::Command) {
    cmd.env_remove(NESTED_GUARD_VAR);
    if std::env::var_os("HOME").is_none() {
        if let Ok(user) = std::env::var("USER") {
            cmd.env("HOME", default_home_for(&user));
        }
    }
}

fn default_home_for(user: &str) -> String {
    #[cfg(target_os = "macos")]
    {
        format!("/Users/{user}")
    }
    #[cfg(not(target_os = "macos"))]
    {
        format!("/home/{user}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentway_core::types::{ProcessMode, ResponseMode};

    fn config() -> ResolvedChannelConfig {
        ResolvedChannelConfig {
            channel_id: "C001".into(),
            name: "one".into(),
            folder: "/work/one".into(),
            model: "sonnet".into(),
            system_prompt: "be brief".into(),
            timeout_ms: 300_000,
            response_mode: ResponseMode::StreamUpdate,
            process_mode: ProcessMode::Oneshot,
        }
    }

    fn sid() -> Uuid {
        crate::session::derive_session_id("C001", "/work/one")
    }

    #[test]
    fn oneshot_stream_args_in_contract_order() {
        let kind = LaunchKind::Oneshot {
            prompt: "hello".into(),
            image_paths: vec![],
            output: OutputFormat::StreamJson,
        };
        let spec = build_launch(&config(), &sid(), false, &kind, None);
        let session = sid().to_string();
        assert_eq!(
            spec.args,
            vec![
                "-p",
                "--output-format",
                "stream-json",
                "--verbose",
                "--include-partial-messages",
                "--model",
                "sonnet",
                "--session-id",
                session.as_str(),
                "--append-system-prompt",
                "be brief",
                "--dangerously-skip-permissions",
                "hello",
            ]
        );
        assert!(!spec.piped_stdin);
        assert_eq!(spec.cwd, PathBuf::from("/work/one"));
    }

    #[test]
    fn oneshot_json_omits_stream_flags() {
        let kind = LaunchKind::Oneshot {
            prompt: "hello".into(),
            image_paths: vec![],
            output: OutputFormat::Json,
        };
        let spec = build_launch(&config(), &sid(), false, &kind, None);
        assert!(spec.args.contains(&"json".to_string()));
        assert!(!spec.args.contains(&"--verbose".to_string()));
        assert!(!spec.args.contains(&"--include-partial-messages".to_string()));
    }

    #[test]
    fn resume_replaces_session_id_flag() {
        let kind = LaunchKind::Oneshot {
            prompt: "hello".into(),
            image_paths: vec![],
            output: OutputFormat::StreamJson,
        };
        let spec = build_launch(&config(), &sid(), true, &kind, None);
        assert!(spec.args.contains(&"--resume".to_string()));
        assert!(!spec.args.contains(&"--session-id".to_string()));
    }

    #[test]
    fn persistent_args_add_input_format_and_pipe_stdin() {
        let spec = build_launch(&config(), &sid(), true, &LaunchKind::Persistent, None);
        let joined = spec.args.join(" ");
        assert!(joined.contains("--input-format stream-json"));
        assert!(joined.contains("--replay-user-messages"));
        assert!(joined.contains("--output-format stream-json"));
        assert!(spec.piped_stdin);
        // No positional prompt in persistent mode.
        assert_eq!(spec.args.last().unwrap(), "--dangerously-skip-permissions");
    }

    #[test]
    fn mcp_config_is_appended_after_permissions() {
        let kind = LaunchKind::Oneshot {
            prompt: "hi".into(),
            image_paths: vec![],
            output: OutputFormat::StreamJson,
        };
        let spec = build_launch(
            &config(),
            &sid(),
            false,
            &kind,
            Some(Path::new("/srv/gateway/mcp.json")),
        );
        let pos_mcp = spec
            .args
            .iter()
            .position(|a| a == "--mcp-config")
            .unwrap();
        let pos_skip = spec
            .args
            .iter()
            .position(|a| a == "--dangerously-skip-permissions")
            .unwrap();
        assert!(pos_mcp > pos_skip);
        assert_eq!(spec.args[pos_mcp + 1], "/srv/gateway/mcp.json");
        assert_eq!(spec.args.last().unwrap(), "hi");
    }

    #[test]
    fn image_paths_extend_the_prompt() {
        let kind = LaunchKind::Oneshot {
            prompt: "what is this".into(),
            image_paths: vec![PathBuf::from("/tmp/a.png"), PathBuf::from("/tmp/b.jpg")],
            output: OutputFormat::StreamJson,
        };
        let spec = build_launch(&config(), &sid(), false, &kind, None);
        let prompt = spec.args.last().unwrap();
        assert_eq!(
            prompt,
            &format!("what is this\n\n{IMAGE_SUFFIX_HEADER}\n/tmp/a.png\n/tmp/b.jpg")
        );
    }

    #[test]
    fn empty_system_prompt_is_not_passed() {
        let mut cfg = config();
        cfg.system_prompt = String::new();
        let kind = LaunchKind::Oneshot {
            prompt: "hi".into(),
            image_paths: vec![],
            output: OutputFormat::StreamJson,
        };
        let spec = build_launch(&cfg, &sid(), false, &kind, None);
        assert!(!spec.args.contains(&"--append-system-prompt".to_string()));
    }
}
