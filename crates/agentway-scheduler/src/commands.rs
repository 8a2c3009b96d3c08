// SPDX-FileCopyrightText: 2026 Agentway Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Magic-command interpreter.
//!
//! A small set of `!`-prefixed texts bypass the queue entirely and drive
//! the supervisor directly: process listing, SIGTERM kills, and SIGINT
//! nudges. Commands act on the current channel unless a channel reference
//! (`<#ID|name>`, `#name`, or a bare name) targets another one.

use std::path::Path;
use std::sync::LazyLock;

use chrono::Utc;
use regex::Regex;

use agentway_claude::Supervisor;
use agentway_config::GatewayConfig;
use agentway_core::types::{ActiveProcess, QueuedMessage, MAX_CONCURRENT_PROCESSES};

static RE_KILL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^!kill\s+(\S.*)$").unwrap());
static RE_NUDGE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^!nudge\s+(\S.*)$").unwrap());
static RE_MENTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^<#([A-Z0-9]+)(?:\|([^>]*))?>$").unwrap());

/// A recognized queue-bypassing command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MagicCommand {
    Ps,
    /// SIGTERM; `None` targets the current channel.
    Kill(Option<String>),
    KillAll,
    /// SIGINT; `None` targets the current channel.
    Nudge(Option<String>),
}

/// Recognize a magic command. Only an exact command (after trim) or a
/// command plus channel reference qualifies; anything else is a prompt.
pub fn parse_magic(text: &str) -> Option<MagicCommand> {
    let text = text.trim();
    match text {
        "!ps" => return Some(MagicCommand::Ps),
        "!kill" => return Some(MagicCommand::Kill(None)),
        "!killall" => return Some(MagicCommand::KillAll),
        "!nudge" => return Some(MagicCommand::Nudge(None)),
        _ => {}
    }
    if let Some(captures) = RE_KILL.captures(text) {
        return Some(MagicCommand::Kill(Some(captures[1].trim().to_string())));
    }
    if let Some(captures) = RE_NUDGE.captures(text) {
        return Some(MagicCommand::Nudge(Some(captures[1].trim().to_string())));
    }
    None
}

/// Resolve a channel reference to (channel id, display name).
///
/// Accepts a platform mention `<#ID|name>`, a plain configured name, or a
/// name with a leading `#`.
pub fn resolve_channel_ref(reference: &str, config: &GatewayConfig) -> Result<(String, String), String> {
    if let Some(captures) = RE_MENTION.captures(reference) {
        let id = captures[1].to_string();
        let name = config
            .channels
            .get(&id)
            .map(|c| c.name.clone())
            .or_else(|| captures.get(2).map(|m| m.as_str().to_string()))
            .unwrap_or_else(|| id.clone());
        return Ok((id, name));
    }

    let name = reference.strip_prefix('#').unwrap_or(reference);
    match config.channel_id_by_name(name) {
        Some(id) => Ok((id.to_string(), name.to_string())),
        None => Err(format!("unknown channel `{reference}`")),
    }
}

/// Render `!ps` output: active processes against the cap, one line per
/// process, then the queued-count breakdown per channel.
pub fn format_ps(
    processes: &[ActiveProcess],
    pending: &[QueuedMessage],
    config: &GatewayConfig,
    config_path: &Path,
) -> String {
    let mut out = format!(
        "*Active processes: {}/{}*\n",
        processes.len(),
        MAX_CONCURRENT_PROCESSES
    );

    if processes.is_empty() {
        out.push_str("_none_\n");
    }
    for process in processes {
        let name = config
            .resolve_channel(&process.channel_id, config_path)
            .map(|c| c.name)
            .unwrap_or_else(|| process.channel_id.clone());
        let elapsed = (Utc::now() - process.started_at).num_seconds().max(0) as u64;
        let usage = if process.total_tokens > 0 {
            format!("{} tokens", process.total_tokens)
        } else {
            format!("${:.2}", process.total_cost)
        };
        let indicator = if process.is_active {
            ":hourglass_flowing_sand:"
        } else {
            "(idle)"
        };
        out.push_str(&format!(
            "• #{name} — {}, {} turns, {usage} {indicator}\n",
            format_duration(elapsed),
            process.message_count,
        ));
    }

    let mut per_channel: Vec<(String, usize)> = Vec::new();
    for msg in pending {
        match per_channel.iter_mut().find(|(id, _)| id == &msg.channel_id) {
            Some((_, count)) => *count += 1,
            None => per_channel.push((msg.channel_id.clone(), 1)),
        }
    }

    if per_channel.is_empty() {
        out.push_str("\n*Queued:* none");
    } else {
        out.push_str("\n*Queued:*\n");
        for (channel_id, count) in per_channel {
            let name = config
                .resolve_channel(&channel_id, config_path)
                .map(|c| c.name)
                .unwrap_or(channel_id);
            out.push_str(&format!("• #{name}: {count}\n"));
        }
    }
    out.trim_end().to_string()
}

/// `Hh Mm Ss` / `Mm Ss` / `Ss` duration buckets.
pub fn format_duration(total_secs: u64) -> String {
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    if hours > 0 {
        format!("{hours}h {minutes}m {seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}

/// Confirmation line for a completed `!kill`.
pub fn format_kill_confirmation(name: &str, running_secs: u64) -> String {
    format!(
        ":stop_sign: Killed process in #{name} (was running {})",
        format_duration(running_secs)
    )
}

/// Run a kill or nudge against the supervisor, returning the message to
/// post in the originating channel.
pub async fn kill_or_nudge(
    supervisor: &Supervisor,
    channel_id: &str,
    name: &str,
    nudge: bool,
) -> String {
    if nudge {
        if supervisor.nudge_process(channel_id).await {
            format!(":point_right: Nudged process in #{name}")
        } else {
            format!(":warning: No active process in #{name}")
        }
    } else {
        let running_secs = supervisor
            .get_active_processes()
            .await
            .iter()
            .find(|p| p.channel_id == channel_id)
            .map(|p| (Utc::now() - p.started_at).num_seconds().max(0) as u64);
        match running_secs {
            Some(secs) => {
                if supervisor.kill_process(channel_id).await {
                    format_kill_confirmation(name, secs)
                } else {
                    format!(":warning: No active process in #{name}")
                }
            }
            None => format!(":warning: No active process in #{name}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentway_config::{ChannelConfig, Defaults, SlackConfig};
    use agentway_core::types::ProcessMode;
    use std::collections::HashMap;
    use std::path::PathBuf;

    fn config() -> GatewayConfig {
        let mut channels = HashMap::new();
        channels.insert(
            "C002".to_string(),
            ChannelConfig {
                name: "project-two".into(),
                folder: "/work/two".into(),
                model: None,
                system_prompt: None,
                timeout_ms: None,
                response_mode: None,
                process_mode: None,
            },
        );
        GatewayConfig {
            channels,
            defaults: Defaults::default(),
            system_channel: None,
            slack: SlackConfig::default(),
        }
    }

    #[test]
    fn exact_commands_parse() {
        assert_eq!(parse_magic("!ps"), Some(MagicCommand::Ps));
        assert_eq!(parse_magic("  !kill  "), Some(MagicCommand::Kill(None)));
        assert_eq!(parse_magic("!killall"), Some(MagicCommand::KillAll));
        assert_eq!(parse_magic("!nudge"), Some(MagicCommand::Nudge(None)));
    }

    #[test]
    fn commands_with_refs_parse() {
        assert_eq!(
            parse_magic("!kill #project-two"),
            Some(MagicCommand::Kill(Some("#project-two".into())))
        );
        assert_eq!(
            parse_magic("!nudge <#C002|project-two>"),
            Some(MagicCommand::Nudge(Some("<#C002|project-two>".into())))
        );
    }

    #[test]
    fn non_commands_do_not_parse() {
        assert_eq!(parse_magic("!psalm reading"), None);
        assert_eq!(parse_magic("please !kill this"), None);
        assert_eq!(parse_magic("!killallthe things"), None);
        assert_eq!(parse_magic("hello"), None);
    }

    #[test]
    fn channel_refs_resolve() {
        let config = config();
        assert_eq!(
            resolve_channel_ref("<#C002|project-two>", &config).unwrap(),
            ("C002".into(), "project-two".into())
        );
        assert_eq!(
            resolve_channel_ref("#project-two", &config).unwrap(),
            ("C002".into(), "project-two".into())
        );
        assert_eq!(
            resolve_channel_ref("project-two", &config).unwrap(),
            ("C002".into(), "project-two".into())
        );
        assert!(resolve_channel_ref("#missing", &config).is_err());
    }

    #[test]
    fn duration_buckets() {
        assert_eq!(format_duration(42), "42s");
        assert_eq!(format_duration(102), "1m 42s");
        assert_eq!(format_duration(3723), "1h 2m 3s");
        assert_eq!(format_duration(0), "0s");
    }

    #[test]
    fn kill_confirmation_matches_expected_shape() {
        assert_eq!(
            format_kill_confirmation("project-two", 102),
            ":stop_sign: Killed process in #project-two (was running 1m 42s)"
        );
    }

    #[test]
    fn ps_output_lists_processes_and_queue() {
        let config = config();
        let path = PathBuf::from("/tmp/config.yaml");
        let processes = vec![ActiveProcess {
            channel_id: "C002".into(),
            session_id: "s".into(),
            mode: ProcessMode::Persistent,
            started_at: Utc::now() - chrono::Duration::seconds(102),
            last_prompt: "fix the bug".into(),
            message_count: 3,
            total_cost: 0.5,
            total_tokens: 0,
            is_active: false,
        }];
        let pending = vec![QueuedMessage {
            channel_id: "C002".into(),
            user_id: "U1".into(),
            text: "next".into(),
            ts: "2.000".into(),
            thread_ts: "2.000".into(),
            queued_at: "2026-01-01T00:00:00Z".into(),
            image_paths: vec![],
        }];

        let out = format_ps(&processes, &pending, &config, &path);
        assert!(out.starts_with("*Active processes: 1/8*"));
        assert!(out.contains("#project-two"));
        assert!(out.contains("1m 42s"));
        assert!(out.contains("3 turns"));
        // Zero tokens falls back to cost.
        assert!(out.contains("$0.50"));
        assert!(out.contains("(idle)"));
        assert!(out.contains("#project-two: 1"));
    }

    #[test]
    fn ps_output_empty_state() {
        let out = format_ps(&[], &[], &config(), &PathBuf::from("/tmp/config.yaml"));
        assert!(out.contains("0/8"));
        assert!(out.contains("_none_"));
        assert!(out.contains("*Queued:* none"));
    }
}
