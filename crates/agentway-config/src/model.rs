// SPDX-FileCopyrightText: 2026 Agentway Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Agentway gateway.
//!
//! A config file maps chat channels to working directories and carries
//! workspace-wide defaults. Per-channel values overlay the defaults at
//! resolution time; the resolved form handed to the scheduler is
//! [`ResolvedChannelConfig`].

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use agentway_core::types::{ProcessMode, ResolvedChannelConfig, ResponseMode};

/// Token inside `systemPrompt` values that expands to the config file path,
/// letting the agent edit its own configuration via filesystem tools.
pub const CONFIG_PATH_TOKEN: &str = "CONFIG_PATH";

/// Top-level gateway configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Inbound routing table: channel id → channel settings.
    #[serde(default)]
    pub channels: HashMap<String, ChannelConfig>,

    /// Workspace-wide fallback values.
    #[serde(default)]
    pub defaults: Defaults,

    /// Optional channel for startup/shutdown notifications.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_channel: Option<String>,

    /// Chat platform credentials and ingress settings.
    #[serde(default)]
    pub slack: SlackConfig,
}

/// Per-channel settings. Optional fields fall back to [`Defaults`].
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelConfig {
    /// Display label, shown in `!ps` output and kill confirmations.
    pub name: String,

    /// Agent working directory for this channel.
    pub folder: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_mode: Option<ResponseMode>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_mode: Option<ProcessMode>,
}

/// Workspace-wide fallback values for per-channel options.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Defaults {
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default)]
    pub system_prompt: String,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_response_mode")]
    pub response_mode: ResponseMode,

    #[serde(default = "default_process_mode")]
    pub process_mode: ProcessMode,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            model: default_model(),
            system_prompt: String::new(),
            timeout_ms: default_timeout_ms(),
            response_mode: default_response_mode(),
            process_mode: default_process_mode(),
        }
    }
}

fn default_model() -> String {
    "sonnet".to_string()
}

fn default_timeout_ms() -> u64 {
    300_000
}

fn default_response_mode() -> ResponseMode {
    ResponseMode::StreamUpdate
}

fn default_process_mode() -> ProcessMode {
    ProcessMode::Oneshot
}

/// Chat platform settings used by the binary's ingress and Web-API client.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlackConfig {
    /// Bot token for Web-API calls and authenticated file downloads.
    #[serde(default)]
    pub bot_token: Option<String>,

    /// Bind address for the event-callback ingress server.
    #[serde(default = "default_ingress_host")]
    pub ingress_host: String,

    /// Bind port for the event-callback ingress server.
    #[serde(default = "default_ingress_port")]
    pub ingress_port: u16,
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            ingress_host: default_ingress_host(),
            ingress_port: default_ingress_port(),
        }
    }
}

fn default_ingress_host() -> String {
    "127.0.0.1".to_string()
}

fn default_ingress_port() -> u16 {
    3840
}

impl GatewayConfig {
    /// Resolve the effective settings for a channel by overlaying its
    /// overrides on the workspace defaults.
    ///
    /// `config_path` feeds the `CONFIG_PATH` token expansion inside the
    /// system prompt. Returns `None` for channels absent from the routing
    /// table.
    pub fn resolve_channel(
        &self,
        channel_id: &str,
        config_path: &Path,
    ) -> Option<ResolvedChannelConfig> {
        let channel = self.channels.get(channel_id)?;

        let system_prompt = channel
            .system_prompt
            .as_deref()
            .unwrap_or(&self.defaults.system_prompt)
            .replace(CONFIG_PATH_TOKEN, &config_path.to_string_lossy());

        Some(ResolvedChannelConfig {
            channel_id: channel_id.to_string(),
            name: channel.name.clone(),
            folder: channel.folder.clone(),
            model: channel
                .model
                .clone()
                .unwrap_or_else(|| self.defaults.model.clone()),
            system_prompt,
            timeout_ms: channel.timeout_ms.unwrap_or(self.defaults.timeout_ms),
            response_mode: channel
                .response_mode
                .unwrap_or(self.defaults.response_mode),
            process_mode: channel.process_mode.unwrap_or(self.defaults.process_mode),
        })
    }

    /// Find a channel id by its display name.
    ///
    /// Used by the command interpreter to resolve `!kill #name` style
    /// references. Matching is case-sensitive on the configured name.
    pub fn channel_id_by_name(&self, name: &str) -> Option<&str> {
        self.channels
            .iter()
            .find(|(_, c)| c.name == name)
            .map(|(id, _)| id.as_str())
    }
}
