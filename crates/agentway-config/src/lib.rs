// SPDX-FileCopyrightText: 2026 Agentway Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration for the Agentway gateway: the model structs, the YAML/JSON
//! loader with atomic save, and per-channel overlay resolution.

pub mod loader;
pub mod model;

pub use loader::{find_config_file, load_config, save_config};
pub use model::{ChannelConfig, Defaults, GatewayConfig, SlackConfig, CONFIG_PATH_TOKEN};
