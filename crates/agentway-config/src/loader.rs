// SPDX-FileCopyrightText: 2026 Agentway Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loading and atomic persistence.
//!
//! `config.yaml` is preferred; `config.json` is accepted. Loading merges the
//! file over compiled defaults via Figment. Saving is atomic: serialize to
//! `<path>.tmp`, parse the temp file back to prove it is valid, then rename
//! over the original.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::{Path, PathBuf};

use figment::{
    providers::{Format, Json, Serialized, Yaml},
    Figment,
};

use agentway_core::AgentwayError;

use crate::model::GatewayConfig;

/// Locate the config file inside `dir`: `config.yaml` wins over `config.json`.
pub fn find_config_file(dir: &Path) -> Option<PathBuf> {
    let yaml = dir.join("config.yaml");
    if yaml.exists() {
        return Some(yaml);
    }
    let json = dir.join("config.json");
    if json.exists() {
        return Some(json);
    }
    None
}

/// Load configuration from an explicit file path, merged over defaults.
///
/// The file format is chosen by extension; anything other than `.json` is
/// parsed as YAML.
pub fn load_config(path: &Path) -> Result<GatewayConfig, AgentwayError> {
    let figment = Figment::new().merge(Serialized::defaults(GatewayConfig::default()));

    let figment = if is_json(path) {
        figment.merge(Json::file(path))
    } else {
        figment.merge(Yaml::file(path))
    };

    figment
        .extract()
        .map_err(|e| AgentwayError::Config(format!("{}: {e}", path.display())))
}

/// Persist configuration atomically.
///
/// Writes to `<path>.tmp`, parses the temp file back to validate it, then
/// renames it over `path`. A failed validation leaves the original intact.
pub fn save_config(config: &GatewayConfig, path: &Path) -> Result<(), AgentwayError> {
    let serialized = if is_json(path) {
        serde_json::to_string_pretty(config)
            .map_err(|e| AgentwayError::Config(format!("serialize config: {e}")))?
    } else {
        serde_yaml::to_string(config)
            .map_err(|e| AgentwayError::Config(format!("serialize config: {e}")))?
    };

    let tmp = path.with_extension(tmp_extension(path));
    std::fs::write(&tmp, &serialized)
        .map_err(|e| AgentwayError::Config(format!("write {}: {e}", tmp.display())))?;

    // Parse back before committing the rename.
    load_config(&tmp)?;

    std::fs::rename(&tmp, path)
        .map_err(|e| AgentwayError::Config(format!("rename {}: {e}", tmp.display())))?;
    Ok(())
}

fn is_json(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "json")
}

fn tmp_extension(path: &Path) -> String {
    match path.extension() {
        Some(ext) => format!("{}.tmp", ext.to_string_lossy()),
        None => "tmp".to_string(),
    }
}
