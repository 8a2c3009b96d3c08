// SPDX-FileCopyrightText: 2026 Agentway Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Image attachment intake.
//!
//! Supported images on inbound messages are downloaded through the
//! authenticated fetcher into a temp directory and handed to the agent as
//! local paths. Temp files are namespaced by the platform's unique file id
//! plus the original name, and removed once the turn ends.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

use agentway_core::types::{RemoteFile, IMAGE_SIZE_LIMIT};
use agentway_core::FileFetcher;

/// MIME types the agent can read as images.
pub const SUPPORTED_IMAGE_MIMES: [&str; 4] =
    ["image/png", "image/jpeg", "image/gif", "image/webp"];

/// Whether a file qualifies for download: supported MIME and within the
/// size limit.
pub fn is_supported_image(file: &RemoteFile) -> bool {
    SUPPORTED_IMAGE_MIMES.contains(&file.mimetype.as_str()) && file.size <= IMAGE_SIZE_LIMIT
}

/// Download every supported image to `dir`, returning their local paths in
/// upload order. Individual download failures are logged and skipped.
pub async fn download_images(
    fetcher: &Arc<dyn FileFetcher>,
    files: &[RemoteFile],
    dir: &Path,
) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    for file in files.iter().filter(|f| is_supported_image(f)) {
        let path = dir.join(format!("{}_{}", file.id, sanitize_name(&file.name)));
        match fetcher.fetch(&file.url_private_download).await {
            Ok(bytes) => match tokio::fs::write(&path, &bytes).await {
                Ok(()) => {
                    debug!(path = %path.display(), size = bytes.len(), "image downloaded");
                    paths.push(path);
                }
                Err(e) => warn!(path = %path.display(), error = %e, "image write failed"),
            },
            Err(e) => warn!(file = %file.id, error = %e, "image download failed"),
        }
    }
    paths
}

/// Remove downloaded temp images. Best-effort.
pub async fn cleanup_images(paths: &[PathBuf]) {
    for path in paths {
        if let Err(e) = tokio::fs::remove_file(path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %path.display(), error = %e, "temp image cleanup failed");
            }
        }
    }
}

/// Keep the original name readable but path-safe.
fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| if c == '/' || c == '\\' || c == '\0' { '_' } else { c })
        .collect()
}
