// SPDX-FileCopyrightText: 2026 Agentway Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable message queue: a file-per-message FIFO that survives restarts.
//!
//! Each pending prompt is one JSON file under the queue directory, named
//! from its channel id and message ts. Records are created on ingress and
//! removed only after the agent turn for them terminates, so a crash
//! mid-turn leaves the prompt on disk for the next drain pass.

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, warn};

use agentway_core::types::QueuedMessage;
use agentway_core::AgentwayError;

/// File-backed FIFO of [`QueuedMessage`] records, scoped by channel.
///
/// All access is serialized on the scheduler's task, so no file locking is
/// needed; the directory is the single source of truth.
#[derive(Debug, Clone)]
pub struct FileQueue {
    dir: PathBuf,
}

impl FileQueue {
    /// Open (and create if needed) the queue directory.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, AgentwayError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| AgentwayError::queue(format!("create {}", dir.display()), e))?;
        Ok(Self { dir })
    }

    /// The on-disk location of one record.
    ///
    /// The platform ts contains dots, which are replaced so the name stays
    /// safe on any host filesystem. Same (channel, ts) ⇒ same path, so a
    /// re-enqueue of an identical message overwrites rather than duplicates.
    fn entry_path(&self, channel_id: &str, ts: &str) -> PathBuf {
        self.dir
            .join(format!("{channel_id}_{}.json", ts.replace('.', "-")))
    }

    /// Persist a message. Write errors propagate so the caller can surface
    /// the failure to the user.
    pub async fn enqueue(&self, msg: &QueuedMessage) -> Result<(), AgentwayError> {
        let path = self.entry_path(&msg.channel_id, &msg.ts);
        let json = serde_json::to_vec_pretty(msg).map_err(|e| AgentwayError::Queue {
            message: format!("serialize {}", path.display()),
            source: Some(Box::new(e)),
        })?;
        fs::write(&path, json)
            .await
            .map_err(|e| AgentwayError::queue(format!("write {}", path.display()), e))?;
        debug!(channel = %msg.channel_id, ts = %msg.ts, "message enqueued");
        Ok(())
    }

    /// Remove a record. Returns whether a record actually existed.
    pub async fn dequeue(&self, channel_id: &str, ts: &str) -> Result<bool, AgentwayError> {
        let path = self.entry_path(channel_id, ts);
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!(channel = %channel_id, ts = %ts, "message dequeued");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(AgentwayError::queue(format!("remove {}", path.display()), e)),
        }
    }

    /// All pending records, sorted ascending by `queued_at`.
    ///
    /// Unreadable or malformed records are skipped with a warning; the queue
    /// never fails wholesale because one file is damaged.
    pub async fn pending(&self) -> Result<Vec<QueuedMessage>, AgentwayError> {
        let mut entries = fs::read_dir(&self.dir)
            .await
            .map_err(|e| AgentwayError::queue(format!("read {}", self.dir.display()), e))?;

        let mut messages = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| AgentwayError::queue(format!("read {}", self.dir.display()), e))?
        {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            match read_record(&path).await {
                Some(msg) => messages.push(msg),
                None => warn!(path = %path.display(), "skipping unreadable queue record"),
            }
        }

        messages.sort_by(|a, b| a.queued_at.cmp(&b.queued_at));
        Ok(messages)
    }

    /// Pending records for one channel, oldest first.
    pub async fn pending_for_channel(
        &self,
        channel_id: &str,
    ) -> Result<Vec<QueuedMessage>, AgentwayError> {
        let mut messages = self.pending().await?;
        messages.retain(|m| m.channel_id == channel_id);
        Ok(messages)
    }

    /// Replace the text of a record that is still queued.
    ///
    /// Returns `false` when no record exists for (channel, ts), typically
    /// because the message already moved into processing.
    pub async fn update_queued_text(
        &self,
        channel_id: &str,
        ts: &str,
        new_text: &str,
    ) -> Result<bool, AgentwayError> {
        let path = self.entry_path(channel_id, ts);
        let Some(mut msg) = read_record(&path).await else {
            return Ok(false);
        };
        msg.text = new_text.to_string();
        self.enqueue(&msg).await?;
        debug!(channel = %channel_id, ts = %ts, "queued text updated");
        Ok(true)
    }
}

/// Read and parse one record, returning `None` on any failure.
async fn read_record(path: &Path) -> Option<QueuedMessage> {
    let bytes = fs::read(path).await.ok()?;
    serde_json::from_slice(&bytes).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn message(channel: &str, ts: &str, queued_at: &str) -> QueuedMessage {
        QueuedMessage {
            channel_id: channel.into(),
            user_id: "U001".into(),
            text: format!("prompt {ts}"),
            ts: ts.into(),
            thread_ts: ts.into(),
            queued_at: queued_at.into(),
            image_paths: vec![],
        }
    }

    #[tokio::test]
    async fn enqueue_then_pending_preserves_fields() {
        let dir = tempdir().unwrap();
        let queue = FileQueue::open(dir.path()).await.unwrap();

        let msg = message("C001", "1700000000.000100", "2026-01-01T00:00:00Z");
        queue.enqueue(&msg).await.unwrap();

        let pending = queue.pending_for_channel("C001").await.unwrap();
        assert_eq!(pending, vec![msg]);
    }

    #[tokio::test]
    async fn dequeue_is_exactly_once() {
        let dir = tempdir().unwrap();
        let queue = FileQueue::open(dir.path()).await.unwrap();

        let msg = message("C001", "1.000", "2026-01-01T00:00:00Z");
        queue.enqueue(&msg).await.unwrap();

        assert!(queue.dequeue("C001", "1.000").await.unwrap());
        assert!(!queue.dequeue("C001", "1.000").await.unwrap());
    }

    #[tokio::test]
    async fn pending_sorts_by_queued_at_across_channels() {
        let dir = tempdir().unwrap();
        let queue = FileQueue::open(dir.path()).await.unwrap();

        queue
            .enqueue(&message("C002", "2.000", "2026-01-01T00:00:02Z"))
            .await
            .unwrap();
        queue
            .enqueue(&message("C001", "3.000", "2026-01-01T00:00:03Z"))
            .await
            .unwrap();
        queue
            .enqueue(&message("C001", "1.000", "2026-01-01T00:00:01Z"))
            .await
            .unwrap();

        let all = queue.pending().await.unwrap();
        let ts: Vec<&str> = all.iter().map(|m| m.ts.as_str()).collect();
        assert_eq!(ts, vec!["1.000", "2.000", "3.000"]);

        let c1 = queue.pending_for_channel("C001").await.unwrap();
        assert_eq!(c1.len(), 2);
        assert_eq!(c1[0].ts, "1.000");
    }

    #[tokio::test]
    async fn update_queued_text_only_while_queued() {
        let dir = tempdir().unwrap();
        let queue = FileQueue::open(dir.path()).await.unwrap();

        let msg = message("C001", "1.000", "2026-01-01T00:00:00Z");
        queue.enqueue(&msg).await.unwrap();

        assert!(queue
            .update_queued_text("C001", "1.000", "edited")
            .await
            .unwrap());
        let pending = queue.pending_for_channel("C001").await.unwrap();
        assert_eq!(pending[0].text, "edited");
        // Everything else survives the rewrite.
        assert_eq!(pending[0].user_id, "U001");

        queue.dequeue("C001", "1.000").await.unwrap();
        assert!(!queue
            .update_queued_text("C001", "1.000", "too late")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn damaged_records_are_skipped() {
        let dir = tempdir().unwrap();
        let queue = FileQueue::open(dir.path()).await.unwrap();

        queue
            .enqueue(&message("C001", "1.000", "2026-01-01T00:00:00Z"))
            .await
            .unwrap();
        std::fs::write(dir.path().join("C001_2-000.json"), "not json").unwrap();

        let pending = queue.pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].ts, "1.000");
    }

    #[tokio::test]
    async fn enqueue_same_ts_overwrites() {
        let dir = tempdir().unwrap();
        let queue = FileQueue::open(dir.path()).await.unwrap();

        let mut msg = message("C001", "1.000", "2026-01-01T00:00:00Z");
        queue.enqueue(&msg).await.unwrap();
        msg.text = "second write".into();
        queue.enqueue(&msg).await.unwrap();

        let pending = queue.pending_for_channel("C001").await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].text, "second write");
    }

    #[tokio::test]
    async fn survives_reopen() {
        let dir = tempdir().unwrap();
        {
            let queue = FileQueue::open(dir.path()).await.unwrap();
            queue
                .enqueue(&message("C001", "1.000", "2026-01-01T00:00:00Z"))
                .await
                .unwrap();
        }
        let queue = FileQueue::open(dir.path()).await.unwrap();
        assert_eq!(queue.pending().await.unwrap().len(), 1);
    }
}
