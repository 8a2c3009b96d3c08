// SPDX-FileCopyrightText: 2026 Agentway Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock chat client for deterministic testing.
//!
//! Every outbound operation is captured in order; `ts` values are minted
//! from a counter so tests can reference posted messages. File fetches are
//! served from stubbed URL → bytes mappings.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use agentway_core::traits::chat::{ChatClient, ChatStream, FileFetcher};
use agentway_core::AgentwayError;

/// A captured `post_message` call.
#[derive(Debug, Clone)]
pub struct PostedMessage {
    pub channel: String,
    pub thread_ts: Option<String>,
    pub text: String,
    /// The ts minted for this message.
    pub ts: String,
}

/// A captured `update_message` call.
#[derive(Debug, Clone)]
pub struct UpdatedMessage {
    pub channel: String,
    pub ts: String,
    pub text: String,
}

/// A captured reaction add/remove, in call order.
#[derive(Debug, Clone)]
pub struct ReactionEvent {
    pub channel: String,
    pub ts: String,
    pub name: String,
    pub added: bool,
}

/// A captured `file_upload` call.
#[derive(Debug, Clone)]
pub struct Upload {
    pub channel: String,
    pub thread_ts: Option<String>,
    pub content: String,
    pub filename: String,
    pub title: String,
}

/// One native stream opened through the mock.
#[derive(Debug, Clone, Default)]
pub struct MockStreamRecord {
    pub channel: String,
    pub thread_ts: String,
    pub buffer_size: u32,
    pub appends: Vec<String>,
    pub stopped: bool,
}

/// Chat client double capturing all outbound traffic.
#[derive(Default)]
pub struct MockChat {
    counter: AtomicU64,
    posted: Mutex<Vec<PostedMessage>>,
    updates: Mutex<Vec<UpdatedMessage>>,
    deleted: Mutex<Vec<(String, String)>>,
    reactions: Mutex<Vec<ReactionEvent>>,
    uploads: Mutex<Vec<Upload>>,
    streams: Arc<Mutex<Vec<MockStreamRecord>>>,
    files: Mutex<HashMap<String, Vec<u8>>>,
}

impl MockChat {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_ts(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        format!("1700000000.{n:06}")
    }

    /// Stub a downloadable file for [`FileFetcher::fetch`].
    pub async fn stub_file(&self, url: &str, bytes: Vec<u8>) {
        self.files.lock().await.insert(url.to_string(), bytes);
    }

    pub async fn posted(&self) -> Vec<PostedMessage> {
        self.posted.lock().await.clone()
    }

    pub async fn updates(&self) -> Vec<UpdatedMessage> {
        self.updates.lock().await.clone()
    }

    pub async fn deleted(&self) -> Vec<(String, String)> {
        self.deleted.lock().await.clone()
    }

    pub async fn reactions(&self) -> Vec<ReactionEvent> {
        self.reactions.lock().await.clone()
    }

    /// Reaction names currently present on a message, in add order.
    pub async fn reactions_on(&self, channel: &str, ts: &str) -> Vec<String> {
        let mut present: Vec<String> = Vec::new();
        for event in self.reactions.lock().await.iter() {
            if event.channel != channel || event.ts != ts {
                continue;
            }
            if event.added {
                present.push(event.name.clone());
            } else {
                present.retain(|name| name != &event.name);
            }
        }
        present
    }

    pub async fn uploads(&self) -> Vec<Upload> {
        self.uploads.lock().await.clone()
    }

    pub async fn streams(&self) -> Vec<MockStreamRecord> {
        self.streams.lock().await.clone()
    }
}

#[async_trait]
impl ChatClient for MockChat {
    async fn post_message(
        &self,
        channel: &str,
        thread_ts: Option<&str>,
        text: &str,
    ) -> Result<String, AgentwayError> {
        let ts = self.next_ts();
        self.posted.lock().await.push(PostedMessage {
            channel: channel.to_string(),
            thread_ts: thread_ts.map(str::to_string),
            text: text.to_string(),
            ts: ts.clone(),
        });
        Ok(ts)
    }

    async fn update_message(
        &self,
        channel: &str,
        ts: &str,
        text: &str,
    ) -> Result<(), AgentwayError> {
        self.updates.lock().await.push(UpdatedMessage {
            channel: channel.to_string(),
            ts: ts.to_string(),
            text: text.to_string(),
        });
        Ok(())
    }

    async fn delete_message(&self, channel: &str, ts: &str) -> Result<(), AgentwayError> {
        self.deleted
            .lock()
            .await
            .push((channel.to_string(), ts.to_string()));
        Ok(())
    }

    async fn reaction_add(
        &self,
        channel: &str,
        ts: &str,
        name: &str,
    ) -> Result<(), AgentwayError> {
        self.reactions.lock().await.push(ReactionEvent {
            channel: channel.to_string(),
            ts: ts.to_string(),
            name: name.to_string(),
            added: true,
        });
        Ok(())
    }

    async fn reaction_remove(
        &self,
        channel: &str,
        ts: &str,
        name: &str,
    ) -> Result<(), AgentwayError> {
        self.reactions.lock().await.push(ReactionEvent {
            channel: channel.to_string(),
            ts: ts.to_string(),
            name: name.to_string(),
            added: false,
        });
        Ok(())
    }

    async fn file_upload(
        &self,
        channel: &str,
        thread_ts: Option<&str>,
        content: &str,
        filename: &str,
        title: &str,
    ) -> Result<(), AgentwayError> {
        self.uploads.lock().await.push(Upload {
            channel: channel.to_string(),
            thread_ts: thread_ts.map(str::to_string),
            content: content.to_string(),
            filename: filename.to_string(),
            title: title.to_string(),
        });
        Ok(())
    }

    async fn chat_stream(
        &self,
        channel: &str,
        thread_ts: &str,
        buffer_size: u32,
    ) -> Result<Box<dyn ChatStream>, AgentwayError> {
        let index = {
            let mut streams = self.streams.lock().await;
            streams.push(MockStreamRecord {
                channel: channel.to_string(),
                thread_ts: thread_ts.to_string(),
                buffer_size,
                appends: Vec::new(),
                stopped: false,
            });
            streams.len() - 1
        };
        Ok(Box::new(MockStream {
            streams: self.streams.clone(),
            index,
        }))
    }
}

#[async_trait]
impl FileFetcher for MockChat {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, AgentwayError> {
        self.files
            .lock()
            .await
            .get(url)
            .cloned()
            .ok_or_else(|| AgentwayError::chat(format!("no stubbed file for {url}")))
    }
}

struct MockStream {
    streams: Arc<Mutex<Vec<MockStreamRecord>>>,
    index: usize,
}

#[async_trait]
impl ChatStream for MockStream {
    async fn append(&mut self, markdown_text: &str) -> Result<(), AgentwayError> {
        let mut streams = self.streams.lock().await;
        if let Some(record) = streams.get_mut(self.index) {
            record.appends.push(markdown_text.to_string());
        }
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), AgentwayError> {
        let mut streams = self.streams.lock().await;
        if let Some(record) = streams.get_mut(self.index) {
            record.stopped = true;
        }
        Ok(())
    }
}
