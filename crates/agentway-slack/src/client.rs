// SPDX-FileCopyrightText: 2026 Agentway Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Web-API implementation of [`ChatClient`].
//!
//! Thin wrappers over the platform's HTTP methods. Every call posts JSON to
//! `https://slack.com/api/<method>` with the bot token and checks the `ok`
//! field in the response envelope.

use async_trait::async_trait;
use serde_json::{json, Value};

use agentway_core::traits::chat::{ChatClient, ChatStream, FileFetcher};
use agentway_core::AgentwayError;

const API_BASE: &str = "https://slack.com/api";

/// Chat platform client backed by the Web API.
pub struct SlackClient {
    http: reqwest::Client,
    token: String,
}

impl SlackClient {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            token: token.into(),
        }
    }

    async fn call(&self, method: &str, body: Value) -> Result<Value, AgentwayError> {
        let response = self
            .http
            .post(format!("{API_BASE}/{method}"))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .map_err(|e| AgentwayError::Chat {
                message: format!("{method} request failed: {e}"),
                source: Some(Box::new(e)),
            })?;

        let value: Value = response.json().await.map_err(|e| AgentwayError::Chat {
            message: format!("{method} returned invalid JSON: {e}"),
            source: Some(Box::new(e)),
        })?;

        if value.get("ok").and_then(Value::as_bool) != Some(true) {
            let detail = value
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("unknown_error");
            return Err(AgentwayError::chat(format!("{method} failed: {detail}")));
        }
        Ok(value)
    }
}

#[async_trait]
impl ChatClient for SlackClient {
    async fn post_message(
        &self,
        channel: &str,
        thread_ts: Option<&str>,
        text: &str,
    ) -> Result<String, AgentwayError> {
        let mut body = json!({ "channel": channel, "text": text });
        if let Some(thread) = thread_ts {
            body["thread_ts"] = json!(thread);
        }
        let value = self.call("chat.postMessage", body).await?;
        value
            .get("ts")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| AgentwayError::chat("chat.postMessage response missing ts"))
    }

    async fn update_message(
        &self,
        channel: &str,
        ts: &str,
        text: &str,
    ) -> Result<(), AgentwayError> {
        self.call(
            "chat.update",
            json!({ "channel": channel, "ts": ts, "text": text }),
        )
        .await
        .map(|_| ())
    }

    async fn delete_message(&self, channel: &str, ts: &str) -> Result<(), AgentwayError> {
        self.call("chat.delete", json!({ "channel": channel, "ts": ts }))
            .await
            .map(|_| ())
    }

    async fn reaction_add(
        &self,
        channel: &str,
        ts: &str,
        name: &str,
    ) -> Result<(), AgentwayError> {
        self.call(
            "reactions.add",
            json!({ "channel": channel, "timestamp": ts, "name": name }),
        )
        .await
        .map(|_| ())
    }

    async fn reaction_remove(
        &self,
        channel: &str,
        ts: &str,
        name: &str,
    ) -> Result<(), AgentwayError> {
        self.call(
            "reactions.remove",
            json!({ "channel": channel, "timestamp": ts, "name": name }),
        )
        .await
        .map(|_| ())
    }

    async fn file_upload(
        &self,
        channel: &str,
        thread_ts: Option<&str>,
        content: &str,
        filename: &str,
        title: &str,
    ) -> Result<(), AgentwayError> {
        let mut body = json!({
            "channels": channel,
            "content": content,
            "filename": filename,
            "title": title,
        });
        if let Some(thread) = thread_ts {
            body["thread_ts"] = json!(thread);
        }
        self.call("files.upload", body).await.map(|_| ())
    }

    async fn chat_stream(
        &self,
        channel: &str,
        thread_ts: &str,
        buffer_size: u32,
    ) -> Result<Box<dyn ChatStream>, AgentwayError> {
        let value = self
            .call(
                "chat.startStream",
                json!({
                    "channel": channel,
                    "thread_ts": thread_ts,
                    "buffer_size": buffer_size,
                }),
            )
            .await?;
        let stream_ts = value
            .get("ts")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| AgentwayError::chat("chat.startStream response missing ts"))?;
        Ok(Box::new(SlackChatStream {
            http: self.http.clone(),
            token: self.token.clone(),
            channel: channel.to_string(),
            stream_ts,
        }))
    }
}

#[async_trait]
impl FileFetcher for SlackClient {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, AgentwayError> {
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| AgentwayError::Chat {
                message: format!("file download failed: {e}"),
                source: Some(Box::new(e)),
            })?;
        let bytes = response.bytes().await.map_err(|e| AgentwayError::Chat {
            message: format!("file download body failed: {e}"),
            source: Some(Box::new(e)),
        })?;
        Ok(bytes.to_vec())
    }
}

/// Handle for one open native stream.
struct SlackChatStream {
    http: reqwest::Client,
    token: String,
    channel: String,
    stream_ts: String,
}

impl SlackChatStream {
    async fn call(&self, method: &str, body: Value) -> Result<(), AgentwayError> {
        let response = self
            .http
            .post(format!("{API_BASE}/{method}"))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .map_err(|e| AgentwayError::Chat {
                message: format!("{method} request failed: {e}"),
                source: Some(Box::new(e)),
            })?;
        let value: Value = response.json().await.map_err(|e| AgentwayError::Chat {
            message: format!("{method} returned invalid JSON: {e}"),
            source: Some(Box::new(e)),
        })?;
        if value.get("ok").and_then(Value::as_bool) != Some(true) {
            let detail = value
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("unknown_error");
            return Err(AgentwayError::chat(format!("{method} failed: {detail}")));
        }
        Ok(())
    }
}

#[async_trait]
impl ChatStream for SlackChatStream {
    async fn append(&mut self, markdown_text: &str) -> Result<(), AgentwayError> {
        self.call(
            "chat.appendStream",
            json!({
                "channel": self.channel,
                "ts": self.stream_ts,
                "markdown_text": markdown_text,
            }),
        )
        .await
    }

    async fn stop(&mut self) -> Result<(), AgentwayError> {
        self.call(
            "chat.stopStream",
            json!({ "channel": self.channel, "ts": self.stream_ts }),
        )
        .await
    }
}
