// SPDX-FileCopyrightText: 2026 Agentway Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Parsing of the agent's newline-delimited JSON output stream.
//!
//! The agent emits one JSON document per line. Only three shapes matter to
//! the gateway; everything else (tool traces, system banners, malformed
//! lines) is dropped without effect.

use serde_json::Value;

/// One recognized event from the agent's stdout stream.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    /// An incremental text fragment of the response.
    TextDelta { text: String },
    /// Terminal record for a turn, with usage accounting when present.
    TurnResult {
        text: String,
        session_id: Option<String>,
        cost: Option<f64>,
        tokens: Option<u64>,
    },
    /// Echo of a stdin message, emitted in persistent mode to acknowledge
    /// receipt. Informational only.
    UserReceipt,
}

/// Parse one line of agent output.
///
/// Returns `None` for blank lines, truncated JSON, unknown top-level types,
/// and `stream_event` envelopes whose inner shape is not exactly a
/// non-empty `text_delta`. Never panics.
pub fn parse_stream_line(line: &str) -> Option<AgentEvent> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let value: Value = serde_json::from_str(line).ok()?;

    match value.get("type")?.as_str()? {
        "stream_event" => {
            let event = value.get("event")?;
            if event.get("type")?.as_str()? != "content_block_delta" {
                return None;
            }
            let delta = event.get("delta")?;
            if delta.get("type")?.as_str()? != "text_delta" {
                return None;
            }
            let text = delta.get("text")?.as_str()?;
            if text.is_empty() {
                return None;
            }
            Some(AgentEvent::TextDelta {
                text: text.to_string(),
            })
        }
        "result" => {
            let text = value
                .get("result")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let session_id = value
                .get("session_id")
                .and_then(Value::as_str)
                .map(str::to_string);
            let cost = value
                .get("cost_usd")
                .and_then(Value::as_f64)
                .or_else(|| value.get("total_cost_usd").and_then(Value::as_f64));
            let tokens = value.get("usage").map(|usage| {
                usage
                    .get("input_tokens")
                    .and_then(Value::as_u64)
                    .unwrap_or(0)
                    + usage
                        .get("output_tokens")
                        .and_then(Value::as_u64)
                        .unwrap_or(0)
            });
            Some(AgentEvent::TurnResult {
                text,
                session_id,
                cost,
                tokens,
            })
        }
        "user" => Some(AgentEvent::UserReceipt),
        _ => None,
    }
}

/// Accumulates raw stdout chunks and yields complete lines.
///
/// A chunk may end mid-line (and mid-UTF-8-sequence); the trailing partial
/// is retained across pushes and surfaced by [`LineBuffer::flush`] when the
/// stream closes.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and drain every complete line it closes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            lines.push(String::from_utf8_lossy(&line[..line.len() - 1]).into_owned());
        }
        lines
    }

    /// Drain the trailing partial line, if any. Called on stream close.
    pub fn flush(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let line = String::from_utf8_lossy(&self.buf).into_owned();
        self.buf.clear();
        Some(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_delta_parses() {
        let line = r#"{"type":"stream_event","event":{"type":"content_block_delta","delta":{"type":"text_delta","text":"hello"}}}"#;
        assert_eq!(
            parse_stream_line(line),
            Some(AgentEvent::TextDelta {
                text: "hello".into()
            })
        );
    }

    #[test]
    fn empty_delta_text_is_dropped() {
        let line = r#"{"type":"stream_event","event":{"type":"content_block_delta","delta":{"type":"text_delta","text":""}}}"#;
        assert_eq!(parse_stream_line(line), None);
    }

    #[test]
    fn non_text_delta_is_dropped() {
        let line = r#"{"type":"stream_event","event":{"type":"content_block_delta","delta":{"type":"input_json_delta","partial_json":"{"}}}"#;
        assert_eq!(parse_stream_line(line), None);
        let line = r#"{"type":"stream_event","event":{"type":"content_block_start","content_block":{"type":"tool_use"}}}"#;
        assert_eq!(parse_stream_line(line), None);
    }

    #[test]
    fn result_with_usage_sums_tokens() {
        let line = r#"{"type":"result","result":"done","session_id":"abc","cost_usd":0.0125,"usage":{"input_tokens":100,"output_tokens":23}}"#;
        assert_eq!(
            parse_stream_line(line),
            Some(AgentEvent::TurnResult {
                text: "done".into(),
                session_id: Some("abc".into()),
                cost: Some(0.0125),
                tokens: Some(123),
            })
        );
    }

    #[test]
    fn result_cost_falls_back_to_total_cost_usd() {
        let line = r#"{"type":"result","result":"x","total_cost_usd":0.5}"#;
        match parse_stream_line(line) {
            Some(AgentEvent::TurnResult { cost, tokens, .. }) => {
                assert_eq!(cost, Some(0.5));
                assert_eq!(tokens, None);
            }
            other => panic!("unexpected parse: {other:?}"),
        }
    }

    #[test]
    fn result_without_fields_is_all_none() {
        let line = r#"{"type":"result"}"#;
        assert_eq!(
            parse_stream_line(line),
            Some(AgentEvent::TurnResult {
                text: String::new(),
                session_id: None,
                cost: None,
                tokens: None,
            })
        );
    }

    #[test]
    fn user_echo_is_receipt() {
        let line = r#"{"type":"user","message":{"role":"user","content":"hi"}}"#;
        assert_eq!(parse_stream_line(line), Some(AgentEvent::UserReceipt));
    }

    #[test]
    fn garbage_never_panics() {
        for line in [
            "",
            "   ",
            "not json",
            "{\"type\":",
            r#"{"no_type":true}"#,
            r#"{"type":"system","subtype":"init"}"#,
            r#"{"type":"stream_event"}"#,
            r#"{"type":"stream_event","event":{}}"#,
            r#"{"type":42}"#,
            "\u{0}\u{1}\u{2}",
        ] {
            assert_eq!(parse_stream_line(line), None, "line: {line:?}");
        }
    }

    #[test]
    fn line_buffer_splits_chunks() {
        let mut buf = LineBuffer::new();
        assert_eq!(buf.push(b"{\"a\":1}\n{\"b\""), vec!["{\"a\":1}"]);
        let lines = buf.push(b":2}\n{\"c\":3}");
        assert_eq!(lines, vec!["{\"b\":2}"]);
        assert_eq!(buf.flush(), Some("{\"c\":3}".to_string()));
        assert_eq!(buf.flush(), None);
    }

    #[test]
    fn line_buffer_handles_multiple_lines_per_chunk() {
        let mut buf = LineBuffer::new();
        let lines = buf.push(b"one\ntwo\nthree\n");
        assert_eq!(lines, vec!["one", "two", "three"]);
        assert_eq!(buf.flush(), None);
    }

    #[test]
    fn line_buffer_survives_split_utf8() {
        let mut buf = LineBuffer::new();
        let bytes = "héllo\n".as_bytes();
        // Split in the middle of the two-byte 'é'.
        assert!(buf.push(&bytes[..2]).is_empty());
        let lines = buf.push(&bytes[2..]);
        assert_eq!(lines, vec!["héllo"]);
    }
}
