//! Challenge stream messages
//!
//! The AI match receives its challenges ahead of time over a server-sent event
//! stream. This module turns raw SSE text into `StreamMessage`s; the runtime
//! owns the HTTP connection and feeds it bytes.

use crate::challenge::CulturalData;
use serde::Deserialize;
use tracing::{debug, warn};

/// One decoded stream message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamMessage {
    /// Progress text; ignored by the engine
    Status { message: String },
    /// The stream reported a failure and will not deliver more items
    Error { detail: String },
    /// A complete challenge record to queue
    Item(CulturalData),
    /// No more items will arrive
    Complete,
    /// Unusable payload; logged and skipped
    Malformed,
}

#[derive(Deserialize)]
struct RawPayload {
    #[serde(rename = "type")]
    kind: Option<String>,
    message: Option<String>,
    detail: Option<serde_json::Value>,
    #[serde(flatten)]
    record: CulturalData,
}

impl StreamMessage {
    /// Decode an SSE event given its `event:` name (if any) and `data:` payload
    pub fn parse(event: Option<&str>, data: &str) -> Self {
        if event == Some("complete") {
            return StreamMessage::Complete;
        }

        let raw: RawPayload = match serde_json::from_str(data) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Failed to parse stream payload: {}", e);
                return StreamMessage::Malformed;
            }
        };

        if let Some(detail) = raw.detail {
            let detail = match detail {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            return StreamMessage::Error { detail };
        }

        match raw.kind.as_deref() {
            Some("status") => {
                return StreamMessage::Status {
                    message: raw.message.unwrap_or_default(),
                }
            }
            Some("complete") => return StreamMessage::Complete,
            _ => {}
        }

        if raw.record.is_complete() {
            StreamMessage::Item(raw.record)
        } else {
            debug!(province = %raw.record.province, "Skipping incomplete stream record");
            StreamMessage::Malformed
        }
    }
}

// ----------------------------------------------------------------------------
// SSE Framing
// ----------------------------------------------------------------------------

/// Incremental server-sent events decoder
///
/// Accepts arbitrary text chunks and yields a message for every completed
/// event block (terminated by a blank line).
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: String,
    event: Option<String>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &str) -> Vec<StreamMessage> {
        self.buffer.push_str(chunk);
        let mut out = Vec::new();

        while let Some(pos) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=pos).collect();
            let line = line.trim_end_matches(['\n', '\r']);

            if line.is_empty() {
                if let Some(message) = self.dispatch() {
                    out.push(message);
                }
                continue;
            }
            if line.starts_with(':') {
                continue;
            }

            let (field, value) = match line.split_once(':') {
                Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                None => (line, ""),
            };
            match field {
                "event" => self.event = Some(value.to_string()),
                "data" => self.data.push(value.to_string()),
                _ => {}
            }
        }

        out
    }

    /// Flush a trailing event that was not terminated by a blank line
    pub fn finish(&mut self) -> Option<StreamMessage> {
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            let mut messages = self.push(&format!("{}\n", rest));
            if !messages.is_empty() {
                return messages.pop();
            }
        }
        self.dispatch()
    }

    fn dispatch(&mut self) -> Option<StreamMessage> {
        let event = self.event.take();
        if self.data.is_empty() && event.is_none() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        if data.is_empty() && event.as_deref() != Some("complete") {
            return None;
        }
        Some(StreamMessage::parse(event.as_deref(), &data))
    }
}
