//! Challenge Stream
//!
//! Opens the server-sent event stream that pre-fetches AI match challenges and
//! forwards decoded messages to the engine task.

use async_trait::async_trait;
use culturate_core::{CulturateResult, SseDecoder, StreamError, StreamMessage};
use futures::StreamExt;
use reqwest::{header::ACCEPT, Client};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

#[async_trait]
pub trait ChallengeFeed: Send + Sync {
    /// Open a new stream; dropping the receiver ends it
    async fn open(&self) -> CulturateResult<mpsc::Receiver<StreamMessage>>;
}

// ----------------------------------------------------------------------------
// HTTP Feed
// ----------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct HttpChallengeFeed {
    client: Client,
    url: String,
    buffer: usize,
}

impl HttpChallengeFeed {
    pub fn new(url: impl Into<String>, buffer: usize) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
            buffer: buffer.max(1),
        }
    }
}

#[async_trait]
impl ChallengeFeed for HttpChallengeFeed {
    async fn open(&self) -> CulturateResult<mpsc::Receiver<StreamMessage>> {
        let response = self
            .client
            .get(&self.url)
            .header(ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(|e| StreamError::ConnectionFailed {
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(StreamError::ConnectionFailed {
                reason: format!("HTTP status {}", status),
            }
            .into());
        }
        info!(url = %self.url, "Challenge stream opened");

        let (tx, rx) = mpsc::channel(self.buffer);
        let mut body = response.bytes_stream();
        tokio::spawn(async move {
            let mut decoder = SseDecoder::new();
            let mut pending = Vec::new();
            let mut completed = false;

            while let Some(chunk) = body.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        warn!("Challenge stream read failed: {}", e);
                        let _ = tx
                            .send(StreamMessage::Error {
                                detail: e.to_string(),
                            })
                            .await;
                        return;
                    }
                };
                pending.extend_from_slice(&chunk);
                let text = take_utf8(&mut pending);
                for message in decoder.push(&text) {
                    completed |= message == StreamMessage::Complete;
                    if tx.send(message).await.is_err() {
                        debug!("Stream receiver dropped");
                        return;
                    }
                }
            }

            if let Some(message) = decoder.finish() {
                completed |= message == StreamMessage::Complete;
                if tx.send(message).await.is_err() {
                    return;
                }
            }
            if !completed {
                let _ = tx.send(StreamMessage::Complete).await;
            }
            debug!("Challenge stream ended");
        });

        Ok(rx)
    }
}

/// Drain the longest valid UTF-8 prefix, keeping a split code point for the next chunk
fn take_utf8(pending: &mut Vec<u8>) -> String {
    let valid = match std::str::from_utf8(pending) {
        Ok(_) => pending.len(),
        Err(e) => match e.error_len() {
            // Invalid bytes mid-stream: replace and move on
            Some(_) => {
                let text = String::from_utf8_lossy(pending).into_owned();
                pending.clear();
                return text;
            }
            None => e.valid_up_to(),
        },
    };
    let rest = pending.split_off(valid);
    let text = String::from_utf8_lossy(pending).into_owned();
    *pending = rest;
    text
}

// ----------------------------------------------------------------------------
// Scripted Feed
// ----------------------------------------------------------------------------

/// Feed that replays a fixed message list, for tests and offline play
#[derive(Debug, Clone, Default)]
pub struct ScriptedFeed {
    messages: Vec<StreamMessage>,
}

impl ScriptedFeed {
    pub fn new(messages: Vec<StreamMessage>) -> Self {
        Self { messages }
    }
}

#[async_trait]
impl ChallengeFeed for ScriptedFeed {
    async fn open(&self) -> CulturateResult<mpsc::Receiver<StreamMessage>> {
        let (tx, rx) = mpsc::channel(self.messages.len().max(1));
        let messages = self.messages.clone();
        tokio::spawn(async move {
            for message in messages {
                if tx.send(message).await.is_err() {
                    return;
                }
            }
        });
        Ok(rx)
    }
}
