//! Realtime Channel
//!
//! Bidirectional event channel between a client engine and the room server.
//! `WebSocketChannel` owns the socket in a background task and reconnects with
//! exponential backoff; `MemoryChannel` is an in-process pair for tests and
//! local play against an embedded hub.

use async_trait::async_trait;
use culturate_core::{
    protocol::{decode, encode},
    ChannelConfig, ClientEvent, CulturateError, CulturateResult, ServerEvent,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use url::Url;

// ----------------------------------------------------------------------------
// Channel Interface
// ----------------------------------------------------------------------------

/// What the channel surfaces to the engine task
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelMessage {
    Connected,
    Disconnected { reason: String },
    Event(ServerEvent),
    /// Unreadable frame or failed connection attempt
    Error { message: String },
}

#[async_trait]
pub trait RealtimeChannel: Send {
    /// Queue an event for the server
    async fn send(&mut self, event: ClientEvent) -> CulturateResult<()>;

    /// Next message; `None` once the channel is closed for good
    async fn recv(&mut self) -> Option<ChannelMessage>;

    async fn close(&mut self);
}

// ----------------------------------------------------------------------------
// In-Memory Channel
// ----------------------------------------------------------------------------

/// Client end of an in-process channel
#[derive(Debug)]
pub struct MemoryChannel {
    outbound: mpsc::UnboundedSender<ClientEvent>,
    inbound: mpsc::UnboundedReceiver<ChannelMessage>,
    closed: bool,
}

/// Server end of an in-process channel
#[derive(Debug)]
pub struct MemoryPeer {
    pub outbound: mpsc::UnboundedReceiver<ClientEvent>,
    pub inbound: mpsc::UnboundedSender<ChannelMessage>,
}

impl MemoryChannel {
    pub fn pair() -> (MemoryChannel, MemoryPeer) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        (
            MemoryChannel {
                outbound: outbound_tx,
                inbound: inbound_rx,
                closed: false,
            },
            MemoryPeer {
                outbound: outbound_rx,
                inbound: inbound_tx,
            },
        )
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

#[async_trait]
impl RealtimeChannel for MemoryChannel {
    async fn send(&mut self, event: ClientEvent) -> CulturateResult<()> {
        if self.closed {
            return Err(CulturateError::connection("Channel closed"));
        }
        self.outbound
            .send(event)
            .map_err(|_| CulturateError::connection("Peer dropped"))
    }

    async fn recv(&mut self) -> Option<ChannelMessage> {
        if self.closed {
            return None;
        }
        self.inbound.recv().await
    }

    async fn close(&mut self) {
        self.closed = true;
        self.inbound.close();
    }
}

// ----------------------------------------------------------------------------
// WebSocket Channel
// ----------------------------------------------------------------------------

/// Auto-reconnecting WebSocket connection to the room server
pub struct WebSocketChannel {
    commands: Option<mpsc::Sender<ClientEvent>>,
    messages: mpsc::Receiver<ChannelMessage>,
    worker: JoinHandle<()>,
}

impl WebSocketChannel {
    /// Start connecting in the background; `Connected` arrives once the socket is up
    pub fn connect(url: &str, config: ChannelConfig) -> CulturateResult<Self> {
        let url = Url::parse(url).map_err(|e| {
            CulturateError::config_error(format!("Invalid realtime URL {}: {}", url, e))
        })?;
        let (command_tx, command_rx) = mpsc::channel(config.command_buffer_size);
        let (message_tx, message_rx) = mpsc::channel(config.event_buffer_size);
        let worker = tokio::spawn(run_socket(url, config, command_rx, message_tx));

        Ok(Self {
            commands: Some(command_tx),
            messages: message_rx,
            worker,
        })
    }
}

#[async_trait]
impl RealtimeChannel for WebSocketChannel {
    async fn send(&mut self, event: ClientEvent) -> CulturateResult<()> {
        let commands = self
            .commands
            .as_ref()
            .ok_or_else(|| CulturateError::connection("Channel closed"))?;
        commands
            .send(event)
            .await
            .map_err(|_| CulturateError::channel_error("Socket task stopped"))
    }

    async fn recv(&mut self) -> Option<ChannelMessage> {
        self.messages.recv().await
    }

    async fn close(&mut self) {
        // Dropping the sender lets the worker send a close frame and exit
        self.commands = None;
        self.messages.close();
        if self.worker.is_finished() {
            debug!("Socket task already stopped");
        }
    }
}

impl Drop for WebSocketChannel {
    fn drop(&mut self) {
        self.worker.abort();
    }
}

async fn run_socket(
    url: Url,
    config: ChannelConfig,
    mut commands: mpsc::Receiver<ClientEvent>,
    messages: mpsc::Sender<ChannelMessage>,
) {
    let mut attempt = 0u32;
    loop {
        match connect_async(url.as_str()).await {
            Ok((socket, _response)) => {
                attempt = 0;
                info!(url = %url, "Realtime channel connected");
                if messages.send(ChannelMessage::Connected).await.is_err() {
                    return;
                }

                let (mut write, mut read) = socket.split();
                let reason = loop {
                    tokio::select! {
                        command = commands.recv() => match command {
                            Some(event) => {
                                let frame = match encode(&event) {
                                    Ok(frame) => frame,
                                    Err(e) => {
                                        warn!(event = event.name(), "Failed to encode event: {}", e);
                                        continue;
                                    }
                                };
                                debug!(event = event.name(), "Sending");
                                if let Err(e) = write.send(Message::Text(frame)).await {
                                    break e.to_string();
                                }
                            }
                            None => {
                                debug!("Channel closed by owner");
                                let _ = write.send(Message::Close(None)).await;
                                return;
                            }
                        },
                        frame = read.next() => match frame {
                            Some(Ok(Message::Text(text))) => {
                                let message = match decode::<ServerEvent>(&text) {
                                    Ok(event) => ChannelMessage::Event(event),
                                    Err(e) => ChannelMessage::Error { message: e.to_string() },
                                };
                                if messages.send(message).await.is_err() {
                                    return;
                                }
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                break "Connection closed by server".to_string();
                            }
                            Some(Ok(_)) => {}
                            Some(Err(e)) => break e.to_string(),
                        }
                    }
                };

                warn!(url = %url, "Realtime channel lost: {}", reason);
                if messages
                    .send(ChannelMessage::Disconnected { reason })
                    .await
                    .is_err()
                {
                    return;
                }
            }
            Err(e) => {
                debug!(attempt, "Realtime connect failed: {}", e);
                if attempt == 0
                    && messages
                        .send(ChannelMessage::Error {
                            message: e.to_string(),
                        })
                        .await
                        .is_err()
                {
                    return;
                }
            }
        }

        // Events queued while offline are stale; the engine resyncs after reconnect
        let mut dropped = 0usize;
        while commands.try_recv().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            debug!(dropped, "Dropped events queued while disconnected");
        }

        let delay = config.backoff_for(attempt);
        attempt = attempt.saturating_add(1);
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = messages.closed() => return,
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use culturate_core::{protocol::RoomRequest, PlayerId, RoomId};

    #[tokio::test]
    async fn test_memory_pair_round_trip() {
        let (mut channel, mut peer) = MemoryChannel::pair();
        let request = RoomRequest::new(RoomId::new("ABC123"), PlayerId::new("p1"));
        channel
            .send(ClientEvent::JoinRoom(request.clone()))
            .await
            .unwrap();
        assert_eq!(
            peer.outbound.recv().await,
            Some(ClientEvent::JoinRoom(request))
        );

        peer.inbound.send(ChannelMessage::Connected).unwrap();
        assert_eq!(channel.recv().await, Some(ChannelMessage::Connected));
    }

    #[tokio::test]
    async fn test_memory_close_stops_traffic() {
        let (mut channel, _peer) = MemoryChannel::pair();
        channel.close().await;
        assert!(channel.is_closed());
        assert!(channel.recv().await.is_none());
        let request = RoomRequest::new(RoomId::new("ABC123"), PlayerId::new("p1"));
        assert!(channel.send(ClientEvent::LeaveRoom(request)).await.is_err());
    }

    #[test]
    fn test_rejects_invalid_url() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let _guard = runtime.enter();
        assert!(WebSocketChannel::connect("not a url", ChannelConfig::testing()).is_err());
    }
}
