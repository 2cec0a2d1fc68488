//! Room Server
//!
//! Hosts authoritative rooms for multiplayer matches. `RoomHub` routes client
//! events to each room's arbiter and fans the resulting events out to the
//! players' connections; `RoomServer` puts the hub behind WebSocket sockets
//! (or in-process memory channels) and ticks it for timeouts.

use crate::channel::{ChannelMessage, MemoryChannel};
use anyhow::Context;
use culturate_core::{
    config::millis,
    protocol::{decode, encode},
    Audience, ChallengeDeck, ChallengeSource, ClientEvent, GameConfig, Outbound, PlayerId, Room,
    RoomId, RoomPhase, ServerEvent, TimeSource, Timestamp,
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, info, warn};
use uuid::Uuid;

// ----------------------------------------------------------------------------
// Configuration
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    /// How often rooms are checked for expired countdowns
    #[serde(rename = "tick_interval_ms", with = "millis")]
    pub tick_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:3000".to_string(),
            tick_interval: Duration::from_secs(1),
        }
    }
}

impl ServerConfig {
    pub fn testing() -> Self {
        Self {
            bind: "127.0.0.1:0".to_string(),
            tick_interval: Duration::from_millis(10),
        }
    }
}

/// Monotonic milliseconds since the clock was created
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    origin: Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for TokioClock {
    fn now(&self) -> Timestamp {
        Timestamp::new(self.origin.elapsed().as_millis() as u64)
    }
}

// ----------------------------------------------------------------------------
// Room Hub
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(Uuid);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

struct Connection {
    sender: mpsc::UnboundedSender<ServerEvent>,
    bindings: BTreeSet<(RoomId, PlayerId)>,
}

type SourceFactory = Box<dyn Fn() -> Box<dyn ChallengeSource> + Send + Sync>;

/// Registry of rooms and the connections of their players
pub struct RoomHub {
    config: GameConfig,
    clock: Arc<dyn TimeSource>,
    rooms: BTreeMap<RoomId, Room>,
    connections: BTreeMap<ConnectionId, Connection>,
    routes: BTreeMap<(RoomId, PlayerId), ConnectionId>,
    challenges: SourceFactory,
}

impl fmt::Debug for RoomHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoomHub")
            .field("rooms", &self.rooms.len())
            .field("connections", &self.connections.len())
            .finish()
    }
}

impl RoomHub {
    pub fn new(config: GameConfig) -> Self {
        Self {
            config,
            clock: Arc::new(TokioClock::new()),
            rooms: BTreeMap::new(),
            connections: BTreeMap::new(),
            routes: BTreeMap::new(),
            challenges: Box::new(|| Box::new(ChallengeDeck::standard())),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn TimeSource>) -> Self {
        self.clock = clock;
        self
    }

    /// Challenge source for each newly created room
    pub fn with_challenges<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Box<dyn ChallengeSource> + Send + Sync + 'static,
    {
        self.challenges = Box::new(factory);
        self
    }

    pub fn room(&self, room_id: &RoomId) -> Option<&Room> {
        self.rooms.get(room_id)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn connect(&mut self, sender: mpsc::UnboundedSender<ServerEvent>) -> ConnectionId {
        let id = ConnectionId(Uuid::new_v4());
        self.connections.insert(
            id,
            Connection {
                sender,
                bindings: BTreeSet::new(),
            },
        );
        debug!(connection = %id, "Connection registered");
        id
    }

    /// Route one client event from `connection`
    pub fn handle(&mut self, connection: ConnectionId, event: ClientEvent) {
        let now = self.clock.now();
        let room_id = event.room_id().clone();
        debug!(connection = %connection, room = %room_id, event = event.name(), "Client event");

        if !self.rooms.contains_key(&room_id) {
            if matches!(event, ClientEvent::CreateRoom(_)) {
                info!(room = %room_id, "Room created");
                let room = Room::new(room_id.clone(), self.config.clone(), (self.challenges)());
                self.rooms.insert(room_id.clone(), room);
            } else {
                self.send_to(connection, ServerEvent::error("Room not found"));
                return;
            }
        }

        // Anonymous lookups are answered to the requester alone
        let Some(player) = event.user_id().cloned() else {
            if let Some(room) = self.rooms.get(&room_id) {
                self.send_to(connection, room.room_data());
            }
            return;
        };
        if !self.may_act_as(connection, &room_id, &player, &event) {
            self.cleanup(&room_id);
            return;
        }

        let outbound = match self.rooms.get_mut(&room_id) {
            Some(room) => room.apply(event, now),
            None => return,
        };
        let seated = self
            .rooms
            .get(&room_id)
            .is_some_and(|room| room.has_player(&player));
        if seated {
            self.bind(connection, room_id.clone(), player.clone());
        } else {
            self.unbind(connection, &room_id, &player);
        }
        self.deliver(&room_id, outbound, Some((connection, &player)));
        self.cleanup(&room_id);
    }

    /// Whether `connection` may speak for `player` in `room_id`.
    ///
    /// A player's route is claimed by create/join/rejoin and held until the
    /// connection drops. Only a rejoin may move a live route to another
    /// connection; everything else from an unbound connection is dropped.
    fn may_act_as(
        &self,
        connection: ConnectionId,
        room_id: &RoomId,
        player: &PlayerId,
        event: &ClientEvent,
    ) -> bool {
        let claims = matches!(
            event,
            ClientEvent::CreateRoom(_) | ClientEvent::JoinRoom(_) | ClientEvent::RejoinRoom(_)
        );
        match self.routes.get(&(room_id.clone(), player.clone())) {
            Some(owner) if *owner == connection => true,
            Some(_) if matches!(event, ClientEvent::RejoinRoom(_)) => true,
            Some(owner) => {
                warn!(
                    room = %room_id,
                    player = %player,
                    connection = %connection,
                    owner = %owner,
                    event = event.name(),
                    "Refusing event for a player bound to another connection"
                );
                if claims {
                    self.send_to(connection, ServerEvent::error("Player already connected"));
                }
                false
            }
            None if claims => true,
            None => {
                debug!(room = %room_id, player = %player, event = event.name(), "Dropping event from unbound connection");
                false
            }
        }
    }

    /// Transport for `connection` is gone; its players keep their seats
    pub fn disconnect(&mut self, connection: ConnectionId) {
        let Some(entry) = self.connections.remove(&connection) else {
            return;
        };
        for (room_id, player) in entry.bindings {
            let key = (room_id.clone(), player.clone());
            if self.routes.get(&key) != Some(&connection) {
                // The player already reconnected elsewhere
                continue;
            }
            self.routes.remove(&key);
            if let Some(room) = self.rooms.get_mut(&room_id) {
                let outbound = room.disconnect(&player);
                self.deliver(&room_id, outbound, None);
            }
            self.cleanup(&room_id);
        }
        debug!(connection = %connection, "Connection dropped");
    }

    /// Fire expired room countdowns
    pub fn tick(&mut self) {
        let now = self.clock.now();
        let room_ids: Vec<RoomId> = self.rooms.keys().cloned().collect();
        for room_id in room_ids {
            let outbound = match self.rooms.get_mut(&room_id) {
                Some(room) => room.tick(now),
                None => continue,
            };
            if !outbound.is_empty() {
                self.deliver(&room_id, outbound, None);
            }
            self.cleanup(&room_id);
        }
    }

    fn bind(&mut self, connection: ConnectionId, room_id: RoomId, player: PlayerId) {
        let key = (room_id, player);
        if let Some(entry) = self.connections.get_mut(&connection) {
            entry.bindings.insert(key.clone());
        }
        if let Some(previous) = self.routes.insert(key.clone(), connection) {
            if previous != connection {
                info!(room = %key.0, player = %key.1, from = %previous, to = %connection, "Player moved to a new connection");
            }
        } else {
            debug!(room = %key.0, player = %key.1, connection = %connection, "Player routed");
        }
    }

    /// Forget `player` on `connection` once they hold no seat
    fn unbind(&mut self, connection: ConnectionId, room_id: &RoomId, player: &PlayerId) {
        let key = (room_id.clone(), player.clone());
        if let Some(entry) = self.connections.get_mut(&connection) {
            entry.bindings.remove(&key);
        }
        if self.routes.get(&key) == Some(&connection) {
            self.routes.remove(&key);
        }
    }

    /// Route of `player` in `room_id`, if any
    pub fn connection_for(&self, room_id: &RoomId, player: &PlayerId) -> Option<ConnectionId> {
        self.routes.get(&(room_id.clone(), player.clone())).copied()
    }

    fn send_to(&self, connection: ConnectionId, event: ServerEvent) {
        if let Some(entry) = self.connections.get(&connection) {
            if entry.sender.send(event).is_err() {
                debug!(connection = %connection, "Connection writer gone");
            }
        }
    }

    /// Fan events out by route. Direct replies to `origin`'s player fall back
    /// to the requesting connection when the player holds no route, so
    /// rejected joins still hear why (e.g. "Room is full").
    fn deliver(
        &self,
        room_id: &RoomId,
        outbound: Vec<Outbound>,
        origin: Option<(ConnectionId, &PlayerId)>,
    ) {
        let seated = self
            .rooms
            .get(room_id)
            .map(|room| room.player_ids())
            .unwrap_or_default();

        for Outbound { to, event } in outbound {
            let recipients: Vec<PlayerId> = match &to {
                Audience::Only(player) => vec![player.clone()],
                _ => seated.iter().filter(|p| to.includes(p)).cloned().collect(),
            };
            for player in recipients {
                let key = (room_id.clone(), player);
                match (self.routes.get(&key), origin) {
                    (Some(connection), _) => self.send_to(*connection, event.clone()),
                    (None, Some((connection, requester))) if requester == &key.1 => {
                        self.send_to(connection, event.clone())
                    }
                    (None, _) => {}
                }
            }
        }
    }

    /// Drop rooms nobody can come back to
    fn cleanup(&mut self, room_id: &RoomId) {
        let Some(room) = self.rooms.get(room_id) else {
            return;
        };
        let abandoned = room.phase() == RoomPhase::Finished
            && room.player_ids().iter().all(|p| !room.is_connected(p));
        if room.is_empty() || abandoned {
            info!(room = %room_id, "Room closed");
            self.rooms.remove(room_id);
            self.routes.retain(|(room, _), _| room != room_id);
        }
    }
}

pub type SharedHub = Arc<Mutex<RoomHub>>;

// ----------------------------------------------------------------------------
// Room Server
// ----------------------------------------------------------------------------

pub struct RoomServer {
    config: ServerConfig,
    hub: SharedHub,
}

impl RoomServer {
    pub fn new(config: ServerConfig, game: GameConfig) -> Self {
        Self::with_hub(config, RoomHub::new(game))
    }

    pub fn with_hub(config: ServerConfig, hub: RoomHub) -> Self {
        Self {
            config,
            hub: Arc::new(Mutex::new(hub)),
        }
    }

    pub fn hub(&self) -> SharedHub {
        Arc::clone(&self.hub)
    }

    /// Periodic timeout checks for every room
    pub fn spawn_ticker(&self) -> JoinHandle<()> {
        let hub = self.hub();
        let period = self.config.tick_interval;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                hub.lock().await.tick();
            }
        })
    }

    /// Bind the configured address and serve until the listener fails
    pub async fn serve(self) -> anyhow::Result<()> {
        let listener = TcpListener::bind(&self.config.bind)
            .await
            .with_context(|| format!("Failed to bind {}", self.config.bind))?;
        self.run(listener).await
    }

    pub async fn run(self, listener: TcpListener) -> anyhow::Result<()> {
        let address = listener.local_addr().context("Listener has no address")?;
        info!(%address, "Room server listening");
        let ticker = self.spawn_ticker();

        let result = loop {
            let (stream, peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => break Err(anyhow::Error::new(e).context("Accept failed")),
            };
            debug!(%peer, "Incoming connection");
            let hub = self.hub();
            tokio::spawn(async move {
                if let Err(e) = handle_socket(hub, stream).await {
                    warn!(%peer, "Connection ended with error: {:#}", e);
                }
            });
        };

        ticker.abort();
        result
    }

    /// In-process client connection to this server's hub
    pub fn connect_memory(&self) -> MemoryChannel {
        let (channel, mut peer) = MemoryChannel::pair();
        let hub = self.hub();

        tokio::spawn(async move {
            let (tx, mut rx) = mpsc::unbounded_channel();
            let connection = hub.lock().await.connect(tx);
            if peer.inbound.send(ChannelMessage::Connected).is_err() {
                hub.lock().await.disconnect(connection);
                return;
            }

            loop {
                tokio::select! {
                    event = peer.outbound.recv() => match event {
                        Some(event) => hub.lock().await.handle(connection, event),
                        None => break,
                    },
                    event = rx.recv() => match event {
                        Some(event) => {
                            if peer.inbound.send(ChannelMessage::Event(event)).is_err() {
                                break;
                            }
                        }
                        None => break,
                    },
                }
            }
            hub.lock().await.disconnect(connection);
        });

        channel
    }
}

async fn handle_socket(hub: SharedHub, stream: TcpStream) -> anyhow::Result<()> {
    let socket = accept_async(stream).await.context("WebSocket handshake failed")?;
    let (mut write, mut read) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let connection = hub.lock().await.connect(tx.clone());

    let result: anyhow::Result<()> = loop {
        tokio::select! {
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => match decode::<ClientEvent>(&text) {
                    Ok(event) => hub.lock().await.handle(connection, event),
                    Err(e) => {
                        debug!(connection = %connection, "Rejected frame: {}", e);
                        let _ = tx.send(ServerEvent::error(e.to_string()));
                    }
                },
                Some(Ok(Message::Close(_))) | None => break Ok(()),
                Some(Ok(_)) => {}
                Some(Err(e)) => break Err(anyhow::Error::new(e)),
            },
            event = rx.recv() => {
                let Some(event) = event else { break Ok(()) };
                let frame = encode(&event)?;
                if let Err(e) = write.send(Message::Text(frame)).await {
                    break Err(anyhow::Error::new(e));
                }
            }
        }
    };

    hub.lock().await.disconnect(connection);
    result
}
