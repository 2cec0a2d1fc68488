//! Realtime wire protocol
//!
//! Room and round events exchanged over the realtime channel. Every frame is a
//! JSON object `{"event": <name>, "data": <payload>}` with camelCase fields, so
//! event names line up one to one with the server's named events.

use crate::challenge::CulturalData;
use crate::errors::{CulturateError, Result};
use crate::types::{Health, PlayerId, RegionId, RegionPick, RoomId};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ----------------------------------------------------------------------------
// Shared Payloads
// ----------------------------------------------------------------------------

/// `{roomId, userId}`: used by every room-scoped client request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomRequest {
    pub room_id: RoomId,
    pub user_id: PlayerId,
}

impl RoomRequest {
    pub fn new(room_id: RoomId, user_id: PlayerId) -> Self {
        Self { room_id, user_id }
    }
}

/// `{roomId, userId, round}`: skip the rest of one round's result display
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundContinue {
    pub room_id: RoomId,
    pub user_id: PlayerId,
    /// Round whose results are showing; 0 from clients that do not number rounds
    #[serde(default)]
    pub round: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomRef {
    pub room_id: RoomId,
}

/// `{province, userId, roomId}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvinceMove {
    pub province: RegionPick,
    pub user_id: PlayerId,
    pub room_id: RoomId,
}

/// `{roomId, userId, health}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Membership {
    pub room_id: RoomId,
    pub user_id: PlayerId,
    pub health: Health,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerEntry {
    pub user_id: PlayerId,
    #[serde(default)]
    pub health: Option<Health>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomData {
    pub room_id: RoomId,
    pub players: BTreeMap<PlayerId, PlayerEntry>,
    pub player_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerHealth {
    pub user_id: PlayerId,
    pub health: Health,
}

/// One player's graded answer inside `showResults`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerResult {
    pub user_id: PlayerId,
    /// `None` when the player gave no answer before resolution
    #[serde(default)]
    pub province: Option<RegionPick>,
    pub is_correct: bool,
    pub health: Health,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundResults {
    /// Round being resolved; 0 from servers that do not number rounds
    #[serde(default)]
    pub round: u32,
    pub results: Vec<PlayerResult>,
    pub correct_answer: RegionId,
    #[serde(default)]
    pub cultural_data: Option<CulturalData>,
}

impl RoundResults {
    pub fn result_for(&self, player: &PlayerId) -> Option<&PlayerResult> {
        self.results.iter().find(|r| &r.user_id == player)
    }

    pub fn result_against(&self, player: &PlayerId) -> Option<&PlayerResult> {
        self.results.iter().find(|r| &r.user_id != player)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NextRound {
    pub round_message: String,
    pub players: Vec<PlayerHealth>,
    #[serde(default)]
    pub round: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameOver {
    /// `None` is a draw
    pub winner: Option<PlayerId>,
    pub players: Vec<PlayerHealth>,
}

/// Lifecycle of a room as held by the authoritative server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomPhase {
    WaitingForPlayers,
    ReadyCheck,
    InProgress,
    Finished,
}

impl fmt::Display for RoomPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoomPhase::WaitingForPlayers => write!(f, "waiting_for_players"),
            RoomPhase::ReadyCheck => write!(f, "ready_check"),
            RoomPhase::InProgress => write!(f, "in_progress"),
            RoomPhase::Finished => write!(f, "finished"),
        }
    }
}

/// Authoritative round lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundStatus {
    Open,
    AwaitingOpponent,
    Resolved,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundSnapshot {
    pub index: u32,
    pub status: RoundStatus,
    pub challenge: Option<CulturalData>,
    /// Players that already submitted, without their answers
    pub submitted: Vec<PlayerId>,
    /// The requesting player's own submission, if any
    pub own_submission: Option<RegionPick>,
    pub results: Option<RoundResults>,
}

/// Reply to `requestGameState`: everything a refreshed client needs to resume
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSnapshot {
    pub room_id: RoomId,
    pub phase: RoomPhase,
    pub players: Vec<PlayerHealth>,
    pub ready_players: Vec<PlayerId>,
    pub round: Option<RoundSnapshot>,
    pub game_over: Option<GameOver>,
}

// ----------------------------------------------------------------------------
// ClientEvent: client → server
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientEvent {
    CreateRoom(RoomRequest),
    JoinRoom(RoomRequest),
    RejoinRoom(RoomRequest),
    RequestRoomData(RoomRef),
    PlayerReady(RoomRequest),
    PlayerUnready(RoomRequest),
    /// Advisory preview of the current pick
    SelectProvince(ProvinceMove),
    SubmitProvince(ProvinceMove),
    RequestGameState(RoomRequest),
    ContinueRound(RoundContinue),
    LeaveRoom(RoomRequest),
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::CreateRoom(_) => "createRoom",
            ClientEvent::JoinRoom(_) => "joinRoom",
            ClientEvent::RejoinRoom(_) => "rejoinRoom",
            ClientEvent::RequestRoomData(_) => "requestRoomData",
            ClientEvent::PlayerReady(_) => "playerReady",
            ClientEvent::PlayerUnready(_) => "playerUnready",
            ClientEvent::SelectProvince(_) => "selectProvince",
            ClientEvent::SubmitProvince(_) => "submitProvince",
            ClientEvent::RequestGameState(_) => "requestGameState",
            ClientEvent::ContinueRound(_) => "continueRound",
            ClientEvent::LeaveRoom(_) => "leaveRoom",
        }
    }

    pub fn room_id(&self) -> &RoomId {
        match self {
            ClientEvent::CreateRoom(r)
            | ClientEvent::JoinRoom(r)
            | ClientEvent::RejoinRoom(r)
            | ClientEvent::PlayerReady(r)
            | ClientEvent::PlayerUnready(r)
            | ClientEvent::RequestGameState(r)
            | ClientEvent::LeaveRoom(r) => &r.room_id,
            ClientEvent::ContinueRound(c) => &c.room_id,
            ClientEvent::RequestRoomData(r) => &r.room_id,
            ClientEvent::SelectProvince(m) | ClientEvent::SubmitProvince(m) => &m.room_id,
        }
    }

    /// Sender named in the payload; `requestRoomData` is anonymous
    pub fn user_id(&self) -> Option<&PlayerId> {
        match self {
            ClientEvent::CreateRoom(r)
            | ClientEvent::JoinRoom(r)
            | ClientEvent::RejoinRoom(r)
            | ClientEvent::PlayerReady(r)
            | ClientEvent::PlayerUnready(r)
            | ClientEvent::RequestGameState(r)
            | ClientEvent::LeaveRoom(r) => Some(&r.user_id),
            ClientEvent::ContinueRound(c) => Some(&c.user_id),
            ClientEvent::RequestRoomData(_) => None,
            ClientEvent::SelectProvince(m) | ClientEvent::SubmitProvince(m) => Some(&m.user_id),
        }
    }
}

// ----------------------------------------------------------------------------
// ServerEvent: server → client
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    RoomCreated(Membership),
    JoinedRoom(Membership),
    RoomRejoined(Membership),
    RoomData(RoomData),
    #[serde(rename_all = "camelCase")]
    PlayerLeft { user_id: PlayerId },
    #[serde(rename_all = "camelCase")]
    ReadyStateUpdate {
        ready_players: Vec<PlayerId>,
        total_players: usize,
    },
    #[serde(rename_all = "camelCase")]
    GameStarted { room_id: RoomId },
    RoundStarted { round: u32, challenge: CulturalData },
    #[serde(rename_all = "camelCase")]
    ProvinceSelected { province: RegionPick, user_id: PlayerId },
    /// The opponent's answer is withheld until `showResults`
    #[serde(rename_all = "camelCase")]
    OpponentSubmitted {
        user_id: PlayerId,
        #[serde(default)]
        province: Option<RegionPick>,
    },
    BothPlayersSubmitted { message: String },
    ShowResults(RoundResults),
    NextRound(NextRound),
    GameOver(GameOver),
    GameState(GameSnapshot),
    Error { message: String },
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::RoomCreated(_) => "roomCreated",
            ServerEvent::JoinedRoom(_) => "joinedRoom",
            ServerEvent::RoomRejoined(_) => "roomRejoined",
            ServerEvent::RoomData(_) => "roomData",
            ServerEvent::PlayerLeft { .. } => "playerLeft",
            ServerEvent::ReadyStateUpdate { .. } => "readyStateUpdate",
            ServerEvent::GameStarted { .. } => "gameStarted",
            ServerEvent::RoundStarted { .. } => "roundStarted",
            ServerEvent::ProvinceSelected { .. } => "provinceSelected",
            ServerEvent::OpponentSubmitted { .. } => "opponentSubmitted",
            ServerEvent::BothPlayersSubmitted { .. } => "bothPlayersSubmitted",
            ServerEvent::ShowResults(_) => "showResults",
            ServerEvent::NextRound(_) => "nextRound",
            ServerEvent::GameOver(_) => "gameOver",
            ServerEvent::GameState(_) => "gameState",
            ServerEvent::Error { .. } => "error",
        }
    }

    pub fn error<T: Into<String>>(message: T) -> Self {
        ServerEvent::Error {
            message: message.into(),
        }
    }
}

// ----------------------------------------------------------------------------
// Framing
// ----------------------------------------------------------------------------

/// Serialize an event into a text frame
pub fn encode<T: Serialize>(event: &T) -> Result<String> {
    Ok(serde_json::to_string(event)?)
}

/// Parse a text frame; malformed frames are protocol errors
pub fn decode<T: DeserializeOwned>(frame: &str) -> Result<T> {
    serde_json::from_str(frame)
        .map_err(|e| CulturateError::protocol(format!("Malformed frame: {}", e)))
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
