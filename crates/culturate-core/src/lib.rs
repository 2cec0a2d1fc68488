//! Culturate Core
//!
//! Transport-free domain logic for the Culturate geography quiz: identifiers and
//! health, challenges, the shared scoring rule, match history, the realtime wire
//! protocol, and the state machines that drive a match. The multiplayer client
//! projection and the AI match are pure reducers; the room arbiter is the
//! authoritative server-side state. Nothing in this crate performs I/O or reads
//! a clock on its own.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod ai;
pub mod challenge;
pub mod config;
pub mod countdown;
pub mod errors;
pub mod history;
pub mod protocol;
pub mod room;
pub mod scoring;
pub mod session;
pub mod stream;
pub mod types;
pub mod versus;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use ai::{AiEffect, AiInput, AiMatchState, AiNotice, AiPhase, AiRoundResult, AiTransition, SummaryState};
pub use challenge::{Challenge, CulturalData, Media, MediaKind};
pub use config::{ChannelConfig, EndpointConfig, GameConfig};
pub use countdown::{Countdown, TimerKind, Timers};
pub use errors::{CulturateError, CulturateResult, JudgeError, Result, StreamError};
pub use history::{HistoryError, MatchHistory, RecapStats, RoundRecord, SummaryEntry};
pub use protocol::{ClientEvent, GameSnapshot, RoomPhase, RoundStatus, ServerEvent};
pub use room::{Audience, ChallengeDeck, ChallengeSource, Outbound, Room};
pub use scoring::{decide_by_health, decide_outcome, score_round, MatchOutcome, RoundDelta};
pub use session::{MemorySessionStore, Session, SessionStore};
pub use stream::{SseDecoder, StreamMessage};
pub use types::{Health, PlayerId, RegionId, RegionPick, RoomId, SystemTimeSource, TimeSource, Timestamp};
pub use versus::{
    ChannelSignal, ConnectionStatus, Effect, Notice, PlayerCommand, RoundPhase, RoundView,
    Transition, VersusInput, VersusState,
};
