//! Culturate Runtime
//!
//! Async plumbing around the `culturate-core` state machines:
//! - `RealtimeChannel`: WebSocket connection to the room server, auto-reconnecting
//! - `ChallengeFeed`: server-sent event stream of AI match challenges
//! - `Judge` / `Summarizer`: HTTP clients for the AI services
//! - Engine tasks that drive the reducers with tokio timers
//! - `RoomServer`: WebSocket host for authoritative rooms
//!
//! The core decides; this crate only moves bytes, keeps time and reports back.

pub mod builder;
pub mod channel;
pub mod remote;
pub mod server;
pub mod storage;
pub mod stream;
pub mod tasks;

pub use builder::RuntimeBuilder;
pub use channel::{ChannelMessage, MemoryChannel, MemoryPeer, RealtimeChannel, WebSocketChannel};
pub use remote::{HttpJudge, HttpSummarizer, Judge, Summarizer};
pub use server::{ConnectionId, RoomHub, RoomServer, ServerConfig, SharedHub, TokioClock};
pub use storage::FileSessionStore;
pub use stream::{ChallengeFeed, HttpChallengeFeed, ScriptedFeed};
pub use tasks::{AiCommand, EngineUpdate, MatchHandle, TimerSet};

// Re-export core types for convenience
pub use culturate_core::{
    AiMatchState, AiNotice, AiPhase, CulturateError, CulturateResult, GameConfig, Notice,
    PlayerCommand, Session, SessionStore, VersusState,
};
