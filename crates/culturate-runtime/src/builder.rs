//! Runtime Builder API
//!
//! Front ends (CLI, tests) configure a builder once and use it to spawn match
//! tasks, getting back a `MatchHandle` for commands and updates.

use crate::channel::{RealtimeChannel, WebSocketChannel};
use crate::remote::{HttpJudge, HttpSummarizer, Judge, Summarizer};
use crate::stream::{ChallengeFeed, HttpChallengeFeed};
use crate::tasks::{AiCommand, AiTask, MatchHandle, VersusTask};
use culturate_core::{
    AiMatchState, ChannelConfig, CulturateResult, EndpointConfig, GameConfig, PlayerCommand,
    Session, SessionStore, VersusState,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

#[derive(Debug, Clone, Default)]
pub struct RuntimeBuilder {
    game: GameConfig,
    channels: ChannelConfig,
    endpoints: EndpointConfig,
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Short timings and small buffers for tests
    pub fn testing() -> Self {
        Self {
            game: GameConfig::testing(),
            channels: ChannelConfig::testing(),
            endpoints: EndpointConfig::default(),
        }
    }

    pub fn with_game_config(mut self, game: GameConfig) -> Self {
        self.game = game;
        self
    }

    pub fn with_channel_config(mut self, channels: ChannelConfig) -> Self {
        self.channels = channels;
        self
    }

    pub fn with_endpoints(mut self, endpoints: EndpointConfig) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn game_config(&self) -> &GameConfig {
        &self.game
    }

    pub fn endpoints(&self) -> &EndpointConfig {
        &self.endpoints
    }

    // ------------------------------------------------------------------------
    // Multiplayer
    // ------------------------------------------------------------------------

    /// Spawn a multiplayer match over an existing channel
    pub fn spawn_versus(
        &self,
        session: Session,
        channel: Box<dyn RealtimeChannel>,
        store: Arc<dyn SessionStore>,
    ) -> CulturateResult<MatchHandle<PlayerCommand>> {
        self.game.validate()?;
        info!(room = %session.room_id, player = %session.player_id, "Spawning multiplayer match");

        let (command_tx, command_rx) = mpsc::channel(self.channels.command_buffer_size);
        let (update_tx, update_rx) = mpsc::channel(self.channels.update_buffer_size);
        let state = VersusState::new(session, self.game.clone());
        let task = VersusTask::new(state, channel, store, command_rx, update_tx);
        Ok(MatchHandle::new(command_tx, update_rx, tokio::spawn(task.run())))
    }

    /// Spawn a multiplayer match against the configured room server
    pub fn connect_versus(
        &self,
        session: Session,
        store: Arc<dyn SessionStore>,
    ) -> CulturateResult<MatchHandle<PlayerCommand>> {
        let channel = WebSocketChannel::connect(&self.endpoints.realtime_url, self.channels.clone())?;
        self.spawn_versus(session, Box::new(channel), store)
    }

    // ------------------------------------------------------------------------
    // AI Match
    // ------------------------------------------------------------------------

    pub fn spawn_ai(
        &self,
        feed: Arc<dyn ChallengeFeed>,
        judge: Arc<dyn Judge>,
        summarizer: Arc<dyn Summarizer>,
    ) -> CulturateResult<MatchHandle<AiCommand>> {
        self.game.validate()?;
        info!("Spawning AI match");

        let (command_tx, command_rx) = mpsc::channel(self.channels.command_buffer_size);
        let (update_tx, update_rx) = mpsc::channel(self.channels.update_buffer_size);
        let state = AiMatchState::new(self.game.clone());
        let task = AiTask::new(state, feed, judge, summarizer, command_rx, update_tx);
        Ok(MatchHandle::new(command_tx, update_rx, tokio::spawn(task.run())))
    }

    /// Spawn an AI match against the configured HTTP services
    pub fn connect_ai(&self) -> CulturateResult<MatchHandle<AiCommand>> {
        let feed = HttpChallengeFeed::new(&self.endpoints.stream_url, self.channels.event_buffer_size);
        let judge = HttpJudge::new(&self.endpoints.judge_url);
        let summarizer = HttpSummarizer::new(&self.endpoints.summary_url);
        self.spawn_ai(Arc::new(feed), Arc::new(judge), Arc::new(summarizer))
    }
}
