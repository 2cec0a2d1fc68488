//! Multiplayer Round Engine: client projection
//!
//! The authoritative room lives on the server (see [`crate::room`]). This
//! module is the client's view of it: a reducer consuming player commands,
//! server events, channel signals and timer expiries, producing the next state
//! plus the effects the runtime must carry out.
//!
//! Any server event may arrive late or twice. Every handler checks the current
//! phase before mutating, and the round index only moves forward when the
//! server says so (`nextRound`), never because of a local submission or timer.

use crate::challenge::CulturalData;
use crate::config::GameConfig;
use crate::countdown::TimerKind;
use crate::history::{MatchHistory, RoundRecord};
use crate::protocol::{
    ClientEvent, GameOver, GameSnapshot, Membership, NextRound, PlayerHealth, ProvinceMove,
    RoomData, RoomPhase, RoomRequest, RoundContinue, RoundResults, RoundSnapshot, RoundStatus,
    ServerEvent,
};
use crate::scoring::MatchOutcome;
use crate::session::Session;
use crate::types::{Health, PlayerId, RegionId, RegionPick, RoomId, SystemTimeSource, TimeSource};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

// ----------------------------------------------------------------------------
// Inputs
// ----------------------------------------------------------------------------

/// Actions taken by the local player
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerCommand {
    Ready,
    Unready,
    /// Point at a region (advisory; also becomes the pending answer)
    Select(RegionPick),
    /// Lock in the current selection
    Submit,
    /// Skip the rest of the result display
    Continue,
    Leave,
}

/// Connection lifecycle reported by the realtime channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelSignal {
    Connected,
    Disconnected { reason: String },
    Error { message: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum VersusInput {
    Command(PlayerCommand),
    Server(ServerEvent),
    Channel(ChannelSignal),
    TimerExpired(TimerKind),
}

// ----------------------------------------------------------------------------
// Outputs
// ----------------------------------------------------------------------------

/// User-facing notifications
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    Joined { room_id: RoomId },
    OpponentLeft { player: PlayerId },
    OpponentSelecting { province: RegionPick },
    GameStarted,
    RoundStarted { round: u32 },
    WaitingForOpponent,
    OpponentSubmitted,
    BothSubmitted { message: String },
    RoundResolved {
        round: u32,
        correct_answer: RegionId,
        player_correct: bool,
        opponent_correct: bool,
    },
    GameOver { outcome: MatchOutcome },
    /// Transient banner; the engine keeps its state and waits for reconnect
    ConnectionLost { reason: String },
    Reconnected,
    ChannelError { message: String },
    ServerError { message: String, attempt: u32 },
    /// Retries exhausted; manual action required
    Fatal { message: String },
}

/// Work the runtime performs on behalf of the reducer
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Send(ClientEvent),
    StartTimer { kind: TimerKind, duration: Duration },
    CancelTimer(TimerKind),
    CancelAllTimers,
    PersistSession,
    ClearSession,
    Notify(Notice),
    CloseChannel,
}

/// Result of one reducer step
#[derive(Debug)]
pub struct Transition {
    pub state: VersusState,
    pub effects: Vec<Effect>,
}

// ----------------------------------------------------------------------------
// Round Projection
// ----------------------------------------------------------------------------

/// Local view of the current round's progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoundPhase {
    /// Nobody has submitted
    Open,
    /// The opponent submitted; we have not
    OpponentLocked,
    /// We submitted; the opponent has not
    AwaitingOpponent,
    /// Both submitted; waiting for the server's result
    Sealed,
    Resolved,
}

impl RoundPhase {
    pub fn accepts_submission(&self) -> bool {
        matches!(self, RoundPhase::Open | RoundPhase::OpponentLocked)
    }

    fn from_snapshot(status: RoundStatus, mine: bool, theirs: bool) -> Self {
        match (status, mine, theirs) {
            (RoundStatus::Resolved, _, _) => RoundPhase::Resolved,
            (_, false, false) => RoundPhase::Open,
            (_, false, true) => RoundPhase::OpponentLocked,
            (_, true, false) => RoundPhase::AwaitingOpponent,
            (_, true, true) => RoundPhase::Sealed,
        }
    }
}

impl fmt::Display for RoundPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RoundPhase::Open => "open",
            RoundPhase::OpponentLocked => "opponent_locked",
            RoundPhase::AwaitingOpponent => "awaiting_opponent",
            RoundPhase::Sealed => "sealed",
            RoundPhase::Resolved => "resolved",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoundView {
    pub index: u32,
    pub phase: RoundPhase,
    pub challenge: Option<CulturalData>,
    pub selection: Option<RegionPick>,
    pub submission: Option<RegionPick>,
    pub opponent_preview: Option<RegionPick>,
    pub results: Option<RoundResults>,
}

impl RoundView {
    fn new(index: u32) -> Self {
        Self {
            index,
            phase: RoundPhase::Open,
            challenge: None,
            selection: None,
            submission: None,
            opponent_preview: None,
            results: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Reconnecting,
}

// ----------------------------------------------------------------------------
// State
// ----------------------------------------------------------------------------

#[derive(Clone)]
pub struct VersusState {
    config: GameConfig,
    session: Session,
    clock: Arc<dyn TimeSource>,
    phase: RoomPhase,
    players: BTreeMap<PlayerId, Health>,
    ready: BTreeSet<PlayerId>,
    total_players: usize,
    round: Option<RoundView>,
    /// Challenge that arrived before its round was opened locally
    pending_challenge: Option<(u32, CulturalData)>,
    history: MatchHistory,
    outcome: Option<MatchOutcome>,
    connection: ConnectionStatus,
    joined: bool,
    protocol_retries: u32,
    /// The current attempt already had its server error counted
    attempt_refused: bool,
    failed: bool,
    left: bool,
}

impl fmt::Debug for VersusState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VersusState")
            .field("session", &self.session)
            .field("phase", &self.phase)
            .field("players", &self.players)
            .field("ready", &self.ready)
            .field("round", &self.round)
            .field("history", &self.history.len())
            .field("connection", &self.connection)
            .field("protocol_retries", &self.protocol_retries)
            .field("failed", &self.failed)
            .field("left", &self.left)
            .finish()
    }
}

impl VersusState {
    pub fn new(session: Session, config: GameConfig) -> Self {
        let mut players = BTreeMap::new();
        players.insert(session.player_id.clone(), config.starting_health());
        Self {
            config,
            session,
            clock: Arc::new(SystemTimeSource),
            phase: RoomPhase::WaitingForPlayers,
            players,
            ready: BTreeSet::new(),
            total_players: 1,
            round: None,
            pending_challenge: None,
            history: MatchHistory::new(),
            outcome: None,
            connection: ConnectionStatus::Connecting,
            joined: false,
            protocol_retries: 0,
            attempt_refused: false,
            failed: false,
            left: false,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn TimeSource>) -> Self {
        self.clock = clock;
        self
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn player_id(&self) -> &PlayerId {
        &self.session.player_id
    }

    pub fn phase(&self) -> RoomPhase {
        self.phase
    }

    pub fn round(&self) -> Option<&RoundView> {
        self.round.as_ref()
    }

    pub fn round_phase(&self) -> Option<RoundPhase> {
        self.round.as_ref().map(|r| r.phase)
    }

    pub fn history(&self) -> &MatchHistory {
        &self.history
    }

    pub fn outcome(&self) -> Option<&MatchOutcome> {
        self.outcome.as_ref()
    }

    pub fn players(&self) -> &BTreeMap<PlayerId, Health> {
        &self.players
    }

    pub fn opponent_id(&self) -> Option<&PlayerId> {
        self.players.keys().find(|id| *id != &self.session.player_id)
    }

    pub fn own_health(&self) -> Health {
        self.players
            .get(&self.session.player_id)
            .copied()
            .unwrap_or_else(|| self.config.starting_health())
    }

    pub fn opponent_health(&self) -> Option<Health> {
        self.opponent_id().and_then(|id| self.players.get(id)).copied()
    }

    pub fn ready_players(&self) -> &BTreeSet<PlayerId> {
        &self.ready
    }

    pub fn total_players(&self) -> usize {
        self.total_players
    }

    pub fn is_ready(&self) -> bool {
        self.ready.contains(&self.session.player_id)
    }

    /// Everyone present is ready and the room is full
    pub fn all_ready(&self) -> bool {
        self.total_players >= 2 && self.ready.len() == self.total_players
    }

    pub fn connection(&self) -> ConnectionStatus {
        self.connection
    }

    pub fn protocol_retries(&self) -> u32 {
        self.protocol_retries
    }

    pub fn is_failed(&self) -> bool {
        self.failed
    }

    pub fn has_left(&self) -> bool {
        self.left
    }

    // ------------------------------------------------------------------------
    // Reducer
    // ------------------------------------------------------------------------

    /// Consume one input and produce the next state
    pub fn step(mut self, input: VersusInput) -> Transition {
        let mut effects = Vec::new();

        if self.left {
            debug!("Ignoring input after leaving the room");
            return Transition {
                state: self,
                effects,
            };
        }

        match input {
            VersusInput::Command(command) => self.on_command(command, &mut effects),
            VersusInput::Server(event) => self.on_server_event(event, &mut effects),
            VersusInput::Channel(signal) => self.on_channel(signal, &mut effects),
            VersusInput::TimerExpired(kind) => self.on_timer(kind, &mut effects),
        }

        Transition {
            state: self,
            effects,
        }
    }

    fn request(&self) -> RoomRequest {
        RoomRequest::new(self.session.room_id.clone(), self.session.player_id.clone())
    }

    fn province_move(&self, province: RegionPick) -> ProvinceMove {
        ProvinceMove {
            province,
            user_id: self.session.player_id.clone(),
            room_id: self.session.room_id.clone(),
        }
    }

    fn is_other_room(&self, room_id: &RoomId) -> bool {
        if room_id != &self.session.room_id {
            debug!(room = %room_id, "Ignoring event for another room");
            return true;
        }
        false
    }

    /// First contact creates or joins; later contacts rejoin
    fn membership_event(&self) -> ClientEvent {
        let request = self.request();
        if self.joined {
            ClientEvent::RejoinRoom(request)
        } else if self.session.created {
            ClientEvent::CreateRoom(request)
        } else {
            ClientEvent::JoinRoom(request)
        }
    }

    // ------------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------------

    fn on_command(&mut self, command: PlayerCommand, effects: &mut Vec<Effect>) {
        match command {
            PlayerCommand::Ready => {
                if self.accepts_ready_toggle() && !self.is_ready() {
                    effects.push(Effect::Send(ClientEvent::PlayerReady(self.request())));
                }
            }
            PlayerCommand::Unready => {
                if self.accepts_ready_toggle() && self.is_ready() {
                    effects.push(Effect::Send(ClientEvent::PlayerUnready(self.request())));
                }
            }
            PlayerCommand::Select(pick) => {
                let Some(round) = self.round.as_mut() else {
                    return;
                };
                if !round.phase.accepts_submission() {
                    debug!(phase = %round.phase, "Ignoring selection outside open round");
                    return;
                }
                round.selection = Some(pick.clone());
                effects.push(Effect::Send(ClientEvent::SelectProvince(
                    self.province_move(pick),
                )));
            }
            PlayerCommand::Submit => self.submit(effects),
            PlayerCommand::Continue => self.continue_round(effects),
            PlayerCommand::Leave => self.leave(effects),
        }
    }

    fn accepts_ready_toggle(&self) -> bool {
        !self.failed
            && matches!(
                self.phase,
                RoomPhase::WaitingForPlayers | RoomPhase::ReadyCheck
            )
    }

    fn submit(&mut self, effects: &mut Vec<Effect>) {
        if self.phase != RoomPhase::InProgress {
            return;
        }
        let Some(round) = self.round.as_mut() else {
            return;
        };
        if !round.phase.accepts_submission() {
            debug!(round = round.index, phase = %round.phase, "Ignoring duplicate submission");
            return;
        }
        let Some(pick) = round.selection.clone() else {
            debug!(round = round.index, "Ignoring submission without a selection");
            return;
        };

        round.submission = Some(pick.clone());
        round.phase = match round.phase {
            RoundPhase::OpponentLocked => RoundPhase::Sealed,
            _ => RoundPhase::AwaitingOpponent,
        };
        debug!(round = round.index, phase = %round.phase, "Submitted answer");

        let waiting = round.phase == RoundPhase::AwaitingOpponent;
        effects.push(Effect::Send(ClientEvent::SubmitProvince(
            self.province_move(pick),
        )));
        if waiting {
            effects.push(Effect::Notify(Notice::WaitingForOpponent));
        }
    }

    fn continue_round(&self, effects: &mut Vec<Effect>) {
        if self.phase != RoomPhase::InProgress {
            return;
        }
        let Some(round) = self.round.as_ref().filter(|r| r.phase == RoundPhase::Resolved) else {
            return;
        };
        effects.push(Effect::Send(ClientEvent::ContinueRound(RoundContinue {
            room_id: self.session.room_id.clone(),
            user_id: self.session.player_id.clone(),
            round: round.index,
        })));
    }

    fn leave(&mut self, effects: &mut Vec<Effect>) {
        info!(room = %self.session.room_id, "Leaving room");
        self.left = true;
        effects.push(Effect::Send(ClientEvent::LeaveRoom(self.request())));
        effects.push(Effect::CancelAllTimers);
        effects.push(Effect::ClearSession);
        effects.push(Effect::CloseChannel);
    }

    // ------------------------------------------------------------------------
    // Channel
    // ------------------------------------------------------------------------

    fn on_channel(&mut self, signal: ChannelSignal, effects: &mut Vec<Effect>) {
        match signal {
            ChannelSignal::Connected => {
                if self.connection == ConnectionStatus::Reconnecting {
                    effects.push(Effect::Notify(Notice::Reconnected));
                }
                self.connection = ConnectionStatus::Connected;
                effects.push(Effect::StartTimer {
                    kind: TimerKind::Rejoin,
                    duration: self.config.rejoin_delay,
                });
            }
            ChannelSignal::Disconnected { reason } => {
                warn!("Realtime channel disconnected: {}", reason);
                self.connection = ConnectionStatus::Reconnecting;
                effects.push(Effect::CancelTimer(TimerKind::Rejoin));
                effects.push(Effect::Notify(Notice::ConnectionLost { reason }));
            }
            ChannelSignal::Error { message } => {
                warn!("Realtime channel error: {}", message);
                effects.push(Effect::Notify(Notice::ChannelError { message }));
            }
        }
    }

    // ------------------------------------------------------------------------
    // Timers
    // ------------------------------------------------------------------------

    fn on_timer(&mut self, kind: TimerKind, effects: &mut Vec<Effect>) {
        match kind {
            TimerKind::Rejoin => {
                if self.connection != ConnectionStatus::Connected || self.failed {
                    return;
                }
                self.attempt_refused = false;
                effects.push(Effect::Send(self.membership_event()));
                effects.push(Effect::Send(ClientEvent::RequestGameState(self.request())));
            }
            TimerKind::AnswerWindow => {
                if self.phase == RoomPhase::InProgress
                    && self.round_phase().is_some_and(|p| p != RoundPhase::Resolved)
                {
                    debug!("Answer window elapsed, asking server for round state");
                    effects.push(Effect::Send(ClientEvent::RequestGameState(self.request())));
                }
            }
            TimerKind::ResyncFallback => {
                if self.round.as_ref().is_some_and(|r| r.challenge.is_none()) {
                    debug!("No challenge received, requesting game state");
                    effects.push(Effect::Send(ClientEvent::RequestGameState(self.request())));
                }
            }
            TimerKind::ResultDisplay => self.continue_round(effects),
            TimerKind::GameOverRedirect => {
                if self.phase == RoomPhase::Finished {
                    self.leave(effects);
                }
            }
            TimerKind::InitialLoading | TimerKind::Display | TimerKind::InterLoading => {}
        }
    }

    // ------------------------------------------------------------------------
    // Server Events
    // ------------------------------------------------------------------------

    fn on_server_event(&mut self, event: ServerEvent, effects: &mut Vec<Effect>) {
        debug!(event = event.name(), "Server event");
        match event {
            ServerEvent::RoomCreated(m) | ServerEvent::JoinedRoom(m) | ServerEvent::RoomRejoined(m) => {
                self.on_membership(m, effects)
            }
            ServerEvent::RoomData(data) => self.on_room_data(data),
            ServerEvent::PlayerLeft { user_id } => {
                if user_id == self.session.player_id {
                    return;
                }
                self.players.remove(&user_id);
                self.ready.remove(&user_id);
                self.total_players = self.players.len();
                if matches!(self.phase, RoomPhase::ReadyCheck) {
                    self.phase = RoomPhase::WaitingForPlayers;
                }
                effects.push(Effect::Notify(Notice::OpponentLeft { player: user_id }));
            }
            ServerEvent::ReadyStateUpdate {
                ready_players,
                total_players,
            } => {
                if !matches!(
                    self.phase,
                    RoomPhase::WaitingForPlayers | RoomPhase::ReadyCheck
                ) {
                    return;
                }
                self.ready = ready_players.into_iter().collect();
                self.total_players = total_players;
                self.phase = if total_players >= 2 {
                    RoomPhase::ReadyCheck
                } else {
                    RoomPhase::WaitingForPlayers
                };
            }
            ServerEvent::GameStarted { room_id } => {
                if self.is_other_room(&room_id) {
                    return;
                }
                if matches!(self.phase, RoomPhase::InProgress | RoomPhase::Finished) {
                    debug!("Ignoring duplicate gameStarted");
                    return;
                }
                info!(room = %room_id, "Game started");
                self.phase = RoomPhase::InProgress;
                effects.push(Effect::Notify(Notice::GameStarted));
                self.open_round(1, effects);
            }
            ServerEvent::RoundStarted { round, challenge } => self.on_round_started(round, challenge, effects),
            ServerEvent::ProvinceSelected { province, user_id } => {
                if user_id == self.session.player_id {
                    return;
                }
                if let Some(round) = self.round.as_mut() {
                    if round.phase != RoundPhase::Resolved {
                        round.opponent_preview = Some(province.clone());
                        effects.push(Effect::Notify(Notice::OpponentSelecting { province }));
                    }
                }
            }
            ServerEvent::OpponentSubmitted { user_id, .. } => {
                if user_id == self.session.player_id {
                    return;
                }
                let Some(round) = self.round.as_mut() else {
                    return;
                };
                let next = match round.phase {
                    RoundPhase::Open => RoundPhase::OpponentLocked,
                    RoundPhase::AwaitingOpponent => RoundPhase::Sealed,
                    _ => {
                        debug!(phase = %round.phase, "Ignoring duplicate opponentSubmitted");
                        return;
                    }
                };
                round.phase = next;
                effects.push(Effect::Notify(Notice::OpponentSubmitted));
            }
            ServerEvent::BothPlayersSubmitted { message } => {
                if let Some(round) = self.round.as_mut() {
                    if round.phase != RoundPhase::Resolved {
                        round.phase = RoundPhase::Sealed;
                        effects.push(Effect::Notify(Notice::BothSubmitted { message }));
                    }
                }
            }
            ServerEvent::ShowResults(results) => self.on_results(results, effects),
            ServerEvent::NextRound(next) => self.on_next_round(next, effects),
            ServerEvent::GameOver(game_over) => self.on_game_over(game_over, effects),
            ServerEvent::GameState(snapshot) => self.on_snapshot(snapshot, effects),
            ServerEvent::Error { message } => self.on_server_error(message, effects),
        }
    }

    fn on_membership(&mut self, membership: Membership, effects: &mut Vec<Effect>) {
        if self.is_other_room(&membership.room_id) || membership.user_id != self.session.player_id {
            return;
        }
        if !self.joined {
            info!(room = %membership.room_id, "Joined room");
        }
        self.joined = true;
        self.protocol_retries = 0;
        self.attempt_refused = false;
        self.players
            .insert(membership.user_id, membership.health);
        effects.push(Effect::PersistSession);
        effects.push(Effect::Notify(Notice::Joined {
            room_id: membership.room_id,
        }));
    }

    fn on_room_data(&mut self, data: RoomData) {
        if self.is_other_room(&data.room_id) {
            return;
        }
        let starting = self.config.starting_health();
        let previous = std::mem::take(&mut self.players);
        for (id, entry) in data.players {
            let health = entry
                .health
                .or_else(|| previous.get(&id).copied())
                .unwrap_or(starting);
            self.players.insert(id, health);
        }
        self.ready.retain(|id| self.players.contains_key(id));
        self.total_players = data.player_count;

        match self.phase {
            RoomPhase::WaitingForPlayers if data.player_count >= 2 => {
                self.phase = RoomPhase::ReadyCheck
            }
            RoomPhase::ReadyCheck if data.player_count < 2 => {
                self.phase = RoomPhase::WaitingForPlayers
            }
            _ => {}
        }
    }

    fn open_round(&mut self, index: u32, effects: &mut Vec<Effect>) {
        let mut round = RoundView::new(index);
        if let Some((pending_index, challenge)) = self.pending_challenge.take() {
            if pending_index == index {
                round.challenge = Some(challenge);
            } else if pending_index > index {
                self.pending_challenge = Some((pending_index, challenge));
            }
        }
        let has_challenge = round.challenge.is_some();
        self.round = Some(round);
        debug!(round = index, "Round opened");

        effects.push(Effect::CancelTimer(TimerKind::ResultDisplay));
        effects.push(Effect::StartTimer {
            kind: TimerKind::AnswerWindow,
            duration: self.config.answer_window,
        });
        if !has_challenge {
            effects.push(Effect::StartTimer {
                kind: TimerKind::ResyncFallback,
                duration: self.config.resync_fallback,
            });
        }
        effects.push(Effect::Notify(Notice::RoundStarted { round: index }));
    }

    fn on_round_started(&mut self, index: u32, challenge: CulturalData, effects: &mut Vec<Effect>) {
        match self.round.as_mut() {
            Some(round) if round.index == index => {
                if round.challenge.is_none() {
                    round.challenge = Some(challenge);
                    effects.push(Effect::CancelTimer(TimerKind::ResyncFallback));
                }
            }
            Some(round) if round.index > index => {
                debug!(round = index, current = round.index, "Ignoring stale roundStarted");
            }
            _ => {
                debug!(round = index, "Holding challenge for a round not yet opened");
                self.pending_challenge = Some((index, challenge));
            }
        }
    }

    fn on_results(&mut self, results: RoundResults, effects: &mut Vec<Effect>) {
        let Some(round) = self.round.as_ref() else {
            debug!("Ignoring showResults without an active round");
            return;
        };
        if round.phase == RoundPhase::Resolved {
            debug!(round = round.index, "Ignoring duplicate showResults");
            return;
        }
        if results.round != 0 && results.round != round.index {
            debug!(round = results.round, current = round.index, "Ignoring showResults for another round");
            return;
        }
        let index = round.index;
        let challenge = round.challenge.clone();
        let Some((player_correct, opponent_correct)) = self.record_round(index, &results, challenge)
        else {
            return;
        };
        if let Some(round) = self.round.as_mut() {
            round.phase = RoundPhase::Resolved;
            round.results = Some(results.clone());
        }

        debug!(round = index, "Round resolved");
        effects.push(Effect::CancelTimer(TimerKind::AnswerWindow));
        effects.push(Effect::CancelTimer(TimerKind::ResyncFallback));
        effects.push(Effect::StartTimer {
            kind: TimerKind::ResultDisplay,
            duration: self.config.result_display,
        });
        effects.push(Effect::Notify(Notice::RoundResolved {
            round: index,
            correct_answer: results.correct_answer,
            player_correct,
            opponent_correct,
        }));
    }

    /// Apply a resolved round's health and append it to the history.
    /// Returns `(player_correct, opponent_correct)`; `None` when the results
    /// do not name the local player.
    fn record_round(
        &mut self,
        index: u32,
        results: &RoundResults,
        challenge: Option<CulturalData>,
    ) -> Option<(bool, bool)> {
        let me = &self.session.player_id;
        let Some(mine) = results.result_for(me).cloned() else {
            warn!(round = index, "Round results did not include the local player");
            return None;
        };
        let theirs = results.result_against(me).cloned();

        for result in &results.results {
            self.players.insert(result.user_id.clone(), result.health);
        }

        let opponent_correct = theirs.as_ref().is_some_and(|r| r.is_correct);
        let record = RoundRecord {
            round_number: index,
            correct_answer: results.correct_answer.clone(),
            cultural_data: results.cultural_data.clone().or(challenge),
            player_answer: mine.province.map(|p| p.region_id),
            opponent_answer: theirs.as_ref().and_then(|r| r.province.as_ref()).map(|p| p.region_id.clone()),
            player_correct: mine.is_correct,
            opponent_correct,
            player_health_after: mine.health,
            opponent_health_after: theirs.map(|r| r.health).unwrap_or(Health::ZERO),
            recorded_at: self.clock.now(),
        };
        if let Err(e) = self.history.append(record) {
            debug!("Round not recorded: {}", e);
        }
        Some((mine.is_correct, opponent_correct))
    }

    /// A round that resolved while we were away still belongs in the history
    fn record_missed_round(&mut self, snapshot: &RoundSnapshot) {
        if snapshot.status != RoundStatus::Resolved {
            return;
        }
        let Some(results) = snapshot.results.as_ref() else {
            return;
        };
        if self.history.last_round().is_some_and(|last| last >= snapshot.index) {
            return;
        }
        let challenge = snapshot.challenge.clone().or_else(|| {
            self.round
                .as_ref()
                .filter(|r| r.index == snapshot.index)
                .and_then(|r| r.challenge.clone())
        });
        debug!(round = snapshot.index, "Recording round resolved during resync");
        self.record_round(snapshot.index, results, challenge);
    }

    fn on_next_round(&mut self, next: NextRound, effects: &mut Vec<Effect>) {
        if self.phase != RoomPhase::InProgress {
            return;
        }
        let Some(current) = self.round.as_ref() else {
            return;
        };
        if current.phase != RoundPhase::Resolved {
            debug!(round = current.index, "Ignoring nextRound before resolution");
            return;
        }
        let index = current.index + 1;
        if next.round != 0 && next.round != index {
            debug!(round = next.round, expected = index, "Ignoring out-of-order nextRound");
            return;
        }
        self.apply_health(&next.players);
        self.open_round(index, effects);
    }

    fn on_game_over(&mut self, game_over: GameOver, effects: &mut Vec<Effect>) {
        if self.phase == RoomPhase::Finished {
            debug!("Ignoring duplicate gameOver");
            return;
        }
        self.apply_health(&game_over.players);
        let outcome = MatchOutcome {
            winner: game_over.winner,
            final_health: game_over
                .players
                .iter()
                .map(|p| (p.user_id.clone(), p.health))
                .collect(),
        };
        info!(winner = ?outcome.winner, "Game over");
        self.phase = RoomPhase::Finished;
        self.history.freeze();
        self.outcome = Some(outcome.clone());

        effects.push(Effect::CancelAllTimers);
        effects.push(Effect::StartTimer {
            kind: TimerKind::GameOverRedirect,
            duration: self.config.game_over_redirect,
        });
        effects.push(Effect::Notify(Notice::GameOver { outcome }));
    }

    fn on_snapshot(&mut self, snapshot: GameSnapshot, effects: &mut Vec<Effect>) {
        if self.is_other_room(&snapshot.room_id) {
            return;
        }
        effects.push(Effect::CancelTimer(TimerKind::ResyncFallback));

        self.players = snapshot
            .players
            .iter()
            .map(|p| (p.user_id.clone(), p.health))
            .collect();
        self.total_players = self.players.len();
        self.ready = snapshot.ready_players.into_iter().collect();

        if let Some(round) = snapshot.round.as_ref() {
            self.record_missed_round(round);
        }
        if let Some(game_over) = snapshot.game_over {
            self.on_game_over(game_over, effects);
            return;
        }
        if self.phase == RoomPhase::Finished {
            return;
        }
        self.phase = snapshot.phase;

        if let Some(round) = snapshot.round {
            self.apply_round_snapshot(round, effects);
        }
    }

    fn apply_round_snapshot(&mut self, snapshot: RoundSnapshot, effects: &mut Vec<Effect>) {
        let current = self.round.as_ref().map(|r| r.index).unwrap_or(0);
        if snapshot.index < current {
            debug!(round = snapshot.index, current, "Ignoring stale round snapshot");
            return;
        }
        let previous = if snapshot.index == current {
            self.round.take()
        } else {
            None
        };

        let me = &self.session.player_id;
        let theirs = snapshot.submitted.iter().any(|id| id != me);
        let phase = RoundPhase::from_snapshot(snapshot.status, snapshot.own_submission.is_some(), theirs);

        let (challenge, selection, preview) = match previous {
            Some(prev) => (
                snapshot.challenge.or(prev.challenge),
                prev.selection.or_else(|| snapshot.own_submission.clone()),
                prev.opponent_preview,
            ),
            None => (snapshot.challenge, snapshot.own_submission.clone(), None),
        };

        debug!(round = snapshot.index, %phase, "Round restored from snapshot");
        self.round = Some(RoundView {
            index: snapshot.index,
            phase,
            challenge,
            selection,
            submission: snapshot.own_submission,
            opponent_preview: preview,
            results: snapshot.results,
        });

        if phase == RoundPhase::Resolved {
            effects.push(Effect::StartTimer {
                kind: TimerKind::ResultDisplay,
                duration: self.config.result_display,
            });
        } else {
            effects.push(Effect::StartTimer {
                kind: TimerKind::AnswerWindow,
                duration: self.config.answer_window,
            });
        }
    }

    /// One attempt sends several requests; only its first refusal counts
    fn on_server_error(&mut self, message: String, effects: &mut Vec<Effect>) {
        if self.failed {
            return;
        }
        if self.attempt_refused {
            debug!("Server error for an attempt already counted: {}", message);
            return;
        }
        self.attempt_refused = true;
        self.protocol_retries += 1;
        if self.protocol_retries <= self.config.max_protocol_retries {
            warn!(
                attempt = self.protocol_retries,
                "Server error: {}, retrying", message
            );
            effects.push(Effect::Notify(Notice::ServerError {
                message,
                attempt: self.protocol_retries,
            }));
            effects.push(Effect::StartTimer {
                kind: TimerKind::Rejoin,
                duration: self.config.rejoin_delay,
            });
        } else {
            warn!("Server error: {}, giving up", message);
            self.failed = true;
            effects.push(Effect::CancelTimer(TimerKind::Rejoin));
            effects.push(Effect::Notify(Notice::Fatal { message }));
        }
    }

    fn apply_health(&mut self, players: &[PlayerHealth]) {
        for p in players {
            self.players.insert(p.user_id.clone(), p.health);
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> VersusState {
        let session = Session::new(RoomId::new("ROOM01"), PlayerId::new("alice"), true);
        VersusState::new(session, GameConfig::default())
    }

    fn step(state: VersusState, input: VersusInput) -> (VersusState, Vec<Effect>) {
        let t = state.step(input);
        (t.state, t.effects)
    }

    fn sent(effects: &[Effect]) -> Vec<&'static str> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::Send(event) => Some(event.name()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_connect_schedules_rejoin() {
        let (s, effects) = step(state(), VersusInput::Channel(ChannelSignal::Connected));
        assert!(effects.contains(&Effect::StartTimer {
            kind: TimerKind::Rejoin,
            duration: Duration::from_millis(500)
        }));

        let (s, effects) = step(s, VersusInput::TimerExpired(TimerKind::Rejoin));
        assert_eq!(sent(&effects), vec!["createRoom", "requestGameState"]);

        let (s, effects) = step(
            s,
            VersusInput::Server(ServerEvent::RoomCreated(Membership {
                room_id: RoomId::new("ROOM01"),
                user_id: PlayerId::new("alice"),
                health: Health::FULL,
            })),
        );
        assert!(effects.contains(&Effect::PersistSession));

        let (s, _) = step(s, VersusInput::Channel(ChannelSignal::Disconnected { reason: "eof".into() }));
        assert_eq!(s.connection(), ConnectionStatus::Reconnecting);
        let (s, effects) = step(s, VersusInput::Channel(ChannelSignal::Connected));
        assert!(effects.contains(&Effect::Notify(Notice::Reconnected)));
        let (_, effects) = step(s, VersusInput::TimerExpired(TimerKind::Rejoin));
        assert_eq!(sent(&effects), vec!["rejoinRoom", "requestGameState"]);
    }

    #[test]
    fn test_ready_toggle_is_idempotent_locally() {
        let (s, effects) = step(state(), VersusInput::Command(PlayerCommand::Unready));
        assert!(effects.is_empty());

        let (s, effects) = step(s, VersusInput::Command(PlayerCommand::Ready));
        assert_eq!(sent(&effects), vec!["playerReady"]);

        let (s, _) = step(
            s,
            VersusInput::Server(ServerEvent::ReadyStateUpdate {
                ready_players: vec![PlayerId::new("alice")],
                total_players: 2,
            }),
        );
        assert_eq!(s.phase(), RoomPhase::ReadyCheck);
        assert!(s.is_ready());
        assert!(!s.all_ready());

        let (_, effects) = step(s, VersusInput::Command(PlayerCommand::Ready));
        assert!(effects.is_empty());
    }

    #[test]
    fn test_events_for_other_room_are_ignored() {
        let (s, effects) = step(
            state(),
            VersusInput::Server(ServerEvent::GameStarted {
                room_id: RoomId::new("ELSEWH"),
            }),
        );
        assert!(effects.is_empty());
        assert_eq!(s.phase(), RoomPhase::WaitingForPlayers);
    }

    #[test]
    fn test_protocol_retries_are_capped() {
        let (mut s, _) = step(state(), VersusInput::Channel(ChannelSignal::Connected));
        for attempt in 1..=3 {
            let (next, effects) = step(s, VersusInput::TimerExpired(TimerKind::Rejoin));
            assert_eq!(sent(&effects), vec!["createRoom", "requestGameState"]);

            // The server refuses both requests of the attempt
            let (next, effects) = step(next, VersusInput::Server(ServerEvent::error("Room not found")));
            assert!(effects.contains(&Effect::Notify(Notice::ServerError {
                message: "Room not found".into(),
                attempt
            })));
            let (next, effects) = step(next, VersusInput::Server(ServerEvent::error("Room not found")));
            assert!(effects.is_empty());
            assert_eq!(next.protocol_retries(), attempt);
            s = next;
        }

        // Fourth attempt: the cap of three retries is spent
        let (s, effects) = step(s, VersusInput::TimerExpired(TimerKind::Rejoin));
        assert_eq!(sent(&effects), vec!["createRoom", "requestGameState"]);
        let (s, effects) = step(s, VersusInput::Server(ServerEvent::error("Room not found")));
        assert!(s.is_failed());
        assert!(effects.contains(&Effect::Notify(Notice::Fatal {
            message: "Room not found".into()
        })));

        let (s, effects) = step(s, VersusInput::Server(ServerEvent::error("Room not found")));
        assert!(effects.is_empty());
        let (_, effects) = step(s, VersusInput::TimerExpired(TimerKind::Rejoin));
        assert!(sent(&effects).is_empty());
    }

    #[test]
    fn test_join_resets_retry_count() {
        let (s, _) = step(state(), VersusInput::Channel(ChannelSignal::Connected));
        let (s, _) = step(s, VersusInput::TimerExpired(TimerKind::Rejoin));
        let (s, _) = step(s, VersusInput::Server(ServerEvent::error("Room is full")));
        assert_eq!(s.protocol_retries(), 1);

        let (s, _) = step(s, VersusInput::TimerExpired(TimerKind::Rejoin));
        let (s, _) = step(
            s,
            VersusInput::Server(ServerEvent::RoomCreated(Membership {
                room_id: RoomId::new("ROOM01"),
                user_id: PlayerId::new("alice"),
                health: Health::FULL,
            })),
        );
        assert_eq!(s.protocol_retries(), 0);

        // A later refusal starts counting from one again
        let (_, effects) = step(s, VersusInput::Server(ServerEvent::error("Player not in room")));
        assert!(effects.contains(&Effect::Notify(Notice::ServerError {
            message: "Player not in room".into(),
            attempt: 1
        })));
    }

    #[test]
    fn test_leave_is_terminal() {
        let (s, effects) = step(state(), VersusInput::Command(PlayerCommand::Leave));
        assert_eq!(sent(&effects), vec!["leaveRoom"]);
        assert!(effects.contains(&Effect::ClearSession));
        assert!(effects.contains(&Effect::CloseChannel));

        let (_, effects) = step(s, VersusInput::Command(PlayerCommand::Ready));
        assert!(effects.is_empty());
    }
}
