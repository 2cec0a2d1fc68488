//! Authoritative room arbiter
//!
//! Server-side state for one two-player room. All coordination invariants live
//! here: readiness before start, a single game start, one submission per player
//! per round, simultaneous reveal, and termination on zero health. Every
//! operation returns the events to deliver and to whom; the caller owns the
//! sockets and the clock.

use crate::challenge::{Challenge, Media, MediaKind};
use crate::config::GameConfig;
use crate::countdown::{TimerKind, Timers};
use crate::protocol::{
    ClientEvent, GameOver, GameSnapshot, Membership, NextRound, PlayerEntry, PlayerHealth,
    PlayerResult, RoomData, RoomPhase, RoundResults, RoundSnapshot, RoundStatus, ServerEvent,
};
use crate::scoring::{decide_by_health, decide_outcome, score_round, MatchOutcome};
use crate::types::{Health, PlayerId, RegionPick, RoomId, Timestamp};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::{debug, info};

const MAX_PLAYERS: usize = 2;

// ----------------------------------------------------------------------------
// Challenge Source
// ----------------------------------------------------------------------------

/// Supplies the challenge for each new round
pub trait ChallengeSource: Send {
    /// `None` when no further challenges are available
    fn next_challenge(&mut self, round: u32) -> Option<Challenge>;
}

/// Fixed list of challenges, optionally cycling
#[derive(Debug, Clone)]
pub struct ChallengeDeck {
    challenges: Vec<Challenge>,
    cursor: usize,
    cycle: bool,
}

impl ChallengeDeck {
    /// Deck that starts over when exhausted
    pub fn cycling(challenges: Vec<Challenge>) -> Self {
        Self {
            challenges,
            cursor: 0,
            cycle: true,
        }
    }

    /// Deck that runs out
    pub fn once(challenges: Vec<Challenge>) -> Self {
        Self {
            challenges,
            cursor: 0,
            cycle: false,
        }
    }

    /// Built-in deck of Indonesian cultural items
    pub fn standard() -> Self {
        let entries = [
            ("Aceh", "Dance", "Saman dance", "Rows of kneeling dancers clap and sway in rapid unison.", "media/saman.jpg"),
            ("Bali", "Ritual", "Kecak dance", "A circle of chanting performers retells an episode of the Ramayana.", "media/kecak.jpg"),
            ("Jawa Barat", "Music", "Angklung", "Bamboo tubes tuned to a single note are shaken to play melodies.", "media/angklung.jpg"),
            ("Sumatera Barat", "Cuisine", "Rendang", "Beef slow-cooked in coconut milk and spices until nearly dry.", "media/rendang.jpg"),
            ("Papua", "Craft", "Noken", "A knotted bag of bark fibre carried from the forehead.", "media/noken.jpg"),
            ("Jawa Tengah", "Textile", "Batik", "Wax-resist dyed cloth with motifs tied to rank and region.", "media/batik.jpg"),
            ("Sulawesi Selatan", "Architecture", "Tongkonan", "Ancestral houses with saddle-shaped roofs built by the Toraja.", "media/tongkonan.jpg"),
        ];
        let challenges = entries
            .into_iter()
            .map(|(province, category, query, context, url)| Challenge {
                correct_region: province.into(),
                media: Media {
                    kind: MediaKind::Image,
                    url: url.to_string(),
                },
                category: category.to_string(),
                context: context.to_string(),
                query: query.to_string(),
                fun_fact: None,
            })
            .collect();
        Self::cycling(challenges)
    }

    pub fn len(&self) -> usize {
        self.challenges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.challenges.is_empty()
    }
}

impl ChallengeSource for ChallengeDeck {
    fn next_challenge(&mut self, _round: u32) -> Option<Challenge> {
        if self.challenges.is_empty() {
            return None;
        }
        if self.cursor >= self.challenges.len() {
            if !self.cycle {
                return None;
            }
            self.cursor = 0;
        }
        let challenge = self.challenges[self.cursor].clone();
        self.cursor += 1;
        Some(challenge)
    }
}

// ----------------------------------------------------------------------------
// Outbound Events
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Audience {
    All,
    Only(PlayerId),
    AllExcept(PlayerId),
}

impl Audience {
    pub fn includes(&self, player: &PlayerId) -> bool {
        match self {
            Audience::All => true,
            Audience::Only(target) => target == player,
            Audience::AllExcept(excluded) => excluded != player,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    pub to: Audience,
    pub event: ServerEvent,
}

impl Outbound {
    pub fn all(event: ServerEvent) -> Self {
        Self {
            to: Audience::All,
            event,
        }
    }

    pub fn only(player: PlayerId, event: ServerEvent) -> Self {
        Self {
            to: Audience::Only(player),
            event,
        }
    }

    pub fn all_except(player: PlayerId, event: ServerEvent) -> Self {
        Self {
            to: Audience::AllExcept(player),
            event,
        }
    }
}

// ----------------------------------------------------------------------------
// Room State
// ----------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct Seat {
    id: PlayerId,
    health: Health,
    connected: bool,
}

#[derive(Debug, Clone)]
struct Submission {
    pick: RegionPick,
    is_correct: bool,
    submitted_at: Timestamp,
}

#[derive(Debug, Clone)]
struct ActiveRound {
    index: u32,
    challenge: Challenge,
    submissions: BTreeMap<PlayerId, Submission>,
    status: RoundStatus,
    results: Option<RoundResults>,
}

pub struct Room {
    id: RoomId,
    config: GameConfig,
    phase: RoomPhase,
    seats: Vec<Seat>,
    ready: BTreeSet<PlayerId>,
    round: Option<ActiveRound>,
    game_over: Option<GameOver>,
    timers: Timers,
    source: Box<dyn ChallengeSource>,
}

impl fmt::Debug for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Room")
            .field("id", &self.id)
            .field("phase", &self.phase)
            .field("seats", &self.seats)
            .field("ready", &self.ready)
            .field("round", &self.round.as_ref().map(|r| (r.index, r.status)))
            .finish()
    }
}

impl Room {
    pub fn new(id: RoomId, config: GameConfig, source: Box<dyn ChallengeSource>) -> Self {
        Self {
            id,
            config,
            phase: RoomPhase::WaitingForPlayers,
            seats: Vec::with_capacity(MAX_PLAYERS),
            ready: BTreeSet::new(),
            round: None,
            game_over: None,
            timers: Timers::new(),
            source,
        }
    }

    pub fn with_standard_deck(id: RoomId, config: GameConfig) -> Self {
        Self::new(id, config, Box::new(ChallengeDeck::standard()))
    }

    pub fn id(&self) -> &RoomId {
        &self.id
    }

    pub fn phase(&self) -> RoomPhase {
        self.phase
    }

    pub fn player_count(&self) -> usize {
        self.seats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seats.is_empty()
    }

    pub fn has_player(&self, player: &PlayerId) -> bool {
        self.seat(player).is_some()
    }

    pub fn health_of(&self, player: &PlayerId) -> Option<Health> {
        self.seat(player).map(|s| s.health)
    }

    pub fn is_connected(&self, player: &PlayerId) -> bool {
        self.seat(player).is_some_and(|s| s.connected)
    }

    pub fn current_round(&self) -> Option<u32> {
        self.round.as_ref().map(|r| r.index)
    }

    pub fn round_status(&self) -> Option<RoundStatus> {
        self.round.as_ref().map(|r| r.status)
    }

    /// Number of recorded submissions in the current round
    pub fn submission_count(&self) -> usize {
        self.round.as_ref().map(|r| r.submissions.len()).unwrap_or(0)
    }

    pub fn next_deadline(&self) -> Option<Timestamp> {
        self.timers.next_deadline()
    }

    pub fn player_ids(&self) -> Vec<PlayerId> {
        self.seats.iter().map(|s| s.id.clone()).collect()
    }

    pub fn players(&self) -> Vec<PlayerHealth> {
        self.seats
            .iter()
            .map(|s| PlayerHealth {
                user_id: s.id.clone(),
                health: s.health,
            })
            .collect()
    }

    fn seat(&self, player: &PlayerId) -> Option<&Seat> {
        self.seats.iter().find(|s| &s.id == player)
    }

    fn seat_mut(&mut self, player: &PlayerId) -> Option<&mut Seat> {
        self.seats.iter_mut().find(|s| &s.id == player)
    }

    fn is_lobby(&self) -> bool {
        matches!(
            self.phase,
            RoomPhase::WaitingForPlayers | RoomPhase::ReadyCheck
        )
    }

    pub fn room_data(&self) -> ServerEvent {
        let players = self
            .seats
            .iter()
            .map(|s| {
                (
                    s.id.clone(),
                    PlayerEntry {
                        user_id: s.id.clone(),
                        health: Some(s.health),
                    },
                )
            })
            .collect();
        ServerEvent::RoomData(RoomData {
            room_id: self.id.clone(),
            players,
            player_count: self.seats.len(),
        })
    }

    pub fn ready_state(&self) -> ServerEvent {
        ServerEvent::ReadyStateUpdate {
            ready_players: self.ready.iter().cloned().collect(),
            total_players: self.seats.len(),
        }
    }

    // ------------------------------------------------------------------------
    // Event Routing
    // ------------------------------------------------------------------------

    /// Route a client event to the matching operation
    pub fn apply(&mut self, event: ClientEvent, now: Timestamp) -> Vec<Outbound> {
        match event {
            ClientEvent::CreateRoom(r) => self.join(r.user_id, true),
            ClientEvent::JoinRoom(r) => self.join(r.user_id, false),
            ClientEvent::RejoinRoom(r) => self.rejoin(r.user_id),
            ClientEvent::RequestRoomData(_) => vec![Outbound::all(self.room_data())],
            ClientEvent::PlayerReady(r) => self.ready(&r.user_id, now),
            ClientEvent::PlayerUnready(r) => self.unready(&r.user_id),
            ClientEvent::SelectProvince(m) => self.select(&m.user_id, m.province),
            ClientEvent::SubmitProvince(m) => self.submit(&m.user_id, m.province, now),
            ClientEvent::RequestGameState(r) => self.request_state(r.user_id),
            ClientEvent::ContinueRound(c) => self.continue_round(&c.user_id, c.round, now),
            ClientEvent::LeaveRoom(r) => self.leave(&r.user_id),
        }
    }

    // ------------------------------------------------------------------------
    // Membership
    // ------------------------------------------------------------------------

    /// Join the room; joining again with the same id only reconnects
    pub fn join(&mut self, player: PlayerId, created: bool) -> Vec<Outbound> {
        let membership = |room: &Room, health| Membership {
            room_id: room.id.clone(),
            user_id: player.clone(),
            health,
        };

        if let Some(seat) = self.seat_mut(&player) {
            seat.connected = true;
            let health = seat.health;
            debug!(room = %self.id, player = %player, "Idempotent join");
            let event = if created {
                ServerEvent::RoomCreated(membership(self, health))
            } else {
                ServerEvent::JoinedRoom(membership(self, health))
            };
            return vec![
                Outbound::only(player.clone(), event),
                Outbound::all(self.room_data()),
                Outbound::only(player.clone(), self.ready_state()),
            ];
        }

        if self.seats.len() >= MAX_PLAYERS {
            return vec![Outbound::only(player.clone(), ServerEvent::error("Room is full"))];
        }
        if !self.is_lobby() {
            return vec![Outbound::only(
                player.clone(),
                ServerEvent::error("Game already in progress"),
            )];
        }

        let health = self.config.starting_health();
        self.seats.push(Seat {
            id: player.clone(),
            health,
            connected: true,
        });
        if self.seats.len() == MAX_PLAYERS {
            self.phase = RoomPhase::ReadyCheck;
        }
        info!(room = %self.id, player = %player, players = self.seats.len(), "Player joined");

        let event = if created {
            ServerEvent::RoomCreated(membership(self, health))
        } else {
            ServerEvent::JoinedRoom(membership(self, health))
        };
        vec![
            Outbound::only(player.clone(), event),
            Outbound::all(self.room_data()),
            Outbound::all(self.ready_state()),
        ]
    }

    pub fn rejoin(&mut self, player: PlayerId) -> Vec<Outbound> {
        let Some(seat) = self.seat_mut(&player) else {
            return vec![Outbound::only(player, ServerEvent::error("Player not in room"))];
        };
        seat.connected = true;
        let health = seat.health;
        debug!(room = %self.id, player = %player, "Player rejoined");
        vec![
            Outbound::only(
                player.clone(),
                ServerEvent::RoomRejoined(Membership {
                    room_id: self.id.clone(),
                    user_id: player.clone(),
                    health,
                }),
            ),
            Outbound::all(self.room_data()),
            Outbound::only(player, self.ready_state()),
        ]
    }

    /// Explicit leave; during a match the leaver forfeits
    pub fn leave(&mut self, player: &PlayerId) -> Vec<Outbound> {
        if !self.has_player(player) {
            return Vec::new();
        }
        let mut out = Vec::new();
        self.ready.remove(player);

        if self.phase == RoomPhase::InProgress {
            let winner = self.seats.iter().find(|s| &s.id != player).map(|s| s.id.clone());
            info!(room = %self.id, player = %player, "Player forfeited by leaving");
            let outcome = MatchOutcome {
                winner,
                final_health: self.seats.iter().map(|s| (s.id.clone(), s.health)).collect(),
            };
            self.finish(outcome, &mut out);
        }

        self.seats.retain(|s| &s.id != player);
        out.push(Outbound::all_except(
            player.clone(),
            ServerEvent::PlayerLeft {
                user_id: player.clone(),
            },
        ));
        if self.is_lobby() {
            self.phase = RoomPhase::WaitingForPlayers;
            out.push(Outbound::all(self.room_data()));
            out.push(Outbound::all(self.ready_state()));
        }
        out
    }

    /// Transport dropped; the seat is kept and nothing is forfeited
    pub fn disconnect(&mut self, player: &PlayerId) -> Vec<Outbound> {
        if let Some(seat) = self.seat_mut(player) {
            seat.connected = false;
            debug!(player = %player, "Player disconnected");
        }
        Vec::new()
    }

    // ------------------------------------------------------------------------
    // Readiness
    // ------------------------------------------------------------------------

    pub fn ready(&mut self, player: &PlayerId, now: Timestamp) -> Vec<Outbound> {
        if !self.is_lobby() || !self.has_player(player) {
            return Vec::new();
        }
        if !self.ready.insert(player.clone()) {
            return Vec::new();
        }
        let mut out = vec![Outbound::all(self.ready_state())];
        if self.seats.len() == MAX_PLAYERS && self.ready.len() == self.seats.len() {
            self.start_game(now, &mut out);
        }
        out
    }

    pub fn unready(&mut self, player: &PlayerId) -> Vec<Outbound> {
        if !self.is_lobby() || !self.ready.remove(player) {
            return Vec::new();
        }
        vec![Outbound::all(self.ready_state())]
    }

    fn start_game(&mut self, now: Timestamp, out: &mut Vec<Outbound>) {
        info!(room = %self.id, "Game started");
        self.phase = RoomPhase::InProgress;
        out.push(Outbound::all(ServerEvent::GameStarted {
            room_id: self.id.clone(),
        }));
        match self.source.next_challenge(1) {
            Some(challenge) => self.open_round(1, challenge, now, out),
            None => self.finish_by_health(out),
        }
    }

    // ------------------------------------------------------------------------
    // Rounds
    // ------------------------------------------------------------------------

    fn open_round(&mut self, index: u32, challenge: Challenge, now: Timestamp, out: &mut Vec<Outbound>) {
        debug!(room = %self.id, round = index, "Round opened");
        let data = challenge.cultural_data();
        self.round = Some(ActiveRound {
            index,
            challenge,
            submissions: BTreeMap::new(),
            status: RoundStatus::Open,
            results: None,
        });
        self.timers
            .arm(TimerKind::AnswerWindow, self.config.answer_window, now);
        out.push(Outbound::all(ServerEvent::RoundStarted {
            round: index,
            challenge: data,
        }));
    }

    /// Advisory preview, forwarded to the opponent only
    pub fn select(&mut self, player: &PlayerId, province: RegionPick) -> Vec<Outbound> {
        if self.phase != RoomPhase::InProgress || !self.has_player(player) {
            return Vec::new();
        }
        let Some(round) = self.round.as_ref() else {
            return Vec::new();
        };
        if round.status == RoundStatus::Resolved || round.submissions.contains_key(player) {
            return Vec::new();
        }
        vec![Outbound::all_except(
            player.clone(),
            ServerEvent::ProvinceSelected {
                province,
                user_id: player.clone(),
            },
        )]
    }

    pub fn submit(&mut self, player: &PlayerId, province: RegionPick, now: Timestamp) -> Vec<Outbound> {
        if self.phase != RoomPhase::InProgress || !self.has_player(player) {
            return Vec::new();
        }
        let seats = self.seats.len();
        let Some(round) = self.round.as_mut() else {
            return Vec::new();
        };
        if round.status == RoundStatus::Resolved {
            debug!(player = %player, "Ignoring submission after resolution");
            return Vec::new();
        }
        if round.submissions.contains_key(player) {
            debug!(player = %player, round = round.index, "Ignoring duplicate submission");
            return Vec::new();
        }

        let is_correct = round.challenge.grade(Some(&province.region_id));
        round.submissions.insert(
            player.clone(),
            Submission {
                pick: province,
                is_correct,
                submitted_at: now,
            },
        );
        debug!(player = %player, round = round.index, "Submission recorded");

        let mut out = Vec::new();
        if round.submissions.len() >= seats {
            out.push(Outbound::all(ServerEvent::BothPlayersSubmitted {
                message: "Both players have submitted".to_string(),
            }));
            self.resolve(now, &mut out);
        } else {
            round.status = RoundStatus::AwaitingOpponent;
            out.push(Outbound::all_except(
                player.clone(),
                ServerEvent::OpponentSubmitted {
                    user_id: player.clone(),
                    province: None,
                },
            ));
        }
        out
    }

    /// Score the round and reveal it to both players at once
    fn resolve(&mut self, now: Timestamp, out: &mut Vec<Outbound>) {
        let Some(round) = self.round.as_mut() else {
            return;
        };
        if round.status == RoundStatus::Resolved || self.seats.len() != MAX_PLAYERS {
            return;
        }

        let grade = |id: &PlayerId| round.submissions.get(id).is_some_and(|s| s.is_correct);
        let a_correct = grade(&self.seats[0].id);
        let b_correct = grade(&self.seats[1].id);
        let (a_health, b_health) =
            score_round(a_correct, b_correct).apply(self.seats[0].health, self.seats[1].health);
        self.seats[0].health = a_health;
        self.seats[1].health = b_health;

        let results = self
            .seats
            .iter()
            .zip([a_correct, b_correct])
            .map(|(seat, is_correct)| PlayerResult {
                user_id: seat.id.clone(),
                province: round.submissions.get(&seat.id).map(|s| s.pick.clone()),
                is_correct,
                health: seat.health,
            })
            .collect();
        let results = RoundResults {
            round: round.index,
            results,
            correct_answer: round.challenge.correct_region.clone(),
            cultural_data: Some(round.challenge.cultural_data()),
        };

        info!(
            room = %self.id,
            round = round.index,
            a_correct,
            b_correct,
            "Round resolved"
        );
        round.status = RoundStatus::Resolved;
        round.results = Some(results.clone());
        let index = round.index;

        self.timers.cancel(TimerKind::AnswerWindow);
        out.push(Outbound::all(ServerEvent::ShowResults(results)));

        let a = (&self.seats[0].id, a_health);
        let b = (&self.seats[1].id, b_health);
        if let Some(outcome) = decide_outcome(a, b) {
            self.finish(outcome, out);
        } else if self.config.is_final_round(index) {
            let outcome = decide_by_health(a, b);
            self.finish(outcome, out);
        } else {
            self.timers
                .arm(TimerKind::ResultDisplay, self.config.result_display, now);
        }
    }

    /// Explicit continue from either player ends the result display early.
    /// `round` names the round whose results the player saw; 0 matches any.
    pub fn continue_round(&mut self, player: &PlayerId, round: u32, now: Timestamp) -> Vec<Outbound> {
        if self.phase != RoomPhase::InProgress
            || !self.has_player(player)
            || self.round_status() != Some(RoundStatus::Resolved)
        {
            return Vec::new();
        }
        let current = self.current_round().unwrap_or(0);
        if round != 0 && round != current {
            debug!(room = %self.id, round, current, "Ignoring stale continue");
            return Vec::new();
        }
        let mut out = Vec::new();
        self.advance(now, &mut out);
        out
    }

    fn advance(&mut self, now: Timestamp, out: &mut Vec<Outbound>) {
        self.timers.cancel(TimerKind::ResultDisplay);
        let index = self.current_round().unwrap_or(0) + 1;
        let Some(challenge) = self.source.next_challenge(index) else {
            info!(room = %self.id, "No challenges left");
            self.finish_by_health(out);
            return;
        };
        out.push(Outbound::all(ServerEvent::NextRound(NextRound {
            round_message: format!("Round {}", index),
            players: self.players(),
            round: index,
        })));
        self.open_round(index, challenge, now, out);
    }

    /// Drive timeouts; call at least once per second
    pub fn tick(&mut self, now: Timestamp) -> Vec<Outbound> {
        let mut out = Vec::new();
        for kind in self.timers.take_expired(now) {
            match kind {
                TimerKind::AnswerWindow => {
                    if self.phase == RoomPhase::InProgress
                        && self.round_status().is_some_and(|s| s != RoundStatus::Resolved)
                    {
                        debug!(room = %self.id, "Answer window elapsed, forcing missing answers");
                        self.resolve(now, &mut out);
                    }
                }
                TimerKind::ResultDisplay => {
                    if self.phase == RoomPhase::InProgress
                        && self.round_status() == Some(RoundStatus::Resolved)
                    {
                        self.advance(now, &mut out);
                    }
                }
                _ => {}
            }
        }
        out
    }

    // ------------------------------------------------------------------------
    // Termination
    // ------------------------------------------------------------------------

    fn finish_by_health(&mut self, out: &mut Vec<Outbound>) {
        let outcome = match self.seats.as_slice() {
            [a, b] => decide_by_health((&a.id, a.health), (&b.id, b.health)),
            _ => MatchOutcome {
                winner: None,
                final_health: self.seats.iter().map(|s| (s.id.clone(), s.health)).collect(),
            },
        };
        self.finish(outcome, out);
    }

    fn finish(&mut self, outcome: MatchOutcome, out: &mut Vec<Outbound>) {
        info!(room = %self.id, winner = ?outcome.winner, "Game over");
        self.phase = RoomPhase::Finished;
        self.timers.cancel_all();
        let game_over = GameOver {
            winner: outcome.winner,
            players: outcome
                .final_health
                .into_iter()
                .map(|(user_id, health)| PlayerHealth { user_id, health })
                .collect(),
        };
        self.game_over = Some(game_over.clone());
        out.push(Outbound::all(ServerEvent::GameOver(game_over)));
    }

    // ------------------------------------------------------------------------
    // Resync
    // ------------------------------------------------------------------------

    fn request_state(&self, player: PlayerId) -> Vec<Outbound> {
        match self.snapshot(&player) {
            Some(snapshot) => vec![Outbound::only(player, ServerEvent::GameState(snapshot))],
            None => vec![Outbound::only(player, ServerEvent::error("Player not in room"))],
        }
    }

    /// Authoritative state as seen by `player`; `None` if they are not seated
    pub fn snapshot(&self, player: &PlayerId) -> Option<GameSnapshot> {
        if !self.has_player(player) {
            return None;
        }
        let round = self.round.as_ref().map(|round| {
            let mut submitted: Vec<(Timestamp, PlayerId)> = round
                .submissions
                .iter()
                .map(|(id, s)| (s.submitted_at, id.clone()))
                .collect();
            submitted.sort();
            RoundSnapshot {
                index: round.index,
                status: round.status,
                challenge: Some(round.challenge.cultural_data()),
                submitted: submitted.into_iter().map(|(_, id)| id).collect(),
                own_submission: round.submissions.get(player).map(|s| s.pick.clone()),
                results: round.results.clone(),
            }
        });
        Some(GameSnapshot {
            room_id: self.id.clone(),
            phase: self.phase,
            players: self.players(),
            ready_players: self.ready.iter().cloned().collect(),
            round,
            game_over: self.game_over.clone(),
        })
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
