//! Multiplayer Round Scenarios
//!
//! Drives an authoritative `Room` and two client `VersusState` projections
//! together, routing every outbound server event to the seated clients and every
//! client `Send` effect back into the room. No transport, no clock: time is an
//! explicit `Timestamp` advanced by the test.

use culturate_core::{
    protocol::RoundStatus, ChannelSignal, ClientEvent, Effect, GameConfig, Health, Notice,
    PlayerCommand, PlayerId, RegionPick, Room, RoomId, RoomPhase, RoundPhase, ServerEvent,
    Session, TimerKind, Timestamp, VersusInput, VersusState,
};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

// ----------------------------------------------------------------------------
// Test Utilities
// ----------------------------------------------------------------------------

fn alice() -> PlayerId {
    PlayerId::new("alice")
}

fn bob() -> PlayerId {
    PlayerId::new("bob")
}

struct Table {
    room: Room,
    clients: BTreeMap<PlayerId, Option<VersusState>>,
    notices: BTreeMap<PlayerId, Vec<Notice>>,
    server_events: Vec<ServerEvent>,
    /// Players whose transport is down; nothing is delivered to them
    offline: BTreeSet<PlayerId>,
    now: Timestamp,
}

impl Table {
    fn new() -> Self {
        let room_id = RoomId::new("ROOM01");
        let config = GameConfig::default();
        let mut clients = BTreeMap::new();
        for (player, created) in [(alice(), true), (bob(), false)] {
            let session = Session::new(room_id.clone(), player.clone(), created);
            clients.insert(player, Some(VersusState::new(session, config.clone())));
        }
        Self {
            room: Room::with_standard_deck(room_id, config),
            clients,
            notices: BTreeMap::new(),
            server_events: Vec::new(),
            offline: BTreeSet::new(),
            now: Timestamp::new(1_000),
        }
    }

    fn client(&self, player: &PlayerId) -> &VersusState {
        self.clients[player].as_ref().expect("client state present")
    }

    /// Step one client and push its outgoing events onto `queue`
    fn step_client(&mut self, player: &PlayerId, input: VersusInput, queue: &mut VecDeque<ClientEvent>) {
        let slot = self.clients.get_mut(player).expect("known player");
        let state = slot.take().expect("client state present");
        let transition = state.step(input);
        *slot = Some(transition.state);
        for effect in transition.effects {
            match effect {
                Effect::Send(event) => queue.push_back(event),
                Effect::Notify(notice) => self.notices.entry(player.clone()).or_default().push(notice),
                _ => {}
            }
        }
    }

    fn pump(&mut self, mut queue: VecDeque<ClientEvent>) {
        while let Some(event) = queue.pop_front() {
            let outbound = self.room.apply(event, self.now);
            self.deliver(outbound, &mut queue);
        }
    }

    fn deliver(&mut self, outbound: Vec<culturate_core::Outbound>, queue: &mut VecDeque<ClientEvent>) {
        for message in outbound {
            self.server_events.push(message.event.clone());
            let players: Vec<PlayerId> = self.clients.keys().cloned().collect();
            for player in players {
                if self.room.has_player(&player)
                    && message.to.includes(&player)
                    && !self.offline.contains(&player)
                {
                    self.step_client(&player, VersusInput::Server(message.event.clone()), queue);
                }
            }
        }
    }

    fn input(&mut self, player: &PlayerId, input: VersusInput) {
        let mut queue = VecDeque::new();
        self.step_client(player, input, &mut queue);
        self.pump(queue);
    }

    fn command(&mut self, player: &PlayerId, command: PlayerCommand) {
        self.input(player, VersusInput::Command(command));
    }

    fn connect(&mut self, player: &PlayerId) {
        self.input(player, VersusInput::Channel(ChannelSignal::Connected));
        self.input(player, VersusInput::TimerExpired(TimerKind::Rejoin));
    }

    fn drop_connection(&mut self, player: &PlayerId) {
        self.offline.insert(player.clone());
        self.room.disconnect(player);
        self.input(player, VersusInput::Channel(ChannelSignal::Disconnected { reason: "network".into() }));
    }

    fn restore_connection(&mut self, player: &PlayerId) {
        self.offline.remove(player);
        self.connect(player);
    }

    fn wrong_answer(&self) -> &'static str {
        if self.correct_answer() == "Papua" {
            "Bali"
        } else {
            "Papua"
        }
    }

    fn tick(&mut self, millis: u64) {
        self.now = self.now + millis;
        let outbound = self.room.tick(self.now);
        let mut queue = VecDeque::new();
        self.deliver(outbound, &mut queue);
        self.pump(queue);
    }

    fn start(&mut self) {
        self.connect(&alice());
        self.connect(&bob());
        self.command(&alice(), PlayerCommand::Ready);
        self.command(&bob(), PlayerCommand::Ready);
    }

    fn correct_answer(&self) -> String {
        self.client(&alice())
            .round()
            .and_then(|r| r.challenge.as_ref())
            .map(|c| c.province.clone())
            .expect("round challenge")
    }

    fn answer(&mut self, player: &PlayerId, region: &str) {
        self.command(player, PlayerCommand::Select(RegionPick::new(region)));
        self.command(player, PlayerCommand::Submit);
    }

    fn answer_round(&mut self, a_correct: bool, b_correct: bool) {
        let correct = self.correct_answer();
        let wrong = if correct == "Papua" { "Bali" } else { "Papua" };
        self.answer(&alice(), if a_correct { correct.as_str() } else { wrong });
        self.answer(&bob(), if b_correct { correct.as_str() } else { wrong });
    }

    fn health(&self, viewer: &PlayerId) -> (Health, Option<Health>) {
        let state = self.client(viewer);
        (state.own_health(), state.opponent_health())
    }

    fn count_events(&self, name: &str) -> usize {
        self.server_events.iter().filter(|e| e.name() == name).count()
    }
}

// ----------------------------------------------------------------------------
// Lobby
// ----------------------------------------------------------------------------

#[test]
fn test_game_starts_once_both_ready() {
    let mut table = Table::new();
    table.connect(&alice());
    table.connect(&bob());
    assert_eq!(table.client(&alice()).phase(), RoomPhase::ReadyCheck);

    table.command(&alice(), PlayerCommand::Ready);
    assert_eq!(table.room.phase(), RoomPhase::ReadyCheck);
    assert_eq!(table.client(&bob()).ready_players().len(), 1);

    table.command(&bob(), PlayerCommand::Ready);
    assert_eq!(table.count_events("gameStarted"), 1);
    for player in [alice(), bob()] {
        let state = table.client(&player);
        assert_eq!(state.phase(), RoomPhase::InProgress);
        let round = state.round().expect("round opened");
        assert_eq!(round.index, 1);
        assert!(round.challenge.is_some());
    }

    // Racing duplicate ready presses do not start a second game
    let mut queue = VecDeque::new();
    queue.push_back(ClientEvent::PlayerReady(culturate_core::protocol::RoomRequest::new(
        RoomId::new("ROOM01"),
        alice(),
    )));
    table.pump(queue);
    assert_eq!(table.count_events("gameStarted"), 1);
}

// ----------------------------------------------------------------------------
// Scenarios
// ----------------------------------------------------------------------------

#[test]
fn scenario_a_both_correct_keeps_health_and_advances() {
    let mut table = Table::new();
    table.start();

    table.answer_round(true, true);
    assert_eq!(table.health(&alice()), (Health::FULL, Some(Health::FULL)));
    assert_eq!(table.health(&bob()), (Health::FULL, Some(Health::FULL)));
    assert_eq!(table.client(&alice()).round_phase(), Some(RoundPhase::Resolved));

    table.tick(8_000);
    for player in [alice(), bob()] {
        let round = table.client(&player).round().expect("round");
        assert_eq!(round.index, 2);
        assert_eq!(round.phase, RoundPhase::Open);
    }
}

#[test]
fn scenario_b_one_wrong_loses_one() {
    let mut table = Table::new();
    table.start();
    assert_eq!(table.correct_answer(), "Aceh");

    table.answer(&alice(), "Aceh");
    table.answer(&bob(), "Bali");

    assert_eq!(table.health(&alice()), (Health::FULL, Some(Health::new(2))));
    assert_eq!(table.health(&bob()), (Health::new(2), Some(Health::FULL)));

    let record = &table.client(&bob()).history().rounds()[0];
    assert!(!record.player_correct);
    assert!(record.opponent_correct);
    assert_eq!(record.player_answer.as_ref().map(|r| r.as_str()), Some("Bali"));
}

#[test]
fn scenario_c_both_wrong_both_lose() {
    let mut table = Table::new();
    table.start();
    table.answer_round(false, false);
    assert_eq!(table.health(&alice()), (Health::new(2), Some(Health::new(2))));
    assert_eq!(table.room.health_of(&bob()), Some(Health::new(2)));
}

#[test]
fn scenario_d_three_misses_end_the_match() {
    let mut table = Table::new();
    table.start();

    for expected in [2, 1, 0] {
        table.answer_round(true, false);
        assert_eq!(table.room.health_of(&bob()), Some(Health::new(expected)));
        if expected > 0 {
            table.command(&bob(), PlayerCommand::Continue);
        }
    }

    assert_eq!(table.room.phase(), RoomPhase::Finished);
    assert_eq!(table.count_events("gameOver"), 1);
    for player in [alice(), bob()] {
        let state = table.client(&player);
        assert_eq!(state.phase(), RoomPhase::Finished);
        let outcome = state.outcome().expect("outcome");
        assert!(outcome.is_winner(&alice()));
        assert_eq!(state.history().len(), 3);
        assert!(state.history().is_frozen());
    }
    assert_eq!(table.health(&alice()), (Health::FULL, Some(Health::ZERO)));
}

#[test]
fn scenario_f_second_submission_is_ignored() {
    let mut table = Table::new();
    table.start();

    table.answer(&alice(), "Aceh");
    table.answer(&alice(), "Bali");
    assert_eq!(
        table.client(&alice()).round().and_then(|r| r.submission.as_ref()).map(|p| p.region_id.as_str()),
        Some("Aceh")
    );

    // A raw duplicate that bypasses the client guard is ignored by the room too
    let mut queue = VecDeque::new();
    queue.push_back(ClientEvent::SubmitProvince(culturate_core::protocol::ProvinceMove {
        province: RegionPick::new("Bali"),
        user_id: alice(),
        room_id: RoomId::new("ROOM01"),
    }));
    table.pump(queue);
    assert_eq!(table.room.submission_count(), 1);
    assert_eq!(table.count_events("opponentSubmitted"), 1);

    table.answer(&bob(), "Aceh");
    let results = table
        .client(&alice())
        .round()
        .and_then(|r| r.results.clone())
        .expect("results");
    let mine = results.result_for(&alice()).expect("own result");
    assert!(mine.is_correct);
    assert_eq!(mine.province.as_ref().map(|p| p.region_id.as_str()), Some("Aceh"));
}

// ----------------------------------------------------------------------------
// Ordering, Timeouts and Recovery
// ----------------------------------------------------------------------------

#[test]
fn test_waiting_notice_and_opponent_lock() {
    let mut table = Table::new();
    table.start();

    table.answer(&alice(), "Aceh");
    assert_eq!(table.client(&alice()).round_phase(), Some(RoundPhase::AwaitingOpponent));
    assert_eq!(table.client(&bob()).round_phase(), Some(RoundPhase::OpponentLocked));
    assert!(table.notices[&alice()].contains(&Notice::WaitingForOpponent));
    assert!(table.notices[&bob()].contains(&Notice::OpponentSubmitted));
}

#[test]
fn test_results_revealed_once_to_both() {
    let mut table = Table::new();
    table.start();
    table.answer_round(true, false);
    assert_eq!(table.count_events("showResults"), 1);
    assert_eq!(table.count_events("bothPlayersSubmitted"), 1);

    // A replayed showResults does not touch history or health
    let replay = table
        .server_events
        .iter()
        .find(|e| e.name() == "showResults")
        .cloned()
        .expect("showResults");
    table.input(&bob(), VersusInput::Server(replay));
    assert_eq!(table.client(&bob()).history().len(), 1);
    assert_eq!(table.health(&bob()).0, Health::new(2));
}

#[test]
fn test_timeout_forces_no_answer_for_disconnected_player() {
    let mut table = Table::new();
    table.start();

    table.answer(&alice(), "Aceh");
    table.room.disconnect(&bob());
    table.input(&bob(), VersusInput::Channel(ChannelSignal::Disconnected { reason: "network".into() }));

    table.tick(10_000);
    assert_eq!(table.room.round_status(), Some(RoundStatus::AwaitingOpponent));

    table.tick(20_000);
    assert_eq!(table.room.round_status(), Some(RoundStatus::Resolved));
    assert_eq!(table.room.health_of(&bob()), Some(Health::new(2)));
    assert_eq!(table.client(&alice()).round_phase(), Some(RoundPhase::Resolved));
}

#[test]
fn test_reconnect_resyncs_without_double_join() {
    let mut table = Table::new();
    table.start();
    table.answer(&bob(), "Bali");

    // Bob's process restarts: a fresh projection with only the stored session
    let session = table.client(&bob()).session().clone();
    table
        .clients
        .insert(bob(), Some(VersusState::new(session, GameConfig::default())));
    table.connect(&bob());

    assert_eq!(table.room.player_count(), 2);
    let state = table.client(&bob());
    assert_eq!(state.phase(), RoomPhase::InProgress);
    let round = state.round().expect("round restored");
    assert_eq!(round.index, 1);
    assert_eq!(round.phase, RoundPhase::AwaitingOpponent);
    assert_eq!(round.submission.as_ref().map(|p| p.region_id.as_str()), Some("Bali"));
    assert!(round.challenge.is_some());
    assert!(state.history().is_empty());
}

#[test]
fn test_game_over_redirect_leaves_and_clears() {
    let mut table = Table::new();
    table.start();
    for _ in 0..3 {
        table.answer_round(false, true);
        table.command(&alice(), PlayerCommand::Continue);
    }
    assert_eq!(table.client(&alice()).phase(), RoomPhase::Finished);

    let state = table.clients.get_mut(&alice()).and_then(Option::take).expect("alice");
    let transition = state.step(VersusInput::TimerExpired(TimerKind::GameOverRedirect));
    assert!(transition.state.has_left());
    assert!(transition.effects.contains(&Effect::ClearSession));
    assert!(transition.effects.contains(&Effect::CloseChannel));
    assert!(transition
        .effects
        .iter()
        .any(|e| matches!(e, Effect::Send(ClientEvent::LeaveRoom(_)))));
}

#[test]
fn test_resync_records_round_resolved_while_offline() {
    let mut table = Table::new();
    table.start();

    let wrong = table.wrong_answer();
    table.answer(&bob(), wrong);
    table.drop_connection(&bob());
    let correct = table.correct_answer();
    table.answer(&alice(), &correct);
    assert_eq!(table.room.round_status(), Some(RoundStatus::Resolved));
    assert!(table.client(&bob()).history().is_empty());

    table.restore_connection(&bob());
    let state = table.client(&bob());
    assert_eq!(state.round_phase(), Some(RoundPhase::Resolved));
    assert_eq!(state.own_health(), Health::new(2));
    assert_eq!(state.history().len(), 1);
    let record = &state.history().rounds()[0];
    assert_eq!(record.round_number, 1);
    assert!(!record.player_correct);
    assert!(record.opponent_correct);
    assert_eq!(record.player_answer.as_ref().map(|r| r.as_str()), Some(wrong));
}

#[test]
fn test_resync_after_game_over_keeps_the_final_round() {
    let mut table = Table::new();
    table.start();
    for _ in 0..2 {
        table.answer_round(true, false);
        table.command(&alice(), PlayerCommand::Continue);
    }

    // Bob misses both showResults and gameOver for the deciding round
    let wrong = table.wrong_answer();
    table.answer(&bob(), wrong);
    table.drop_connection(&bob());
    let correct = table.correct_answer();
    table.answer(&alice(), &correct);
    assert_eq!(table.room.phase(), RoomPhase::Finished);
    assert_eq!(table.client(&bob()).history().len(), 2);

    table.restore_connection(&bob());
    let state = table.client(&bob());
    assert_eq!(state.phase(), RoomPhase::Finished);
    assert!(state.outcome().expect("outcome").is_winner(&alice()));
    assert!(state.history().is_frozen());
    assert_eq!(state.history().len(), 3);
    assert_eq!(state.history().last_round(), Some(3));
    assert_eq!(state.history().recap().rounds, 3);
    assert_eq!(state.history().summary_request().len(), 3);
}
