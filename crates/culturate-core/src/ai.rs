//! AI Round Engine
//!
//! Single player against a remote judge. Challenges arrive ahead of time over
//! the stream and are queued; local countdowns pace the match independently of
//! delivery. The judge call is the only suspension point: while it is in flight
//! the round is `Judging` and no further submission is accepted.

use crate::challenge::{Challenge, CulturalData};
use crate::config::GameConfig;
use crate::countdown::TimerKind;
use crate::history::{MatchHistory, RoundRecord, SummaryEntry};
use crate::scoring::{decide_by_health, decide_outcome, score_round, MatchOutcome};
use crate::stream::StreamMessage;
use crate::types::{Health, PlayerId, RegionId, RegionPick, SystemTimeSource, TimeSource};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const PLAYER: &str = "player";
const AI: &str = "ai";

/// Identifier used for the human side in outcomes
pub fn player_id() -> PlayerId {
    PlayerId::new(PLAYER)
}

/// Identifier used for the AI side in outcomes
pub fn ai_id() -> PlayerId {
    PlayerId::new(AI)
}

// ----------------------------------------------------------------------------
// Phases, Inputs, Effects
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AiPhase {
    Idle,
    InitialLoading,
    Displaying { index: usize },
    /// Judge call in flight
    Judging { index: usize },
    ShowingResult { index: usize },
    InterLoading { next: usize },
    Completed,
    Error { message: String },
}

impl fmt::Display for AiPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AiPhase::Idle => write!(f, "idle"),
            AiPhase::InitialLoading => write!(f, "initial_loading"),
            AiPhase::Displaying { index } => write!(f, "displaying({})", index),
            AiPhase::Judging { index } => write!(f, "judging({})", index),
            AiPhase::ShowingResult { index } => write!(f, "showing_result({})", index),
            AiPhase::InterLoading { next } => write!(f, "inter_loading({})", next),
            AiPhase::Completed => write!(f, "completed"),
            AiPhase::Error { .. } => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AiInput {
    Start,
    Stream(StreamMessage),
    Select(RegionPick),
    Submit,
    JudgeResolved { attempt: u64, guess: RegionId },
    JudgeFailed { attempt: u64, message: String },
    Retry,
    DismissResult,
    TimerExpired(TimerKind),
    SummaryResolved { feedback: String },
    SummaryFailed { message: String },
    RetrySummary,
    Teardown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AiNotice {
    WaitingForChallenges,
    ChallengeShown { round: u32 },
    Thinking,
    RoundResult(AiRoundResult),
    JudgeFailed { message: String },
    StreamFailed { detail: String },
    MatchOver { outcome: MatchOutcome },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AiEffect {
    OpenStream,
    CloseStream,
    RequestJudge {
        attempt: u64,
        media_url: String,
        correct_region: RegionId,
    },
    StartTimer { kind: TimerKind, duration: Duration },
    CancelTimer(TimerKind),
    CancelAllTimers,
    RequestSummary(Vec<SummaryEntry>),
    Notify(AiNotice),
}

#[derive(Debug)]
pub struct AiTransition {
    pub state: AiMatchState,
    pub effects: Vec<AiEffect>,
}

/// Outcome of one judged round
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AiRoundResult {
    pub round: u32,
    pub correct_answer: RegionId,
    pub player_answer: Option<RegionId>,
    pub ai_answer: RegionId,
    pub player_correct: bool,
    pub ai_correct: bool,
    pub player_health: Health,
    pub ai_health: Health,
    pub fun_fact: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SummaryState {
    #[default]
    NotRequested,
    Pending,
    Ready(String),
    Failed(String),
}

// ----------------------------------------------------------------------------
// State
// ----------------------------------------------------------------------------

#[derive(Clone)]
pub struct AiMatchState {
    config: GameConfig,
    clock: Arc<dyn TimeSource>,
    phase: AiPhase,
    challenges: Vec<Challenge>,
    raw: Vec<CulturalData>,
    stream_complete: bool,
    player_health: Health,
    ai_health: Health,
    selection: Option<RegionPick>,
    /// `Some(None)` is a timed-out round with no answer
    submission: Option<Option<RegionId>>,
    attempt: u64,
    pending_attempt: Option<u64>,
    retry_required: bool,
    history: MatchHistory,
    last_result: Option<AiRoundResult>,
    outcome: Option<MatchOutcome>,
    summary: SummaryState,
    torn_down: bool,
}

impl fmt::Debug for AiMatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AiMatchState")
            .field("phase", &self.phase)
            .field("queued", &self.challenges.len())
            .field("stream_complete", &self.stream_complete)
            .field("player_health", &self.player_health)
            .field("ai_health", &self.ai_health)
            .field("attempt", &self.attempt)
            .field("retry_required", &self.retry_required)
            .field("summary", &self.summary)
            .finish()
    }
}

impl AiMatchState {
    pub fn new(config: GameConfig) -> Self {
        let health = config.starting_health();
        Self {
            config,
            clock: Arc::new(SystemTimeSource),
            phase: AiPhase::Idle,
            challenges: Vec::new(),
            raw: Vec::new(),
            stream_complete: false,
            player_health: health,
            ai_health: health,
            selection: None,
            submission: None,
            attempt: 0,
            pending_attempt: None,
            retry_required: false,
            history: MatchHistory::new(),
            last_result: None,
            outcome: None,
            summary: SummaryState::NotRequested,
            torn_down: false,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn TimeSource>) -> Self {
        self.clock = clock;
        self
    }

    pub fn phase(&self) -> &AiPhase {
        &self.phase
    }

    pub fn player_health(&self) -> Health {
        self.player_health
    }

    pub fn ai_health(&self) -> Health {
        self.ai_health
    }

    pub fn queued(&self) -> usize {
        self.challenges.len()
    }

    /// Challenge currently on screen, if any
    pub fn current_challenge(&self) -> Option<&Challenge> {
        match self.phase {
            AiPhase::Displaying { index }
            | AiPhase::Judging { index }
            | AiPhase::ShowingResult { index } => self.challenges.get(index),
            _ => None,
        }
    }

    pub fn selection(&self) -> Option<&RegionPick> {
        self.selection.as_ref()
    }

    pub fn retry_required(&self) -> bool {
        self.retry_required
    }

    pub fn last_result(&self) -> Option<&AiRoundResult> {
        self.last_result.as_ref()
    }

    pub fn history(&self) -> &MatchHistory {
        &self.history
    }

    pub fn outcome(&self) -> Option<&MatchOutcome> {
        self.outcome.as_ref()
    }

    pub fn summary(&self) -> &SummaryState {
        &self.summary
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    // ------------------------------------------------------------------------
    // Reducer
    // ------------------------------------------------------------------------

    pub fn step(mut self, input: AiInput) -> AiTransition {
        let mut effects = Vec::new();
        if self.torn_down {
            debug!("Discarding input after teardown");
            return AiTransition {
                state: self,
                effects,
            };
        }

        let before = self.phase.clone();
        match input {
            AiInput::Start => self.start(&mut effects),
            AiInput::Stream(message) => self.on_stream(message, &mut effects),
            AiInput::Select(pick) => {
                if matches!(self.phase, AiPhase::Displaying { .. }) && !self.retry_required {
                    self.selection = Some(pick);
                }
            }
            AiInput::Submit => self.submit(&mut effects),
            AiInput::JudgeResolved { attempt, guess } => {
                self.on_judge_resolved(attempt, guess, &mut effects)
            }
            AiInput::JudgeFailed { attempt, message } => {
                self.on_judge_failed(attempt, message, &mut effects)
            }
            AiInput::Retry => {
                if let AiPhase::Displaying { index } = self.phase {
                    if self.retry_required {
                        self.retry_required = false;
                        self.judge(index, &mut effects);
                    }
                }
            }
            AiInput::DismissResult => {
                if matches!(self.phase, AiPhase::ShowingResult { .. }) {
                    effects.push(AiEffect::CancelTimer(TimerKind::ResultDisplay));
                    self.after_result(&mut effects);
                }
            }
            AiInput::TimerExpired(kind) => self.on_timer(kind, &mut effects),
            AiInput::SummaryResolved { feedback } => {
                if self.summary == SummaryState::Pending {
                    self.summary = SummaryState::Ready(feedback);
                }
            }
            AiInput::SummaryFailed { message } => {
                if self.summary == SummaryState::Pending {
                    warn!("Match summary failed: {}", message);
                    self.summary = SummaryState::Failed(message);
                }
            }
            AiInput::RetrySummary => {
                if matches!(self.summary, SummaryState::Failed(_)) {
                    self.request_summary(&mut effects);
                }
            }
            AiInput::Teardown => {
                self.torn_down = true;
                self.pending_attempt = None;
                effects.push(AiEffect::CancelAllTimers);
                effects.push(AiEffect::CloseStream);
            }
        }

        if before != self.phase {
            debug!(from = %before, to = %self.phase, "AI match transition");
        }
        AiTransition {
            state: self,
            effects,
        }
    }

    fn start(&mut self, effects: &mut Vec<AiEffect>) {
        if !matches!(
            self.phase,
            AiPhase::Idle | AiPhase::Completed | AiPhase::Error { .. }
        ) {
            debug!(phase = %self.phase, "Ignoring start while a match is running");
            return;
        }
        let fresh = AiMatchState::new(self.config.clone()).with_clock(self.clock.clone());
        *self = fresh;
        info!("Starting AI match");
        self.phase = AiPhase::InitialLoading;
        effects.push(AiEffect::OpenStream);
        effects.push(AiEffect::StartTimer {
            kind: TimerKind::InitialLoading,
            duration: self.config.initial_loading,
        });
    }

    fn on_stream(&mut self, message: StreamMessage, effects: &mut Vec<AiEffect>) {
        if matches!(
            self.phase,
            AiPhase::Idle | AiPhase::Completed | AiPhase::Error { .. }
        ) {
            return;
        }
        match message {
            StreamMessage::Item(data) => {
                debug!(province = %data.province, queued = self.challenges.len() + 1, "Challenge queued");
                self.raw.push(data.clone());
                self.challenges.push(data.into_challenge());
            }
            StreamMessage::Status { message } => debug!("Stream status: {}", message),
            StreamMessage::Malformed => debug!("Skipping malformed stream message"),
            StreamMessage::Complete => {
                debug!(queued = self.challenges.len(), "Stream complete");
                self.stream_complete = true;
                self.finish_if_exhausted(effects);
            }
            StreamMessage::Error { detail } => {
                warn!("Challenge stream failed: {}", detail);
                self.stream_complete = true;
                effects.push(AiEffect::CloseStream);
                if self.phase == AiPhase::InitialLoading && self.challenges.is_empty() {
                    effects.push(AiEffect::CancelAllTimers);
                    self.phase = AiPhase::Error {
                        message: detail.clone(),
                    };
                }
                effects.push(AiEffect::Notify(AiNotice::StreamFailed { detail }));
            }
        }
    }

    /// Nothing more can be played: end now rather than waiting on a timer
    fn finish_if_exhausted(&mut self, effects: &mut Vec<AiEffect>) {
        let next = match self.phase {
            AiPhase::InitialLoading => 0,
            AiPhase::InterLoading { next } => next,
            _ => return,
        };
        if self.stream_complete && next >= self.challenges.len() {
            self.complete(effects);
        }
    }

    fn display(&mut self, index: usize, effects: &mut Vec<AiEffect>) {
        self.phase = AiPhase::Displaying { index };
        self.selection = None;
        self.submission = None;
        self.retry_required = false;
        effects.push(AiEffect::StartTimer {
            kind: TimerKind::Display,
            duration: self.config.answer_window,
        });
        effects.push(AiEffect::Notify(AiNotice::ChallengeShown {
            round: index as u32 + 1,
        }));
    }

    fn submit(&mut self, effects: &mut Vec<AiEffect>) {
        let AiPhase::Displaying { index } = self.phase else {
            debug!(phase = %self.phase, "Ignoring submission outside display");
            return;
        };
        if self.outcome.is_some() || self.retry_required {
            debug!("Ignoring submission while a retry is required");
            return;
        }
        let Some(pick) = self.selection.as_ref() else {
            debug!("Ignoring submission without a selection");
            return;
        };
        self.submission = Some(Some(pick.region_id.clone()));
        self.judge(index, effects);
    }

    fn judge(&mut self, index: usize, effects: &mut Vec<AiEffect>) {
        let Some(challenge) = self.challenges.get(index) else {
            return;
        };
        self.attempt += 1;
        self.pending_attempt = Some(self.attempt);
        self.phase = AiPhase::Judging { index };
        effects.push(AiEffect::CancelTimer(TimerKind::Display));
        effects.push(AiEffect::RequestJudge {
            attempt: self.attempt,
            media_url: challenge.media.url.clone(),
            correct_region: challenge.correct_region.clone(),
        });
        effects.push(AiEffect::Notify(AiNotice::Thinking));
    }

    fn on_judge_resolved(&mut self, attempt: u64, guess: RegionId, effects: &mut Vec<AiEffect>) {
        let AiPhase::Judging { index } = self.phase else {
            debug!(attempt, "Discarding judge result outside judging");
            return;
        };
        if self.pending_attempt != Some(attempt) {
            debug!(attempt, pending = ?self.pending_attempt, "Discarding stale judge result");
            return;
        }
        self.pending_attempt = None;
        let Some(challenge) = self.challenges.get(index) else {
            return;
        };

        let player_answer = self.submission.clone().flatten();
        let player_correct = challenge.grade(player_answer.as_ref());
        let ai_correct = challenge.grade(Some(&guess));
        let (player_health, ai_health) =
            score_round(player_correct, ai_correct).apply(self.player_health, self.ai_health);
        self.player_health = player_health;
        self.ai_health = ai_health;

        let round = index as u32 + 1;
        let result = AiRoundResult {
            round,
            correct_answer: challenge.correct_region.clone(),
            player_answer: player_answer.clone(),
            ai_answer: guess.clone(),
            player_correct,
            ai_correct,
            player_health,
            ai_health,
            fun_fact: challenge.fun_fact.clone(),
        };
        let record = RoundRecord {
            round_number: round,
            correct_answer: challenge.correct_region.clone(),
            cultural_data: self.raw.get(index).cloned(),
            player_answer,
            opponent_answer: Some(guess),
            player_correct,
            opponent_correct: ai_correct,
            player_health_after: player_health,
            opponent_health_after: ai_health,
            recorded_at: self.clock.now(),
        };
        if let Err(e) = self.history.append(record) {
            debug!("Round not recorded: {}", e);
        }

        info!(round, player_correct, ai_correct, "AI round resolved");
        if let Some(outcome) = decide_outcome((&player_id(), player_health), (&ai_id(), ai_health)) {
            self.outcome = Some(outcome);
        }
        self.last_result = Some(result.clone());
        self.phase = AiPhase::ShowingResult { index };
        effects.push(AiEffect::StartTimer {
            kind: TimerKind::ResultDisplay,
            duration: self.config.result_display,
        });
        effects.push(AiEffect::Notify(AiNotice::RoundResult(result)));
    }

    fn on_judge_failed(&mut self, attempt: u64, message: String, effects: &mut Vec<AiEffect>) {
        let AiPhase::Judging { index } = self.phase else {
            return;
        };
        if self.pending_attempt != Some(attempt) {
            debug!(attempt, "Discarding stale judge failure");
            return;
        }
        warn!(attempt, "Judge call failed: {}", message);
        self.pending_attempt = None;
        self.retry_required = true;
        self.phase = AiPhase::Displaying { index };
        effects.push(AiEffect::Notify(AiNotice::JudgeFailed { message }));
    }

    fn on_timer(&mut self, kind: TimerKind, effects: &mut Vec<AiEffect>) {
        match (kind, self.phase.clone()) {
            (TimerKind::InitialLoading, AiPhase::InitialLoading) => {
                if !self.challenges.is_empty() {
                    self.display(0, effects);
                } else if self.stream_complete {
                    self.complete(effects);
                } else {
                    debug!("No challenge yet, extending initial wait");
                    effects.push(AiEffect::StartTimer {
                        kind: TimerKind::InitialLoading,
                        duration: self.config.initial_loading,
                    });
                    effects.push(AiEffect::Notify(AiNotice::WaitingForChallenges));
                }
            }
            (TimerKind::Display, AiPhase::Displaying { index }) => {
                if self.retry_required {
                    return;
                }
                debug!(round = index + 1, "Answer window elapsed without submission");
                self.submission = Some(None);
                self.judge(index, effects);
            }
            (TimerKind::ResultDisplay, AiPhase::ShowingResult { .. }) => {
                self.after_result(effects);
            }
            (TimerKind::InterLoading, AiPhase::InterLoading { next }) => {
                if next < self.challenges.len() {
                    self.display(next, effects);
                } else if self.stream_complete {
                    self.complete(effects);
                } else {
                    debug!(next, "Queue dry, extending inter-round wait");
                    effects.push(AiEffect::StartTimer {
                        kind: TimerKind::InterLoading,
                        duration: self.config.inter_loading,
                    });
                    effects.push(AiEffect::Notify(AiNotice::WaitingForChallenges));
                }
            }
            (kind, phase) => debug!(?kind, %phase, "Ignoring stale timer"),
        }
    }

    fn after_result(&mut self, effects: &mut Vec<AiEffect>) {
        let AiPhase::ShowingResult { index } = self.phase else {
            return;
        };
        let round = index as u32 + 1;
        if self.outcome.is_some() || self.config.is_final_round(round) {
            self.complete(effects);
            return;
        }
        let next = index + 1;
        self.phase = AiPhase::InterLoading { next };
        if self.stream_complete && next >= self.challenges.len() {
            self.complete(effects);
            return;
        }
        effects.push(AiEffect::StartTimer {
            kind: TimerKind::InterLoading,
            duration: self.config.inter_loading,
        });
    }

    fn complete(&mut self, effects: &mut Vec<AiEffect>) {
        let outcome = match self.outcome.clone() {
            Some(outcome) => outcome,
            None => decide_by_health((&player_id(), self.player_health), (&ai_id(), self.ai_health)),
        };
        info!(winner = ?outcome.winner, rounds = self.history.len(), "AI match completed");
        self.outcome = Some(outcome.clone());
        self.phase = AiPhase::Completed;
        self.history.freeze();
        effects.push(AiEffect::CancelAllTimers);
        effects.push(AiEffect::CloseStream);
        effects.push(AiEffect::Notify(AiNotice::MatchOver { outcome }));
        if !self.history.is_empty() {
            self.request_summary(effects);
        }
    }

    fn request_summary(&mut self, effects: &mut Vec<AiEffect>) {
        self.summary = SummaryState::Pending;
        effects.push(AiEffect::RequestSummary(self.history.summary_request()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(province: &str) -> StreamMessage {
        StreamMessage::Item(CulturalData {
            province: province.into(),
            media_type: "image".into(),
            media_url: format!("https://media/{}.jpg", province),
            cultural_category: "Dance".into(),
            ..CulturalData::default()
        })
    }

    fn run(state: AiMatchState, inputs: Vec<AiInput>) -> (AiMatchState, Vec<AiEffect>) {
        let mut state = state;
        let mut all = Vec::new();
        for input in inputs {
            let t = state.step(input);
            state = t.state;
            all.extend(t.effects);
        }
        (state, all)
    }

    #[test]
    fn test_initial_wait_rearms_when_queue_is_dry() {
        let (state, effects) = run(
            AiMatchState::new(GameConfig::default()),
            vec![AiInput::Start, AiInput::TimerExpired(TimerKind::InitialLoading)],
        );
        assert_eq!(state.phase(), &AiPhase::InitialLoading);
        assert!(effects.contains(&AiEffect::Notify(AiNotice::WaitingForChallenges)));

        let (state, _) = run(
            state,
            vec![
                AiInput::Stream(item("Aceh")),
                AiInput::TimerExpired(TimerKind::InitialLoading),
            ],
        );
        assert_eq!(state.phase(), &AiPhase::Displaying { index: 0 });
    }

    #[test]
    fn test_stale_judge_attempt_is_discarded() {
        let (state, _) = run(
            AiMatchState::new(GameConfig::default()),
            vec![
                AiInput::Start,
                AiInput::Stream(item("Aceh")),
                AiInput::TimerExpired(TimerKind::InitialLoading),
                AiInput::Select(RegionPick::new("Aceh")),
                AiInput::Submit,
                AiInput::JudgeResolved {
                    attempt: 7,
                    guess: RegionId::new("Aceh"),
                },
            ],
        );
        assert_eq!(state.phase(), &AiPhase::Judging { index: 0 });
    }

    #[test]
    fn test_stream_error_before_first_item() {
        let (state, effects) = run(
            AiMatchState::new(GameConfig::default()),
            vec![
                AiInput::Start,
                AiInput::Stream(StreamMessage::Error {
                    detail: "boom".into(),
                }),
            ],
        );
        assert_eq!(
            state.phase(),
            &AiPhase::Error {
                message: "boom".into()
            }
        );
        assert!(effects.contains(&AiEffect::CloseStream));
    }

    #[test]
    fn test_teardown_discards_late_results() {
        let (state, effects) = run(
            AiMatchState::new(GameConfig::default()),
            vec![
                AiInput::Start,
                AiInput::Stream(item("Aceh")),
                AiInput::TimerExpired(TimerKind::InitialLoading),
                AiInput::Select(RegionPick::new("Aceh")),
                AiInput::Submit,
                AiInput::Teardown,
                AiInput::JudgeResolved {
                    attempt: 1,
                    guess: RegionId::new("Bali"),
                },
            ],
        );
        assert!(state.is_torn_down());
        assert_eq!(state.ai_health(), Health::FULL);
        assert!(effects.contains(&AiEffect::CancelAllTimers));
    }
}
