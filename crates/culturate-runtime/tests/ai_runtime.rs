//! AI match integration tests
//!
//! The engine task runs against a scripted challenge feed and in-process
//! judge/summarizer doubles.

use async_trait::async_trait;
use culturate_core::ai::player_id;
use culturate_core::{
    AiNotice, AiPhase, CulturalData, CulturateError, CulturateResult, RegionId, RegionPick,
    StreamMessage, SummaryEntry, SummaryState,
};
use culturate_runtime::{
    AiCommand, ChallengeFeed, EngineUpdate, Judge, MatchHandle, RuntimeBuilder, ScriptedFeed,
    Summarizer,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

// ----------------------------------------------------------------------------
// Test Utilities
// ----------------------------------------------------------------------------

fn item(province: &str) -> StreamMessage {
    StreamMessage::Item(CulturalData {
        province: province.into(),
        media_type: "image".into(),
        media_url: format!("https://media.example/{}.jpg", province.to_lowercase()),
        cultural_category: "Dance".into(),
        ..CulturalData::default()
    })
}

/// Always guesses `guess`, failing the first `failures` calls
struct FixedJudge {
    guess: RegionId,
    failures: AtomicUsize,
    calls: AtomicUsize,
}

impl FixedJudge {
    fn new(guess: &str, failures: usize) -> Arc<Self> {
        Arc::new(Self {
            guess: RegionId::new(guess),
            failures: AtomicUsize::new(failures),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Judge for FixedJudge {
    async fn judge(&self, _media_url: &str, _correct: &RegionId) -> CulturateResult<RegionId> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(CulturateError::connection("judge unavailable"));
        }
        Ok(self.guess.clone())
    }
}

/// Never answers
struct StalledJudge;

#[async_trait]
impl Judge for StalledJudge {
    async fn judge(&self, _media_url: &str, _correct: &RegionId) -> CulturateResult<RegionId> {
        std::future::pending().await
    }
}

struct CountingSummarizer {
    rounds_seen: AtomicUsize,
}

#[async_trait]
impl Summarizer for CountingSummarizer {
    async fn summarize(&self, entries: &[SummaryEntry]) -> CulturateResult<String> {
        self.rounds_seen.store(entries.len(), Ordering::SeqCst);
        Ok(format!("You played {} rounds", entries.len()))
    }
}

struct RefusedFeed;

#[async_trait]
impl ChallengeFeed for RefusedFeed {
    async fn open(&self) -> CulturateResult<mpsc::Receiver<StreamMessage>> {
        Err(CulturateError::connection("connection refused"))
    }
}

fn summarizer() -> Arc<CountingSummarizer> {
    Arc::new(CountingSummarizer {
        rounds_seen: AtomicUsize::new(0),
    })
}

fn spawn(
    feed: Arc<dyn ChallengeFeed>,
    judge: Arc<dyn Judge>,
    summarizer: Arc<dyn Summarizer>,
) -> MatchHandle<AiCommand> {
    RuntimeBuilder::testing()
        .spawn_ai(feed, judge, summarizer)
        .expect("valid config")
}

async fn wait_for<F>(handle: &mut MatchHandle<AiCommand>, mut matches: F) -> EngineUpdate
where
    F: FnMut(&EngineUpdate) -> bool,
{
    timeout(Duration::from_secs(30), async {
        loop {
            match handle.next_update().await {
                Some(update) if matches(&update) => return update,
                Some(_) => continue,
                None => panic!("engine task ended before the expected update"),
            }
        }
    })
    .await
    .expect("expected update within timeout")
}

async fn wait_notice<F>(handle: &mut MatchHandle<AiCommand>, mut matches: F) -> AiNotice
where
    F: FnMut(&AiNotice) -> bool,
{
    match wait_for(handle, |u| matches!(u, EngineUpdate::AiNotice(n) if matches(n))).await {
        EngineUpdate::AiNotice(notice) => notice,
        _ => unreachable!(),
    }
}

async fn answer(handle: &MatchHandle<AiCommand>, province: &str) {
    handle
        .send(AiCommand::Select(RegionPick::new(province)))
        .await
        .unwrap();
    handle.send(AiCommand::Submit).await.unwrap();
}

// ----------------------------------------------------------------------------
// Scenarios
// ----------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_full_ai_match_with_summary() {
    let feed = Arc::new(ScriptedFeed::new(vec![
        StreamMessage::Status {
            message: "searching".into(),
        },
        item("Aceh"),
        item("Bali"),
        StreamMessage::Complete,
    ]));
    let judge = FixedJudge::new("Papua", 0);
    let summary = summarizer();
    let mut handle = spawn(feed, judge.clone(), summary.clone());

    handle.send(AiCommand::Start).await.unwrap();
    for (round, province) in [(1u32, "Aceh"), (2, "Bali")] {
        wait_notice(&mut handle, |n| matches!(n, AiNotice::ChallengeShown { round: r } if *r == round)).await;
        answer(&handle, province).await;

        let AiNotice::RoundResult(result) =
            wait_notice(&mut handle, |n| matches!(n, AiNotice::RoundResult(_))).await
        else {
            unreachable!()
        };
        assert_eq!(result.round, round);
        assert!(result.player_correct);
        assert!(!result.ai_correct);
        assert_eq!(result.ai_answer.as_str(), "Papua");
        handle.send(AiCommand::Dismiss).await.unwrap();
    }

    let AiNotice::MatchOver { outcome } =
        wait_notice(&mut handle, |n| matches!(n, AiNotice::MatchOver { .. })).await
    else {
        unreachable!()
    };
    assert!(outcome.is_winner(&player_id()));

    wait_for(&mut handle, |u| {
        matches!(u, EngineUpdate::Ai(state) if matches!(state.summary(), SummaryState::Ready(_)))
    })
    .await;
    assert_eq!(summary.rounds_seen.load(Ordering::SeqCst), 2);
    assert_eq!(judge.calls.load(Ordering::SeqCst), 2);

    handle.send(AiCommand::Quit).await.unwrap();
    wait_for(&mut handle, |u| matches!(u, EngineUpdate::Stopped)).await;
}

#[tokio::test(start_paused = true)]
async fn test_judge_failure_waits_for_retry() {
    let feed = Arc::new(ScriptedFeed::new(vec![item("Aceh"), StreamMessage::Complete]));
    let judge = FixedJudge::new("Aceh", 1);
    let mut handle = spawn(feed, judge.clone(), summarizer());

    handle.send(AiCommand::Start).await.unwrap();
    wait_notice(&mut handle, |n| matches!(n, AiNotice::ChallengeShown { round: 1 })).await;
    answer(&handle, "Bali").await;
    wait_notice(&mut handle, |n| matches!(n, AiNotice::JudgeFailed { .. })).await;

    // Well past the answer window: nothing moves until the player retries
    tokio::time::sleep(Duration::from_secs(2)).await;
    while let Some(update) = handle.try_update() {
        assert!(!matches!(update, EngineUpdate::AiNotice(AiNotice::RoundResult(_))));
    }
    assert_eq!(judge.calls.load(Ordering::SeqCst), 1);

    handle.send(AiCommand::Retry).await.unwrap();
    let AiNotice::RoundResult(result) =
        wait_notice(&mut handle, |n| matches!(n, AiNotice::RoundResult(_))).await
    else {
        unreachable!()
    };
    assert_eq!(result.player_answer, Some(RegionId::new("Bali")));
    assert!(!result.player_correct);
    assert!(result.ai_correct);
    assert_eq!(judge.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_unanswered_round_is_judged_at_timeout() {
    let feed = Arc::new(ScriptedFeed::new(vec![item("Aceh"), StreamMessage::Complete]));
    let mut handle = spawn(feed, FixedJudge::new("Aceh", 0), summarizer());

    handle.send(AiCommand::Start).await.unwrap();
    wait_notice(&mut handle, |n| matches!(n, AiNotice::ChallengeShown { round: 1 })).await;

    let AiNotice::RoundResult(result) =
        wait_notice(&mut handle, |n| matches!(n, AiNotice::RoundResult(_))).await
    else {
        unreachable!()
    };
    assert_eq!(result.player_answer, None);
    assert!(!result.player_correct);
    assert_eq!(result.player_health.value(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_stream_open_failure_ends_in_error() {
    let mut handle = spawn(Arc::new(RefusedFeed), FixedJudge::new("Aceh", 0), summarizer());

    handle.send(AiCommand::Start).await.unwrap();
    wait_notice(&mut handle, |n| matches!(n, AiNotice::StreamFailed { .. })).await;
    wait_for(&mut handle, |u| {
        matches!(u, EngineUpdate::Ai(state) if matches!(state.phase(), AiPhase::Error { .. }))
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn test_quit_abandons_pending_judge() {
    let feed = Arc::new(ScriptedFeed::new(vec![item("Aceh"), StreamMessage::Complete]));
    let mut handle = spawn(feed, Arc::new(StalledJudge), summarizer());

    handle.send(AiCommand::Start).await.unwrap();
    wait_notice(&mut handle, |n| matches!(n, AiNotice::ChallengeShown { round: 1 })).await;
    answer(&handle, "Aceh").await;
    wait_notice(&mut handle, |n| matches!(n, AiNotice::Thinking)).await;

    handle.send(AiCommand::Quit).await.unwrap();
    wait_for(&mut handle, |u| matches!(u, EngineUpdate::Stopped)).await;
    assert!(timeout(Duration::from_secs(1), handle.shutdown()).await.is_ok());
}
