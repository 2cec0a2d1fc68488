//! AI match engine task

use super::{publish, EngineUpdate, TimerSet};
use crate::remote::{Judge, Summarizer};
use crate::stream::ChallengeFeed;
use culturate_core::{AiEffect, AiInput, AiMatchState, CulturateResult, RegionPick, StreamMessage};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Front-end actions for an AI match
#[derive(Debug, Clone, PartialEq)]
pub enum AiCommand {
    Start,
    Select(RegionPick),
    Submit,
    /// Re-run a failed judge call
    Retry,
    Dismiss,
    RetrySummary,
    Quit,
}

impl From<AiCommand> for AiInput {
    fn from(command: AiCommand) -> Self {
        match command {
            AiCommand::Start => AiInput::Start,
            AiCommand::Select(pick) => AiInput::Select(pick),
            AiCommand::Submit => AiInput::Submit,
            AiCommand::Retry => AiInput::Retry,
            AiCommand::Dismiss => AiInput::DismissResult,
            AiCommand::RetrySummary => AiInput::RetrySummary,
            AiCommand::Quit => AiInput::Teardown,
        }
    }
}

/// Drives an `AiMatchState` against the challenge feed, judge and summarizer
pub struct AiTask {
    state: Option<AiMatchState>,
    feed: Arc<dyn ChallengeFeed>,
    judge: Arc<dyn Judge>,
    summarizer: Arc<dyn Summarizer>,
    stream: Option<mpsc::Receiver<StreamMessage>>,
    timers: TimerSet,
    commands: mpsc::Receiver<AiCommand>,
    updates: mpsc::Sender<EngineUpdate>,
    /// Completions of spawned judge and summary calls
    results_tx: mpsc::UnboundedSender<AiInput>,
    results_rx: mpsc::UnboundedReceiver<AiInput>,
    in_flight: Vec<JoinHandle<()>>,
    running: bool,
}

impl AiTask {
    pub fn new(
        state: AiMatchState,
        feed: Arc<dyn ChallengeFeed>,
        judge: Arc<dyn Judge>,
        summarizer: Arc<dyn Summarizer>,
        commands: mpsc::Receiver<AiCommand>,
        updates: mpsc::Sender<EngineUpdate>,
    ) -> Self {
        let (results_tx, results_rx) = mpsc::unbounded_channel();
        Self {
            state: Some(state),
            feed,
            judge,
            summarizer,
            stream: None,
            timers: TimerSet::new(),
            commands,
            updates,
            results_tx,
            results_rx,
            in_flight: Vec::new(),
            running: true,
        }
    }

    pub async fn run(mut self) -> CulturateResult<()> {
        info!("AI match task starting");

        while self.running {
            tokio::select! {
                command = self.commands.recv() => {
                    let command = command.unwrap_or(AiCommand::Quit);
                    let quit = command == AiCommand::Quit;
                    self.apply(command.into()).await;
                    if quit {
                        self.running = false;
                    }
                }

                message = next_message(&mut self.stream) => match message {
                    Some(message) => self.apply(AiInput::Stream(message)).await,
                    None => {
                        debug!("Challenge stream closed");
                        self.stream = None;
                    }
                },

                Some(result) = self.results_rx.recv() => {
                    self.apply(result).await;
                }

                kind = self.timers.expired() => {
                    self.apply(AiInput::TimerExpired(kind)).await;
                }
            }
        }

        self.abandon_in_flight();
        self.stream = None;
        self.timers.cancel_all();
        publish(&self.updates, EngineUpdate::Stopped).await;
        info!("AI match task stopped");
        Ok(())
    }

    /// Step the reducer, feeding follow-up inputs raised while executing effects
    async fn apply(&mut self, input: AiInput) {
        let mut queue = VecDeque::from([input]);
        while let Some(input) = queue.pop_front() {
            let Some(state) = self.state.take() else {
                error!("Reducer state missing");
                self.running = false;
                return;
            };
            let transition = state.step(input);
            self.state = Some(transition.state);

            for effect in transition.effects {
                if let Some(follow_up) = self.execute(effect).await {
                    queue.push_back(follow_up);
                }
            }
        }

        if let Some(state) = self.state.as_ref() {
            publish(&self.updates, EngineUpdate::Ai(Box::new(state.clone()))).await;
        }
    }

    async fn execute(&mut self, effect: AiEffect) -> Option<AiInput> {
        match effect {
            AiEffect::OpenStream => match self.feed.open().await {
                Ok(stream) => {
                    self.stream = Some(stream);
                    None
                }
                Err(e) => Some(AiInput::Stream(StreamMessage::Error {
                    detail: e.to_string(),
                })),
            },
            AiEffect::CloseStream => {
                self.stream = None;
                None
            }
            AiEffect::RequestJudge {
                attempt,
                media_url,
                correct_region,
            } => {
                let judge = Arc::clone(&self.judge);
                let results = self.results_tx.clone();
                self.track(tokio::spawn(async move {
                    let input = match judge.judge(&media_url, &correct_region).await {
                        Ok(guess) => AiInput::JudgeResolved { attempt, guess },
                        Err(e) => AiInput::JudgeFailed {
                            attempt,
                            message: e.to_string(),
                        },
                    };
                    let _ = results.send(input);
                }));
                None
            }
            AiEffect::RequestSummary(entries) => {
                let summarizer = Arc::clone(&self.summarizer);
                let results = self.results_tx.clone();
                self.track(tokio::spawn(async move {
                    let input = match summarizer.summarize(&entries).await {
                        Ok(feedback) => AiInput::SummaryResolved { feedback },
                        Err(e) => AiInput::SummaryFailed {
                            message: e.to_string(),
                        },
                    };
                    let _ = results.send(input);
                }));
                None
            }
            AiEffect::StartTimer { kind, duration } => {
                self.timers.arm(kind, duration);
                None
            }
            AiEffect::CancelTimer(kind) => {
                self.timers.cancel(kind);
                None
            }
            AiEffect::CancelAllTimers => {
                self.timers.cancel_all();
                if self.state.as_ref().is_some_and(|s| s.is_torn_down()) {
                    self.abandon_in_flight();
                }
                None
            }
            AiEffect::Notify(notice) => {
                publish(&self.updates, EngineUpdate::AiNotice(notice)).await;
                None
            }
        }
    }

    fn track(&mut self, handle: JoinHandle<()>) {
        self.in_flight.retain(|h| !h.is_finished());
        self.in_flight.push(handle);
    }

    /// Drop outstanding remote calls without waiting for them
    fn abandon_in_flight(&mut self) {
        for handle in self.in_flight.drain(..) {
            handle.abort();
        }
    }
}

async fn next_message(stream: &mut Option<mpsc::Receiver<StreamMessage>>) -> Option<StreamMessage> {
    match stream {
        Some(stream) => stream.recv().await,
        None => std::future::pending().await,
    }
}
