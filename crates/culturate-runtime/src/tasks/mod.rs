//! Engine Tasks
//!
//! Each match runs as one tokio task that owns its reducer state. The task
//! turns channel traffic, UI commands and timer deadlines into reducer inputs,
//! executes the effects that come back, and publishes updates to the UI.

mod ai;
mod timers;
mod versus;

pub use ai::{AiCommand, AiTask};
pub use timers::TimerSet;
pub use versus::VersusTask;

use culturate_core::{AiMatchState, AiNotice, CulturateError, CulturateResult, Notice, VersusState};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

// ----------------------------------------------------------------------------
// Updates
// ----------------------------------------------------------------------------

/// What an engine task publishes to its front end
#[derive(Debug, Clone)]
pub enum EngineUpdate {
    /// Multiplayer state after a processed input
    Versus(Box<VersusState>),
    VersusNotice(Notice),
    /// AI match state after a processed input
    Ai(Box<AiMatchState>),
    AiNotice(AiNotice),
    /// The task has exited
    Stopped,
}

/// Best-effort publish; a missing front end is not an error
pub(crate) async fn publish(updates: &mpsc::Sender<EngineUpdate>, update: EngineUpdate) {
    if updates.send(update).await.is_err() {
        debug!("Update receiver dropped");
    }
}

// ----------------------------------------------------------------------------
// Match Handle
// ----------------------------------------------------------------------------

/// Front-end side of a running engine task
pub struct MatchHandle<C> {
    commands: mpsc::Sender<C>,
    updates: mpsc::Receiver<EngineUpdate>,
    task: JoinHandle<CulturateResult<()>>,
}

impl<C: Send + 'static> MatchHandle<C> {
    pub(crate) fn new(
        commands: mpsc::Sender<C>,
        updates: mpsc::Receiver<EngineUpdate>,
        task: JoinHandle<CulturateResult<()>>,
    ) -> Self {
        Self {
            commands,
            updates,
            task,
        }
    }

    pub async fn send(&self, command: C) -> CulturateResult<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| CulturateError::channel_error("Engine task stopped"))
    }

    pub fn sender(&self) -> mpsc::Sender<C> {
        self.commands.clone()
    }

    pub async fn next_update(&mut self) -> Option<EngineUpdate> {
        self.updates.recv().await
    }

    pub fn try_update(&mut self) -> Option<EngineUpdate> {
        self.updates.try_recv().ok()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Split into command sender and update receiver; the task keeps running detached
    pub fn split(self) -> (mpsc::Sender<C>, mpsc::Receiver<EngineUpdate>) {
        (self.commands, self.updates)
    }

    /// Close the command channel and wait for the task to exit
    pub async fn shutdown(self) -> CulturateResult<()> {
        let MatchHandle {
            commands,
            mut updates,
            task,
        } = self;
        drop(commands);
        // Keep draining so the task never blocks on a full update buffer
        let drain = tokio::spawn(async move { while updates.recv().await.is_some() {} });
        let result = task
            .await
            .map_err(|e| CulturateError::channel_error(format!("Engine task failed: {}", e)))?;
        drain.abort();
        result
    }
}
