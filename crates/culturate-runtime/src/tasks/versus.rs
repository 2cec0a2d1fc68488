//! Multiplayer engine task

use super::{publish, EngineUpdate, TimerSet};
use crate::channel::{ChannelMessage, RealtimeChannel};
use culturate_core::{
    ChannelSignal, CulturateResult, Effect, PlayerCommand, SessionStore, VersusInput, VersusState,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Drives a `VersusState` against a realtime channel
pub struct VersusTask {
    state: Option<VersusState>,
    channel: Box<dyn RealtimeChannel>,
    store: Arc<dyn SessionStore>,
    timers: TimerSet,
    commands: mpsc::Receiver<PlayerCommand>,
    updates: mpsc::Sender<EngineUpdate>,
    running: bool,
}

impl VersusTask {
    pub fn new(
        state: VersusState,
        channel: Box<dyn RealtimeChannel>,
        store: Arc<dyn SessionStore>,
        commands: mpsc::Receiver<PlayerCommand>,
        updates: mpsc::Sender<EngineUpdate>,
    ) -> Self {
        Self {
            state: Some(state),
            channel,
            store,
            timers: TimerSet::new(),
            commands,
            updates,
            running: true,
        }
    }

    pub async fn run(mut self) -> CulturateResult<()> {
        info!(room = %self.session_room(), "Multiplayer task starting");

        while self.running {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.apply(VersusInput::Command(command)).await,
                    None => {
                        info!("Command channel closed, leaving room");
                        self.apply(VersusInput::Command(PlayerCommand::Leave)).await;
                        self.running = false;
                    }
                },

                message = self.channel.recv() => match message {
                    Some(message) => {
                        let input = match message {
                            ChannelMessage::Connected => VersusInput::Channel(ChannelSignal::Connected),
                            ChannelMessage::Disconnected { reason } => {
                                VersusInput::Channel(ChannelSignal::Disconnected { reason })
                            }
                            ChannelMessage::Error { message } => {
                                VersusInput::Channel(ChannelSignal::Error { message })
                            }
                            ChannelMessage::Event(event) => {
                                debug!(event = event.name(), "Received");
                                VersusInput::Server(event)
                            }
                        };
                        self.apply(input).await;
                    }
                    None => {
                        warn!("Realtime channel closed");
                        self.running = false;
                    }
                },

                kind = self.timers.expired() => {
                    self.apply(VersusInput::TimerExpired(kind)).await;
                }
            }
        }

        self.timers.cancel_all();
        publish(&self.updates, EngineUpdate::Stopped).await;
        info!("Multiplayer task stopped");
        Ok(())
    }

    fn session_room(&self) -> String {
        self.state
            .as_ref()
            .map(|s| s.session().room_id.to_string())
            .unwrap_or_default()
    }

    /// Step the reducer once and carry out its effects
    async fn apply(&mut self, input: VersusInput) {
        let Some(state) = self.state.take() else {
            error!("Reducer state missing");
            self.running = false;
            return;
        };
        let transition = state.step(input);
        self.state = Some(transition.state);

        for effect in transition.effects {
            self.execute(effect).await;
        }

        if let Some(state) = self.state.as_ref() {
            publish(&self.updates, EngineUpdate::Versus(Box::new(state.clone()))).await;
        }
    }

    async fn execute(&mut self, effect: Effect) {
        match effect {
            Effect::Send(event) => {
                let name = event.name();
                if let Err(e) = self.channel.send(event).await {
                    // Reconnect and resync recover whatever was lost here
                    warn!(event = name, "Failed to send: {}", e);
                }
            }
            Effect::StartTimer { kind, duration } => self.timers.arm(kind, duration),
            Effect::CancelTimer(kind) => self.timers.cancel(kind),
            Effect::CancelAllTimers => self.timers.cancel_all(),
            Effect::PersistSession => {
                if let Some(session) = self.state.as_ref().map(|s| s.session().clone()) {
                    self.with_store("persist", move |store| store.save(&session)).await;
                }
            }
            Effect::ClearSession => {
                self.with_store("clear", |store| store.clear()).await;
            }
            Effect::Notify(notice) => {
                publish(&self.updates, EngineUpdate::VersusNotice(notice)).await;
            }
            Effect::CloseChannel => {
                self.channel.close().await;
                self.running = false;
            }
        }
    }

    /// Session stores may touch the disk; run them on the blocking pool
    fn with_store<F>(
        &self,
        action: &'static str,
        op: F,
    ) -> impl std::future::Future<Output = ()> + Send + 'static
    where
        F: FnOnce(&dyn SessionStore) -> CulturateResult<()> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        async move {
            match tokio::task::spawn_blocking(move || op(store.as_ref())).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Failed to {} session: {}", action, e),
                Err(e) => warn!("Session {} task failed: {}", action, e),
            }
        }
    }
}
