//! Command handlers for the Culturate CLI

use std::sync::Arc;

use tracing::info;

use culturate_core::{PlayerId, RoomId, Session, SessionStore};
use culturate_runtime::{FileSessionStore, RoomServer, RuntimeBuilder};

use crate::cli::{Cli, Commands};
use crate::config::AppConfig;
use crate::error::{CliError, Result};
use crate::terminal;

/// Command dispatcher for handling CLI commands
pub struct CommandDispatcher;

impl CommandDispatcher {
    /// Execute a CLI command
    pub async fn execute(cli: Cli, config: AppConfig) -> Result<()> {
        match cli.command {
            Commands::Play {
                room,
                create,
                player,
            } => Self::handle_play_command(config, room, create, player).await,
            Commands::VersusAi => Self::handle_versus_ai_command(config).await,
            Commands::Serve { bind } => Self::handle_serve_command(config, bind).await,
            Commands::Config => {
                println!("{}", config.to_toml()?);
                Ok(())
            }
        }
    }

    fn runtime(config: &AppConfig) -> RuntimeBuilder {
        RuntimeBuilder::new()
            .with_game_config(config.game.clone())
            .with_channel_config(config.channels.clone())
            .with_endpoints(config.endpoints.clone())
    }

    /// Handle the multiplayer command
    async fn handle_play_command(
        config: AppConfig,
        room: Option<String>,
        create: bool,
        player: Option<String>,
    ) -> Result<()> {
        let store = Arc::new(FileSessionStore::new(config.session_path()));
        let explicit = Self::explicit_session(room, create, player)?;
        let lookup = Arc::clone(&store);
        let session = tokio::task::spawn_blocking(move || Session::resolve(explicit, lookup.as_ref()))
            .await
            .map_err(|e| CliError::Session(format!("Session lookup failed: {}", e)))??
            .ok_or_else(|| {
                CliError::Session("No saved session; pass --room <code> or --create".to_string())
            })?;

        if session.created {
            println!("Room code: {} (share it with your opponent)", session.room_id);
        }
        info!(room = %session.room_id, player = %session.player_id, "Starting multiplayer match");

        let me = session.player_id.clone();
        let store: Arc<dyn SessionStore> = store;
        let handle = Self::runtime(&config).connect_versus(session, store)?;
        terminal::run_versus(handle, me).await
    }

    /// Build the session named on the command line, if any
    fn explicit_session(
        room: Option<String>,
        create: bool,
        player: Option<String>,
    ) -> Result<Option<Session>> {
        let room_id = match (room, create) {
            (Some(code), _) => {
                let code = code.trim().to_uppercase();
                if code.is_empty() {
                    return Err(CliError::Session("Room code must not be empty".to_string()));
                }
                RoomId::new(code)
            }
            (None, true) => RoomId::generate(),
            (None, false) => return Ok(None),
        };
        let player_id = player
            .filter(|p| !p.trim().is_empty())
            .map(PlayerId::new)
            .unwrap_or_else(PlayerId::generate);
        Ok(Some(Session::new(room_id, player_id, create)))
    }

    /// Handle the AI match command
    async fn handle_versus_ai_command(config: AppConfig) -> Result<()> {
        info!(stream = %config.endpoints.stream_url, "Starting AI match");
        let handle = Self::runtime(&config).connect_ai()?;
        println!("Type `ready` to start the match.");
        terminal::run_ai(handle).await
    }

    /// Handle the room server command
    async fn handle_serve_command(mut config: AppConfig, bind: Option<String>) -> Result<()> {
        if let Some(bind) = bind {
            config.server.bind = bind;
        }
        let server = RoomServer::new(config.server.clone(), config.game.clone());
        tokio::select! {
            result = server.serve() => result?,
            _ = tokio::signal::ctrl_c() => info!("Shutting down room server"),
        }
        Ok(())
    }
}
