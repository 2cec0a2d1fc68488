//! Line-oriented terminal front end
//!
//! Reads commands from stdin, forwards them to the engine task and prints
//! engine updates as plain text.

use std::fmt::Write as _;
use std::str::FromStr;

use culturate_core::{
    AiMatchState, AiNotice, AiPhase, AiRoundResult, CulturalData, MatchOutcome, Notice,
    PlayerCommand, PlayerId, RecapStats, RegionPick, SummaryState, VersusState,
};
use culturate_runtime::{AiCommand, EngineUpdate, MatchHandle};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::Result;

// ----------------------------------------------------------------------------
// Input Parsing
// ----------------------------------------------------------------------------

/// One line of terminal input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineCommand {
    Ready,
    Unready,
    Pick(String),
    Submit,
    Continue,
    Retry,
    Dismiss,
    Help,
    Quit,
}

impl FromStr for LineCommand {
    type Err = String;

    fn from_str(line: &str) -> std::result::Result<Self, Self::Err> {
        let line = line.trim();
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };
        match word.to_lowercase().as_str() {
            "ready" | "r" => Ok(LineCommand::Ready),
            "unready" => Ok(LineCommand::Unready),
            "pick" | "p" if !rest.is_empty() => Ok(LineCommand::Pick(rest.to_string())),
            "pick" | "p" => Err("usage: pick <province>".to_string()),
            "submit" | "s" => Ok(LineCommand::Submit),
            "continue" | "c" => Ok(LineCommand::Continue),
            "retry" => Ok(LineCommand::Retry),
            "dismiss" | "d" => Ok(LineCommand::Dismiss),
            "help" | "?" => Ok(LineCommand::Help),
            "quit" | "q" | "exit" => Ok(LineCommand::Quit),
            "" => Err(String::new()),
            other => Err(format!("unknown command: {}", other)),
        }
    }
}

impl LineCommand {
    pub fn into_versus(self) -> Option<PlayerCommand> {
        match self {
            LineCommand::Ready => Some(PlayerCommand::Ready),
            LineCommand::Unready => Some(PlayerCommand::Unready),
            LineCommand::Pick(province) => Some(PlayerCommand::Select(RegionPick::new(province))),
            LineCommand::Submit => Some(PlayerCommand::Submit),
            LineCommand::Continue | LineCommand::Dismiss => Some(PlayerCommand::Continue),
            LineCommand::Quit => Some(PlayerCommand::Leave),
            LineCommand::Retry | LineCommand::Help => None,
        }
    }

    pub fn into_ai(self) -> Option<AiCommand> {
        match self {
            LineCommand::Ready => Some(AiCommand::Start),
            LineCommand::Pick(province) => Some(AiCommand::Select(RegionPick::new(province))),
            LineCommand::Submit => Some(AiCommand::Submit),
            LineCommand::Retry => Some(AiCommand::Retry),
            LineCommand::Continue | LineCommand::Dismiss => Some(AiCommand::Dismiss),
            LineCommand::Quit => Some(AiCommand::Quit),
            LineCommand::Unready | LineCommand::Help => None,
        }
    }
}

const VERSUS_HELP: &str = "commands: ready | unready | pick <province> | submit | continue | quit";
const AI_HELP: &str = "commands: ready (start) | pick <province> | submit | retry | dismiss | quit";

// ----------------------------------------------------------------------------
// Rendering
// ----------------------------------------------------------------------------

pub fn render_notice(notice: &Notice, me: &PlayerId) -> String {
    match notice {
        Notice::Joined { room_id } => format!("Joined room {}. Type `ready` when set.", room_id),
        Notice::OpponentLeft { player } => format!("{} left the room", player),
        Notice::OpponentSelecting { province } => format!("Opponent is looking at {}", province.label()),
        Notice::GameStarted => "Game started!".to_string(),
        Notice::RoundStarted { round } => format!("--- Round {} ---", round),
        Notice::WaitingForOpponent => "Answer locked in. Waiting for opponent...".to_string(),
        Notice::OpponentSubmitted => "Opponent has locked in an answer".to_string(),
        Notice::BothSubmitted { message } => message.clone(),
        Notice::RoundResolved {
            round,
            correct_answer,
            player_correct,
            opponent_correct,
        } => format!(
            "Round {}: answer was {}. You: {}. Opponent: {}.",
            round,
            correct_answer,
            verdict(*player_correct),
            verdict(*opponent_correct)
        ),
        Notice::GameOver { outcome } => render_outcome(outcome, me),
        Notice::ConnectionLost { reason } => format!("Connection lost ({}), reconnecting...", reason),
        Notice::Reconnected => "Reconnected".to_string(),
        Notice::ChannelError { message } => format!("Connection error: {}", message),
        Notice::ServerError { message, attempt } => {
            format!("Server error: {} (attempt {})", message, attempt)
        }
        Notice::Fatal { message } => format!("Giving up: {}. Type `quit` to leave.", message),
    }
}

pub fn render_ai_notice(notice: &AiNotice) -> String {
    match notice {
        AiNotice::WaitingForChallenges => "Waiting for challenges...".to_string(),
        AiNotice::ChallengeShown { round } => format!("--- Round {} ---", round),
        AiNotice::Thinking => "The AI is thinking...".to_string(),
        AiNotice::RoundResult(result) => render_ai_result(result),
        AiNotice::JudgeFailed { message } => {
            format!("The AI could not answer ({}). Type `retry`.", message)
        }
        AiNotice::StreamFailed { detail } => format!("Challenge stream failed: {}", detail),
        AiNotice::MatchOver { outcome } => render_outcome(outcome, &culturate_core::ai::player_id()),
    }
}

fn render_ai_result(result: &AiRoundResult) -> String {
    let mut out = format!(
        "Round {}: answer was {}.\n  You: {} ({})\n  AI:  {} ({})\n  Health: you {} / AI {}",
        result.round,
        result.correct_answer,
        result
            .player_answer
            .as_ref()
            .map_or("no answer", |a| a.as_str()),
        verdict(result.player_correct),
        result.ai_answer,
        verdict(result.ai_correct),
        result.player_health,
        result.ai_health,
    );
    if let Some(fact) = &result.fun_fact {
        let _ = write!(out, "\n  Did you know? {}", fact);
    }
    out
}

pub fn render_outcome(outcome: &MatchOutcome, me: &PlayerId) -> String {
    let headline = match &outcome.winner {
        None => "Game over: it's a draw".to_string(),
        Some(winner) if winner == me => "Game over: you win!".to_string(),
        Some(_) => "Game over: you lose".to_string(),
    };
    let health = outcome
        .final_health
        .iter()
        .map(|(player, health)| format!("{} {}", label(player, me), health))
        .collect::<Vec<_>>()
        .join(", ");
    format!("{} ({})", headline, health)
}

pub fn render_challenge(challenge: &CulturalData, round: u32) -> String {
    let mut out = format!(
        "Round {} [{}] {}: {}",
        round, challenge.cultural_category, challenge.media_type, challenge.media_url
    );
    if let Some(query) = challenge.query.as_deref().filter(|q| !q.is_empty()) {
        let _ = write!(out, "\n  Hint: {}", query);
    }
    out
}

pub fn render_recap(recap: &RecapStats) -> String {
    let mut out = String::from("=== Match Recap ===\n");
    let _ = writeln!(out, "Rounds played: {}", recap.rounds);
    let _ = writeln!(
        out,
        "Your accuracy: {}% ({} correct)",
        recap.player_accuracy, recap.player_correct
    );
    let _ = writeln!(
        out,
        "Opponent accuracy: {}% ({} correct)",
        recap.opponent_accuracy, recap.opponent_correct
    );
    let provinces = recap
        .provinces_explored
        .iter()
        .map(|p| p.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    let _ = writeln!(out, "Provinces explored: {}", if provinces.is_empty() { "none" } else { &provinces });
    let _ = write!(out, "Categories discovered: {}", recap.categories_discovered);
    out
}

fn verdict(correct: bool) -> &'static str {
    if correct {
        "correct"
    } else {
        "wrong"
    }
}

fn label<'a>(player: &'a PlayerId, me: &PlayerId) -> &'a str {
    if player == me {
        "you"
    } else {
        player.as_str()
    }
}

// ----------------------------------------------------------------------------
// Terminal Loops
// ----------------------------------------------------------------------------

/// Forward stdin lines to a channel until EOF
fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if tx.send(line).await.is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("Failed to read stdin: {}", e);
                    break;
                }
            }
        }
    });
    rx
}

/// What the multiplayer screen has already printed
#[derive(Debug, Default)]
struct VersusScreen {
    shown_challenge: Option<u32>,
    recap_printed: bool,
}

impl VersusScreen {
    fn on_state(&mut self, state: &VersusState) {
        if let Some(round) = state.round() {
            if let Some(challenge) = &round.challenge {
                if self.shown_challenge != Some(round.index) {
                    self.shown_challenge = Some(round.index);
                    println!("{}", render_challenge(challenge, round.index));
                }
            }
        }
        if state.outcome().is_some() && !self.recap_printed {
            self.recap_printed = true;
            println!("{}", render_recap(&state.history().recap()));
        }
    }
}

pub async fn run_versus(mut handle: MatchHandle<PlayerCommand>, me: PlayerId) -> Result<()> {
    println!("{}", VERSUS_HELP);
    let mut input = spawn_stdin_reader();
    let mut screen = VersusScreen::default();
    let mut input_open = true;

    loop {
        tokio::select! {
            line = input.recv(), if input_open => match line {
                Some(line) => match line.parse::<LineCommand>() {
                    Ok(LineCommand::Help) => println!("{}", VERSUS_HELP),
                    Ok(command) => match command.into_versus() {
                        Some(command) => handle.send(command).await?,
                        None => println!("not available in multiplayer; {}", VERSUS_HELP),
                    },
                    Err(message) if message.is_empty() => {}
                    Err(message) => println!("{}", message),
                },
                None => {
                    debug!("Stdin closed, leaving the room");
                    input_open = false;
                    handle.send(PlayerCommand::Leave).await?;
                }
            },

            _ = tokio::signal::ctrl_c() => {
                handle.send(PlayerCommand::Leave).await?;
            }

            update = handle.next_update() => match update {
                Some(EngineUpdate::VersusNotice(notice)) => println!("{}", render_notice(&notice, &me)),
                Some(EngineUpdate::Versus(state)) => screen.on_state(&state),
                Some(EngineUpdate::Stopped) | None => break,
                Some(_) => {}
            },
        }
    }

    handle.shutdown().await?;
    Ok(())
}

/// What the AI match screen has already printed
#[derive(Debug, Default)]
struct AiScreen {
    shown_challenge: Option<usize>,
    recap_printed: bool,
    summary: SummaryState,
}

impl AiScreen {
    fn on_state(&mut self, state: &AiMatchState) {
        if let AiPhase::Displaying { index } = state.phase() {
            if self.shown_challenge != Some(*index) {
                if let Some(challenge) = state.current_challenge() {
                    self.shown_challenge = Some(*index);
                    println!("{}", render_challenge(&challenge.cultural_data(), *index as u32 + 1));
                }
            }
        }
        if matches!(state.phase(), AiPhase::Completed) && !self.recap_printed {
            self.recap_printed = true;
            println!("{}", render_recap(&state.history().recap()));
        }
        if state.summary() != &self.summary {
            self.summary = state.summary().clone();
            match &self.summary {
                SummaryState::Ready(feedback) => println!("Coach says: {}", feedback),
                SummaryState::Failed(reason) => {
                    println!("Summary unavailable ({}). Type `retry` to ask again.", reason)
                }
                SummaryState::Pending | SummaryState::NotRequested => {}
            }
        }
    }
}

pub async fn run_ai(mut handle: MatchHandle<AiCommand>) -> Result<()> {
    println!("{}", AI_HELP);
    let mut input = spawn_stdin_reader();
    let mut screen = AiScreen::default();
    let mut input_open = true;
    let mut completed = false;

    loop {
        tokio::select! {
            line = input.recv(), if input_open => match line {
                Some(line) => match line.parse::<LineCommand>() {
                    Ok(LineCommand::Help) => println!("{}", AI_HELP),
                    // After the match `retry` asks for the summary again
                    Ok(LineCommand::Retry) if completed => handle.send(AiCommand::RetrySummary).await?,
                    Ok(command) => match command.into_ai() {
                        Some(command) => handle.send(command).await?,
                        None => println!("not available against the AI; {}", AI_HELP),
                    },
                    Err(message) if message.is_empty() => {}
                    Err(message) => println!("{}", message),
                },
                None => {
                    input_open = false;
                    handle.send(AiCommand::Quit).await?;
                }
            },

            _ = tokio::signal::ctrl_c() => {
                handle.send(AiCommand::Quit).await?;
            }

            update = handle.next_update() => match update {
                Some(EngineUpdate::AiNotice(notice)) => println!("{}", render_ai_notice(&notice)),
                Some(EngineUpdate::Ai(state)) => {
                    completed = matches!(state.phase(), AiPhase::Completed);
                    screen.on_state(&state);
                }
                Some(EngineUpdate::Stopped) | None => break,
                Some(_) => {}
            },
        }
    }

    handle.shutdown().await?;
    Ok(())
}
