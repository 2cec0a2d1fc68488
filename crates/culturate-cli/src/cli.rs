//! Command-line interface definitions and parsing

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<String>,

    /// Directory for the saved session
    #[arg(short, long)]
    pub data_dir: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Play a multiplayer match
    Play {
        /// Room code; omit to resume the saved session
        #[arg(short, long)]
        room: Option<String>,
        /// Create the room instead of joining it
        #[arg(long)]
        create: bool,
        /// Player identifier; a random one is used when omitted
        #[arg(short, long)]
        player: Option<String>,
    },
    /// Play against the AI opponent
    VersusAi,
    /// Host rooms for multiplayer matches
    Serve {
        /// Address to listen on
        #[arg(short, long)]
        bind: Option<String>,
    },
    /// Print the effective configuration
    Config,
}
