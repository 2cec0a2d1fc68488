//! Culturate CLI library
//!
//! Argument parsing, configuration and the terminal front end for the
//! `culturate` binary.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod terminal;

pub use cli::{Cli, Commands};
pub use commands::CommandDispatcher;
pub use config::AppConfig;
pub use error::{CliError, Result};
