//! Culturate CLI Configuration
//!
//! Layered loading with priority: command line > `CULTURATE_*` environment
//! variables > TOML file > defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use culturate_core::{ChannelConfig, EndpointConfig, GameConfig};
use culturate_runtime::ServerConfig;

use crate::error::{CliError, Result};

const SESSION_FILE: &str = "session.json";

// ----------------------------------------------------------------------------
// Application Configuration
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub game: GameConfig,
    pub endpoints: EndpointConfig,
    pub channels: ChannelConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub verbose: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Directory holding the saved session (defaults to the user data dir)
    pub data_dir: Option<PathBuf>,
}

impl AppConfig {
    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            CliError::Config(format!("Failed to read {}: {}", path.as_ref().display(), e))
        })?;
        let config: AppConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Apply `CULTURATE_*` overrides from the process environment
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from `lookup`, which maps variable names to values
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let targets: [(&str, &mut String); 5] = [
            ("CULTURATE_REALTIME_URL", &mut self.endpoints.realtime_url),
            ("CULTURATE_STREAM_URL", &mut self.endpoints.stream_url),
            ("CULTURATE_JUDGE_URL", &mut self.endpoints.judge_url),
            ("CULTURATE_SUMMARY_URL", &mut self.endpoints.summary_url),
            ("CULTURATE_BIND", &mut self.server.bind),
        ];
        for (key, target) in targets {
            if let Some(value) = lookup(key).filter(|v| !v.trim().is_empty()) {
                *target = value;
            }
        }
        if let Some(dir) = lookup("CULTURATE_DATA_DIR").filter(|v| !v.trim().is_empty()) {
            self.session.data_dir = Some(PathBuf::from(dir));
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.game.validate()?;

        let endpoints = [
            ("realtime_url", &self.endpoints.realtime_url, &["ws://", "wss://"][..]),
            ("stream_url", &self.endpoints.stream_url, &["http://", "https://"][..]),
            ("judge_url", &self.endpoints.judge_url, &["http://", "https://"][..]),
            ("summary_url", &self.endpoints.summary_url, &["http://", "https://"][..]),
        ];
        for (name, url, schemes) in endpoints {
            if !schemes.iter().any(|scheme| url.starts_with(scheme)) {
                return Err(CliError::Config(format!(
                    "{} must start with one of {:?}: {}",
                    name, schemes, url
                )));
            }
        }

        if self.channels.command_buffer_size == 0
            || self.channels.event_buffer_size == 0
            || self.channels.update_buffer_size == 0
        {
            return Err(CliError::Config("Channel buffers must be non-zero".to_string()));
        }
        if self.server.tick_interval.is_zero() {
            return Err(CliError::Config("Server tick interval must be non-zero".to_string()));
        }
        Ok(())
    }

    /// Where the current session is persisted
    pub fn session_path(&self) -> PathBuf {
        let dir = self
            .session
            .data_dir
            .clone()
            .or_else(|| dirs::data_dir().map(|d| d.join("culturate")))
            .unwrap_or_else(|| PathBuf::from(".culturate"));
        dir.join(SESSION_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;

    #[test]
    fn test_defaults_are_valid() {
        AppConfig::default().validate().unwrap();
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [endpoints]
            realtime_url = "wss://play.example.org/socket"

            [game]
            starting_health = 5
            max_rounds = 7
            "#,
        )
        .unwrap();
        assert_eq!(config.endpoints.realtime_url, "wss://play.example.org/socket");
        assert_eq!(config.endpoints.judge_url, EndpointConfig::default().judge_url);
        assert_eq!(config.game.starting_health, 5);
        assert_eq!(config.game.max_rounds, 7);
        assert_eq!(config.game.answer_window, Duration::from_secs(30));
    }

    #[test]
    fn test_durations_read_as_milliseconds() {
        let config: AppConfig = toml::from_str(
            r#"
            [game]
            answer_window_ms = 45000
            rejoin_delay_ms = 250

            [server]
            tick_interval_ms = 200
            "#,
        )
        .unwrap();
        assert_eq!(config.game.answer_window, Duration::from_secs(45));
        assert_eq!(config.game.rejoin_delay, Duration::from_millis(250));
        assert_eq!(config.server.tick_interval, Duration::from_millis(200));

        let text = AppConfig::default().to_toml().unwrap();
        assert!(text.contains("answer_window_ms = 30000"));
        assert!(!text.contains("secs"));
    }

    #[test]
    fn test_toml_round_trip_of_defaults() {
        let config = AppConfig::default();
        let text = config.to_toml().unwrap();
        let parsed: AppConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_environment_overrides() {
        let env: HashMap<&str, &str> = [
            ("CULTURATE_JUDGE_URL", "https://judge.example.org/guess"),
            ("CULTURATE_BIND", "0.0.0.0:9000"),
            ("CULTURATE_STREAM_URL", "  "),
            ("CULTURATE_DATA_DIR", "/tmp/culturate-test"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.endpoints.judge_url, "https://judge.example.org/guess");
        assert_eq!(config.server.bind, "0.0.0.0:9000");
        assert_eq!(config.endpoints.stream_url, EndpointConfig::default().stream_url);
        assert_eq!(
            config.session_path(),
            PathBuf::from("/tmp/culturate-test").join("session.json")
        );
    }

    #[test]
    fn test_rejects_wrong_scheme() {
        let mut config = AppConfig::default();
        config.endpoints.realtime_url = "http://127.0.0.1:3000".into();
        assert!(matches!(config.validate(), Err(CliError::Config(_))));
    }

    #[test]
    fn test_rejects_invalid_game_rules() {
        let mut config = AppConfig::default();
        config.game.starting_health = 0;
        assert!(matches!(config.validate(), Err(CliError::Culturate(_))));
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let path = std::env::temp_dir().join(format!("culturate-{}.toml", uuid::Uuid::new_v4()));
        assert!(matches!(AppConfig::load_from_file(&path), Err(CliError::Config(_))));
    }
}
