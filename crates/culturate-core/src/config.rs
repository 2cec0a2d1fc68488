//! Centralized Configuration
//!
//! Timing, health and connection settings shared by the engines, the runtime
//! tasks and the CLI. Every wall-clock interval in a match is configured here.

use crate::errors::{CulturateError, Result};
use crate::types::Health;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Durations as whole milliseconds, so config files hold plain integers
pub mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

// ----------------------------------------------------------------------------
// Game Configuration
// ----------------------------------------------------------------------------

/// Round timing and match rules
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    /// Answer window per round (multiplayer timeout, AI display window)
    #[serde(rename = "answer_window_ms", with = "millis")]
    pub answer_window: Duration,
    /// Result/learning display before the next round
    #[serde(rename = "result_display_ms", with = "millis")]
    pub result_display: Duration,
    /// Wait for the first challenge of an AI match
    #[serde(rename = "initial_loading_ms", with = "millis")]
    pub initial_loading: Duration,
    /// Pause between AI rounds
    #[serde(rename = "inter_loading_ms", with = "millis")]
    pub inter_loading: Duration,
    /// Delay before leaving a finished match
    #[serde(rename = "game_over_redirect_ms", with = "millis")]
    pub game_over_redirect: Duration,
    /// Resync request if no state arrives after entering a round
    #[serde(rename = "resync_fallback_ms", with = "millis")]
    pub resync_fallback: Duration,
    /// Delay between reconnect and rejoin
    #[serde(rename = "rejoin_delay_ms", with = "millis")]
    pub rejoin_delay: Duration,
    /// Rejoin attempts after server errors before giving up
    pub max_protocol_retries: u32,
    pub starting_health: u8,
    /// 0 means rounds continue until someone runs out of health
    pub max_rounds: u32,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            answer_window: Duration::from_secs(30),
            result_display: Duration::from_secs(8),
            initial_loading: Duration::from_secs(10),
            inter_loading: Duration::from_secs(5),
            game_over_redirect: Duration::from_secs(5),
            resync_fallback: Duration::from_secs(3),
            rejoin_delay: Duration::from_millis(500),
            max_protocol_retries: 3,
            starting_health: 3,
            max_rounds: 0,
        }
    }
}

impl GameConfig {
    /// Short intervals for fast tests and local demos
    pub fn testing() -> Self {
        Self {
            answer_window: Duration::from_millis(300),
            result_display: Duration::from_millis(80),
            initial_loading: Duration::from_millis(100),
            inter_loading: Duration::from_millis(50),
            game_over_redirect: Duration::from_millis(50),
            resync_fallback: Duration::from_millis(30),
            rejoin_delay: Duration::from_millis(5),
            ..Self::default()
        }
    }

    pub fn starting_health(&self) -> Health {
        Health::new(self.starting_health)
    }

    /// Whether `round` was the last one allowed by `max_rounds`
    pub fn is_final_round(&self, round: u32) -> bool {
        self.max_rounds != 0 && round >= self.max_rounds
    }

    pub fn validate(&self) -> Result<()> {
        if self.starting_health == 0 {
            return Err(CulturateError::config_error(
                "starting_health must be at least 1",
            ));
        }
        if self.answer_window.is_zero() {
            return Err(CulturateError::config_error(
                "answer_window must be non-zero",
            ));
        }
        if self.initial_loading.is_zero() || self.inter_loading.is_zero() {
            return Err(CulturateError::config_error(
                "loading intervals must be non-zero",
            ));
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Channel Configuration
// ----------------------------------------------------------------------------

/// Buffer sizes and reconnect policy for the runtime channels
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// UI → engine commands
    pub command_buffer_size: usize,
    /// Channel/stream → engine messages
    pub event_buffer_size: usize,
    /// Engine → UI updates
    pub update_buffer_size: usize,
    #[serde(rename = "reconnect_initial_backoff_ms", with = "millis")]
    pub reconnect_initial_backoff: Duration,
    #[serde(rename = "reconnect_max_backoff_ms", with = "millis")]
    pub reconnect_max_backoff: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            command_buffer_size: 32,
            event_buffer_size: 128,
            update_buffer_size: 64,
            reconnect_initial_backoff: Duration::from_millis(500),
            reconnect_max_backoff: Duration::from_secs(30),
        }
    }
}

impl ChannelConfig {
    pub fn testing() -> Self {
        Self {
            command_buffer_size: 100,
            event_buffer_size: 100,
            update_buffer_size: 100,
            reconnect_initial_backoff: Duration::from_millis(10),
            reconnect_max_backoff: Duration::from_millis(100),
        }
    }

    /// Backoff before reconnect attempt `attempt` (0-based), doubling up to the cap
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.min(16)).unwrap_or(u32::MAX);
        self.reconnect_initial_backoff
            .saturating_mul(factor)
            .min(self.reconnect_max_backoff)
    }
}

// ----------------------------------------------------------------------------
// Endpoints
// ----------------------------------------------------------------------------

/// Remote service locations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// Room server WebSocket URL
    pub realtime_url: String,
    /// Challenge stream (server-sent events)
    pub stream_url: String,
    /// AI judge
    pub judge_url: String,
    /// Match summary
    pub summary_url: String,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            realtime_url: "ws://127.0.0.1:3000".to_string(),
            stream_url: "http://127.0.0.1:8000/game/stream".to_string(),
            judge_url: "http://127.0.0.1:8000/game/guess".to_string(),
            summary_url: "http://127.0.0.1:8000/game/summary".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GameConfig::default();
        assert_eq!(config.answer_window, Duration::from_secs(30));
        assert_eq!(config.result_display, Duration::from_secs(8));
        assert_eq!(config.rejoin_delay, Duration::from_millis(500));
        assert_eq!(config.starting_health(), Health::FULL);
        assert!(config.validate().is_ok());
        assert!(!config.is_final_round(100));
    }

    #[test]
    fn test_validation() {
        let config = GameConfig {
            starting_health: 0,
            ..GameConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(CulturateError::Configuration { .. })
        ));
    }

    #[test]
    fn test_max_rounds() {
        let config = GameConfig {
            max_rounds: 5,
            ..GameConfig::default()
        };
        assert!(!config.is_final_round(4));
        assert!(config.is_final_round(5));
    }

    #[test]
    fn test_backoff_doubles_to_cap() {
        let config = ChannelConfig::default();
        assert_eq!(config.backoff_for(0), Duration::from_millis(500));
        assert_eq!(config.backoff_for(1), Duration::from_secs(1));
        assert_eq!(config.backoff_for(3), Duration::from_secs(4));
        assert_eq!(config.backoff_for(10), Duration::from_secs(30));
        assert_eq!(config.backoff_for(200), Duration::from_secs(30));
    }

    #[test]
    fn test_durations_are_plain_milliseconds() {
        let value = serde_json::to_value(GameConfig::default()).unwrap();
        assert_eq!(value["answer_window_ms"], 30_000);
        assert_eq!(value["rejoin_delay_ms"], 500);

        let config: GameConfig =
            serde_json::from_str(r#"{"answer_window_ms": 45000, "result_display_ms": 2500}"#).unwrap();
        assert_eq!(config.answer_window, Duration::from_secs(45));
        assert_eq!(config.result_display, Duration::from_millis(2_500));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: GameConfig = serde_json::from_str(r#"{"max_rounds": 7}"#).unwrap();
        assert_eq!(config.max_rounds, 7);
        assert_eq!(config.inter_loading, Duration::from_secs(5));
    }
}
