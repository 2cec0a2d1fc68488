//! Error types for the Culturate game protocol
//!
//! Every failure the engines can observe is expressed here. The engines never let
//! these escape as panics: they convert them into local state (notices, error
//! phases) at their boundary, and the async runtime only propagates them out of
//! setup and teardown paths.

// ----------------------------------------------------------------------------
// Specific Error Types
// ----------------------------------------------------------------------------

/// Failures reported by the remote judge service
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JudgeError {
    #[error("Judge request failed: {reason}")]
    RequestFailed { reason: String },
    #[error("Judge returned HTTP status {status}")]
    BadStatus { status: u16 },
}

/// Failures raised while reading the challenge stream
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    #[error("Stream connection failed: {reason}")]
    ConnectionFailed { reason: String },
    #[error("Stream reported an error: {detail}")]
    Remote { detail: String },
    #[error("Failed to parse received data")]
    Parse,
}

// ----------------------------------------------------------------------------
// Main Error Type
// ----------------------------------------------------------------------------

/// Core error type for the Culturate engines
#[derive(Debug, thiserror::Error)]
pub enum CulturateError {
    /// Realtime or stream channel dropped; always recoverable
    #[error("Connection error: {reason}")]
    Connection { reason: String },

    /// Server rejected a request (e.g. "room not found")
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    #[error("Judge error: {0}")]
    Judge(#[from] JudgeError),

    #[error("Summary error: {reason}")]
    Summary { reason: String },

    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    #[error("Storage error: {reason}")]
    Storage { reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    /// An operation arrived in a phase that does not accept it
    #[error("Invalid phase: expected {expected}, got {actual}")]
    InvalidPhase { expected: String, actual: String },

    /// Channel communication error between tasks
    #[error("Channel error: {message}")]
    Channel { message: String },
}

// ----------------------------------------------------------------------------
// Convenience Error Constructors
// ----------------------------------------------------------------------------

impl CulturateError {
    pub fn connection<T: Into<String>>(reason: T) -> Self {
        CulturateError::Connection {
            reason: reason.into(),
        }
    }

    pub fn protocol<T: Into<String>>(message: T) -> Self {
        CulturateError::Protocol {
            message: message.into(),
        }
    }

    pub fn summary<T: Into<String>>(reason: T) -> Self {
        CulturateError::Summary {
            reason: reason.into(),
        }
    }

    pub fn storage<T: Into<String>>(reason: T) -> Self {
        CulturateError::Storage {
            reason: reason.into(),
        }
    }

    pub fn config_error<T: Into<String>>(reason: T) -> Self {
        CulturateError::Configuration {
            reason: reason.into(),
        }
    }

    pub fn channel_error<T: Into<String>>(message: T) -> Self {
        CulturateError::Channel {
            message: message.into(),
        }
    }

    pub fn invalid_phase<E: Into<String>, A: Into<String>>(expected: E, actual: A) -> Self {
        CulturateError::InvalidPhase {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Whether the error leaves the engine able to continue after a retry
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            CulturateError::Configuration { .. } | CulturateError::Channel { .. }
        )
    }
}

// ----------------------------------------------------------------------------
// Type Aliases
// ----------------------------------------------------------------------------

pub type Result<T> = core::result::Result<T, CulturateError>;
pub type CulturateResult<T> = Result<T>;

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
