//! Remote services used by the AI match
//!
//! The judge names a province for a challenge's media; the summarizer turns a
//! finished match history into written feedback. Both are plain JSON over HTTP.

use async_trait::async_trait;
use culturate_core::{CulturateError, CulturateResult, JudgeError, RegionId, SummaryEntry};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Guess reported when the judge answers without naming a province
pub const UNKNOWN_GUESS: &str = "Unknown";

// ----------------------------------------------------------------------------
// Interfaces
// ----------------------------------------------------------------------------

#[async_trait]
pub trait Judge: Send + Sync {
    /// The AI's guess for the media at `media_url`
    async fn judge(&self, media_url: &str, correct_region: &RegionId) -> CulturateResult<RegionId>;
}

#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, entries: &[SummaryEntry]) -> CulturateResult<String>;
}

// ----------------------------------------------------------------------------
// HTTP Judge
// ----------------------------------------------------------------------------

#[derive(Serialize)]
struct GuessRequest<'a> {
    input_url: &'a str,
    actual_province: &'a str,
}

#[derive(Debug, Clone)]
pub struct HttpJudge {
    client: Client,
    url: String,
}

impl HttpJudge {
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), url)
    }

    pub fn with_client(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl Judge for HttpJudge {
    async fn judge(&self, media_url: &str, correct_region: &RegionId) -> CulturateResult<RegionId> {
        let request = GuessRequest {
            input_url: media_url,
            actual_province: correct_region.as_str(),
        };
        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| JudgeError::RequestFailed {
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(JudgeError::BadStatus {
                status: status.as_u16(),
            }
            .into());
        }

        let body: Value = response.json().await.map_err(|e| JudgeError::RequestFailed {
            reason: e.to_string(),
        })?;
        let guess = parse_guess(&body);
        debug!(guess = %guess, "Judge answered");
        Ok(guess)
    }
}

/// `ai_guess` wins over `guess`; neither means the AI had no answer
pub fn parse_guess(body: &Value) -> RegionId {
    ["ai_guess", "guess"]
        .iter()
        .filter_map(|key| body.get(key).and_then(Value::as_str))
        .find(|guess| !guess.trim().is_empty())
        .map(RegionId::from)
        .unwrap_or_else(|| RegionId::new(UNKNOWN_GUESS))
}

// ----------------------------------------------------------------------------
// HTTP Summarizer
// ----------------------------------------------------------------------------

#[derive(Deserialize)]
struct SummaryResponse {
    feedback: Option<String>,
}

#[derive(Debug, Clone)]
pub struct HttpSummarizer {
    client: Client,
    url: String,
}

impl HttpSummarizer {
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), url)
    }

    pub fn with_client(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl Summarizer for HttpSummarizer {
    async fn summarize(&self, entries: &[SummaryEntry]) -> CulturateResult<String> {
        let response = self
            .client
            .post(&self.url)
            .json(entries)
            .send()
            .await
            .map_err(|e| CulturateError::summary(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CulturateError::summary(format!("HTTP status {}", status)));
        }

        let body: SummaryResponse = response
            .json()
            .await
            .map_err(|e| CulturateError::summary(e.to_string()))?;
        body.feedback
            .filter(|f| !f.trim().is_empty())
            .ok_or_else(|| CulturateError::summary("Summary response had no feedback"))
    }
}
