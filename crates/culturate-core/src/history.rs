//! Match History Recorder
//!
//! Accumulates resolved rounds for the end-of-match recap. Pure data
//! aggregation: no I/O, append-only, one history per client view.

use crate::challenge::CulturalData;
use crate::types::{Health, RegionId, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

// ----------------------------------------------------------------------------
// Round Record
// ----------------------------------------------------------------------------

/// One resolved round as seen by the local player
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundRecord {
    pub round_number: u32,
    pub correct_answer: RegionId,
    pub cultural_data: Option<CulturalData>,
    /// `None` means no answer was given before the round resolved
    pub player_answer: Option<RegionId>,
    pub opponent_answer: Option<RegionId>,
    pub player_correct: bool,
    pub opponent_correct: bool,
    pub player_health_after: Health,
    pub opponent_health_after: Health,
    pub recorded_at: Timestamp,
}

/// Rejection reason for `MatchHistory::append`
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HistoryError {
    #[error("Round {attempted} is not after round {last}")]
    OutOfOrder { last: u32, attempted: u32 },
    #[error("History is frozen")]
    Frozen,
}

// ----------------------------------------------------------------------------
// Recap Statistics
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RecapStats {
    pub rounds: usize,
    pub player_correct: usize,
    pub opponent_correct: usize,
    /// Rounded percentage, 0 when no rounds were played
    pub player_accuracy: u8,
    pub opponent_accuracy: u8,
    pub provinces_explored: Vec<RegionId>,
    pub categories_discovered: usize,
}

/// Entry of the remote summary request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryEntry {
    pub player_correct: bool,
    pub player_answer: String,
    pub correct_answer: String,
    pub cultural_data: Option<CulturalData>,
}

// ----------------------------------------------------------------------------
// Match History
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatchHistory {
    rounds: Vec<RoundRecord>,
    frozen: bool,
}

impl MatchHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a resolved round; records must arrive in strictly increasing order
    pub fn append(&mut self, record: RoundRecord) -> Result<(), HistoryError> {
        if self.frozen {
            return Err(HistoryError::Frozen);
        }
        if let Some(last) = self.rounds.last() {
            if record.round_number <= last.round_number {
                debug!(
                    last = last.round_number,
                    attempted = record.round_number,
                    "Ignoring out-of-order round record"
                );
                return Err(HistoryError::OutOfOrder {
                    last: last.round_number,
                    attempted: record.round_number,
                });
            }
        }
        self.rounds.push(record);
        Ok(())
    }

    /// Stop accepting rounds (called at game over)
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn rounds(&self) -> &[RoundRecord] {
        &self.rounds
    }

    pub fn len(&self) -> usize {
        self.rounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rounds.is_empty()
    }

    pub fn last_round(&self) -> Option<u32> {
        self.rounds.last().map(|r| r.round_number)
    }

    pub fn recap(&self) -> RecapStats {
        let rounds = self.rounds.len();
        let player_correct = self.rounds.iter().filter(|r| r.player_correct).count();
        let opponent_correct = self.rounds.iter().filter(|r| r.opponent_correct).count();

        let mut seen = BTreeSet::new();
        let mut provinces_explored = Vec::new();
        for record in &self.rounds {
            let key = record.correct_answer.as_str().to_lowercase();
            if seen.insert(key) {
                provinces_explored.push(record.correct_answer.clone());
            }
        }

        let categories_discovered = self
            .rounds
            .iter()
            .filter_map(|r| r.cultural_data.as_ref())
            .map(|d| d.cultural_category.as_str())
            .filter(|c| !c.is_empty())
            .collect::<BTreeSet<_>>()
            .len();

        RecapStats {
            rounds,
            player_correct,
            opponent_correct,
            player_accuracy: accuracy(player_correct, rounds),
            opponent_accuracy: accuracy(opponent_correct, rounds),
            provinces_explored,
            categories_discovered,
        }
    }

    /// Payload for the remote match-summary service
    pub fn summary_request(&self) -> Vec<SummaryEntry> {
        self.rounds
            .iter()
            .map(|r| SummaryEntry {
                player_correct: r.player_correct,
                player_answer: r
                    .player_answer
                    .as_ref()
                    .map(|a| a.to_string())
                    .unwrap_or_else(|| "No answer".to_string()),
                correct_answer: r.correct_answer.to_string(),
                cultural_data: r.cultural_data.clone(),
            })
            .collect()
    }
}

fn accuracy(correct: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    ((correct as f64 / total as f64) * 100.0).round() as u8
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
