//! Shared scoring rule and termination check
//!
//! Both round engines and the room arbiter score through this module, so every
//! participant computes identical health deltas from the same two grades.

use crate::types::{Health, PlayerId};
use serde::{Deserialize, Serialize};

// ----------------------------------------------------------------------------
// Round Scoring
// ----------------------------------------------------------------------------

/// Health lost by each side in one resolved round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RoundDelta {
    pub a_loss: u8,
    pub b_loss: u8,
}

impl RoundDelta {
    /// Same delta seen from the other side
    pub fn swapped(self) -> Self {
        Self {
            a_loss: self.b_loss,
            b_loss: self.a_loss,
        }
    }

    /// Apply the delta to both sides' health
    pub fn apply(self, a: Health, b: Health) -> (Health, Health) {
        (a.damage(self.a_loss), b.damage(self.b_loss))
    }
}

/// Score one round from the two correctness grades
///
/// | A | B | effect |
/// |---|---|--------|
/// | correct | correct | none |
/// | correct | wrong | B loses 1 |
/// | wrong | correct | A loses 1 |
/// | wrong | wrong | both lose 1 |
pub fn score_round(a_correct: bool, b_correct: bool) -> RoundDelta {
    match (a_correct, b_correct) {
        (true, true) => RoundDelta::default(),
        (true, false) => RoundDelta { a_loss: 0, b_loss: 1 },
        (false, true) => RoundDelta { a_loss: 1, b_loss: 0 },
        (false, false) => RoundDelta { a_loss: 1, b_loss: 1 },
    }
}

// ----------------------------------------------------------------------------
// Match Outcome
// ----------------------------------------------------------------------------

/// How a finished match ended, from a neutral point of view
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchOutcome {
    /// `None` is a draw
    pub winner: Option<PlayerId>,
    pub final_health: Vec<(PlayerId, Health)>,
}

impl MatchOutcome {
    pub fn is_draw(&self) -> bool {
        self.winner.is_none()
    }

    pub fn is_winner(&self, player: &PlayerId) -> bool {
        self.winner.as_ref() == Some(player)
    }
}

/// Decide whether the match is over; `None` while both sides still have health
pub fn decide_outcome(a: (&PlayerId, Health), b: (&PlayerId, Health)) -> Option<MatchOutcome> {
    let final_health = vec![(a.0.clone(), a.1), (b.0.clone(), b.1)];
    match (a.1.is_depleted(), b.1.is_depleted()) {
        (false, false) => None,
        (true, true) => Some(MatchOutcome {
            winner: None,
            final_health,
        }),
        (true, false) => Some(MatchOutcome {
            winner: Some(b.0.clone()),
            final_health,
        }),
        (false, true) => Some(MatchOutcome {
            winner: Some(a.0.clone()),
            final_health,
        }),
    }
}

/// Decide a match that ended before anyone reached zero (e.g. challenges ran out)
///
/// Higher remaining health wins; equal health is a draw.
pub fn decide_by_health(a: (&PlayerId, Health), b: (&PlayerId, Health)) -> MatchOutcome {
    let winner = match a.1.cmp(&b.1) {
        core::cmp::Ordering::Greater => Some(a.0.clone()),
        core::cmp::Ordering::Less => Some(b.0.clone()),
        core::cmp::Ordering::Equal => None,
    };
    MatchOutcome {
        winner,
        final_health: vec![(a.0.clone(), a.1), (b.0.clone(), b.1)],
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
