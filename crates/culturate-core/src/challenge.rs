//! Challenges: the cultural item and correct answer driving one round

use crate::types::RegionId;
use serde::{Deserialize, Serialize};

const UNKNOWN_QUERY: &str = "Unknown query";
const UNKNOWN_CONTEXT: &str = "Unknown context";

// ----------------------------------------------------------------------------
// Media
// ----------------------------------------------------------------------------

/// Kind of media attached to a challenge
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaKind {
    Image,
    Video,
    Other(String),
}

impl MediaKind {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "image" => MediaKind::Image,
            "video" => MediaKind::Video,
            other => MediaKind::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
            MediaKind::Other(raw) => raw.as_str(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Media {
    pub kind: MediaKind,
    pub url: String,
}

// ----------------------------------------------------------------------------
// Challenge
// ----------------------------------------------------------------------------

/// Immutable once assigned to a round
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    pub correct_region: RegionId,
    pub media: Media,
    pub category: String,
    pub context: String,
    pub query: String,
    pub fun_fact: Option<String>,
}

impl Challenge {
    /// Grade an answer against this challenge; no answer is always incorrect
    pub fn grade(&self, answer: Option<&RegionId>) -> bool {
        answer.is_some_and(|region| region.matches(&self.correct_region))
    }

    pub fn cultural_data(&self) -> CulturalData {
        CulturalData::from(self)
    }
}

// ----------------------------------------------------------------------------
// Wire Record
// ----------------------------------------------------------------------------

/// Cultural item as it travels over the stream and in result payloads
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CulturalData {
    #[serde(default)]
    pub province: String,
    #[serde(default)]
    pub media_type: String,
    #[serde(default)]
    pub media_url: String,
    #[serde(default)]
    pub cultural_category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cultural_context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cultural_fun_fact: Option<String>,
}

impl CulturalData {
    /// Whether every field needed to pose a challenge is present
    pub fn is_complete(&self) -> bool {
        !self.province.is_empty()
            && !self.media_url.is_empty()
            && !self.media_type.is_empty()
            && !self.cultural_category.is_empty()
    }

    pub fn into_challenge(self) -> Challenge {
        let query = self
            .query
            .filter(|q| !q.is_empty())
            .unwrap_or_else(|| UNKNOWN_QUERY.to_string());
        let context = self
            .cultural_context
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| {
                if query == UNKNOWN_QUERY {
                    UNKNOWN_CONTEXT.to_string()
                } else {
                    query.clone()
                }
            });

        Challenge {
            correct_region: RegionId::new(self.province),
            media: Media {
                kind: MediaKind::parse(&self.media_type),
                url: self.media_url,
            },
            category: self.cultural_category,
            context,
            query,
            fun_fact: self.cultural_fun_fact.filter(|f| !f.is_empty()),
        }
    }
}

impl From<&Challenge> for CulturalData {
    fn from(challenge: &Challenge) -> Self {
        Self {
            province: challenge.correct_region.to_string(),
            media_type: challenge.media.kind.as_str().to_string(),
            media_url: challenge.media.url.clone(),
            cultural_category: challenge.category.clone(),
            query: Some(challenge.query.clone()),
            cultural_context: Some(challenge.context.clone()),
            cultural_fun_fact: challenge.fun_fact.clone(),
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
