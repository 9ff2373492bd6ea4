//! Ephemeral retrieval results (never persisted).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::reflection::Reflection;

/// Minimum similarity for a vector-search hit
pub const SIMILARITY_THRESHOLD: f32 = 0.5;

/// Score assigned to every hit of the text-match fallback
pub const TEXT_MATCH_SCORE: f32 = 0.8;

/// Reason attached to every hit of the text-match fallback
pub const TEXT_MATCH_REASON: &str = "Text match found in reflection";

/// A reflection paired with how well it matched a query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    pub reflection: Reflection,
    pub similarity_score: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relevance_reason: Option<String>,
}

impl QueryResult {
    /// A vector-search hit, with its reason bucketed by score
    pub fn from_similarity(reflection: Reflection, similarity_score: f32) -> Self {
        Self {
            reflection,
            similarity_score,
            relevance_reason: Some(relevance_reason(similarity_score).to_string()),
        }
    }

    /// A text-match fallback hit
    pub fn from_text_match(reflection: Reflection) -> Self {
        Self {
            reflection,
            similarity_score: TEXT_MATCH_SCORE,
            relevance_reason: Some(TEXT_MATCH_REASON.to_string()),
        }
    }
}

/// Human-readable bucket for a similarity score
pub fn relevance_reason(score: f32) -> &'static str {
    if score > 0.8 {
        "Highly relevant match"
    } else if score > 0.6 {
        "Moderately relevant match"
    } else {
        "Potentially relevant match"
    }
}

/// A reflection cited by a grounded answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReflectionReference {
    pub id: Uuid,
    pub transcript: String,
    pub audio_url: String,
    pub created_at: DateTime<Utc>,
    pub emotional_tags: Vec<String>,
    pub themes: Vec<String>,

    /// 1-based position in the model's selection order
    pub citation_index: usize,

    /// Always 1.0: selection is categorical, not ranked
    pub similarity_score: f32,
}

impl ReflectionReference {
    /// Project a reflection into a citation
    pub fn cite(reflection: &Reflection, citation_index: usize) -> Self {
        Self {
            id: reflection.id,
            transcript: reflection.transcript.clone(),
            audio_url: reflection.audio_url.clone(),
            created_at: reflection.created_at,
            emotional_tags: reflection.tags().to_vec(),
            themes: reflection.theme_list().to_vec(),
            citation_index,
            similarity_score: 1.0,
        }
    }
}

/// Answer drafted from the user's whole reflection history
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroundedAnswer {
    /// Text as drafted by the model
    pub response_text: String,

    /// Text with citation markers removed, ready for speech synthesis
    pub spoken_text: String,

    pub referenced_reflections: Vec<ReflectionReference>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relevance_buckets() {
        assert_eq!(relevance_reason(0.95), "Highly relevant match");
        assert_eq!(relevance_reason(0.8), "Moderately relevant match");
        assert_eq!(relevance_reason(0.61), "Moderately relevant match");
        assert_eq!(relevance_reason(0.6), "Potentially relevant match");
        assert_eq!(relevance_reason(0.5), "Potentially relevant match");
    }
}
