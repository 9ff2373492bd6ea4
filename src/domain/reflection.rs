//! Reflections: one spoken entry with its transcript and derived analysis.
//!
//! A reflection is created by ingestion with only the transcript populated,
//! then mutated exactly once by analysis. The analysis fields move from
//! all-`None` to all-`Some` in a single transition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A persisted reflection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reflection {
    /// Unique identifier
    pub id: Uuid,

    /// Owning user (opaque id from the session layer)
    pub user_id: String,

    /// Public URL of the stored audio
    pub audio_url: String,

    /// Transcript (immutable once set)
    pub transcript: String,

    /// Recording length, if the client reported one
    pub duration_seconds: Option<u32>,

    /// When the reflection was created
    pub created_at: DateTime<Utc>,

    pub emotional_tags: Option<Vec<String>>,
    pub themes: Option<Vec<String>>,
    pub key_insights: Option<Vec<String>>,
    pub sentiment_score: Option<f64>,

    /// Embedding vector; dimensionality is whatever the provider returned.
    /// Never sent over the wire.
    #[serde(skip_serializing, default)]
    pub embedding: Option<Vec<f32>>,

    /// Set exactly once, together with all analysis fields
    pub analyzed_at: Option<DateTime<Utc>>,
}

impl Reflection {
    /// Whether analysis has already been persisted
    pub fn is_analyzed(&self) -> bool {
        self.analyzed_at.is_some()
    }

    /// The stored analysis, if every analysis field is populated
    pub fn analysis(&self) -> Option<AnalysisResult> {
        if !self.is_analyzed() {
            return None;
        }

        Some(AnalysisResult {
            emotional_tags: self.emotional_tags.clone()?,
            themes: self.themes.clone()?,
            key_insights: self.key_insights.clone()?,
            sentiment_score: self.sentiment_score?,
        })
    }

    /// Emotional tags, or an empty slice before analysis
    pub fn tags(&self) -> &[String] {
        self.emotional_tags.as_deref().unwrap_or_default()
    }

    /// Themes, or an empty slice before analysis
    pub fn theme_list(&self) -> &[String] {
        self.themes.as_deref().unwrap_or_default()
    }
}

/// Fields supplied by ingestion when inserting a reflection
#[derive(Debug, Clone)]
pub struct NewReflection {
    pub user_id: String,
    pub audio_url: String,
    pub transcript: String,
    pub duration_seconds: Option<u32>,
}

/// The four model-derived analysis fields.
///
/// Serialized with snake_case keys; this is both the shape requested from the
/// language model and the `analysis` object returned by the analyze route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub emotional_tags: Vec<String>,
    pub themes: Vec<String>,
    pub key_insights: Vec<String>,
    pub sentiment_score: f64,
}

/// Everything written by the single analysis update
#[derive(Debug, Clone)]
pub struct ReflectionAnalysis {
    pub result: AnalysisResult,
    pub embedding: Vec<f32>,
    pub analyzed_at: DateTime<Utc>,
}
