//! Persistence for reflections and voice profiles.
//!
//! The pipelines only see the traits; [`SqliteStore`] is the bundled
//! implementation.

pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{NewReflection, Reflection, ReflectionAnalysis, VoiceProfile};

pub use sqlite::SqliteStore;

/// Vector search failures, split so callers can fall back on `Unavailable`
#[derive(Debug, Error)]
pub enum VectorSearchError {
    #[error("Vector search is not available")]
    Unavailable,

    #[error("Vector search failed: {0:#}")]
    Failed(#[from] anyhow::Error),
}

/// Filters for a page of the timeline
#[derive(Debug, Clone)]
pub struct ListFilter {
    pub limit: usize,
    pub offset: usize,
    /// Only reflections whose themes contain this value
    pub theme: Option<String>,
    /// Only reflections whose emotional tags contain this value
    pub emotion: Option<String>,
}

impl Default for ListFilter {
    fn default() -> Self {
        Self {
            limit: 50,
            offset: 0,
            theme: None,
            emotion: None,
        }
    }
}

/// One page of reflections, newest first
#[derive(Debug, Clone)]
pub struct ReflectionPage {
    pub reflections: Vec<Reflection>,
    /// All reflections owned by the user, ignoring filters and paging
    pub total: usize,
}

#[async_trait]
pub trait ReflectionStore: Send + Sync {
    /// Insert a new, unanalyzed reflection
    async fn insert_reflection(&self, new: NewReflection) -> Result<Reflection>;

    async fn get_reflection(&self, id: Uuid) -> Result<Option<Reflection>>;

    /// Write every analysis field in one update.
    ///
    /// Returns `false` when the reflection was already analyzed (or is
    /// missing); nothing is written in that case.
    async fn save_analysis(&self, id: Uuid, analysis: &ReflectionAnalysis) -> Result<bool>;

    async fn list_reflections(&self, user_id: &str, filter: &ListFilter) -> Result<ReflectionPage>;

    /// Every reflection of a user, newest first
    async fn all_reflections(&self, user_id: &str) -> Result<Vec<Reflection>>;

    /// Analyzed reflections with cosine similarity >= `threshold`, best first
    async fn match_reflections(
        &self,
        user_id: &str,
        embedding: &[f32],
        threshold: f32,
        count: usize,
    ) -> Result<Vec<(Reflection, f32)>, VectorSearchError>;

    /// Substring match on transcripts, exact match on insights and themes, newest first
    async fn text_search(&self, user_id: &str, query: &str, limit: usize) -> Result<Vec<Reflection>>;
}

#[async_trait]
pub trait VoiceProfileStore: Send + Sync {
    /// Insert the user's profile, or update the existing one in place
    async fn upsert_voice_profile(
        &self,
        user_id: &str,
        voice_id: &str,
        sample_audio_urls: &[String],
    ) -> Result<VoiceProfile>;

    async fn active_voice_profile(&self, user_id: &str) -> Result<Option<VoiceProfile>>;
}
