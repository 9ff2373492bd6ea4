//! Domain types for echoes.
//!
//! - Reflection: a spoken entry and its analysis
//! - VoiceProfile: a user's cloned voice
//! - Query: ephemeral retrieval results
//! - Audio: container formats

pub mod audio;
pub mod query;
pub mod reflection;
pub mod voice_profile;

// Re-export commonly used types
pub use audio::AudioFormat;
pub use query::{
    relevance_reason, GroundedAnswer, QueryResult, ReflectionReference, SIMILARITY_THRESHOLD,
    TEXT_MATCH_REASON, TEXT_MATCH_SCORE,
};
pub use reflection::{AnalysisResult, NewReflection, Reflection, ReflectionAnalysis};
pub use voice_profile::VoiceProfile;
