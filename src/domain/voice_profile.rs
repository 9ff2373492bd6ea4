//! Voice clone profiles.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A user's cloned-voice identity at the speech provider.
///
/// At most one profile per user is active; cloning again updates the
/// existing row rather than adding a second one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceProfile {
    pub id: Uuid,
    pub user_id: String,

    /// Opaque voice identifier issued by the provider
    pub voice_id: String,

    /// Stored sample locations, in upload order
    pub sample_audio_urls: Vec<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_active: bool,
}
