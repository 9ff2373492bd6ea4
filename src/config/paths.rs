//! Canonical object-storage layout.
//!
//! Single source of truth - import this instead of formatting paths inline.
//!
//! ## Layout
//!
//! | Bucket | Path | Content |
//! |--------|------|---------|
//! | reflections | `{user}/{ts}.{ext}` | Raw reflection audio |
//! | voice-samples | `{user}/samples/sample_{ts}_{i}.webm` | Voice clone samples |
//! | reflections | `{user}/responses/{ts}.mp3` | Spoken answers |
//! | reflections | `{user}/synthesized/{ts}.mp3` | On-demand synthesis |
//!
//! `ts` is milliseconds since the Unix epoch.

use chrono::{DateTime, Utc};

/// Bucket for reflection audio and generated speech
pub const REFLECTIONS_BUCKET: &str = "reflections";

/// Bucket for voice clone samples
pub const VOICE_SAMPLES_BUCKET: &str = "voice-samples";

/// Kinds of generated audio
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratedAudio {
    /// Answer to a spoken query
    Response,
    /// Reflection or free text read back on request
    Synthesized,
}

impl GeneratedAudio {
    fn dir(&self) -> &'static str {
        match self {
            Self::Response => "responses",
            Self::Synthesized => "synthesized",
        }
    }
}

/// Raw reflection audio path
pub fn reflection_audio(user_id: &str, at: DateTime<Utc>, extension: &str) -> String {
    format!("{}/{}.{}", user_id, at.timestamp_millis(), extension)
}

/// Voice sample path
pub fn voice_sample(user_id: &str, at: DateTime<Utc>, index: usize) -> String {
    format!(
        "{}/samples/sample_{}_{}.webm",
        user_id,
        at.timestamp_millis(),
        index
    )
}

/// Generated speech path (always MP3)
pub fn generated_audio(user_id: &str, kind: GeneratedAudio, at: DateTime<Utc>) -> String {
    format!("{}/{}/{}.mp3", user_id, kind.dir(), at.timestamp_millis())
}

/// Reject path segments that could escape a bucket
pub fn is_safe_object_path(path: &str) -> bool {
    !path.is_empty()
        && !path.starts_with('/')
        && !path.contains('\\')
        && path
            .split('/')
            .all(|segment| !segment.is_empty() && segment != "." && segment != "..")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at() -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_700_000_000_123).unwrap()
    }

    #[test]
    fn test_reflection_audio_path() {
        assert_eq!(
            reflection_audio("user-1", at(), "webm"),
            "user-1/1700000000123.webm"
        );
    }

    #[test]
    fn test_voice_sample_path() {
        assert_eq!(
            voice_sample("user-1", at(), 2),
            "user-1/samples/sample_1700000000123_2.webm"
        );
    }

    #[test]
    fn test_generated_audio_paths() {
        assert_eq!(
            generated_audio("u", GeneratedAudio::Response, at()),
            "u/responses/1700000000123.mp3"
        );
        assert_eq!(
            generated_audio("u", GeneratedAudio::Synthesized, at()),
            "u/synthesized/1700000000123.mp3"
        );
    }

    #[test]
    fn test_safe_object_paths() {
        assert!(is_safe_object_path("user-1/samples/sample_1_0.webm"));
        assert!(!is_safe_object_path("../etc/passwd"));
        assert!(!is_safe_object_path("user-1/../../x"));
        assert!(!is_safe_object_path("/abs"));
        assert!(!is_safe_object_path("a//b"));
        assert!(!is_safe_object_path(""));
    }
}
