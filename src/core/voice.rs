//! Voice cloning and speech synthesis.
//!
//! Synthesis with a custom voice falls back once to the stock narrator when
//! the provider rejects it. That is the only automatic retry in the service.

use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use tracing::{info, instrument, warn};

use super::safety::{bounded, Limits};
use crate::adapters::{ObjectStorage, VoiceProvider};
use crate::config::paths::{self, GeneratedAudio, REFLECTIONS_BUCKET, VOICE_SAMPLES_BUCKET};
use crate::domain::{AudioFormat, VoiceProfile};
use crate::error::{EchoError, EchoResult};
use crate::store::VoiceProfileStore;

/// Fewest samples a clone can be built from
pub const MIN_VOICE_SAMPLES: usize = 3;

/// Synthesized audio and the voice that actually produced it
#[derive(Debug, Clone)]
pub struct SynthesizedSpeech {
    /// MP3 bytes
    pub audio: Vec<u8>,
    pub voice_id: String,
    /// The requested voice failed and the narrator was used
    pub fell_back: bool,
}

/// Voice profiles and text-to-speech
pub struct VoicePipeline {
    voices: Arc<dyn VoiceProvider>,
    storage: Arc<dyn ObjectStorage>,
    profiles: Arc<dyn VoiceProfileStore>,
    default_voice_id: String,
    limits: Limits,
}

impl VoicePipeline {
    pub fn new(
        voices: Arc<dyn VoiceProvider>,
        storage: Arc<dyn ObjectStorage>,
        profiles: Arc<dyn VoiceProfileStore>,
        default_voice_id: impl Into<String>,
        limits: Limits,
    ) -> Self {
        Self {
            voices,
            storage,
            profiles,
            default_voice_id: default_voice_id.into(),
            limits,
        }
    }

    /// The stock narrator voice
    pub fn default_voice_id(&self) -> &str {
        &self.default_voice_id
    }

    /// Clone the user's voice from recorded samples and make it their active profile.
    ///
    /// Samples are archived concurrently; an archive failure drops that URL
    /// from the profile but the clone is still built from every sample.
    #[instrument(skip(self, samples), fields(samples = samples.len()))]
    pub async fn clone_voice(
        &self,
        user_id: &str,
        display_name: &str,
        samples: Vec<Vec<u8>>,
    ) -> EchoResult<VoiceProfile> {
        if samples.len() < MIN_VOICE_SAMPLES {
            return Err(EchoError::validation(format!(
                "At least {} voice samples required",
                MIN_VOICE_SAMPLES
            )));
        }
        if let Some(index) = samples.iter().position(|s| s.is_empty()) {
            return Err(EchoError::validation(format!("Voice sample {} is empty", index)));
        }

        let deadline = self.limits.provider_timeout();
        let now = Utc::now();

        let uploads = samples.iter().enumerate().map(|(index, sample)| {
            let path = paths::voice_sample(user_id, now, index);
            async move {
                let stored = bounded(
                    deadline,
                    "voice sample upload",
                    self.storage.put(
                        VOICE_SAMPLES_BUCKET,
                        &path,
                        sample,
                        AudioFormat::WebM.mime_type(),
                    ),
                )
                .await;
                (index, stored)
            }
        });

        let mut sample_urls = Vec::with_capacity(samples.len());
        for (index, stored) in join_all(uploads).await {
            match stored {
                Ok(url) => sample_urls.push(url),
                Err(e) => warn!(index, "Failed to store voice sample: {:#}", e),
            }
        }

        let voice_id = bounded(
            deadline,
            "voice clone",
            self.voices.create_voice_clone(
                &format!("{}'s Voice", display_name),
                &samples,
                &format!("Voice profile for {}", display_name),
            ),
        )
        .await
        .map_err(EchoError::provider)?;

        let profile = bounded(
            deadline,
            "voice profile upsert",
            self.profiles.upsert_voice_profile(user_id, &voice_id, &sample_urls),
        )
        .await
        .map_err(EchoError::persistence)?;

        info!(
            voice_id = %profile.voice_id,
            stored_samples = sample_urls.len(),
            "Voice profile saved"
        );
        Ok(profile)
    }

    /// Synthesize `text`, falling back to the narrator if a custom voice fails
    #[instrument(skip(self, text), fields(chars = text.len()))]
    pub async fn synthesize(&self, text: &str, voice_id: Option<&str>) -> EchoResult<SynthesizedSpeech> {
        let text = text.trim();
        if text.is_empty() {
            return Err(EchoError::validation("Text required"));
        }

        let deadline = self.limits.provider_timeout();
        let requested = voice_id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .unwrap_or(self.default_voice_id.as_str());

        let first = bounded(deadline, "speech synthesis", self.voices.synthesize(text, requested)).await;

        match first {
            Ok(audio) => Ok(SynthesizedSpeech {
                audio,
                voice_id: requested.to_string(),
                fell_back: false,
            }),
            Err(e) if requested != self.default_voice_id => {
                warn!(voice_id = requested, "Custom voice failed, using narrator: {:#}", e);
                let audio = bounded(
                    deadline,
                    "narrator synthesis",
                    self.voices.synthesize(text, &self.default_voice_id),
                )
                .await
                .map_err(EchoError::provider)?;
                Ok(SynthesizedSpeech {
                    audio,
                    voice_id: self.default_voice_id.clone(),
                    fell_back: true,
                })
            }
            Err(e) => Err(EchoError::provider(e)),
        }
    }

    /// Synthesize in the user's active cloned voice, or the narrator if they have none
    pub async fn synthesize_for_user(&self, user_id: &str, text: &str) -> EchoResult<SynthesizedSpeech> {
        let profile = match bounded(
            self.limits.provider_timeout(),
            "voice profile lookup",
            self.profiles.active_voice_profile(user_id),
        )
        .await
        {
            Ok(profile) => profile,
            Err(e) => {
                warn!("Voice profile lookup failed, using narrator: {:#}", e);
                None
            }
        };

        self.synthesize(text, profile.as_ref().map(|p| p.voice_id.as_str()))
            .await
    }

    /// Store generated speech and return its URL
    pub async fn store_generated_audio(
        &self,
        user_id: &str,
        kind: GeneratedAudio,
        audio: &[u8],
    ) -> EchoResult<String> {
        let path = paths::generated_audio(user_id, kind, Utc::now());
        bounded(
            self.limits.provider_timeout(),
            "generated audio upload",
            self.storage
                .put(REFLECTIONS_BUCKET, &path, audio, AudioFormat::Mp3.mime_type()),
        )
        .await
        .map_err(EchoError::persistence)
    }
}
