//! ElevenLabs REST client: speech-to-text, instant voice cloning and
//! text-to-speech.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Transcriber, VoiceProvider};
use crate::config::ElevenLabsSettings;
use crate::domain::AudioFormat;

const STABILITY: f32 = 0.5;
const SIMILARITY_BOOST: f32 = 0.75;

/// ElevenLabs client over the public REST API
pub struct ElevenLabsClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    tts_model: String,
    stt_model: String,
}

impl ElevenLabsClient {
    /// Create a client; `timeout` bounds every request
    pub fn new(
        api_key: impl Into<String>,
        settings: &ElevenLabsSettings,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build ElevenLabs HTTP client")?;

        Ok(Self {
            http,
            api_key: api_key.into(),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            tts_model: settings.tts_model.clone(),
            stt_model: settings.stt_model.clone(),
        })
    }

    async fn check(response: reqwest::Response, what: &str) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        anyhow::bail!("ElevenLabs {} returned {}: {}", what, status, body.trim())
    }
}

#[async_trait]
impl Transcriber for ElevenLabsClient {
    fn name(&self) -> &str {
        "elevenlabs"
    }

    async fn transcribe(&self, audio: &[u8], mime_type: &str) -> Result<String> {
        let format = AudioFormat::from_mime(Some(mime_type));
        let file = Part::bytes(audio.to_vec())
            .file_name(format!("audio.{}", format.extension()))
            .mime_str(format.mime_type())
            .context("Invalid audio MIME type")?;

        let form = Form::new()
            .text("model_id", self.stt_model.clone())
            .part("file", file);

        let response = self
            .http
            .post(format!("{}/speech-to-text", self.base_url))
            .header("xi-api-key", &self.api_key)
            .multipart(form)
            .send()
            .await
            .context("Failed to reach ElevenLabs speech-to-text")?;

        let body: TranscriptionResponse = Self::check(response, "speech-to-text")
            .await?
            .json()
            .await
            .context("Failed to decode ElevenLabs transcription")?;

        Ok(body.text.trim().to_string())
    }
}

#[async_trait]
impl VoiceProvider for ElevenLabsClient {
    async fn create_voice_clone(
        &self,
        name: &str,
        samples: &[Vec<u8>],
        description: &str,
    ) -> Result<String> {
        let mut form = Form::new()
            .text("name", name.to_string())
            .text("description", description.to_string())
            .text("remove_background_noise", "true");

        for (index, sample) in samples.iter().enumerate() {
            let part = Part::bytes(sample.clone())
                .file_name(format!("sample-{}.webm", index))
                .mime_str(AudioFormat::WebM.mime_type())
                .context("Invalid sample MIME type")?;
            form = form.part("files", part);
        }

        let response = self
            .http
            .post(format!("{}/voices/add", self.base_url))
            .header("xi-api-key", &self.api_key)
            .multipart(form)
            .send()
            .await
            .context("Failed to reach ElevenLabs voice cloning")?;

        let body: VoiceCloneResponse = Self::check(response, "voice cloning")
            .await?
            .json()
            .await
            .context("Failed to decode ElevenLabs voice clone response")?;

        debug!(voice_id = %body.voice_id, samples = samples.len(), "Voice clone created");
        Ok(body.voice_id)
    }

    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<Vec<u8>> {
        let request = SpeechRequest {
            text,
            model_id: &self.tts_model,
            voice_settings: VoiceSettings {
                stability: STABILITY,
                similarity_boost: SIMILARITY_BOOST,
            },
        };

        let response = self
            .http
            .post(format!("{}/text-to-speech/{}", self.base_url, voice_id))
            .header("xi-api-key", &self.api_key)
            .header(reqwest::header::ACCEPT, AudioFormat::Mp3.mime_type())
            .json(&request)
            .send()
            .await
            .with_context(|| format!("Failed to reach ElevenLabs text-to-speech for voice {}", voice_id))?;

        let audio = Self::check(response, "text-to-speech")
            .await?
            .bytes()
            .await
            .context("Failed to read synthesized audio")?;

        if audio.is_empty() {
            anyhow::bail!("ElevenLabs returned empty audio for voice {}", voice_id);
        }

        Ok(audio.to_vec())
    }
}

// Wire types

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct VoiceCloneResponse {
    voice_id: String,
}

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: VoiceSettings,
}

#[derive(Debug, Serialize)]
struct VoiceSettings {
    stability: f32,
    similarity_boost: f32,
}
