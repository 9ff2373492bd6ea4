//! Ingestion: store audio, transcribe, create the reflection, schedule analysis.
//!
//! The steps run in order with compensating deletes: if transcription or the
//! insert fails, the stored audio object is removed and no row is left behind.
//! A failed delete leaves an orphaned object; that residual is logged, not
//! retried.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::queue::AnalysisQueue;
use super::safety::{bounded, Limits};
use crate::adapters::{ObjectStorage, Transcriber};
use crate::config::paths::{self, REFLECTIONS_BUCKET};
use crate::domain::{AudioFormat, NewReflection};
use crate::error::{EchoError, EchoResult};
use crate::store::ReflectionStore;

/// What the caller gets back from a successful ingest
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub reflection_id: Uuid,
    pub transcript: String,
    pub audio_url: String,
}

/// Audio upload → reflection
pub struct IngestPipeline {
    storage: Arc<dyn ObjectStorage>,
    transcriber: Arc<dyn Transcriber>,
    reflections: Arc<dyn ReflectionStore>,
    queue: Arc<AnalysisQueue>,
    limits: Limits,
}

impl IngestPipeline {
    pub fn new(
        storage: Arc<dyn ObjectStorage>,
        transcriber: Arc<dyn Transcriber>,
        reflections: Arc<dyn ReflectionStore>,
        queue: Arc<AnalysisQueue>,
        limits: Limits,
    ) -> Self {
        Self {
            storage,
            transcriber,
            reflections,
            queue,
            limits,
        }
    }

    /// Ingest one recording for `user_id`
    #[instrument(skip(self, audio), fields(bytes = audio.len()))]
    pub async fn ingest(
        &self,
        user_id: &str,
        audio: Vec<u8>,
        mime_type: Option<&str>,
        duration_seconds: Option<u32>,
    ) -> EchoResult<IngestOutcome> {
        if audio.is_empty() {
            return Err(EchoError::validation("No audio file provided"));
        }
        if audio.len() > self.limits.max_upload_bytes {
            return Err(EchoError::validation(format!(
                "Audio exceeds the {} byte upload limit",
                self.limits.max_upload_bytes
            )));
        }

        let format = AudioFormat::from_mime(mime_type);
        let path = paths::reflection_audio(user_id, Utc::now(), format.extension());
        let timeout = self.limits.provider_timeout();

        // 1. Store
        let audio_url = bounded(
            timeout,
            "audio upload",
            self.storage
                .put(REFLECTIONS_BUCKET, &path, &audio, format.mime_type()),
        )
        .await
        .map_err(EchoError::persistence)?;

        // 2. Transcribe
        let transcript = match bounded(
            timeout,
            "transcription",
            self.transcriber.transcribe(&audio, format.mime_type()),
        )
        .await
        {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => {
                self.discard_audio(&path).await;
                return Err(EchoError::Transcription(
                    "transcription was empty".to_string(),
                ));
            }
            Err(e) => {
                self.discard_audio(&path).await;
                return Err(EchoError::transcription(e));
            }
        };

        // 3. Persist
        let new = NewReflection {
            user_id: user_id.to_string(),
            audio_url: audio_url.clone(),
            transcript,
            duration_seconds,
        };
        let reflection = match bounded(timeout, "reflection insert", self.reflections.insert_reflection(new)).await {
            Ok(reflection) => reflection,
            Err(e) => {
                self.discard_audio(&path).await;
                return Err(EchoError::persistence(e));
            }
        };

        info!(
            reflection_id = %reflection.id,
            backend = self.transcriber.name(),
            "Reflection created"
        );

        // 4. Schedule analysis; the caller never waits on it
        match self.queue.enqueue(reflection.id).await {
            Ok(result) => info!(reflection_id = %reflection.id, ?result, "Analysis scheduled"),
            Err(e) => warn!(reflection_id = %reflection.id, "Failed to schedule analysis: {}", e),
        }

        Ok(IngestOutcome {
            reflection_id: reflection.id,
            transcript: reflection.transcript,
            audio_url,
        })
    }

    /// Best-effort removal of audio whose reflection was never created
    async fn discard_audio(&self, path: &str) {
        let removed = bounded(
            self.limits.provider_timeout(),
            "audio cleanup",
            self.storage.remove(REFLECTIONS_BUCKET, path),
        )
        .await;

        if let Err(e) = removed {
            warn!(path, "Failed to remove orphaned audio: {:#}", e);
        }
    }
}
