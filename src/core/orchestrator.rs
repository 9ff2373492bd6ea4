//! Wiring for the pipelines.
//!
//! Provider clients, storage and the database are built once from validated
//! configuration and injected into each pipeline as explicit handles.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, instrument};
use uuid::Uuid;

use super::analysis::AnalysisPipeline;
use super::ingest::IngestPipeline;
use super::queue::{AnalysisQueue, QueueSettings};
use super::retrieval::RetrievalPipeline;
use super::safety::{bounded, Limits};
use super::voice::{SynthesizedSpeech, VoicePipeline};
use super::worker::AnalysisWorker;
use crate::adapters::{
    ElevenLabsClient, Embedder, GeminiClient, LanguageModel, LocalObjectStorage, ObjectStorage,
    Transcriber, VoiceProvider,
};
use crate::config::{ResolvedConfig, TranscriptionBackend};
use crate::domain::{AudioFormat, GroundedAnswer, Reflection};
use crate::error::{EchoError, EchoResult};
use crate::store::{ListFilter, ReflectionPage, ReflectionStore, SqliteStore, VoiceProfileStore};

/// External collaborators shared by every pipeline
#[derive(Clone)]
pub struct Services {
    pub transcriber: Arc<dyn Transcriber>,
    pub model: Arc<dyn LanguageModel>,
    pub embedder: Arc<dyn Embedder>,
    pub voices: Arc<dyn VoiceProvider>,
    pub storage: Arc<dyn ObjectStorage>,
    pub reflections: Arc<dyn ReflectionStore>,
    pub profiles: Arc<dyn VoiceProfileStore>,
}

/// A grounded answer together with its speech
#[derive(Debug, Clone)]
pub struct SpokenAnswer {
    pub answer: GroundedAnswer,
    pub speech: SynthesizedSpeech,
}

/// Entry point to every pipeline
pub struct Orchestrator {
    pub ingest: IngestPipeline,
    pub analysis: Arc<AnalysisPipeline>,
    pub retrieval: RetrievalPipeline,
    pub voice: VoicePipeline,
    pub queue: Arc<AnalysisQueue>,
    transcriber: Arc<dyn Transcriber>,
    reflections: Arc<dyn ReflectionStore>,
    storage: Arc<dyn ObjectStorage>,
    queue_settings: QueueSettings,
    limits: Limits,
}

impl Orchestrator {
    /// Build the pipelines from already-constructed services
    pub fn new(
        services: Services,
        limits: Limits,
        queue: Arc<AnalysisQueue>,
        queue_settings: QueueSettings,
        default_voice_id: impl Into<String>,
    ) -> Self {
        let analysis = Arc::new(AnalysisPipeline::new(
            Arc::clone(&services.model),
            Arc::clone(&services.embedder),
            Arc::clone(&services.reflections),
            limits.clone(),
        ));

        Self {
            ingest: IngestPipeline::new(
                Arc::clone(&services.storage),
                Arc::clone(&services.transcriber),
                Arc::clone(&services.reflections),
                Arc::clone(&queue),
                limits.clone(),
            ),
            analysis,
            retrieval: RetrievalPipeline::new(
                Arc::clone(&services.model),
                Arc::clone(&services.embedder),
                Arc::clone(&services.reflections),
                limits.clone(),
            ),
            voice: VoicePipeline::new(
                Arc::clone(&services.voices),
                Arc::clone(&services.storage),
                Arc::clone(&services.profiles),
                default_voice_id,
                limits.clone(),
            ),
            queue,
            transcriber: services.transcriber,
            reflections: services.reflections,
            storage: services.storage,
            queue_settings,
            limits,
        }
    }

    /// Build everything from configuration.
    ///
    /// Missing provider keys and unusable directories fail here, at startup.
    pub async fn from_config(config: &ResolvedConfig) -> Result<Self> {
        config.require_secrets()?;

        std::fs::create_dir_all(&config.home)
            .with_context(|| format!("Failed to create {}", config.home.display()))?;
        std::fs::create_dir_all(&config.storage_dir)
            .with_context(|| format!("Failed to create {}", config.storage_dir.display()))?;

        let timeout = config.limits.provider_timeout();
        let gemini_settings = &config.providers.gemini;
        let eleven_settings = &config.providers.elevenlabs;

        let gemini = Arc::new(GeminiClient::new(
            gemini_settings.api_key.clone().unwrap_or_default(),
            gemini_settings,
            timeout,
        )?);
        let elevenlabs = Arc::new(ElevenLabsClient::new(
            eleven_settings.api_key.clone().unwrap_or_default(),
            eleven_settings,
            timeout,
        )?);

        let transcriber: Arc<dyn Transcriber> = match config.providers.transcription {
            TranscriptionBackend::ElevenLabs => elevenlabs.clone() as Arc<dyn Transcriber>,
            TranscriptionBackend::Gemini => gemini.clone() as Arc<dyn Transcriber>,
        };

        let store = Arc::new(
            SqliteStore::open(&config.db_path())?.with_vector_search(config.vector_search),
        );
        let storage = Arc::new(LocalObjectStorage::new(
            config.storage_dir.clone(),
            config.server.public_url.clone(),
        ));
        let queue = Arc::new(AnalysisQueue::open(config.queue_path()).await?);

        info!(
            transcription = transcriber.name(),
            db = %config.db_path().display(),
            storage = %config.storage_dir.display(),
            "Services initialized"
        );

        let services = Services {
            transcriber,
            model: gemini.clone(),
            embedder: gemini,
            voices: elevenlabs,
            storage,
            reflections: store.clone(),
            profiles: store,
        };

        Ok(Self::new(
            services,
            config.limits.clone(),
            queue,
            config.queue.clone(),
            eleven_settings.default_voice_id.clone(),
        ))
    }

    /// Queue consumer bound to this orchestrator's analysis pipeline
    pub fn worker(&self) -> Arc<AnalysisWorker> {
        Arc::new(AnalysisWorker::new(
            Arc::clone(&self.queue),
            Arc::clone(&self.analysis),
            self.queue_settings.clone(),
        ))
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Object storage handle, for serving stored audio
    pub fn storage(&self) -> &Arc<dyn ObjectStorage> {
        &self.storage
    }

    /// Load a reflection owned by `user_id`; someone else's reflection is not found
    pub async fn reflection_for_user(&self, user_id: &str, id: Uuid) -> EchoResult<Reflection> {
        bounded(
            self.limits.provider_timeout(),
            "reflection lookup",
            self.reflections.get_reflection(id),
        )
        .await
        .map_err(EchoError::persistence)?
        .filter(|r| r.user_id == user_id)
        .ok_or_else(|| EchoError::not_found("Reflection"))
    }

    /// Timeline page
    pub async fn list_reflections(&self, user_id: &str, filter: &ListFilter) -> EchoResult<ReflectionPage> {
        bounded(
            self.limits.provider_timeout(),
            "reflection list",
            self.reflections.list_reflections(user_id, filter),
        )
        .await
        .map_err(EchoError::persistence)
    }

    /// Transcribe a spoken question; silence is a validation error
    #[instrument(skip(self, audio), fields(bytes = audio.len()))]
    pub async fn transcribe_query(&self, audio: &[u8], mime_type: Option<&str>) -> EchoResult<String> {
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
        let transcript = bounded(
            self.limits.provider_timeout(),
            "query transcription",
            self.transcriber.transcribe(audio, format.mime_type()),
        )
        .await
        .map_err(EchoError::transcription)?;

        let transcript = transcript.trim();
        if transcript.is_empty() {
            return Err(EchoError::validation(
                "Failed to transcribe audio or audio was empty",
            ));
        }
        Ok(transcript.to_string())
    }

    /// Grounded answer spoken in the user's voice
    #[instrument(skip(self, question))]
    pub async fn answer_aloud(&self, user_id: &str, question: &str) -> EchoResult<SpokenAnswer> {
        let answer = self
            .retrieval
            .answer_from_all_reflections(user_id, question)
            .await?;
        let speech = self
            .voice
            .synthesize_for_user(user_id, &answer.spoken_text)
            .await?;
        Ok(SpokenAnswer { answer, speech })
    }
}
