//! Shared fakes and harness for integration tests.
//!
//! Providers are replaced with in-process fakes; the database is an in-memory
//! SQLite store and object storage lives in a temp directory.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use async_trait::async_trait;
use tempfile::TempDir;

use echoes::adapters::{
    Embedder, LanguageModel, LocalObjectStorage, ObjectStorage, Transcriber, VoiceProvider,
};
use echoes::core::{AnalysisQueue, Limits, Orchestrator, QueueSettings, Services};
use echoes::domain::{NewReflection, Reflection, ReflectionAnalysis};
use echoes::store::{ListFilter, ReflectionPage, ReflectionStore, SqliteStore, VectorSearchError};
use uuid::Uuid;

pub const NARRATOR: &str = "narrator";

pub const ANALYSIS_REPLY: &str = r#"{"emotional_tags":["hopeful","tired"],"themes":["work"],"key_insights":["Rest matters"],"sentiment_score":0.4}"#;

// =============================================================================
// Transcriber
// =============================================================================

/// Returns a fixed transcript, or fails when none is set
pub struct FakeTranscriber {
    transcript: Mutex<Option<String>>,
    pub calls: AtomicUsize,
}

impl FakeTranscriber {
    pub fn new(transcript: &str) -> Self {
        Self {
            transcript: Mutex::new(Some(transcript.to_string())),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set(&self, transcript: Option<&str>) {
        *self.transcript.lock().unwrap() = transcript.map(str::to_string);
    }
}

#[async_trait]
impl Transcriber for FakeTranscriber {
    fn name(&self) -> &str {
        "fake"
    }

    async fn transcribe(&self, _audio: &[u8], _mime_type: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.transcript.lock().unwrap().clone() {
            Some(text) => Ok(text),
            None => bail!("speech-to-text unavailable"),
        }
    }
}

// =============================================================================
// Language model
// =============================================================================

/// Answers analysis and grounded prompts with canned JSON
pub struct FakeModel {
    analysis_reply: Mutex<String>,
    grounded_reply: Mutex<String>,
    pub analysis_calls: AtomicUsize,
    pub grounded_calls: AtomicUsize,
    pub last_prompt: Mutex<Option<String>>,
}

impl FakeModel {
    pub fn new() -> Self {
        Self {
            analysis_reply: Mutex::new(ANALYSIS_REPLY.to_string()),
            grounded_reply: Mutex::new(
                r#"{"response":"Nothing stands out.","selectedReflectionIds":[]}"#.to_string(),
            ),
            analysis_calls: AtomicUsize::new(0),
            grounded_calls: AtomicUsize::new(0),
            last_prompt: Mutex::new(None),
        }
    }

    pub fn set_analysis_reply(&self, reply: &str) {
        *self.analysis_reply.lock().unwrap() = reply.to_string();
    }

    pub fn set_grounded_reply(&self, reply: &str) {
        *self.grounded_reply.lock().unwrap() = reply.to_string();
    }

    pub fn last_prompt(&self) -> String {
        self.last_prompt.lock().unwrap().clone().unwrap_or_default()
    }
}

#[async_trait]
impl LanguageModel for FakeModel {
    async fn generate_text(&self, _prompt: &str) -> Result<String> {
        bail!("free-form generation is not used")
    }

    async fn generate_structured(&self, prompt: &str, schema: &serde_json::Value) -> Result<String> {
        *self.last_prompt.lock().unwrap() = Some(prompt.to_string());

        if schema["properties"].get("emotional_tags").is_some() {
            self.analysis_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.analysis_reply.lock().unwrap().clone())
        } else {
            self.grounded_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.grounded_reply.lock().unwrap().clone())
        }
    }
}

// =============================================================================
// Embedder
// =============================================================================

/// Topic words mapped onto axes, so texts sharing a topic are similar
pub const TOPICS: [&str; 4] = ["work", "family", "health", "sleep"];

pub fn topic_embedding(text: &str) -> Vec<f32> {
    let lower = text.to_lowercase();
    let mut vector: Vec<f32> = TOPICS
        .iter()
        .map(|topic| if lower.contains(topic) { 1.0 } else { 0.0 })
        .collect();
    vector.push(0.1);
    vector
}

pub struct FakeEmbedder {
    pub fail: AtomicBool,
    pub calls: AtomicUsize,
}

impl FakeEmbedder {
    pub fn new() -> Self {
        Self {
            fail: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Embedder for FakeEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            bail!("embedding service down");
        }
        Ok(topic_embedding(text))
    }
}

// =============================================================================
// Voice provider
// =============================================================================

/// Speech is `voice_id:text` as bytes; listed voices are rejected
pub struct FakeVoices {
    pub rejected: Mutex<HashSet<String>>,
    pub clones: AtomicUsize,
    pub synth_calls: Mutex<Vec<String>>,
    pub last_clone_samples: AtomicUsize,
    pub last_clone_name: Mutex<Option<String>>,
}

impl FakeVoices {
    pub fn new() -> Self {
        Self {
            rejected: Mutex::new(HashSet::new()),
            clones: AtomicUsize::new(0),
            synth_calls: Mutex::new(Vec::new()),
            last_clone_samples: AtomicUsize::new(0),
            last_clone_name: Mutex::new(None),
        }
    }

    pub fn reject(&self, voice_id: &str) {
        self.rejected.lock().unwrap().insert(voice_id.to_string());
    }

    pub fn synthesized_with(&self) -> Vec<String> {
        self.synth_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl VoiceProvider for FakeVoices {
    async fn create_voice_clone(
        &self,
        name: &str,
        samples: &[Vec<u8>],
        _description: &str,
    ) -> Result<String> {
        let n = self.clones.fetch_add(1, Ordering::SeqCst) + 1;
        self.last_clone_samples.store(samples.len(), Ordering::SeqCst);
        *self.last_clone_name.lock().unwrap() = Some(name.to_string());
        Ok(format!("clone-{}", n))
    }

    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<Vec<u8>> {
        self.synth_calls.lock().unwrap().push(voice_id.to_string());
        if self.rejected.lock().unwrap().contains(voice_id) {
            bail!("voice {} not found", voice_id);
        }
        Ok(format!("{}:{}", voice_id, text).into_bytes())
    }
}

// =============================================================================
// Object storage
// =============================================================================

/// Local storage that can be told to fail writes
pub struct FlakyStorage {
    pub inner: LocalObjectStorage,
    pub fail_puts: AtomicBool,
    pub removed: Mutex<Vec<String>>,
}

impl FlakyStorage {
    pub fn new(inner: LocalObjectStorage) -> Self {
        Self {
            inner,
            fail_puts: AtomicBool::new(false),
            removed: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ObjectStorage for FlakyStorage {
    async fn put(&self, bucket: &str, path: &str, bytes: &[u8], content_type: &str) -> Result<String> {
        if self.fail_puts.load(Ordering::SeqCst) {
            bail!("bucket unavailable");
        }
        self.inner.put(bucket, path, bytes, content_type).await
    }

    async fn remove(&self, bucket: &str, path: &str) -> Result<()> {
        self.removed.lock().unwrap().push(format!("{}/{}", bucket, path));
        self.inner.remove(bucket, path).await
    }

    async fn read(&self, bucket: &str, path: &str) -> Result<Option<Vec<u8>>> {
        self.inner.read(bucket, path).await
    }
}

// =============================================================================
// Reflection store
// =============================================================================

/// SQLite store whose inserts can be told to fail
pub struct FlakyReflections {
    pub inner: Arc<SqliteStore>,
    pub fail_inserts: AtomicBool,
}

impl FlakyReflections {
    pub fn new(inner: Arc<SqliteStore>) -> Self {
        Self {
            inner,
            fail_inserts: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl ReflectionStore for FlakyReflections {
    async fn insert_reflection(&self, new: NewReflection) -> Result<Reflection> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            bail!("database is locked");
        }
        self.inner.insert_reflection(new).await
    }

    async fn get_reflection(&self, id: Uuid) -> Result<Option<Reflection>> {
        self.inner.get_reflection(id).await
    }

    async fn save_analysis(&self, id: Uuid, analysis: &ReflectionAnalysis) -> Result<bool> {
        self.inner.save_analysis(id, analysis).await
    }

    async fn list_reflections(&self, user_id: &str, filter: &ListFilter) -> Result<ReflectionPage> {
        self.inner.list_reflections(user_id, filter).await
    }

    async fn all_reflections(&self, user_id: &str) -> Result<Vec<Reflection>> {
        self.inner.all_reflections(user_id).await
    }

    async fn match_reflections(
        &self,
        user_id: &str,
        embedding: &[f32],
        threshold: f32,
        count: usize,
    ) -> Result<Vec<(Reflection, f32)>, VectorSearchError> {
        self.inner
            .match_reflections(user_id, embedding, threshold, count)
            .await
    }

    async fn text_search(&self, user_id: &str, query: &str, limit: usize) -> Result<Vec<Reflection>> {
        self.inner.text_search(user_id, query, limit).await
    }
}

// =============================================================================
// Harness
// =============================================================================

pub struct Harness {
    pub dir: TempDir,
    pub store: Arc<SqliteStore>,
    pub reflections: Arc<FlakyReflections>,
    pub storage: Arc<FlakyStorage>,
    pub transcriber: Arc<FakeTranscriber>,
    pub model: Arc<FakeModel>,
    pub embedder: Arc<FakeEmbedder>,
    pub voices: Arc<FakeVoices>,
    pub queue: Arc<AnalysisQueue>,
    pub orchestrator: Arc<Orchestrator>,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_options(true, Limits::default()).await
    }

    pub async fn with_options(vector_search: bool, limits: Limits) -> Self {
        let dir = TempDir::new().unwrap();

        let store = Arc::new(
            SqliteStore::open_in_memory()
                .unwrap()
                .with_vector_search(vector_search),
        );
        let reflections = Arc::new(FlakyReflections::new(store.clone()));
        let storage = Arc::new(FlakyStorage::new(LocalObjectStorage::new(
            dir.path().join("storage"),
            "http://localhost:3000",
        )));
        let transcriber = Arc::new(FakeTranscriber::new("I worked late again and feel tired"));
        let model = Arc::new(FakeModel::new());
        let embedder = Arc::new(FakeEmbedder::new());
        let voices = Arc::new(FakeVoices::new());
        let queue = Arc::new(
            AnalysisQueue::open(dir.path().join("analysis_queue.jsonl"))
                .await
                .unwrap(),
        );

        let services = Services {
            transcriber: transcriber.clone(),
            model: model.clone(),
            embedder: embedder.clone(),
            voices: voices.clone(),
            storage: storage.clone(),
            reflections: reflections.clone(),
            profiles: store.clone(),
        };

        let orchestrator = Arc::new(Orchestrator::new(
            services,
            limits,
            queue.clone(),
            QueueSettings::default(),
            NARRATOR,
        ));

        Self {
            dir,
            store,
            reflections,
            storage,
            transcriber,
            model,
            embedder,
            voices,
            queue,
            orchestrator,
        }
    }

    /// Insert a reflection directly, bypassing ingest
    pub async fn seed(&self, user_id: &str, transcript: &str) -> Reflection {
        self.store
            .insert_reflection(NewReflection {
                user_id: user_id.to_string(),
                audio_url: format!("http://localhost:3000/storage/reflections/{}/seed.webm", user_id),
                transcript: transcript.to_string(),
                duration_seconds: Some(30),
            })
            .await
            .unwrap()
    }

    /// Insert a reflection and analyze it with the given labels
    pub async fn seed_analyzed(
        &self,
        user_id: &str,
        transcript: &str,
        emotional_tags: &[&str],
        themes: &[&str],
    ) -> Reflection {
        let reflection = self.seed(user_id, transcript).await;
        let analysis = ReflectionAnalysis {
            result: echoes::domain::AnalysisResult {
                emotional_tags: emotional_tags.iter().map(|s| s.to_string()).collect(),
                themes: themes.iter().map(|s| s.to_string()).collect(),
                key_insights: vec![format!("About {}", transcript)],
                sentiment_score: 0.0,
            },
            embedding: topic_embedding(transcript),
            analyzed_at: chrono::Utc::now(),
        };
        assert!(self.store.save_analysis(reflection.id, &analysis).await.unwrap());
        self.store.get_reflection(reflection.id).await.unwrap().unwrap()
    }

    /// Count stored objects in a bucket
    pub fn stored_objects(&self, bucket: &str) -> usize {
        fn walk(path: &std::path::Path) -> usize {
            match std::fs::read_dir(path) {
                Ok(entries) => entries
                    .filter_map(|e| e.ok())
                    .map(|e| {
                        let p = e.path();
                        if p.is_dir() {
                            walk(&p)
                        } else {
                            1
                        }
                    })
                    .sum(),
                Err(_) => 0,
            }
        }
        walk(&self.dir.path().join("storage").join(bucket))
    }
}
