//! Adapter interfaces for external systems.
//!
//! Every hosted service the pipelines talk to sits behind one of these
//! traits: speech-to-text, text generation, embeddings, voice cloning and
//! synthesis, and object storage. Pipelines hold them as `Arc<dyn Trait>`
//! handles built once at startup.

pub mod elevenlabs;
pub mod gemini;
pub mod storage;

use anyhow::Result;
use async_trait::async_trait;

pub use elevenlabs::ElevenLabsClient;
pub use gemini::GeminiClient;
pub use storage::LocalObjectStorage;

/// Speech-to-text
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Human-readable backend name
    fn name(&self) -> &str;

    /// Transcribe an audio buffer to plain text
    async fn transcribe(&self, audio: &[u8], mime_type: &str) -> Result<String>;
}

/// Text generation
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Free-form text completion
    async fn generate_text(&self, prompt: &str) -> Result<String>;

    /// Completion constrained to a JSON schema; returns the raw JSON text
    async fn generate_structured(&self, prompt: &str, schema: &serde_json::Value)
        -> Result<String>;
}

/// Text embeddings
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed text; dimensionality is whatever the provider returns
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Voice cloning and text-to-speech
#[async_trait]
pub trait VoiceProvider: Send + Sync {
    /// Register a cloned voice from audio samples, returning the provider's voice id
    async fn create_voice_clone(
        &self,
        name: &str,
        samples: &[Vec<u8>],
        description: &str,
    ) -> Result<String>;

    /// Synthesize speech; returns MP3 bytes
    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<Vec<u8>>;
}

/// Blob storage for audio
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Store a new object and return its public URL. Existing objects are never overwritten.
    async fn put(&self, bucket: &str, path: &str, bytes: &[u8], content_type: &str)
        -> Result<String>;

    /// Delete an object; deleting a missing object is not an error
    async fn remove(&self, bucket: &str, path: &str) -> Result<()>;

    /// Read an object, `None` if absent
    async fn read(&self, bucket: &str, path: &str) -> Result<Option<Vec<u8>>>;
}
