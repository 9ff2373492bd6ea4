//! Error taxonomy shared by the pipelines.
//!
//! Pipelines return typed [`EchoError`]s; adapters and the store use
//! `anyhow` internally and are classified at the pipeline boundary.

use thiserror::Error;

/// Errors surfaced by pipeline operations
#[derive(Debug, Error)]
pub enum EchoError {
    /// Bad or missing input
    #[error("{0}")]
    Validation(String),

    /// No authenticated session
    #[error("Unauthorized")]
    Auth,

    /// Resource absent or not owned by the caller
    #[error("{0} not found")]
    NotFound(String),

    #[error("Failed to transcribe audio: {0}")]
    Transcription(String),

    /// Model output was not the JSON shape we asked for
    #[error("Malformed model response: {0}")]
    MalformedResponse(String),

    /// Storage or database write failure
    #[error("Persistence failure: {0}")]
    Persistence(String),

    /// Any other downstream failure
    #[error("Provider failure: {0}")]
    Provider(String),
}

impl EchoError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Classify a storage/database failure, keeping the full context chain
    pub fn persistence(err: anyhow::Error) -> Self {
        Self::Persistence(format!("{:#}", err))
    }

    /// Classify a provider failure, keeping the full context chain
    pub fn provider(err: anyhow::Error) -> Self {
        Self::Provider(format!("{:#}", err))
    }

    pub fn transcription(err: anyhow::Error) -> Self {
        Self::Transcription(format!("{:#}", err))
    }

    /// HTTP status code for this error class
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::Auth => 401,
            Self::NotFound(_) => 404,
            Self::Transcription(_)
            | Self::MalformedResponse(_)
            | Self::Persistence(_)
            | Self::Provider(_) => 500,
        }
    }

    /// Single-sentence message safe to show to the caller.
    ///
    /// Validation and not-found messages are the caller's own problem and are
    /// shown as-is; downstream failures hide their internals.
    pub fn public_message(&self) -> String {
        match self {
            Self::Validation(msg) => msg.clone(),
            Self::Auth => "Unauthorized".to_string(),
            Self::NotFound(what) => format!("{} not found", what),
            Self::Transcription(_) => "Failed to transcribe audio".to_string(),
            Self::MalformedResponse(_) => "The language model returned an unexpected response".to_string(),
            Self::Persistence(_) => "Failed to save data".to_string(),
            Self::Provider(_) => "An upstream service failed".to_string(),
        }
    }
}

/// Result alias for pipeline operations
pub type EchoResult<T> = std::result::Result<T, EchoError>;
