//! Core pipelines.
//!
//! This module contains:
//! - Ingest: audio upload → transcribed reflection
//! - Analysis: reflection → tags, themes, insights, sentiment, embedding
//! - Retrieval: similarity search and grounded answers
//! - Voice: cloning and synthesis with narrator fallback
//! - Queue/Worker: at-least-once analysis scheduling
//! - Safety: timeouts and size limits
//! - Orchestrator: wiring of all of the above

pub mod analysis;
pub mod ingest;
pub mod orchestrator;
pub mod queue;
pub mod retrieval;
pub mod safety;
pub mod voice;
pub mod worker;

// Re-export commonly used types
pub use analysis::{AnalysisOutcome, AnalysisPipeline};
pub use ingest::{IngestOutcome, IngestPipeline};
pub use orchestrator::{Orchestrator, Services, SpokenAnswer};
pub use queue::{AnalysisQueue, EnqueueResult, JobStatus, QueueError, QueueSettings, QueueSummary};
pub use retrieval::RetrievalPipeline;
pub use safety::Limits;
pub use voice::{SynthesizedSpeech, VoicePipeline, MIN_VOICE_SAMPLES};
pub use worker::{AnalysisWorker, DrainReport};
