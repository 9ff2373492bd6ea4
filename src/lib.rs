//! echoes - Voice reflection journal with spoken recall
//!
//! Users record short spoken reflections. Each recording is stored,
//! transcribed, analyzed for emotions, themes and insights, and embedded for
//! similarity search. Questions are answered from the user's own reflections
//! and can be spoken back in a cloned copy of their voice.
//!
//! # Modules
//!
//! - `adapters`: Provider clients (Gemini, ElevenLabs) and object storage
//! - `core`: Ingest, analysis, retrieval and voice pipelines plus the analysis queue
//! - `store`: Reflection and voice profile persistence (SQLite)
//! - `domain`: Data structures (Reflection, VoiceProfile, query results)
//! - `server`: HTTP API
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Serve the HTTP API with the background analysis worker
//! echoes serve
//!
//! # Ingest a recording from disk
//! echoes ingest morning.webm --user alice
//!
//! # Ask a question grounded in every reflection, spoken back
//! echoes ask "What keeps coming up for me?" --output answer.mp3
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod error;
pub mod server;
pub mod store;

// Re-export main types at crate root for convenience
pub use core::Orchestrator;
pub use domain::{GroundedAnswer, QueryResult, Reflection, VoiceProfile};
pub use error::{EchoError, EchoResult};
