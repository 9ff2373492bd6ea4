//! Command-line interface for echoes.
//!
//! Runs the HTTP server and exposes each pipeline operation for local use:
//! ingest a recording, analyze, search, ask, clone a voice, speak text, and
//! inspect or drain the analysis queue.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use uuid::Uuid;

use crate::config::ResolvedConfig;
use crate::core::Orchestrator;
use crate::domain::AudioFormat;
use crate::server::{self, AppState};

pub mod queue;

/// echoes - Voice reflection journal with spoken recall
#[derive(Parser, Debug)]
#[command(name = "echoes")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the HTTP server and the analysis worker
    Serve {
        /// Address to bind (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Port to bind (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Ingest an audio recording as a new reflection
    Ingest {
        /// Audio file
        file: PathBuf,

        /// Owning user id
        #[arg(short, long, env = "ECHOES_USER", default_value = "local")]
        user: String,

        /// Recording length in seconds
        #[arg(short, long)]
        duration: Option<u32>,
    },

    /// Analyze a reflection (no-op if already analyzed)
    Analyze {
        /// Reflection ID (UUID)
        reflection_id: String,
    },

    /// Similarity search over your reflections
    Search {
        query: String,

        #[arg(short, long, env = "ECHOES_USER", default_value = "local")]
        user: String,

        /// Maximum results
        #[arg(short, long, default_value = "5")]
        limit: usize,
    },

    /// Ask a question answered from all of your reflections
    Ask {
        question: String,

        #[arg(short, long, env = "ECHOES_USER", default_value = "local")]
        user: String,

        /// Also speak the answer and write the MP3 here
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Clone your voice from 3 or more samples
    Clone {
        /// Sample recordings
        #[arg(required = true, num_args = 1..)]
        samples: Vec<PathBuf>,

        #[arg(short, long, env = "ECHOES_USER", default_value = "local")]
        user: String,

        /// Display name for the voice (defaults to the user id)
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Synthesize text to an MP3 file
    Speak {
        text: String,

        /// Output MP3 path
        #[arg(short, long)]
        output: PathBuf,

        #[arg(short, long, env = "ECHOES_USER", default_value = "local")]
        user: String,

        /// Voice ID (defaults to your cloned voice, then the narrator)
        #[arg(long)]
        voice: Option<String>,
    },

    /// Analysis queue commands
    Queue {
        #[command(subcommand)]
        command: queue::QueueCommands,
    },

    /// Show resolved configuration
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Serve { host, port } => serve(host, port).await,
            Commands::Ingest {
                file,
                user,
                duration,
            } => ingest(&file, &user, duration).await,
            Commands::Analyze { reflection_id } => analyze(&reflection_id).await,
            Commands::Search { query, user, limit } => search(&query, &user, limit).await,
            Commands::Ask {
                question,
                user,
                output,
            } => ask(&question, &user, output).await,
            Commands::Clone {
                samples,
                user,
                name,
            } => clone_voice(&samples, &user, name).await,
            Commands::Speak {
                text,
                output,
                user,
                voice,
            } => speak(&text, &output, &user, voice).await,
            Commands::Queue { command } => queue::execute(command).await,
            Commands::Config => show_config(),
        }
    }
}

async fn orchestrator() -> Result<(ResolvedConfig, Orchestrator)> {
    let config = ResolvedConfig::load()?;
    let orchestrator = Orchestrator::from_config(&config).await?;
    Ok((config, orchestrator))
}

async fn read_audio(path: &Path) -> Result<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read audio file: {}", path.display()))
}

/// Start the server
async fn serve(host: Option<String>, port: Option<u16>) -> Result<()> {
    let (config, orchestrator) = orchestrator().await?;

    let host = host.unwrap_or_else(|| config.server.host.clone());
    let port = port.unwrap_or(config.server.port);
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .with_context(|| format!("Invalid bind address {}:{}", host, port))?;

    if config.auth_tokens.is_empty() {
        tracing::warn!("No auth tokens configured; every authenticated route will answer 401");
    }

    let state = AppState::new(Arc::new(orchestrator), config.auth_tokens.clone());
    server::start_server(state, addr).await
}

/// Ingest a local recording
async fn ingest(file: &Path, user: &str, duration: Option<u32>) -> Result<()> {
    let (_, orchestrator) = orchestrator().await?;

    let audio = read_audio(file).await?;
    let format = AudioFormat::from_path(&file.to_string_lossy()).unwrap_or(AudioFormat::WebM);

    eprintln!("Ingesting {} ({} bytes)", file.display(), audio.len());
    let outcome = orchestrator
        .ingest
        .ingest(user, audio, Some(format.mime_type()), duration)
        .await?;

    eprintln!("Reflection ID: {}", outcome.reflection_id);
    eprintln!("Audio: {}", outcome.audio_url);
    println!("{}", outcome.transcript);

    // Analyze now rather than waiting for a server worker
    let report = orchestrator.worker().run_once().await?;
    eprintln!(
        "Analysis: {} completed, {} failed",
        report.completed, report.failed
    );

    Ok(())
}

/// Analyze one reflection
async fn analyze(reflection_id: &str) -> Result<()> {
    let id = Uuid::parse_str(reflection_id)
        .with_context(|| format!("Invalid reflection ID: {}", reflection_id))?;
    let (_, orchestrator) = orchestrator().await?;

    let outcome = orchestrator.analysis.analyze(id).await?;
    if outcome.already_analyzed {
        eprintln!("[Already analyzed]");
    }
    println!("{}", serde_json::to_string_pretty(&outcome.analysis)?);

    Ok(())
}

/// Similarity search
async fn search(query: &str, user: &str, limit: usize) -> Result<()> {
    let (_, orchestrator) = orchestrator().await?;

    let results = orchestrator
        .retrieval
        .search_by_query(user, query, limit)
        .await?;

    if results.is_empty() {
        println!("No matching reflections");
        return Ok(());
    }

    for result in results {
        let reflection = &result.reflection;
        println!(
            "{:.2}  {}  {}  {}",
            result.similarity_score,
            reflection.created_at.format("%Y-%m-%d"),
            reflection.id,
            result.relevance_reason.as_deref().unwrap_or("")
        );
        println!("      {}", reflection.transcript);
    }

    Ok(())
}

/// Grounded answer, optionally spoken
async fn ask(question: &str, user: &str, output: Option<PathBuf>) -> Result<()> {
    let (_, orchestrator) = orchestrator().await?;

    let answer = match &output {
        Some(path) => {
            let spoken = orchestrator.answer_aloud(user, question).await?;
            tokio::fs::write(path, &spoken.speech.audio)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!("Spoken answer ({}): {}", spoken.speech.voice_id, path.display());
            spoken.answer
        }
        None => {
            orchestrator
                .retrieval
                .answer_from_all_reflections(user, question)
                .await?
        }
    };

    println!("{}", answer.response_text);
    if !answer.referenced_reflections.is_empty() {
        println!();
        for reference in &answer.referenced_reflections {
            println!(
                "[{}] {} {}",
                reference.citation_index,
                reference.created_at.format("%Y-%m-%d"),
                reference.transcript
            );
        }
    }

    Ok(())
}

/// Clone a voice from sample files
async fn clone_voice(samples: &[PathBuf], user: &str, name: Option<String>) -> Result<()> {
    let (_, orchestrator) = orchestrator().await?;

    let mut buffers = Vec::with_capacity(samples.len());
    for path in samples {
        buffers.push(read_audio(path).await?);
    }

    let display_name = name.unwrap_or_else(|| user.to_string());
    let profile = orchestrator
        .voice
        .clone_voice(user, &display_name, buffers)
        .await?;

    println!("Voice ID: {}", profile.voice_id);
    eprintln!("Stored samples: {}", profile.sample_audio_urls.len());

    Ok(())
}

/// Text-to-speech to a file
async fn speak(text: &str, output: &Path, user: &str, voice: Option<String>) -> Result<()> {
    let (_, orchestrator) = orchestrator().await?;

    let speech = match voice {
        Some(voice_id) => orchestrator.voice.synthesize(text, Some(&voice_id)).await?,
        None => orchestrator.voice.synthesize_for_user(user, text).await?,
    };

    tokio::fs::write(output, &speech.audio)
        .await
        .with_context(|| format!("Failed to write {}", output.display()))?;

    if speech.fell_back {
        eprintln!("[Requested voice failed, used narrator {}]", speech.voice_id);
    }
    eprintln!("Wrote {} bytes to {}", speech.audio.len(), output.display());

    Ok(())
}

/// Show resolved configuration (secrets redacted)
fn show_config() -> Result<()> {
    let cfg = ResolvedConfig::load()?;

    println!("echoes configuration");
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Paths:");
    println!("  Home:     {}", cfg.home.display());
    println!("  Database: {}", cfg.db_path().display());
    println!("  Queue:    {}", cfg.queue_path().display());
    println!("  Storage:  {}", cfg.storage_dir.display());
    println!();
    println!("Server:");
    println!("  Bind:        {}:{}", cfg.server.host, cfg.server.port);
    println!("  Public URL:  {}", cfg.server.public_url);
    println!("  Auth tokens: {}", cfg.auth_tokens.len());
    println!();
    println!("Providers:");
    println!("  Transcription: {:?}", cfg.providers.transcription);
    println!("  Gemini:        {:?}", cfg.providers.gemini);
    println!("  ElevenLabs:    {:?}", cfg.providers.elevenlabs);
    println!("  Vector search: {}", cfg.vector_search);
    println!();
    println!("Limits:");
    println!("  Provider timeout:     {}s", cfg.limits.provider_timeout_seconds);
    println!("  Max upload:           {} bytes", cfg.limits.max_upload_bytes);
    println!("  Grounded reflections: {}", cfg.limits.grounded_max_reflections);
    println!("  Grounded prompt:      {} chars", cfg.limits.grounded_max_prompt_chars);
    println!("  Search limit max:     {}", cfg.limits.search_limit_max);
    println!();
    println!("Queue:");
    println!("  Poll interval: {}s", cfg.queue.poll_interval_seconds);
    println!("  Max retries:   {}", cfg.queue.max_retries);

    Ok(())
}
