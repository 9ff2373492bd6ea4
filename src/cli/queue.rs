//! Analysis queue CLI commands.
//!
//! - `echoes queue status` - Show queue status
//! - `echoes queue drain` - Analyze everything pending, then exit

use anyhow::Result;
use clap::Subcommand;

use crate::config::ResolvedConfig;
use crate::core::{AnalysisQueue, JobStatus, Orchestrator};

/// Queue subcommands
#[derive(Subcommand, Debug)]
pub enum QueueCommands {
    /// Show analysis queue status
    Status,

    /// Process pending analyses once (retries failed items first; safe next to a running server)
    Drain,
}

/// Execute a queue subcommand
pub async fn execute(command: QueueCommands) -> Result<()> {
    let config = ResolvedConfig::load()?;

    match command {
        QueueCommands::Status => show_status(&config).await,
        QueueCommands::Drain => drain(&config).await,
    }
}

async fn show_status(config: &ResolvedConfig) -> Result<()> {
    let queue = AnalysisQueue::new(config.queue_path());
    let summary = queue.summary().await?;

    println!("Analysis queue: {}", queue.path().display());
    println!();
    println!("  Pending:    {}", summary.pending);
    println!("  Processing: {}", summary.processing);
    println!("  Done:       {}", summary.done);
    println!("  Failed:     {}", summary.failed);
    println!("  Total:      {}", summary.total());

    if !summary.recent.is_empty() {
        println!();
        println!("Recent:");
        for item in &summary.recent {
            let status = match item.status {
                JobStatus::Pending => "pending",
                JobStatus::Processing => "processing",
                JobStatus::Done => "done",
                JobStatus::Failed => "failed",
            };
            print!("  {} {:<10} {}", item.reflection_id, status, item.enqueued_at.format("%Y-%m-%d %H:%M"));
            if item.retry_count > 0 {
                print!(" (retries: {})", item.retry_count);
            }
            if let Some(error) = &item.error {
                print!(" - {}", error);
            }
            println!();
        }
    }

    Ok(())
}

async fn drain(config: &ResolvedConfig) -> Result<()> {
    let orchestrator = Orchestrator::from_config(config).await?;
    let worker = orchestrator.worker();

    let reset = worker.retry_failed().await?;
    if reset > 0 {
        eprintln!("Retrying {} failed item(s)", reset);
    }

    let report = worker.run_once().await?;
    eprintln!(
        "Drained analysis queue: {} completed, {} failed",
        report.completed, report.failed
    );

    Ok(())
}
