//! Background consumer of the analysis queue.
//!
//! On server start, items left in `processing` by a previous process are
//! returned to pending. The worker then drains pending items, sleeps until an
//! enqueue notification or the poll interval, and on each poll tick resets
//! failed items that still have retry budget.
//!
//! A one-off drain (`echoes queue drain`) may run next to a live server, so
//! it only retries failed items and never touches `processing` ones.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::analysis::AnalysisPipeline;
use super::queue::{AnalysisQueue, QueueError, QueueSettings};

/// Counts from one drain pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub completed: usize,
    pub failed: usize,
}

/// Drives queued reflections through analysis
pub struct AnalysisWorker {
    queue: Arc<AnalysisQueue>,
    analysis: Arc<AnalysisPipeline>,
    settings: QueueSettings,
}

impl AnalysisWorker {
    pub fn new(
        queue: Arc<AnalysisQueue>,
        analysis: Arc<AnalysisPipeline>,
        settings: QueueSettings,
    ) -> Self {
        Self {
            queue,
            analysis,
            settings,
        }
    }

    /// Startup recovery: interrupted items plus retryable failures.
    ///
    /// Only call this when no other consumer is working the queue.
    pub async fn recover(&self) -> Result<usize, QueueError> {
        let interrupted = self.queue.recover_interrupted().await?;
        if interrupted > 0 {
            info!(interrupted, "Recovered interrupted analyses");
        }
        Ok(interrupted + self.retry_failed().await?)
    }

    /// Reset failed items that still have retry budget
    pub async fn retry_failed(&self) -> Result<usize, QueueError> {
        let reset = self.queue.retry_failed(self.settings.max_retries).await?;
        if reset > 0 {
            info!(reset, "Retrying failed analyses");
        }
        Ok(reset)
    }

    /// Process every pending item once
    pub async fn run_once(&self) -> Result<DrainReport, QueueError> {
        let mut report = DrainReport::default();

        for item in self.queue.get_pending().await? {
            let id = item.reflection_id;

            match self.queue.mark_processing(id).await {
                Ok(()) => {}
                Err(QueueError::InvalidTransition { .. }) => {
                    debug!(reflection_id = %id, "Item claimed elsewhere, skipping");
                    continue;
                }
                Err(e) => return Err(e),
            }

            match self.analysis.analyze(id).await {
                Ok(outcome) => {
                    self.queue.mark_done(id).await?;
                    report.completed += 1;
                    debug!(
                        reflection_id = %id,
                        already_analyzed = outcome.already_analyzed,
                        "Analysis job done"
                    );
                }
                Err(e) => {
                    warn!(reflection_id = %id, retry = item.retry_count, "Analysis failed: {}", e);
                    self.queue.mark_failed(id, &e.to_string()).await?;
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    /// Run until the task is aborted
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            if let Err(e) = self.recover().await {
                error!("Analysis queue recovery failed: {}", e);
            }

            let poll = Duration::from_secs(self.settings.poll_interval_seconds.max(1));
            info!(?poll, "Analysis worker started");

            loop {
                match self.run_once().await {
                    Ok(report) if report != DrainReport::default() => {
                        info!(completed = report.completed, failed = report.failed, "Analysis queue drained")
                    }
                    Ok(_) => {}
                    Err(e) => error!("Analysis queue drain failed: {}", e),
                }

                tokio::select! {
                    _ = self.queue.notified() => {}
                    _ = tokio::time::sleep(poll) => {
                        if let Err(e) = self.retry_failed().await {
                            warn!("Failed to reset failed analyses: {}", e);
                        }
                    }
                }
            }
        })
    }
}
