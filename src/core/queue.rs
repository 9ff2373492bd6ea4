//! JSONL-based analysis queue with at-least-once delivery.
//!
//! Append-only JSONL with state derived from replay: each queue item is
//! enqueued once and every state change is appended as a new line. State
//! checks and the append that follows them run under one exclusive file lock,
//! so the server and a CLI drain can share the file without both claiming
//! the same item.
//!
//! Delivery is at-least-once: an item left in `processing` by a crash is
//! recovered when the server starts, and failed items are retried up to
//! `max_retries`. The consumer (analysis) is idempotent, so redelivery is safe.

use std::collections::HashMap;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs::{self, File};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Notify;
use uuid::Uuid;

/// Errors that can occur with the analysis queue
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Queue item not found: {0}")]
    NotFound(Uuid),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid state transition: {from:?} → {to:?}")]
    InvalidTransition { from: JobStatus, to: JobStatus },
}

/// Worker tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueSettings {
    /// Poll interval when no enqueue notification arrives (default: 30s)
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u64,

    /// Retries after the first failed attempt (default: 3)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_poll_interval() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    3
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            poll_interval_seconds: default_poll_interval(),
            max_retries: default_max_retries(),
        }
    }
}

/// Status of a queued analysis job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Done,
    Failed,
}

/// An event in the queue log (append-only)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEvent {
    /// When this event occurred
    pub timestamp: DateTime<Utc>,

    /// The reflection to analyze
    pub reflection_id: Uuid,

    /// Type of queue event
    pub event_type: QueueEventType,

    /// Error message for failures
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Types of queue events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueEventType {
    /// Item added to queue
    Enqueued,

    /// Processing started
    ProcessingStarted,

    /// Processing completed successfully
    Completed,

    /// Processing failed
    Failed,

    /// Reset for retry after a failure (counts against the retry budget)
    ResetForRetry,

    /// Interrupted attempt returned to pending (does not count as a retry)
    Recovered,
}

/// A queue item with current state (derived from replaying events)
#[derive(Debug, Clone)]
pub struct QueueItem {
    pub reflection_id: Uuid,
    pub status: JobStatus,
    pub enqueued_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    /// Number of retry attempts
    pub retry_count: u32,
}

/// Result of enqueueing an item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueResult {
    /// Successfully queued (new item)
    Queued,

    /// Already queued and pending/processing
    AlreadyQueued,

    /// Already analyzed (done)
    AlreadyProcessed,

    /// Reset from failed state for retry
    ResetForRetry,
}

impl EnqueueResult {
    /// Check if this was a new enqueue
    pub fn is_new(&self) -> bool {
        matches!(self, Self::Queued)
    }
}

/// Queue status summary
#[derive(Debug, Clone, Default)]
pub struct QueueSummary {
    pub pending: usize,
    pub processing: usize,
    pub done: usize,
    pub failed: usize,
    pub recent: Vec<QueueItem>,
}

impl QueueSummary {
    /// Total items in queue
    pub fn total(&self) -> usize {
        self.pending + self.processing + self.done + self.failed
    }
}

/// JSONL-based analysis queue
pub struct AnalysisQueue {
    /// Path to the queue JSONL file
    queue_path: PathBuf,

    /// Wakes the worker after an enqueue
    wakeup: Notify,
}

impl AnalysisQueue {
    /// Create a queue backed by `queue_path`
    pub fn new(queue_path: PathBuf) -> Self {
        Self {
            queue_path,
            wakeup: Notify::new(),
        }
    }

    /// Open a queue, creating its parent directory
    pub async fn open(queue_path: PathBuf) -> Result<Self, QueueError> {
        if let Some(parent) = queue_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(Self::new(queue_path))
    }

    /// Path to the queue file
    pub fn path(&self) -> &std::path::Path {
        &self.queue_path
    }

    /// Wait until something is enqueued
    pub async fn notified(&self) {
        self.wakeup.notified().await
    }

    /// Append an event to the queue log under an exclusive lock
    fn append_event(&self, event: &QueueEvent) -> Result<(), QueueError> {
        let json = serde_json::to_string(event)?;

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.queue_path)?;

        file.lock_exclusive()?;
        writeln!(file, "{}", json)?;
        file.flush()?;

        // Lock is released when file is dropped
        Ok(())
    }

    /// Replay, decide, append: all under one exclusive lock.
    ///
    /// `decide` sees the current state and returns the events to append.
    /// Nothing awaits while the lock is held.
    fn update<T>(
        &self,
        decide: impl FnOnce(&HashMap<Uuid, QueueItem>) -> Result<(Vec<QueueEvent>, T), QueueError>,
    ) -> Result<T, QueueError> {
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.queue_path)?;

        file.lock_exclusive()?;
        let items = Self::replay_locked(&self.queue_path)?;
        let (events, out) = decide(&items)?;

        for event in &events {
            writeln!(file, "{}", serde_json::to_string(event)?)?;
        }
        file.flush()?;

        // Lock is released when file is dropped
        Ok(out)
    }

    /// Blocking replay for use while the lock is held
    fn replay_locked(path: &Path) -> Result<HashMap<Uuid, QueueItem>, QueueError> {
        let mut items = HashMap::new();
        let reader = std::io::BufReader::new(std::fs::File::open(path)?);

        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            Self::apply_event(&mut items, serde_json::from_str(&line)?);
        }

        Ok(items)
    }

    fn event(reflection_id: Uuid, event_type: QueueEventType) -> QueueEvent {
        QueueEvent {
            timestamp: Utc::now(),
            reflection_id,
            event_type,
            error: None,
        }
    }

    /// Replay all events to build current state
    pub async fn replay(&self) -> Result<HashMap<Uuid, QueueItem>, QueueError> {
        let mut items: HashMap<Uuid, QueueItem> = HashMap::new();

        if !self.queue_path.exists() {
            return Ok(items);
        }

        let file = File::open(&self.queue_path).await?;
        let reader = BufReader::new(file);
        let mut lines = reader.lines();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }

            let event: QueueEvent = serde_json::from_str(&line)?;
            Self::apply_event(&mut items, event);
        }

        Ok(items)
    }

    /// Apply a single event to the state
    fn apply_event(items: &mut HashMap<Uuid, QueueItem>, event: QueueEvent) {
        match event.event_type {
            QueueEventType::Enqueued => {
                items.entry(event.reflection_id).or_insert(QueueItem {
                    reflection_id: event.reflection_id,
                    status: JobStatus::Pending,
                    enqueued_at: event.timestamp,
                    started_at: None,
                    completed_at: None,
                    error: None,
                    retry_count: 0,
                });
            }
            QueueEventType::ProcessingStarted => {
                if let Some(item) = items.get_mut(&event.reflection_id) {
                    item.status = JobStatus::Processing;
                    item.started_at = Some(event.timestamp);
                }
            }
            QueueEventType::Completed => {
                if let Some(item) = items.get_mut(&event.reflection_id) {
                    item.status = JobStatus::Done;
                    item.completed_at = Some(event.timestamp);
                }
            }
            QueueEventType::Failed => {
                if let Some(item) = items.get_mut(&event.reflection_id) {
                    item.status = JobStatus::Failed;
                    item.completed_at = Some(event.timestamp);
                    item.error = event.error;
                }
            }
            QueueEventType::ResetForRetry => {
                if let Some(item) = items.get_mut(&event.reflection_id) {
                    item.status = JobStatus::Pending;
                    item.retry_count += 1;
                    item.error = None;
                    item.started_at = None;
                    item.completed_at = None;
                }
            }
            QueueEventType::Recovered => {
                if let Some(item) = items.get_mut(&event.reflection_id) {
                    item.status = JobStatus::Pending;
                    item.started_at = None;
                }
            }
        }
    }

    /// Enqueue a reflection for analysis (idempotent)
    pub async fn enqueue(&self, reflection_id: Uuid) -> Result<EnqueueResult, QueueError> {
        let result = self.update(|items| {
            Ok(match items.get(&reflection_id).map(|i| i.status) {
                Some(JobStatus::Done) => (vec![], EnqueueResult::AlreadyProcessed),
                Some(JobStatus::Pending) | Some(JobStatus::Processing) => {
                    (vec![], EnqueueResult::AlreadyQueued)
                }
                Some(JobStatus::Failed) => (
                    vec![Self::event(reflection_id, QueueEventType::ResetForRetry)],
                    EnqueueResult::ResetForRetry,
                ),
                None => (
                    vec![Self::event(reflection_id, QueueEventType::Enqueued)],
                    EnqueueResult::Queued,
                ),
            })
        })?;

        if matches!(result, EnqueueResult::Queued | EnqueueResult::ResetForRetry) {
            self.wakeup.notify_one();
        }
        Ok(result)
    }

    /// Get all pending items, oldest first
    pub async fn get_pending(&self) -> Result<Vec<QueueItem>, QueueError> {
        let items = self.replay().await?;
        let mut pending: Vec<QueueItem> = items
            .into_values()
            .filter(|item| item.status == JobStatus::Pending)
            .collect();

        pending.sort_by(|a, b| a.enqueued_at.cmp(&b.enqueued_at));

        Ok(pending)
    }

    /// Claim a pending item. Only one consumer can win the claim.
    pub async fn mark_processing(&self, reflection_id: Uuid) -> Result<(), QueueError> {
        self.update(|items| {
            let item = items
                .get(&reflection_id)
                .ok_or(QueueError::NotFound(reflection_id))?;

            if item.status != JobStatus::Pending {
                return Err(QueueError::InvalidTransition {
                    from: item.status,
                    to: JobStatus::Processing,
                });
            }

            Ok((
                vec![Self::event(reflection_id, QueueEventType::ProcessingStarted)],
                (),
            ))
        })
    }

    /// Mark an item as done
    pub async fn mark_done(&self, reflection_id: Uuid) -> Result<(), QueueError> {
        self.append_event(&Self::event(reflection_id, QueueEventType::Completed))
    }

    /// Mark an item as failed
    pub async fn mark_failed(&self, reflection_id: Uuid, error: &str) -> Result<(), QueueError> {
        let mut event = Self::event(reflection_id, QueueEventType::Failed);
        event.error = Some(error.to_string());
        self.append_event(&event)
    }

    /// Return items left in `processing` to pending.
    ///
    /// Only safe when no other consumer is running (server start). Recovery
    /// does not count against the retry budget. Returns how many were reset.
    pub async fn recover_interrupted(&self) -> Result<usize, QueueError> {
        self.update(|items| {
            let events: Vec<QueueEvent> = items
                .values()
                .filter(|item| item.status == JobStatus::Processing)
                .map(|item| Self::event(item.reflection_id, QueueEventType::Recovered))
                .collect();
            let reset = events.len();
            Ok((events, reset))
        })
    }

    /// Return failed items with retry budget left to pending
    pub async fn retry_failed(&self, max_retries: u32) -> Result<usize, QueueError> {
        self.update(|items| {
            let events: Vec<QueueEvent> = items
                .values()
                .filter(|item| item.status == JobStatus::Failed && item.retry_count < max_retries)
                .map(|item| Self::event(item.reflection_id, QueueEventType::ResetForRetry))
                .collect();
            let reset = events.len();
            Ok((events, reset))
        })
    }

    /// Get queue status summary
    pub async fn summary(&self) -> Result<QueueSummary, QueueError> {
        let items = self.replay().await?;

        let mut summary = QueueSummary::default();
        for item in items.values() {
            match item.status {
                JobStatus::Pending => summary.pending += 1,
                JobStatus::Processing => summary.processing += 1,
                JobStatus::Done => summary.done += 1,
                JobStatus::Failed => summary.failed += 1,
            }
        }

        // Get recent items (last 5)
        let mut all_items: Vec<&QueueItem> = items.values().collect();
        all_items.sort_by(|a, b| b.enqueued_at.cmp(&a.enqueued_at));
        summary.recent = all_items.into_iter().take(5).cloned().collect();

        Ok(summary)
    }

    /// Get a specific item
    pub async fn get(&self, reflection_id: Uuid) -> Result<Option<QueueItem>, QueueError> {
        let items = self.replay().await?;
        Ok(items.get(&reflection_id).cloned())
    }
}
