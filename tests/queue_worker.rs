//! Analysis Queue + Worker Integration Tests
//!
//! Ingest schedules analysis; the worker drains it, records failures and
//! retries them on the next recovery.

mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use common::Harness;
use echoes::core::{AnalysisQueue, AnalysisWorker, DrainReport, EnqueueResult, JobStatus, QueueSettings};
use echoes::store::ReflectionStore;

#[tokio::test]
async fn test_drain_analyzes_ingested_reflection() {
    let h = Harness::new().await;

    let outcome = h
        .orchestrator
        .ingest
        .ingest("alice", b"audio".to_vec(), None, None)
        .await
        .unwrap();

    let report = h.orchestrator.worker().run_once().await.unwrap();
    assert_eq!(report, DrainReport { completed: 1, failed: 0 });

    let stored = h.store.get_reflection(outcome.reflection_id).await.unwrap().unwrap();
    assert!(stored.is_analyzed());

    let item = h.queue.get(outcome.reflection_id).await.unwrap().unwrap();
    assert_eq!(item.status, JobStatus::Done);
    assert!(item.completed_at.is_some());

    // Nothing left to do
    let again = h.orchestrator.worker().run_once().await.unwrap();
    assert_eq!(again, DrainReport::default());
    assert_eq!(h.model.analysis_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_enqueue_is_idempotent() {
    let h = Harness::new().await;
    let reflection = h.seed("alice", "Queued twice").await;

    assert_eq!(h.queue.enqueue(reflection.id).await.unwrap(), EnqueueResult::Queued);
    assert_eq!(
        h.queue.enqueue(reflection.id).await.unwrap(),
        EnqueueResult::AlreadyQueued
    );
    assert_eq!(h.queue.get_pending().await.unwrap().len(), 1);

    h.orchestrator.worker().run_once().await.unwrap();
    assert_eq!(
        h.queue.enqueue(reflection.id).await.unwrap(),
        EnqueueResult::AlreadyProcessed
    );
}

#[tokio::test]
async fn test_failed_analysis_is_recorded_and_retried() {
    let h = Harness::new().await;
    let reflection = h.seed("alice", "Flaky provider day").await;
    h.queue.enqueue(reflection.id).await.unwrap();

    h.model.set_analysis_reply("not json");
    let report = h.orchestrator.worker().run_once().await.unwrap();
    assert_eq!(report, DrainReport { completed: 0, failed: 1 });

    let item = h.queue.get(reflection.id).await.unwrap().unwrap();
    assert_eq!(item.status, JobStatus::Failed);
    assert!(item.error.as_deref().unwrap_or_default().contains("Malformed"));

    // Provider recovers; the next recovery pass resets and the drain succeeds
    h.model.set_analysis_reply(common::ANALYSIS_REPLY);
    let worker = h.orchestrator.worker();
    assert_eq!(worker.recover().await.unwrap(), 1);
    let report = worker.run_once().await.unwrap();
    assert_eq!(report.completed, 1);

    let item = h.queue.get(reflection.id).await.unwrap().unwrap();
    assert_eq!(item.status, JobStatus::Done);
    assert_eq!(item.retry_count, 1);
}

#[tokio::test]
async fn test_retries_stop_at_max() {
    let h = Harness::new().await;
    let reflection = h.seed("alice", "Never parses").await;
    h.queue.enqueue(reflection.id).await.unwrap();
    h.model.set_analysis_reply("still not json");

    let settings = QueueSettings {
        poll_interval_seconds: 1,
        max_retries: 2,
    };
    let worker = AnalysisWorker::new(
        h.queue.clone(),
        h.orchestrator.analysis.clone(),
        settings,
    );

    worker.run_once().await.unwrap();
    for _ in 0..5 {
        worker.recover().await.unwrap();
        worker.run_once().await.unwrap();
    }

    let item = h.queue.get(reflection.id).await.unwrap().unwrap();
    assert_eq!(item.status, JobStatus::Failed);
    assert_eq!(item.retry_count, 2);
    // One initial attempt plus two retries
    assert_eq!(h.model.analysis_calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_interrupted_item_is_recovered_after_restart() {
    let h = Harness::new().await;
    let reflection = h.seed("alice", "Crashed mid-analysis").await;
    h.queue.enqueue(reflection.id).await.unwrap();
    h.queue.mark_processing(reflection.id).await.unwrap();

    // A fresh queue over the same file sees the same state
    let reopened = std::sync::Arc::new(AnalysisQueue::new(h.queue.path().to_path_buf()));
    let item = reopened.get(reflection.id).await.unwrap().unwrap();
    assert_eq!(item.status, JobStatus::Processing);

    let worker = AnalysisWorker::new(
        reopened.clone(),
        h.orchestrator.analysis.clone(),
        QueueSettings::default(),
    );
    assert_eq!(worker.recover().await.unwrap(), 1);
    assert_eq!(worker.run_once().await.unwrap().completed, 1);

    let item = reopened.get(reflection.id).await.unwrap().unwrap();
    assert_eq!(item.status, JobStatus::Done);
    // A restart is not a failed attempt
    assert_eq!(item.retry_count, 0);
}

#[tokio::test]
async fn test_one_off_drain_leaves_in_flight_items_alone() {
    let h = Harness::new().await;
    let in_flight = h.seed("alice", "Being analyzed by the server").await;
    let failed = h.seed("alice", "Failed earlier").await;

    // The server's worker holds `in_flight`; `failed` has retry budget left
    h.queue.enqueue(in_flight.id).await.unwrap();
    h.queue.mark_processing(in_flight.id).await.unwrap();
    h.queue.enqueue(failed.id).await.unwrap();
    h.queue.mark_processing(failed.id).await.unwrap();
    h.queue.mark_failed(failed.id, "timeout").await.unwrap();

    // A second process sharing the queue file
    let shared = std::sync::Arc::new(AnalysisQueue::new(h.queue.path().to_path_buf()));
    let drain = AnalysisWorker::new(
        shared.clone(),
        h.orchestrator.analysis.clone(),
        QueueSettings::default(),
    );

    assert_eq!(drain.retry_failed().await.unwrap(), 1);
    let report = drain.run_once().await.unwrap();
    assert_eq!(report, DrainReport { completed: 1, failed: 0 });

    assert_eq!(h.model.analysis_calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        shared.get(in_flight.id).await.unwrap().unwrap().status,
        JobStatus::Processing
    );
    assert!(!h.store.get_reflection(in_flight.id).await.unwrap().unwrap().is_analyzed());

    // The claim is still held; a second consumer cannot take it
    assert!(shared.mark_processing(in_flight.id).await.is_err());
}

#[tokio::test]
async fn test_spawned_worker_picks_up_new_items() {
    let h = Harness::new().await;
    let handle = h.orchestrator.worker().spawn();

    let outcome = h
        .orchestrator
        .ingest
        .ingest("alice", b"audio".to_vec(), None, None)
        .await
        .unwrap();

    let mut analyzed = false;
    for _ in 0..100 {
        let stored = h.store.get_reflection(outcome.reflection_id).await.unwrap().unwrap();
        if stored.is_analyzed() {
            analyzed = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    handle.abort();

    assert!(analyzed, "worker did not analyze the new reflection");
}
