//! Retrieval Integration Tests
//!
//! Similarity search with its text-match fallback, and grounded answers
//! drawn from the whole reflection history.

mod common;

use std::sync::atomic::Ordering;

use common::Harness;
use echoes::core::retrieval::{MAX_CITATIONS, NO_REFLECTIONS_RESPONSE};
use echoes::core::Limits;
use echoes::domain::{TEXT_MATCH_REASON, TEXT_MATCH_SCORE};
use echoes::error::EchoError;

// =============================================================================
// Similarity search
// =============================================================================

#[tokio::test]
async fn test_search_ranks_by_similarity_and_drops_weak_matches() {
    let h = Harness::new().await;
    let work = h
        .seed_analyzed("alice", "Work deadlines again", &["stressed"], &["career"])
        .await;
    let work_and_sleep = h
        .seed_analyzed("alice", "Work kept me from sleep", &["tired"], &["career"])
        .await;
    h.seed_analyzed("alice", "Family picnic", &["happy"], &["family"])
        .await;

    let results = h
        .orchestrator
        .retrieval
        .search_by_query("alice", "how is work going", 5)
        .await
        .unwrap();

    let ids: Vec<_> = results.iter().map(|r| r.reflection.id).collect();
    assert_eq!(ids, vec![work.id, work_and_sleep.id]);
    assert!(results[0].similarity_score > results[1].similarity_score);
    assert!(results.iter().all(|r| r.similarity_score >= 0.5));
    assert_eq!(
        results[0].relevance_reason.as_deref(),
        Some("Highly relevant match")
    );
}

#[tokio::test]
async fn test_search_is_scoped_to_the_caller() {
    let h = Harness::new().await;
    h.seed_analyzed("bob", "Work is fine", &["calm"], &["career"]).await;

    let results = h
        .orchestrator
        .retrieval
        .search_by_query("alice", "work", 5)
        .await
        .unwrap();
    assert!(results.is_empty());
}

#[tokio::test]
async fn test_search_respects_limit() {
    let h = Harness::new().await;
    for i in 0..4 {
        h.seed_analyzed("alice", &format!("Work note {}", i), &["busy"], &["career"])
            .await;
    }

    let results = h
        .orchestrator
        .retrieval
        .search_by_query("alice", "work", 2)
        .await
        .unwrap();
    assert_eq!(results.len(), 2);
}

#[tokio::test]
async fn test_search_falls_back_to_text_match() {
    let h = Harness::with_options(false, Limits::default()).await;
    let hit = h.seed("alice", "Walked the dog by the river").await;
    h.seed("alice", "Cooked dinner").await;

    let results = h
        .orchestrator
        .retrieval
        .search_by_query("alice", "RIVER", 5)
        .await
        .unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].reflection.id, hit.id);
    assert_eq!(results[0].similarity_score, TEXT_MATCH_SCORE);
    assert_eq!(results[0].relevance_reason.as_deref(), Some(TEXT_MATCH_REASON));
}

#[tokio::test]
async fn test_search_requires_a_query() {
    let h = Harness::new().await;

    let err = h
        .orchestrator
        .retrieval
        .search_by_query("alice", "   ", 5)
        .await
        .unwrap_err();
    assert!(matches!(err, EchoError::Validation(_)));
    assert_eq!(err.public_message(), "Query required");
    assert_eq!(h.embedder.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_search_embedding_failure_is_a_provider_error() {
    let h = Harness::new().await;
    h.embedder.fail.store(true, Ordering::SeqCst);

    let err = h
        .orchestrator
        .retrieval
        .search_by_query("alice", "work", 5)
        .await
        .unwrap_err();
    assert!(matches!(err, EchoError::Provider(_)));
}

// =============================================================================
// Grounded answers
// =============================================================================

#[tokio::test]
async fn test_no_reflections_answers_without_model_call() {
    let h = Harness::new().await;

    let answer = h
        .orchestrator
        .retrieval
        .answer_from_all_reflections("alice", "What have I learned?")
        .await
        .unwrap();

    assert_eq!(answer.response_text, NO_REFLECTIONS_RESPONSE);
    assert!(answer.referenced_reflections.is_empty());
    assert_eq!(h.model.grounded_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_grounded_answer_cites_selected_reflections_in_order() {
    let h = Harness::new().await;
    let older = h
        .seed_analyzed("alice", "Started running", &["proud"], &["health"])
        .await;
    let newer = h
        .seed_analyzed("alice", "Ran a 10k", &["elated"], &["health"])
        .await;

    h.model.set_grounded_reply(&format!(
        r#"{{"response":"You kept showing up [1] and it paid off [2].","selectedReflectionIds":["{}","{}"]}}"#,
        newer.id, older.id
    ));

    let answer = h
        .orchestrator
        .retrieval
        .answer_from_all_reflections("alice", "How has my running gone?")
        .await
        .unwrap();

    assert_eq!(answer.response_text, "You kept showing up [1] and it paid off [2].");
    assert_eq!(answer.spoken_text, "You kept showing up and it paid off.");

    let cited: Vec<_> = answer
        .referenced_reflections
        .iter()
        .map(|r| (r.id, r.citation_index))
        .collect();
    assert_eq!(cited, vec![(newer.id, 1), (older.id, 2)]);
    assert!(answer
        .referenced_reflections
        .iter()
        .all(|r| r.similarity_score == 1.0));
    assert_eq!(answer.referenced_reflections[0].themes, vec!["health"]);

    // Both reflections were shown to the model, newest first
    let prompt = h.model.last_prompt();
    let newer_at = prompt.find(&newer.id.to_string()).unwrap();
    let older_at = prompt.find(&older.id.to_string()).unwrap();
    assert!(newer_at < older_at);
    assert!(prompt.contains("How has my running gone?"));
}

#[tokio::test]
async fn test_grounded_answer_drops_unknown_and_foreign_ids() {
    let h = Harness::new().await;
    let mine = h.seed("alice", "My own reflection").await;
    let theirs = h.seed("bob", "Someone else's reflection").await;

    h.model.set_grounded_reply(&format!(
        r#"{{"response":"Here is what I found.","selectedReflectionIds":["not-a-uuid","{}","{}","{}"]}}"#,
        theirs.id,
        uuid::Uuid::new_v4(),
        mine.id
    ));

    let answer = h
        .orchestrator
        .retrieval
        .answer_from_all_reflections("alice", "Anything?")
        .await
        .unwrap();

    assert_eq!(answer.referenced_reflections.len(), 1);
    assert_eq!(answer.referenced_reflections[0].id, mine.id);
    assert_eq!(answer.referenced_reflections[0].citation_index, 1);
    assert!(!h.model.last_prompt().contains(&theirs.id.to_string()));
}

#[tokio::test]
async fn test_grounded_answer_caps_citations() {
    let h = Harness::new().await;
    let mut ids = Vec::new();
    for i in 0..6 {
        ids.push(h.seed("alice", &format!("Reflection {}", i)).await.id.to_string());
    }

    h.model.set_grounded_reply(
        &serde_json::json!({
            "response": "Lots of thoughts.",
            "selectedReflectionIds": ids,
        })
        .to_string(),
    );

    let answer = h
        .orchestrator
        .retrieval
        .answer_from_all_reflections("alice", "Summarize")
        .await
        .unwrap();
    assert_eq!(answer.referenced_reflections.len(), MAX_CITATIONS);
}

#[tokio::test]
async fn test_grounded_answer_without_selection_is_valid() {
    let h = Harness::new().await;
    h.seed("alice", "Nothing relevant").await;

    let answer = h
        .orchestrator
        .retrieval
        .answer_from_all_reflections("alice", "What about quantum physics?")
        .await
        .unwrap();

    assert_eq!(answer.response_text, "Nothing stands out.");
    assert!(answer.referenced_reflections.is_empty());
}

#[tokio::test]
async fn test_grounded_answer_rejects_malformed_output() {
    let h = Harness::new().await;
    h.seed("alice", "Something").await;
    h.model.set_grounded_reply("I think you're doing great!");

    let err = h
        .orchestrator
        .retrieval
        .answer_from_all_reflections("alice", "How am I?")
        .await
        .unwrap_err();
    assert!(matches!(err, EchoError::MalformedResponse(_)));
}

#[tokio::test]
async fn test_grounded_corpus_respects_reflection_cap() {
    let limits = Limits {
        grounded_max_reflections: 2,
        ..Default::default()
    };
    let h = Harness::with_options(true, limits).await;
    let oldest = h.seed("alice", "Oldest").await;
    let middle = h.seed("alice", "Middle").await;
    let newest = h.seed("alice", "Newest").await;

    h.orchestrator
        .retrieval
        .answer_from_all_reflections("alice", "Recap")
        .await
        .unwrap();

    let prompt = h.model.last_prompt();
    assert!(prompt.contains(&newest.id.to_string()));
    assert!(prompt.contains(&middle.id.to_string()));
    assert!(!prompt.contains(&oldest.id.to_string()));
}

#[tokio::test]
async fn test_grounded_prompt_bounds_a_huge_transcript() {
    let limits = Limits {
        grounded_max_prompt_chars: 2_000,
        ..Default::default()
    };
    let h = Harness::with_options(true, limits).await;
    let huge = h.seed("alice", &"on and on ".repeat(50_000)).await;

    h.orchestrator
        .retrieval
        .answer_from_all_reflections("alice", "Recap")
        .await
        .unwrap();

    let prompt = h.model.last_prompt();
    assert!(prompt.contains(&huge.id.to_string()));
    assert!(prompt.chars().count() < 5_000);
}
