//! Analysis: derive tags, themes, insights, sentiment and an embedding for a
//! reflection, written once.
//!
//! The language model is asked for schema-constrained JSON; its text is still
//! passed through [`extract_json_object`] so a provider that wraps the object
//! in prose or code fences is handled the same way. Nothing is written unless
//! every field parsed and the embedding came back.

use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use super::safety::{bounded, Limits};
use crate::adapters::{Embedder, LanguageModel};
use crate::domain::{AnalysisResult, ReflectionAnalysis};
use crate::error::{EchoError, EchoResult};
use crate::store::ReflectionStore;

/// Result of an analyze call
#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub analysis: AnalysisResult,
    /// The stored analysis was returned without calling the model
    pub already_analyzed: bool,
}

/// Transcript → analysis fields + embedding
pub struct AnalysisPipeline {
    model: Arc<dyn LanguageModel>,
    embedder: Arc<dyn Embedder>,
    reflections: Arc<dyn ReflectionStore>,
    limits: Limits,
}

impl AnalysisPipeline {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        embedder: Arc<dyn Embedder>,
        reflections: Arc<dyn ReflectionStore>,
        limits: Limits,
    ) -> Self {
        Self {
            model,
            embedder,
            reflections,
            limits,
        }
    }

    /// Analyze a reflection, or return its stored analysis
    #[instrument(skip(self))]
    pub async fn analyze(&self, reflection_id: Uuid) -> EchoResult<AnalysisOutcome> {
        let timeout = self.limits.provider_timeout();

        let reflection = bounded(
            timeout,
            "reflection lookup",
            self.reflections.get_reflection(reflection_id),
        )
        .await
        .map_err(EchoError::persistence)?
        .ok_or_else(|| EchoError::not_found("Reflection"))?;

        if reflection.is_analyzed() {
            let analysis = reflection.analysis().ok_or_else(|| {
                EchoError::Persistence(format!(
                    "reflection {} is marked analyzed but has missing fields",
                    reflection_id
                ))
            })?;
            debug!("Reflection already analyzed");
            return Ok(AnalysisOutcome {
                analysis,
                already_analyzed: true,
            });
        }

        let raw = bounded(
            timeout,
            "analysis generation",
            self.model
                .generate_structured(&analysis_prompt(&reflection.transcript), &analysis_schema()),
        )
        .await
        .map_err(EchoError::provider)?;

        let analysis = parse_analysis(&raw)?;

        let embedding = bounded(
            timeout,
            "embedding",
            self.embedder.embed(&reflection.transcript),
        )
        .await
        .map_err(EchoError::provider)?;

        if embedding.is_empty() {
            return Err(EchoError::Provider(
                "embedding provider returned an empty vector".to_string(),
            ));
        }

        let update = ReflectionAnalysis {
            result: analysis.clone(),
            embedding,
            analyzed_at: Utc::now(),
        };

        let written = bounded(
            timeout,
            "analysis update",
            self.reflections.save_analysis(reflection_id, &update),
        )
        .await
        .map_err(EchoError::persistence)?;

        if !written {
            // Another worker got there first; its result is the one that counts
            let stored = self
                .reflections
                .get_reflection(reflection_id)
                .await
                .map_err(EchoError::persistence)?
                .and_then(|r| r.analysis())
                .ok_or_else(|| EchoError::not_found("Reflection"))?;
            return Ok(AnalysisOutcome {
                analysis: stored,
                already_analyzed: true,
            });
        }

        info!(
            dimensions = update.embedding.len(),
            sentiment = analysis.sentiment_score,
            "Reflection analyzed"
        );

        Ok(AnalysisOutcome {
            analysis,
            already_analyzed: false,
        })
    }
}

fn analysis_prompt(transcript: &str) -> String {
    format!(
        r#"You are analyzing a personal voice reflection. Extract the following from the transcript.

Transcript:
"{transcript}"

Respond with a JSON object with exactly these fields:
- emotional_tags: 2-4 emotion words (e.g. "hopeful", "anxious", "grateful", "frustrated", "peaceful")
- themes: 1-3 life areas (e.g. "career", "relationships", "self-growth", "health", "family")
- key_insights: 1-3 realizations or lessons, one sentence each
- sentiment_score: a number from -1.0 (very negative) to 1.0 (very positive)

Only extract what is actually present. Be grounded and non-judgmental."#
    )
}

fn analysis_schema() -> serde_json::Value {
    let strings = json!({"type": "ARRAY", "items": {"type": "STRING"}});
    json!({
        "type": "OBJECT",
        "properties": {
            "emotional_tags": strings,
            "themes": strings,
            "key_insights": strings,
            "sentiment_score": {"type": "NUMBER"}
        },
        "required": ["emotional_tags", "themes", "key_insights", "sentiment_score"]
    })
}

#[derive(Debug, Deserialize)]
struct RawAnalysis {
    emotional_tags: Vec<String>,
    themes: Vec<String>,
    key_insights: Vec<String>,
    sentiment_score: f64,
}

/// Parse model output into an analysis.
///
/// Out-of-range or non-finite sentiment is rejected rather than clamped.
pub fn parse_analysis(text: &str) -> EchoResult<AnalysisResult> {
    let object = extract_json_object(text).ok_or_else(|| {
        EchoError::MalformedResponse("no JSON object in model response".to_string())
    })?;

    let raw: RawAnalysis = serde_json::from_str(object)
        .map_err(|e| EchoError::MalformedResponse(format!("unexpected analysis shape: {}", e)))?;

    if !raw.sentiment_score.is_finite() || !(-1.0..=1.0).contains(&raw.sentiment_score) {
        return Err(EchoError::MalformedResponse(format!(
            "sentiment_score {} outside [-1, 1]",
            raw.sentiment_score
        )));
    }

    Ok(AnalysisResult {
        emotional_tags: normalize_labels(raw.emotional_tags),
        themes: normalize_labels(raw.themes),
        key_insights: normalize_labels(raw.key_insights),
        sentiment_score: raw.sentiment_score,
    })
}

/// Trim, drop empties and duplicates, keep first-seen order
fn normalize_labels(labels: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(labels.len());
    for label in labels {
        let label = label.trim();
        if label.is_empty() || out.iter().any(|seen| seen.eq_ignore_ascii_case(label)) {
            continue;
        }
        out.push(label.to_string());
    }
    out
}

/// First balanced `{...}` in `text` that parses as a JSON object.
///
/// Honors JSON strings and escapes; balanced spans that are not JSON (prose
/// in braces) are skipped.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();

    'candidates: for (start, _) in text.match_indices('{') {
        let mut depth = 0usize;
        let mut in_string = false;
        let mut escaped = false;

        for (offset, &byte) in bytes[start..].iter().enumerate() {
            if in_string {
                match byte {
                    _ if escaped => escaped = false,
                    b'\\' => escaped = true,
                    b'"' => in_string = false,
                    _ => {}
                }
                continue;
            }

            match byte {
                b'"' => in_string = true,
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        let candidate = &text[start..=start + offset];
                        if serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(candidate)
                            .is_ok()
                        {
                            return Some(candidate);
                        }
                        continue 'candidates;
                    }
                }
                _ => {}
            }
        }
    }

    None
}
