//! Retrieval over a user's reflections.
//!
//! Two strategies serve different flows:
//! - [`RetrievalPipeline::search_by_query`]: embed the query and rank by
//!   cosine similarity, falling back to a text match when vector search fails.
//! - [`RetrievalPipeline::answer_from_all_reflections`]: hand the (capped)
//!   history to the model, let it pick the relevant reflections and draft a
//!   short spoken answer citing them.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::analysis::extract_json_object;
use super::safety::{bounded, Limits};
use crate::adapters::{Embedder, LanguageModel};
use crate::domain::{
    GroundedAnswer, QueryResult, Reflection, ReflectionReference, SIMILARITY_THRESHOLD,
};
use crate::error::{EchoError, EchoResult};
use crate::store::{ReflectionStore, VectorSearchError};

/// Most reflections a grounded answer may cite
pub const MAX_CITATIONS: usize = 4;

/// Answer given when there is nothing to ground on
pub const NO_REFLECTIONS_RESPONSE: &str =
    "You haven't recorded any reflections yet, so there is nothing for me to draw on. Record a reflection and ask me again.";

/// Query → reflections
pub struct RetrievalPipeline {
    model: Arc<dyn LanguageModel>,
    embedder: Arc<dyn Embedder>,
    reflections: Arc<dyn ReflectionStore>,
    limits: Limits,
}

impl RetrievalPipeline {
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

    /// Similarity search with text-match fallback
    #[instrument(skip(self, query))]
    pub async fn search_by_query(
        &self,
        user_id: &str,
        query: &str,
        limit: usize,
    ) -> EchoResult<Vec<QueryResult>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(EchoError::validation("Query required"));
        }

        let limit = self.limits.clamp_search_limit(limit);
        let deadline = self.limits.provider_timeout();

        let embedding = bounded(deadline, "query embedding", self.embedder.embed(query))
            .await
            .map_err(EchoError::provider)?;

        let search = timeout(
            deadline,
            self.reflections
                .match_reflections(user_id, &embedding, SIMILARITY_THRESHOLD, limit),
        )
        .await
        .unwrap_or_else(|_| {
            Err(VectorSearchError::Failed(anyhow::anyhow!(
                "vector search timed out after {:?}",
                deadline
            )))
        });

        match search {
            Ok(matches) => {
                let results: Vec<QueryResult> = matches
                    .into_iter()
                    .filter(|(_, score)| *score >= SIMILARITY_THRESHOLD)
                    .take(limit)
                    .map(|(reflection, score)| QueryResult::from_similarity(reflection, score.min(1.0)))
                    .collect();
                debug!(hits = results.len(), "Vector search complete");
                Ok(results)
            }
            Err(e) => {
                warn!("Vector search unavailable, falling back to text match: {}", e);
                let hits = bounded(
                    deadline,
                    "text search",
                    self.reflections.text_search(user_id, query, limit),
                )
                .await
                .map_err(EchoError::persistence)?;
                Ok(hits.into_iter().map(QueryResult::from_text_match).collect())
            }
        }
    }

    /// Grounded answer drawn from the user's reflection history
    #[instrument(skip(self, question))]
    pub async fn answer_from_all_reflections(
        &self,
        user_id: &str,
        question: &str,
    ) -> EchoResult<GroundedAnswer> {
        let question = question.trim();
        if question.is_empty() {
            return Err(EchoError::validation("Question required"));
        }

        let deadline = self.limits.provider_timeout();

        let all = bounded(
            deadline,
            "reflection history",
            self.reflections.all_reflections(user_id),
        )
        .await
        .map_err(EchoError::persistence)?;

        if all.is_empty() {
            info!("No reflections to ground on");
            return Ok(GroundedAnswer {
                response_text: NO_REFLECTIONS_RESPONSE.to_string(),
                spoken_text: NO_REFLECTIONS_RESPONSE.to_string(),
                referenced_reflections: Vec::new(),
            });
        }

        let corpus = cap_corpus(
            &all,
            self.limits.grounded_max_reflections,
            self.limits.grounded_max_prompt_chars,
        );
        if corpus.len() < all.len() {
            info!(
                total = all.len(),
                included = corpus.len(),
                "Reflection history capped for grounded answer"
            );
        }

        let prompt = grounded_prompt(&corpus, question, self.limits.grounded_max_prompt_chars);
        let raw = bounded(
            deadline,
            "grounded generation",
            self.model.generate_structured(&prompt, &grounded_schema()),
        )
        .await
        .map_err(EchoError::provider)?;

        let selection = parse_selection(&raw)?;
        let references = resolve_citations(&selection.selected_reflection_ids, &corpus);

        info!(
            selected = selection.selected_reflection_ids.len(),
            cited = references.len(),
            "Grounded answer drafted"
        );

        Ok(GroundedAnswer {
            spoken_text: clean_spoken_text(&selection.response),
            response_text: selection.response,
            referenced_reflections: references,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroundedSelection {
    response: String,
    #[serde(default)]
    selected_reflection_ids: Vec<String>,
}

fn parse_selection(text: &str) -> EchoResult<GroundedSelection> {
    let object = extract_json_object(text).ok_or_else(|| {
        EchoError::MalformedResponse("no JSON object in grounded response".to_string())
    })?;

    let selection: GroundedSelection = serde_json::from_str(object)
        .map_err(|e| EchoError::MalformedResponse(format!("unexpected grounded shape: {}", e)))?;

    if selection.response.trim().is_empty() {
        return Err(EchoError::MalformedResponse(
            "grounded response text was empty".to_string(),
        ));
    }

    Ok(selection)
}

/// Map selected ids onto the reflections the model was shown.
///
/// Unknown or malformed ids are dropped with a warning; repeats keep their
/// first position. Citation indices are 1..=N in selection order.
pub fn resolve_citations(selected: &[String], corpus: &[&Reflection]) -> Vec<ReflectionReference> {
    let mut seen: HashSet<Uuid> = HashSet::new();
    let mut references = Vec::new();

    for raw_id in selected {
        if references.len() == MAX_CITATIONS {
            break;
        }

        let Ok(id) = Uuid::parse_str(raw_id.trim()) else {
            warn!(id = %raw_id, "Model selected a malformed reflection id");
            continue;
        };
        if !seen.insert(id) {
            continue;
        }
        match corpus.iter().find(|r| r.id == id) {
            Some(reflection) => {
                references.push(ReflectionReference::cite(reflection, references.len() + 1))
            }
            None => warn!(%id, "Model selected an unknown reflection id"),
        }
    }

    references
}

/// Newest-first prefix of `reflections` that fits both caps.
///
/// The newest reflection is always included so a single oversized entry still
/// produces an answer; [`grounded_prompt`] truncates its transcript to fit.
pub fn cap_corpus(reflections: &[Reflection], max_reflections: usize, max_chars: usize) -> Vec<&Reflection> {
    let mut used = 0usize;
    let mut corpus = Vec::new();

    for reflection in reflections.iter().take(max_reflections.max(1)) {
        let size = format_reflection(reflection).chars().count();
        if !corpus.is_empty() && used + size > max_chars {
            break;
        }
        used += size;
        corpus.push(reflection);
    }

    corpus
}

/// One labeled block of the grounding prompt
pub fn format_reflection(reflection: &Reflection) -> String {
    reflection_block(reflection, &reflection.transcript)
}

/// Block for `reflection` no longer than `max_chars`, cutting the transcript
/// and marking the cut with an ellipsis. Labels are never cut.
pub fn format_reflection_within(reflection: &Reflection, max_chars: usize) -> String {
    let full = format_reflection(reflection);
    if full.chars().count() <= max_chars {
        return full;
    }

    let labels = reflection_block(reflection, "").chars().count();
    let keep = max_chars.saturating_sub(labels + 1);
    let mut head: String = reflection.transcript.chars().take(keep).collect();
    head.push('…');
    reflection_block(reflection, &head)
}

fn reflection_block(reflection: &Reflection, transcript: &str) -> String {
    let tags = reflection.tags();
    let themes = reflection.theme_list();
    format!(
        "[Reflection ID: {}]\nDate: {}\nEmotions: {}\nThemes: {}\nTranscript: \"{}\"\n",
        reflection.id,
        reflection.created_at.format("%B %-d, %Y"),
        if tags.is_empty() { "none".to_string() } else { tags.join(", ") },
        if themes.is_empty() { "none".to_string() } else { themes.join(", ") },
        transcript
    )
}

/// Prompt over `corpus`; reflection blocks total at most `max_chars`
pub fn grounded_prompt(corpus: &[&Reflection], question: &str, max_chars: usize) -> String {
    let mut blocks = String::new();
    let mut used = 0usize;
    for reflection in corpus {
        let block = format_reflection_within(reflection, max_chars.saturating_sub(used));
        used += block.chars().count();
        blocks.push_str(&block);
        blocks.push('\n');
    }

    format!(
        r#"You are a reflective companion speaking back to someone using their own past voice reflections.

Here are their reflections, newest first:

{blocks}
Their question: "{question}"

Choose the 2-4 reflections that best answer the question and write a warm 2-4 sentence answer meant to be spoken aloud. Refer to the chosen reflections with citation markers like [1], [2] in the order you list their ids.
If none of the reflections are relevant, say so honestly and select no ids.

Respond with JSON: {{"response": string, "selectedReflectionIds": string[]}}."#
    )
}

fn grounded_schema() -> serde_json::Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "response": {"type": "STRING"},
            "selectedReflectionIds": {"type": "ARRAY", "items": {"type": "STRING"}}
        },
        "required": ["response", "selectedReflectionIds"]
    })
}

/// Strip citation markers like `[1]` or `[1, 2]` and collapse whitespace
pub fn clean_spoken_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(open) = rest.find('[') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find(']') {
            Some(close)
                if close > 0
                    && after[..close]
                        .chars()
                        .all(|c| c.is_ascii_digit() || c == ',' || c == ' ')
                    && after[..close].chars().any(|c| c.is_ascii_digit()) =>
            {
                rest = &after[close + 1..];
            }
            _ => {
                out.push('[');
                rest = after;
            }
        }
    }
    out.push_str(rest);

    let collapsed = out.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed
        .replace(" .", ".")
        .replace(" ,", ",")
        .replace(" !", "!")
        .replace(" ?", "?")
}
