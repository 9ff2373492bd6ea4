//! HTTP request handlers.
//!
//! Each handler authenticates, decodes its input, calls one orchestrator
//! operation and renders the result. Failures come back as [`ApiError`].

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::multipart::{Multipart, MultipartError};
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use tracing::{info, warn};

use super::auth::AuthUser;
use super::types::*;
use crate::config::paths::{is_safe_object_path, GeneratedAudio};
use crate::core::Orchestrator;
use crate::domain::AudioFormat;
use crate::error::EchoError;
use crate::store::ListFilter;

/// Default page size for the timeline
pub const DEFAULT_LIST_LIMIT: usize = 50;

/// Largest page the timeline will return
pub const MAX_LIST_LIMIT: usize = 200;

/// Default number of similarity search results
pub const DEFAULT_QUERY_LIMIT: usize = 5;

/// Multipart fields read by the clone route
const SAMPLE_FIELDS: [&str; 5] = ["sample_0", "sample_1", "sample_2", "sample_3", "sample_4"];

/// Application state shared across all handlers
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    /// Bearer token -> user id
    pub auth_tokens: HashMap<String, String>,
}

impl AppState {
    pub fn new(orchestrator: Arc<Orchestrator>, auth_tokens: HashMap<String, String>) -> Arc<Self> {
        Arc::new(Self {
            orchestrator,
            auth_tokens,
        })
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// An uploaded file part
struct FilePart {
    bytes: Bytes,
    content_type: Option<String>,
}

fn multipart_error(err: MultipartError) -> ApiError {
    ApiError(EchoError::validation(format!("Invalid multipart body: {}", err)))
}

fn json_error(err: JsonRejection) -> ApiError {
    ApiError(EchoError::validation(format!("Invalid JSON body: {}", err.body_text())))
}

/// Collect the named file parts and text fields of a multipart body
async fn read_multipart(
    mut multipart: Multipart,
) -> ApiResult<(HashMap<String, FilePart>, HashMap<String, String>)> {
    let mut files = HashMap::new();
    let mut fields = HashMap::new();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        let is_file = field.file_name().is_some() || field.content_type().is_some();
        let content_type = field.content_type().map(str::to_string);
        let bytes = field.bytes().await.map_err(multipart_error)?;

        if !is_file {
            if let Ok(text) = std::str::from_utf8(&bytes) {
                fields.insert(name.clone(), text.to_string());
            }
        }
        files.insert(name, FilePart { bytes, content_type });
    }

    Ok((files, fields))
}

/// Lenient duration parse: positive integers only, anything else is ignored
fn parse_duration(raw: Option<&String>) -> Option<u32> {
    let value: f64 = raw?.trim().parse().ok()?;
    if value.is_finite() && value >= 1.0 && value <= u32::MAX as f64 {
        Some(value.round() as u32)
    } else {
        None
    }
}

// =============================================================================
// Health
// =============================================================================

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}

// =============================================================================
// Reflections
// =============================================================================

/// POST /reflections/upload (multipart: `audio`, `duration`)
pub async fn upload_reflection(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    multipart: Multipart,
) -> ApiResult<Json<UploadResponse>> {
    let (mut files, fields) = read_multipart(multipart).await?;

    let audio = files
        .remove("audio")
        .filter(|part| !part.bytes.is_empty())
        .ok_or_else(|| ApiError(EchoError::validation("No audio file provided")))?;
    let duration = parse_duration(fields.get("duration"));

    let outcome = state
        .orchestrator
        .ingest
        .ingest(
            &user.user_id,
            audio.bytes.to_vec(),
            audio.content_type.as_deref(),
            duration,
        )
        .await?;

    Ok(Json(UploadResponse {
        reflection_id: outcome.reflection_id,
        transcript: outcome.transcript,
        audio_url: outcome.audio_url,
        message: "Reflection uploaded successfully".to_string(),
    }))
}

/// POST /reflections/analyze
pub async fn analyze_reflection(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    body: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> ApiResult<Json<AnalyzeResponse>> {
    let Json(request) = body.map_err(json_error)?;
    let id = request
        .reflection_id
        .ok_or_else(|| ApiError(EchoError::validation("Reflection ID required")))?;

    // Ownership check before any model call
    state
        .orchestrator
        .reflection_for_user(&user.user_id, id)
        .await?;

    let outcome = state.orchestrator.analysis.analyze(id).await?;
    let message = if outcome.already_analyzed {
        "Reflection already analyzed"
    } else {
        "Reflection analyzed successfully"
    };

    Ok(Json(AnalyzeResponse {
        message: message.to_string(),
        analysis: outcome.analysis,
    }))
}

/// GET /reflections/list
pub async fn list_reflections(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> ApiResult<Json<ListResponse>> {
    let Query(query) = query
        .map_err(|e| ApiError(EchoError::validation(format!("Invalid query: {}", e.body_text()))))?;

    let filter = ListFilter {
        limit: query
            .limit
            .unwrap_or(DEFAULT_LIST_LIMIT)
            .clamp(1, MAX_LIST_LIMIT),
        offset: query.offset.unwrap_or(0),
        theme: query.theme.filter(|t| !t.trim().is_empty()),
        emotion: query.emotion.filter(|e| !e.trim().is_empty()),
    };

    let page = state
        .orchestrator
        .list_reflections(&user.user_id, &filter)
        .await?;

    Ok(Json(ListResponse {
        reflections: page.reflections,
        total: page.total,
        limit: filter.limit,
        offset: filter.offset,
    }))
}

/// POST /reflections/query
pub async fn query_reflections(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    body: Result<Json<QueryRequest>, JsonRejection>,
) -> ApiResult<Json<QueryResponse>> {
    let Json(request) = body.map_err(json_error)?;

    let results = state
        .orchestrator
        .retrieval
        .search_by_query(
            &user.user_id,
            &request.query,
            request.limit.unwrap_or(DEFAULT_QUERY_LIMIT),
        )
        .await?;

    Ok(Json(QueryResponse { results }))
}

// =============================================================================
// Voice
// =============================================================================

/// POST /voice/clone (multipart: `sample_0` .. `sample_4`)
pub async fn clone_voice(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    multipart: Multipart,
) -> ApiResult<Json<CloneResponse>> {
    let (mut files, _) = read_multipart(multipart).await?;

    let samples: Vec<Vec<u8>> = SAMPLE_FIELDS
        .iter()
        .filter_map(|name| files.remove(*name))
        .filter(|part| !part.bytes.is_empty())
        .map(|part| part.bytes.to_vec())
        .collect();

    let profile = state
        .orchestrator
        .voice
        .clone_voice(&user.user_id, &user.user_id, samples)
        .await?;

    Ok(Json(CloneResponse {
        voice_id: profile.voice_id,
        message: "Voice profile created successfully".to_string(),
    }))
}

/// POST /voice/synthesize
///
/// Returns the stored audio URL, or the raw MP3 when storing it fails.
pub async fn synthesize(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    body: Result<Json<SynthesizeRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(request) = body.map_err(json_error)?;

    let text = match (request.reflection_id, request.text) {
        (Some(id), _) => {
            state
                .orchestrator
                .reflection_for_user(&user.user_id, id)
                .await?
                .transcript
        }
        (None, Some(text)) if !text.trim().is_empty() => text,
        _ => {
            return Err(ApiError(EchoError::validation(
                "Either reflectionId or text required",
            )))
        }
    };

    let voice = &state.orchestrator.voice;
    let speech = voice.synthesize_for_user(&user.user_id, &text).await?;

    match voice
        .store_generated_audio(&user.user_id, GeneratedAudio::Synthesized, &speech.audio)
        .await
    {
        Ok(audio_url) => Ok(Json(SynthesizeResponse {
            audio_url,
            voice_id: speech.voice_id,
        })
        .into_response()),
        Err(e) => {
            warn!("Storing synthesized audio failed, returning bytes: {}", e);
            Ok((
                [(header::CONTENT_TYPE, AudioFormat::Mp3.mime_type())],
                speech.audio,
            )
                .into_response())
        }
    }
}

// =============================================================================
// Spoken queries
// =============================================================================

/// POST /query/audio (multipart: `audio`)
///
/// When storing the spoken answer fails, it is inlined as a data URL.
pub async fn audio_query(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    multipart: Multipart,
) -> ApiResult<Json<AudioQueryResponse>> {
    let (mut files, _) = read_multipart(multipart).await?;

    let audio = files
        .remove("audio")
        .filter(|part| !part.bytes.is_empty())
        .ok_or_else(|| ApiError(EchoError::validation("No audio file provided")))?;

    let orchestrator = &state.orchestrator;
    let question = orchestrator
        .transcribe_query(&audio.bytes, audio.content_type.as_deref())
        .await?;

    let spoken = orchestrator.answer_aloud(&user.user_id, &question).await?;

    let response_audio_url = match orchestrator
        .voice
        .store_generated_audio(&user.user_id, GeneratedAudio::Response, &spoken.speech.audio)
        .await
    {
        Ok(url) => url,
        Err(e) => {
            warn!("Storing spoken answer failed, inlining audio: {}", e);
            format!(
                "data:{};base64,{}",
                AudioFormat::Mp3.mime_type(),
                BASE64.encode(&spoken.speech.audio)
            )
        }
    };

    info!(
        cited = spoken.answer.referenced_reflections.len(),
        voice_id = %spoken.speech.voice_id,
        "Answered spoken query"
    );

    Ok(Json(AudioQueryResponse {
        query_transcript: question,
        response_text: spoken.answer.response_text,
        response_audio_url,
        referenced_reflections: spoken.answer.referenced_reflections,
    }))
}

// =============================================================================
// Stored audio
// =============================================================================

/// GET /storage/:bucket/*path
pub async fn serve_object(
    State(state): State<Arc<AppState>>,
    Path((bucket, path)): Path<(String, String)>,
) -> Response {
    let path = path.trim_start_matches('/');
    if !is_safe_object_path(&bucket) || !is_safe_object_path(path) {
        return (StatusCode::BAD_REQUEST, Json(ErrorResponse::new("Invalid path"))).into_response();
    }

    match state.orchestrator.storage().read(&bucket, path).await {
        Ok(Some(bytes)) => {
            let content_type = AudioFormat::from_path(path)
                .map(|f| f.mime_type())
                .unwrap_or("application/octet-stream");
            ([(header::CONTENT_TYPE, content_type)], bytes).into_response()
        }
        Ok(None) => (StatusCode::NOT_FOUND, Json(ErrorResponse::new("Not found"))).into_response(),
        Err(e) => {
            warn!("Failed to read stored object: {:#}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("Failed to read stored audio")),
            )
                .into_response()
        }
    }
}
