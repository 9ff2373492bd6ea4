//! SQLite-backed store.
//!
//! String arrays and embeddings live in JSON text columns; theme and emotion
//! filters query them through `json_each`. Timestamps are RFC 3339 with
//! fixed microsecond precision so text order is chronological order.
//!
//! All queries run on the blocking pool behind a single connection mutex.

use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::{ListFilter, ReflectionPage, ReflectionStore, VectorSearchError, VoiceProfileStore};
use crate::domain::{NewReflection, Reflection, ReflectionAnalysis, VoiceProfile};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS reflections (
    id               TEXT PRIMARY KEY,
    user_id          TEXT NOT NULL,
    audio_url        TEXT NOT NULL,
    transcript       TEXT NOT NULL,
    duration_seconds INTEGER,
    created_at       TEXT NOT NULL,
    emotional_tags   TEXT,
    themes           TEXT,
    key_insights     TEXT,
    sentiment_score  REAL,
    embedding        TEXT,
    analyzed_at      TEXT
);
CREATE INDEX IF NOT EXISTS idx_reflections_user_created
    ON reflections (user_id, created_at);

CREATE TABLE IF NOT EXISTS voice_profiles (
    id                TEXT PRIMARY KEY,
    user_id           TEXT NOT NULL,
    voice_id          TEXT NOT NULL,
    sample_audio_urls TEXT NOT NULL,
    created_at        TEXT NOT NULL,
    updated_at        TEXT NOT NULL,
    is_active         INTEGER NOT NULL DEFAULT 1
);
CREATE INDEX IF NOT EXISTS idx_voice_profiles_user
    ON voice_profiles (user_id);
";

const REFLECTION_COLUMNS: &str = "id, user_id, audio_url, transcript, duration_seconds, created_at,
     emotional_tags, themes, key_insights, sentiment_score, embedding, analyzed_at";

const VOICE_PROFILE_COLUMNS: &str =
    "id, user_id, voice_id, sample_audio_urls, created_at, updated_at, is_active";

/// Reflection and voice profile store on a single SQLite connection
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    vector_search: bool,
}

impl SqliteStore {
    /// Open (or create) a database file
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .context("Failed to enable WAL")?;
        Self::from_connection(conn)
    }

    /// In-memory database, for tests and one-off tools
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)
            .context("Failed to initialize schema")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            vector_search: true,
        })
    }

    /// Enable or disable similarity search; when disabled, `match_reflections`
    /// reports `Unavailable` and callers fall back to text search.
    pub fn with_vector_search(mut self, enabled: bool) -> Self {
        self.vector_search = enabled;
        self
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| anyhow::anyhow!("Database connection lock poisoned"))?;
            f(&mut guard)
        })
        .await
        .context("Database task failed")?
    }
}

fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("Invalid stored timestamp: {}", raw))?
        .with_timezone(&Utc))
}

fn parse_json<T: serde::de::DeserializeOwned>(raw: Option<String>) -> Result<Option<T>> {
    raw.map(|text| serde_json::from_str(&text).context("Invalid stored JSON column"))
        .transpose()
}

/// Raw column values, converted outside the rusqlite row callback
struct ReflectionRow {
    id: String,
    user_id: String,
    audio_url: String,
    transcript: String,
    duration_seconds: Option<u32>,
    created_at: String,
    emotional_tags: Option<String>,
    themes: Option<String>,
    key_insights: Option<String>,
    sentiment_score: Option<f64>,
    embedding: Option<String>,
    analyzed_at: Option<String>,
}

impl ReflectionRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            audio_url: row.get(2)?,
            transcript: row.get(3)?,
            duration_seconds: row.get(4)?,
            created_at: row.get(5)?,
            emotional_tags: row.get(6)?,
            themes: row.get(7)?,
            key_insights: row.get(8)?,
            sentiment_score: row.get(9)?,
            embedding: row.get(10)?,
            analyzed_at: row.get(11)?,
        })
    }

    fn into_reflection(self) -> Result<Reflection> {
        Ok(Reflection {
            id: Uuid::parse_str(&self.id).context("Invalid stored reflection id")?,
            user_id: self.user_id,
            audio_url: self.audio_url,
            transcript: self.transcript,
            duration_seconds: self.duration_seconds,
            created_at: parse_timestamp(&self.created_at)?,
            emotional_tags: parse_json(self.emotional_tags)?,
            themes: parse_json(self.themes)?,
            key_insights: parse_json(self.key_insights)?,
            sentiment_score: self.sentiment_score,
            embedding: parse_json(self.embedding)?,
            analyzed_at: self.analyzed_at.as_deref().map(parse_timestamp).transpose()?,
        })
    }
}

fn query_reflections(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<Reflection>> {
    let mut stmt = conn.prepare(sql).context("Failed to prepare reflection query")?;
    let rows = stmt
        .query_map(params, ReflectionRow::read)
        .context("Failed to query reflections")?;

    let mut reflections = Vec::new();
    for row in rows {
        reflections.push(row.context("Failed to read reflection row")?.into_reflection()?);
    }
    Ok(reflections)
}

fn read_voice_profile(row: &Row<'_>) -> rusqlite::Result<(String, String, String, String, String, String, bool)> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get::<_, i64>(6)? != 0,
    ))
}

fn into_voice_profile(
    (id, user_id, voice_id, urls, created_at, updated_at, is_active): (
        String,
        String,
        String,
        String,
        String,
        String,
        bool,
    ),
) -> Result<VoiceProfile> {
    Ok(VoiceProfile {
        id: Uuid::parse_str(&id).context("Invalid stored voice profile id")?,
        user_id,
        voice_id,
        sample_audio_urls: serde_json::from_str(&urls).context("Invalid stored sample URLs")?,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
        is_active,
    })
}

/// Cosine similarity in [-1, 1]; 0 for empty or mismatched vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    (dot_product / (norm_a * norm_b)).clamp(-1.0, 1.0)
}

#[async_trait]
impl ReflectionStore for SqliteStore {
    async fn insert_reflection(&self, new: NewReflection) -> Result<Reflection> {
        let reflection = Reflection {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            audio_url: new.audio_url,
            transcript: new.transcript,
            duration_seconds: new.duration_seconds,
            created_at: Utc::now(),
            emotional_tags: None,
            themes: None,
            key_insights: None,
            sentiment_score: None,
            embedding: None,
            analyzed_at: None,
        };

        let row = reflection.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO reflections
                    (id, user_id, audio_url, transcript, duration_seconds, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    row.id.to_string(),
                    row.user_id,
                    row.audio_url,
                    row.transcript,
                    row.duration_seconds,
                    timestamp(&row.created_at),
                ],
            )
            .context("Failed to insert reflection")?;
            Ok(())
        })
        .await?;

        Ok(reflection)
    }

    async fn get_reflection(&self, id: Uuid) -> Result<Option<Reflection>> {
        self.with_conn(move |conn| {
            let row = conn
                .query_row(
                    &format!("SELECT {} FROM reflections WHERE id = ?1", REFLECTION_COLUMNS),
                    [id.to_string()],
                    ReflectionRow::read,
                )
                .optional()
                .context("Failed to load reflection")?;
            row.map(ReflectionRow::into_reflection).transpose()
        })
        .await
    }

    async fn save_analysis(&self, id: Uuid, analysis: &ReflectionAnalysis) -> Result<bool> {
        let tags = serde_json::to_string(&analysis.result.emotional_tags)?;
        let themes = serde_json::to_string(&analysis.result.themes)?;
        let insights = serde_json::to_string(&analysis.result.key_insights)?;
        let embedding = serde_json::to_string(&analysis.embedding)?;
        let sentiment = analysis.result.sentiment_score;
        let analyzed_at = timestamp(&analysis.analyzed_at);

        self.with_conn(move |conn| {
            let changed = conn
                .execute(
                    "UPDATE reflections SET
                        emotional_tags = ?2,
                        themes = ?3,
                        key_insights = ?4,
                        sentiment_score = ?5,
                        embedding = ?6,
                        analyzed_at = ?7
                     WHERE id = ?1 AND analyzed_at IS NULL",
                    params![
                        id.to_string(),
                        tags,
                        themes,
                        insights,
                        sentiment,
                        embedding,
                        analyzed_at
                    ],
                )
                .context("Failed to save analysis")?;
            Ok(changed == 1)
        })
        .await
    }

    async fn list_reflections(&self, user_id: &str, filter: &ListFilter) -> Result<ReflectionPage> {
        let user_id = user_id.to_string();
        let filter = filter.clone();

        self.with_conn(move |conn| {
            let total: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM reflections WHERE user_id = ?1",
                    [&user_id],
                    |row| row.get(0),
                )
                .context("Failed to count reflections")?;

            let sql = format!(
                "SELECT {} FROM reflections
                 WHERE user_id = ?1
                   AND (?2 IS NULL OR EXISTS (SELECT 1 FROM json_each(reflections.themes) WHERE value = ?2))
                   AND (?3 IS NULL OR EXISTS (SELECT 1 FROM json_each(reflections.emotional_tags) WHERE value = ?3))
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT ?4 OFFSET ?5",
                REFLECTION_COLUMNS
            );
            let reflections = query_reflections(
                conn,
                &sql,
                params![
                    user_id,
                    filter.theme,
                    filter.emotion,
                    filter.limit as i64,
                    filter.offset as i64
                ],
            )?;

            Ok(ReflectionPage {
                reflections,
                total: total.max(0) as usize,
            })
        })
        .await
    }

    async fn all_reflections(&self, user_id: &str) -> Result<Vec<Reflection>> {
        let user_id = user_id.to_string();
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {} FROM reflections WHERE user_id = ?1 ORDER BY created_at DESC, rowid DESC",
                REFLECTION_COLUMNS
            );
            query_reflections(conn, &sql, [user_id])
        })
        .await
    }

    async fn match_reflections(
        &self,
        user_id: &str,
        embedding: &[f32],
        threshold: f32,
        count: usize,
    ) -> Result<Vec<(Reflection, f32)>, VectorSearchError> {
        if !self.vector_search {
            return Err(VectorSearchError::Unavailable);
        }

        let user_id = user_id.to_string();
        let candidates = self
            .with_conn(move |conn| {
                let sql = format!(
                    "SELECT {} FROM reflections
                     WHERE user_id = ?1 AND embedding IS NOT NULL
                     ORDER BY created_at DESC, rowid DESC",
                    REFLECTION_COLUMNS
                );
                query_reflections(conn, &sql, [user_id])
            })
            .await?;

        let mut matches: Vec<(Reflection, f32)> = candidates
            .into_iter()
            .filter_map(|reflection| {
                let score = cosine_similarity(embedding, reflection.embedding.as_deref()?);
                (score >= threshold).then_some((reflection, score))
            })
            .collect();

        // Stable sort keeps newest first among equal scores
        matches.sort_by(|a, b| b.1.total_cmp(&a.1));
        matches.truncate(count);

        Ok(matches)
    }

    async fn text_search(&self, user_id: &str, query: &str, limit: usize) -> Result<Vec<Reflection>> {
        let user_id = user_id.to_string();
        let query = query.trim().to_string();

        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {} FROM reflections
                 WHERE user_id = ?1
                   AND (instr(lower(transcript), lower(?2)) > 0
                        OR EXISTS (SELECT 1 FROM json_each(reflections.key_insights) WHERE value = ?2)
                        OR EXISTS (SELECT 1 FROM json_each(reflections.themes) WHERE value = ?2))
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT ?3",
                REFLECTION_COLUMNS
            );
            query_reflections(conn, &sql, params![user_id, query, limit as i64])
        })
        .await
    }
}

#[async_trait]
impl VoiceProfileStore for SqliteStore {
    async fn upsert_voice_profile(
        &self,
        user_id: &str,
        voice_id: &str,
        sample_audio_urls: &[String],
    ) -> Result<VoiceProfile> {
        let user_id = user_id.to_string();
        let voice_id = voice_id.to_string();
        let urls = serde_json::to_string(sample_audio_urls)?;

        self.with_conn(move |conn| {
            let tx = conn.transaction().context("Failed to begin transaction")?;
            let now = timestamp(&Utc::now());

            let existing: Option<String> = tx
                .query_row(
                    "SELECT id FROM voice_profiles WHERE user_id = ?1
                     ORDER BY is_active DESC, updated_at DESC LIMIT 1",
                    [&user_id],
                    |row| row.get(0),
                )
                .optional()
                .context("Failed to look up voice profile")?;

            let id = match existing {
                Some(id) => {
                    tx.execute(
                        "UPDATE voice_profiles
                         SET voice_id = ?2, sample_audio_urls = ?3, updated_at = ?4, is_active = 1
                         WHERE id = ?1",
                        params![id, voice_id, urls, now],
                    )
                    .context("Failed to update voice profile")?;
                    id
                }
                None => {
                    let id = Uuid::new_v4().to_string();
                    tx.execute(
                        "INSERT INTO voice_profiles
                            (id, user_id, voice_id, sample_audio_urls, created_at, updated_at, is_active)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?5, 1)",
                        params![id, user_id, voice_id, urls, now],
                    )
                    .context("Failed to insert voice profile")?;
                    id
                }
            };

            let row = tx
                .query_row(
                    &format!(
                        "SELECT {} FROM voice_profiles WHERE id = ?1",
                        VOICE_PROFILE_COLUMNS
                    ),
                    [&id],
                    read_voice_profile,
                )
                .context("Failed to reload voice profile")?;
            tx.commit().context("Failed to commit voice profile")?;

            into_voice_profile(row)
        })
        .await
    }

    async fn active_voice_profile(&self, user_id: &str) -> Result<Option<VoiceProfile>> {
        let user_id = user_id.to_string();
        self.with_conn(move |conn| {
            let row = conn
                .query_row(
                    &format!(
                        "SELECT {} FROM voice_profiles
                         WHERE user_id = ?1 AND is_active = 1
                         ORDER BY updated_at DESC LIMIT 1",
                        VOICE_PROFILE_COLUMNS
                    ),
                    [&user_id],
                    read_voice_profile,
                )
                .optional()
                .context("Failed to load voice profile")?;
            row.map(into_voice_profile).transpose()
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AnalysisResult;

    fn new_reflection(user: &str, transcript: &str) -> NewReflection {
        NewReflection {
            user_id: user.to_string(),
            audio_url: format!("http://localhost/storage/reflections/{}/1.webm", user),
            transcript: transcript.to_string(),
            duration_seconds: Some(12),
        }
    }

    fn analysis(themes: &[&str], tags: &[&str], embedding: Vec<f32>) -> ReflectionAnalysis {
        ReflectionAnalysis {
            result: AnalysisResult {
                emotional_tags: tags.iter().map(|s| s.to_string()).collect(),
                themes: themes.iter().map(|s| s.to_string()).collect(),
                key_insights: vec!["Family keeps me grounded".to_string()],
                sentiment_score: 0.6,
            },
            embedding,
            analyzed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let store = SqliteStore::open_in_memory().unwrap();
        let inserted = store
            .insert_reflection(new_reflection("u1", "hello there"))
            .await
            .unwrap();

        let loaded = store.get_reflection(inserted.id).await.unwrap().unwrap();
        assert_eq!(loaded.transcript, "hello there");
        assert_eq!(loaded.duration_seconds, Some(12));
        assert!(!loaded.is_analyzed());

        assert!(store.get_reflection(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_analysis_only_once() {
        let store = SqliteStore::open_in_memory().unwrap();
        let r = store
            .insert_reflection(new_reflection("u1", "grateful"))
            .await
            .unwrap();

        let first = analysis(&["family"], &["grateful"], vec![1.0, 0.0]);
        assert!(store.save_analysis(r.id, &first).await.unwrap());

        let second = analysis(&["career"], &["anxious"], vec![0.0, 1.0]);
        assert!(!store.save_analysis(r.id, &second).await.unwrap());

        let loaded = store.get_reflection(r.id).await.unwrap().unwrap();
        assert_eq!(loaded.themes, Some(vec!["family".to_string()]));
        assert_eq!(loaded.embedding, Some(vec![1.0, 0.0]));
        assert!(loaded.analysis().is_some());
    }

    #[tokio::test]
    async fn test_list_filters_and_total() {
        let store = SqliteStore::open_in_memory().unwrap();
        let a = store.insert_reflection(new_reflection("u1", "a")).await.unwrap();
        let b = store.insert_reflection(new_reflection("u1", "b")).await.unwrap();
        store.insert_reflection(new_reflection("u2", "other")).await.unwrap();

        store
            .save_analysis(a.id, &analysis(&["family"], &["grateful"], vec![1.0]))
            .await
            .unwrap();
        store
            .save_analysis(b.id, &analysis(&["career"], &["anxious"], vec![1.0]))
            .await
            .unwrap();

        let page = store.list_reflections("u1", &ListFilter::default()).await.unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.reflections[0].id, b.id);

        let filter = ListFilter {
            theme: Some("family".to_string()),
            ..Default::default()
        };
        let page = store.list_reflections("u1", &filter).await.unwrap();
        assert_eq!(page.reflections.len(), 1);
        assert_eq!(page.reflections[0].id, a.id);
        assert_eq!(page.total, 2);

        let filter = ListFilter {
            emotion: Some("anxious".to_string()),
            ..Default::default()
        };
        let page = store.list_reflections("u1", &filter).await.unwrap();
        assert_eq!(page.reflections.len(), 1);
        assert_eq!(page.reflections[0].id, b.id);

        let filter = ListFilter {
            limit: 1,
            offset: 1,
            ..Default::default()
        };
        let page = store.list_reflections("u1", &filter).await.unwrap();
        assert_eq!(page.reflections.len(), 1);
        assert_eq!(page.reflections[0].id, a.id);
    }

    #[tokio::test]
    async fn test_match_reflections_threshold_and_order() {
        let store = SqliteStore::open_in_memory().unwrap();
        let close = store.insert_reflection(new_reflection("u1", "close")).await.unwrap();
        let far = store.insert_reflection(new_reflection("u1", "far")).await.unwrap();
        let exact = store.insert_reflection(new_reflection("u1", "exact")).await.unwrap();
        store.insert_reflection(new_reflection("u1", "unanalyzed")).await.unwrap();

        store
            .save_analysis(close.id, &analysis(&[], &[], vec![0.8, 0.6]))
            .await
            .unwrap();
        store
            .save_analysis(far.id, &analysis(&[], &[], vec![0.0, 1.0]))
            .await
            .unwrap();
        store
            .save_analysis(exact.id, &analysis(&[], &[], vec![1.0, 0.0]))
            .await
            .unwrap();

        let matches = store
            .match_reflections("u1", &[1.0, 0.0], 0.5, 10)
            .await
            .unwrap();
        let ids: Vec<Uuid> = matches.iter().map(|(r, _)| r.id).collect();
        assert_eq!(ids, vec![exact.id, close.id]);
        assert!((matches[1].1 - 0.8).abs() < 1e-6);

        let other_user = store
            .match_reflections("u2", &[1.0, 0.0], 0.5, 10)
            .await
            .unwrap();
        assert!(other_user.is_empty());
    }

    #[tokio::test]
    async fn test_match_reflections_unavailable() {
        let store = SqliteStore::open_in_memory()
            .unwrap()
            .with_vector_search(false);
        let result = store.match_reflections("u1", &[1.0], 0.5, 5).await;
        assert!(matches!(result, Err(VectorSearchError::Unavailable)));
    }

    #[tokio::test]
    async fn test_text_search() {
        let store = SqliteStore::open_in_memory().unwrap();
        let by_transcript = store
            .insert_reflection(new_reflection("u1", "Thinking about my Career today"))
            .await
            .unwrap();
        let by_theme = store
            .insert_reflection(new_reflection("u1", "long day"))
            .await
            .unwrap();
        store
            .save_analysis(by_theme.id, &analysis(&["career"], &[], vec![1.0]))
            .await
            .unwrap();
        store
            .insert_reflection(new_reflection("u1", "nothing relevant"))
            .await
            .unwrap();

        let hits = store.text_search("u1", "career", 10).await.unwrap();
        let ids: Vec<Uuid> = hits.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![by_theme.id, by_transcript.id]);

        assert!(store.text_search("u2", "career", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_voice_profile_upsert_in_place() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(store.active_voice_profile("u1").await.unwrap().is_none());

        let urls = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let first = store.upsert_voice_profile("u1", "voice-1", &urls).await.unwrap();
        let second = store
            .upsert_voice_profile("u1", "voice-2", &urls[..1])
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.voice_id, "voice-2");
        assert_eq!(second.sample_audio_urls, vec!["a".to_string()]);
        assert!(second.is_active);

        let active = store.active_voice_profile("u1").await.unwrap().unwrap();
        assert_eq!(active.voice_id, "voice-2");
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }
}
