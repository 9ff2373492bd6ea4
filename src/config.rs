//! Configuration for echoes.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (ECHOES_HOME, ECHOES_STORAGE_DIR, ECHOES_PUBLIC_URL,
//!    ECHOES_AUTH_TOKENS, GEMINI_API_KEY, ELEVENLABS_API_KEY)
//! 2. Config file (.echoes/config.yaml)
//! 3. Defaults (~/.echoes)
//!
//! Config file discovery:
//! - Searches current directory and parents for .echoes/config.yaml
//! - Paths in config file are relative to the config file's parent directory
//!
//! API keys are only ever read from the environment. Configuration is loaded
//! once at startup and handed to the orchestrator; nothing reads it lazily.

pub mod paths;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::core::queue::QueueSettings;
use crate::core::safety::Limits;

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub server: Option<ServerConfig>,
    #[serde(default)]
    pub store: Option<StoreConfig>,
    #[serde(default)]
    pub providers: Option<ProvidersConfig>,
    #[serde(default)]
    pub limits: Limits,
    #[serde(default)]
    pub queue: QueueSettings,
    #[serde(default)]
    pub auth: Option<AuthConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// State directory holding the database and queue (relative to config file)
    pub home: Option<String>,
    /// Object storage root (relative to config file)
    pub storage: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    /// Externally reachable base URL used in stored-object links
    pub public_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Disable to force the text-match fallback for similarity search
    pub vector_search: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProvidersConfig {
    pub transcription: Option<TranscriptionBackend>,
    pub gemini: Option<GeminiConfig>,
    pub elevenlabs: Option<ElevenLabsConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeminiConfig {
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub embedding_model: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ElevenLabsConfig {
    pub base_url: Option<String>,
    pub tts_model: Option<String>,
    pub stt_model: Option<String>,
    pub default_voice_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
    /// Bearer token -> user id
    #[serde(default)]
    pub tokens: HashMap<String, String>,
}

/// Which provider transcribes uploaded audio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptionBackend {
    #[default]
    ElevenLabs,
    Gemini,
}

/// Resolved configuration with absolute paths and defaults applied
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// State directory (database, analysis queue)
    pub home: PathBuf,
    /// Object storage root
    pub storage_dir: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    pub server: ServerSettings,
    pub providers: ProviderSettings,
    pub limits: Limits,
    pub queue: QueueSettings,
    pub vector_search: bool,
    /// Bearer token -> user id
    pub auth_tokens: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub public_url: String,
}

#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub transcription: TranscriptionBackend,
    pub gemini: GeminiSettings,
    pub elevenlabs: ElevenLabsSettings,
}

#[derive(Clone)]
pub struct GeminiSettings {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub embedding_model: String,
}

#[derive(Clone)]
pub struct ElevenLabsSettings {
    pub api_key: Option<String>,
    pub base_url: String,
    pub tts_model: String,
    pub stt_model: String,
    pub default_voice_id: String,
}

// Keys must never reach logs through `{:?}`
impl std::fmt::Debug for GeminiSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiSettings")
            .field("api_key", &self.api_key.as_ref().map(|_| "<set>"))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("embedding_model", &self.embedding_model)
            .finish()
    }
}

impl std::fmt::Debug for ElevenLabsSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElevenLabsSettings")
            .field("api_key", &self.api_key.as_ref().map(|_| "<set>"))
            .field("base_url", &self.base_url)
            .field("tts_model", &self.tts_model)
            .field("stt_model", &self.stt_model)
            .field("default_voice_id", &self.default_voice_id)
            .finish()
    }
}

pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_GEMINI_EMBEDDING_MODEL: &str = "gemini-embedding-001";
pub const DEFAULT_ELEVENLABS_BASE_URL: &str = "https://api.elevenlabs.io/v1";
pub const DEFAULT_ELEVENLABS_TTS_MODEL: &str = "eleven_monolingual_v1";
pub const DEFAULT_ELEVENLABS_STT_MODEL: &str = "scribe_v1";
/// Stock narrator voice used when no clone exists or the clone fails
pub const DEFAULT_NARRATOR_VOICE_ID: &str = "21m00Tcm4TlvDq8ikWAM";

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;

impl ResolvedConfig {
    /// Load configuration from all sources
    pub fn load() -> Result<Self> {
        let default_home = dirs::home_dir()
            .context("Failed to determine home directory")?
            .join(".echoes");

        let file = match find_config_file() {
            Some(path) => {
                let config = load_config_file(&path)?;
                Some((path, config))
            }
            None => None,
        };

        Ok(resolve(file, default_home, |key| std::env::var(key).ok()))
    }

    /// SQLite database path
    pub fn db_path(&self) -> PathBuf {
        self.home.join("echoes.db")
    }

    /// Analysis queue file path
    pub fn queue_path(&self) -> PathBuf {
        self.home.join("analysis_queue.jsonl")
    }

    /// Fail fast when a provider key is missing.
    ///
    /// Called once at startup so a bad deployment fails on boot rather than on
    /// the first request that reaches a provider.
    pub fn require_secrets(&self) -> Result<()> {
        if self.providers.gemini.api_key.is_none() {
            anyhow::bail!("GEMINI_API_KEY is not set in environment variables");
        }
        if self.providers.elevenlabs.api_key.is_none() {
            anyhow::bail!("ELEVENLABS_API_KEY is not set in environment variables");
        }
        Ok(())
    }
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".echoes").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the config file's parent
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

/// Parse `token:user,token2:user2`
fn parse_auth_tokens(raw: &str) -> HashMap<String, String> {
    raw.split(',')
        .filter_map(|pair| {
            let (token, user) = pair.split_once(':')?;
            let (token, user) = (token.trim(), user.trim());
            if token.is_empty() || user.is_empty() {
                None
            } else {
                Some((token.to_string(), user.to_string()))
            }
        })
        .collect()
}

/// Merge file values, environment and defaults
fn resolve<F>(file: Option<(PathBuf, ConfigFile)>, default_home: PathBuf, env: F) -> ResolvedConfig
where
    F: Fn(&str) -> Option<String>,
{
    let (config_file, config) = match file {
        Some((path, config)) => (Some(path), Some(config)),
        None => (None, None),
    };

    // Base directory is the parent of .echoes/ (i.e., grandparent of config.yaml)
    let base_dir = config_file
        .as_deref()
        .and_then(Path::parent)
        .and_then(Path::parent)
        .map(Path::to_path_buf);
    let echoes_dir = config_file
        .as_deref()
        .and_then(Path::parent)
        .map(Path::to_path_buf);

    let home = if let Some(env_home) = env("ECHOES_HOME") {
        PathBuf::from(env_home)
    } else if let (Some(home_path), Some(dir)) = (
        config.as_ref().and_then(|c| c.paths.home.as_deref()),
        echoes_dir.as_deref(),
    ) {
        // home is relative to .echoes/ directory
        resolve_path(dir, home_path)
    } else {
        default_home
    };

    let storage_dir = if let Some(env_storage) = env("ECHOES_STORAGE_DIR") {
        PathBuf::from(env_storage)
    } else if let (Some(storage_path), Some(dir)) = (
        config.as_ref().and_then(|c| c.paths.storage.as_deref()),
        base_dir.as_deref(),
    ) {
        resolve_path(dir, storage_path)
    } else {
        home.join("storage")
    };

    let server_file = config.as_ref().and_then(|c| c.server.clone());
    let host = server_file
        .as_ref()
        .and_then(|s| s.host.clone())
        .unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = server_file.as_ref().and_then(|s| s.port).unwrap_or(DEFAULT_PORT);
    let public_url = env("ECHOES_PUBLIC_URL")
        .or_else(|| server_file.as_ref().and_then(|s| s.public_url.clone()))
        .unwrap_or_else(|| format!("http://{}:{}", host, port))
        .trim_end_matches('/')
        .to_string();

    let providers_file = config.as_ref().and_then(|c| c.providers.clone());
    let gemini_file = providers_file.as_ref().and_then(|p| p.gemini.clone());
    let eleven_file = providers_file.as_ref().and_then(|p| p.elevenlabs.clone());

    let providers = ProviderSettings {
        transcription: providers_file
            .as_ref()
            .and_then(|p| p.transcription)
            .unwrap_or_default(),
        gemini: GeminiSettings {
            api_key: env("GEMINI_API_KEY").filter(|k| !k.is_empty()),
            base_url: gemini_file
                .as_ref()
                .and_then(|g| g.base_url.clone())
                .unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.to_string()),
            model: gemini_file
                .as_ref()
                .and_then(|g| g.model.clone())
                .unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
            embedding_model: gemini_file
                .as_ref()
                .and_then(|g| g.embedding_model.clone())
                .unwrap_or_else(|| DEFAULT_GEMINI_EMBEDDING_MODEL.to_string()),
        },
        elevenlabs: ElevenLabsSettings {
            api_key: env("ELEVENLABS_API_KEY").filter(|k| !k.is_empty()),
            base_url: eleven_file
                .as_ref()
                .and_then(|e| e.base_url.clone())
                .unwrap_or_else(|| DEFAULT_ELEVENLABS_BASE_URL.to_string()),
            tts_model: eleven_file
                .as_ref()
                .and_then(|e| e.tts_model.clone())
                .unwrap_or_else(|| DEFAULT_ELEVENLABS_TTS_MODEL.to_string()),
            stt_model: eleven_file
                .as_ref()
                .and_then(|e| e.stt_model.clone())
                .unwrap_or_else(|| DEFAULT_ELEVENLABS_STT_MODEL.to_string()),
            default_voice_id: eleven_file
                .as_ref()
                .and_then(|e| e.default_voice_id.clone())
                .unwrap_or_else(|| DEFAULT_NARRATOR_VOICE_ID.to_string()),
        },
    };

    let mut auth_tokens = config
        .as_ref()
        .and_then(|c| c.auth.clone())
        .map(|a| a.tokens)
        .unwrap_or_default();
    if let Some(raw) = env("ECHOES_AUTH_TOKENS") {
        auth_tokens.extend(parse_auth_tokens(&raw));
    }

    ResolvedConfig {
        home,
        storage_dir,
        config_file,
        server: ServerSettings {
            host,
            port,
            public_url,
        },
        providers,
        limits: config.as_ref().map(|c| c.limits.clone()).unwrap_or_default(),
        queue: config.as_ref().map(|c| c.queue.clone()).unwrap_or_default(),
        vector_search: config
            .as_ref()
            .and_then(|c| c.store.as_ref())
            .and_then(|s| s.vector_search)
            .unwrap_or(true),
        auth_tokens,
    }
}
