use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_STORE_PATH: &str = "data/docsift.db";
const DEFAULT_UPLOAD_DIR: &str = "data/uploads";
const DEFAULT_COLLECTION: &str = "documents";
const DEFAULT_EMBEDDING_MODEL: &str = "nomic-embed-text";
const DEFAULT_EMBEDDING_DIMENSION: usize = 768;
const DEFAULT_LLM_URL: &str = "https://openrouter.ai/api/v1";
const DEFAULT_LLM_MODEL: &str = "mistralai/mistral-7b-instruct:free";
const DEFAULT_LLM_TEMPERATURE: f32 = 0.3;
const DEFAULT_TOP_K: usize = 5;
const DEFAULT_SNIPPET_CHARS: usize = 300;
const DEFAULT_THEME_EXCERPT_CHARS: usize = 1000;
const DEFAULT_THEME_MAX_DOCUMENTS: usize = 10;
const DEFAULT_TIMEOUT_SECS: u64 = 120;
const DEFAULT_SESSION_IDLE_SECS: u64 = crate::session::DEFAULT_IDLE_TIMEOUT.as_secs();
const DEFAULT_MAX_SESSIONS: usize = crate::session::DEFAULT_MAX_SESSIONS;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for docsift.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Persistent backend holding document vectors.
    pub store_backend: StoreBackend,
    /// SQLite database file used by the local backend.
    pub store_path: PathBuf,
    /// Base URL of the Qdrant instance, required when `store_backend` is `qdrant`.
    pub qdrant_url: Option<String>,
    /// Name of the Qdrant collection used for document storage.
    pub qdrant_collection_name: String,
    /// Optional API key required to access Qdrant.
    pub qdrant_api_key: Option<String>,
    /// Embedding provider used to generate vector representations.
    pub embedding_provider: EmbeddingProvider,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Dimensionality of the produced vectors.
    pub embedding_dimension: usize,
    /// Optional endpoint override for the embedding provider.
    pub embedding_url: Option<String>,
    /// Optional API key for hosted embedding providers.
    pub embedding_api_key: Option<String>,
    /// Language model backend used for answers and themes.
    pub llm_provider: LlmProvider,
    /// Base URL of the language model API.
    pub llm_url: String,
    /// API key for hosted language model providers.
    pub llm_api_key: Option<String>,
    /// Model identifier passed to the language model provider.
    pub llm_model: String,
    /// Sampling temperature applied to every completion.
    pub llm_temperature: f32,
    /// Whether theme extraction should request schema-constrained JSON output.
    pub llm_structured_output: bool,
    /// Number of documents retrieved for each query.
    pub retrieval_top_k: usize,
    /// Maximum characters of document text shown in a citation.
    pub snippet_chars: usize,
    /// Maximum characters of each document passed to theme extraction.
    pub theme_excerpt_chars: usize,
    /// Maximum number of documents passed to theme extraction.
    pub theme_max_documents: usize,
    /// Timeout applied to every embedding and language model round trip.
    pub request_timeout_secs: u64,
    /// Directory receiving uploaded files.
    pub upload_dir: PathBuf,
    /// OCR executable invoked for image documents.
    pub ocr_command: String,
    /// Language pack passed to the OCR executable.
    pub ocr_language: String,
    /// Sessions untouched for longer than this are dropped when a new session is created.
    pub session_idle_secs: u64,
    /// Upper bound on live sessions; the least recently used one is evicted beyond it.
    pub max_sessions: usize,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

/// Persistent storage backends for the embedding store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Local SQLite database file.
    Sqlite,
    /// Remote Qdrant collection.
    Qdrant,
}

/// Supported embedding backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Local Ollama runtime.
    Ollama,
    /// Hosted OpenAI-compatible embeddings API.
    OpenAI,
    /// Deterministic word-hash embeddings for offline use and tests.
    Hash,
}

/// Supported language model backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    /// OpenAI-compatible chat completions (OpenAI, OpenRouter, vLLM, ...).
    OpenAI,
    /// Local Ollama runtime.
    Ollama,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        let store_backend = parse_optional("STORE_BACKEND")?.unwrap_or(StoreBackend::Sqlite);
        let qdrant_url = load_env_optional("QDRANT_URL");
        if store_backend == StoreBackend::Qdrant && qdrant_url.is_none() {
            return Err(ConfigError::MissingVariable("QDRANT_URL".into()));
        }

        let llm_provider = parse_optional("LLM_PROVIDER")?.unwrap_or(LlmProvider::OpenAI);
        let llm_api_key =
            load_env_optional("LLM_API_KEY").or_else(|| load_env_optional("OPENROUTER_API_KEY"));
        if llm_provider == LlmProvider::OpenAI && llm_api_key.is_none() {
            return Err(ConfigError::MissingVariable("LLM_API_KEY".into()));
        }

        let embedding_dimension =
            parse_number("EMBEDDING_DIMENSION")?.unwrap_or(DEFAULT_EMBEDDING_DIMENSION);
        if embedding_dimension == 0 {
            return Err(ConfigError::InvalidValue("EMBEDDING_DIMENSION".into()));
        }
        let retrieval_top_k = parse_number("RETRIEVAL_TOP_K")?.unwrap_or(DEFAULT_TOP_K);
        if retrieval_top_k == 0 {
            return Err(ConfigError::InvalidValue("RETRIEVAL_TOP_K".into()));
        }
        let max_sessions = parse_number("MAX_SESSIONS")?.unwrap_or(DEFAULT_MAX_SESSIONS);
        if max_sessions == 0 {
            return Err(ConfigError::InvalidValue("MAX_SESSIONS".into()));
        }

        Ok(Self {
            store_backend,
            store_path: load_env_optional("STORE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STORE_PATH)),
            qdrant_url,
            qdrant_collection_name: load_env_optional("QDRANT_COLLECTION_NAME")
                .unwrap_or_else(|| DEFAULT_COLLECTION.to_string()),
            qdrant_api_key: load_env_optional("QDRANT_API_KEY"),
            embedding_provider: parse_optional("EMBEDDING_PROVIDER")?
                .unwrap_or(EmbeddingProvider::Ollama),
            embedding_model: load_env_optional("EMBEDDING_MODEL")
                .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
            embedding_dimension,
            embedding_url: load_env_optional("EMBEDDING_URL"),
            embedding_api_key: load_env_optional("EMBEDDING_API_KEY"),
            llm_provider,
            llm_url: load_env_optional("LLM_URL").unwrap_or_else(|| match llm_provider {
                LlmProvider::OpenAI => DEFAULT_LLM_URL.to_string(),
                LlmProvider::Ollama => crate::llm::DEFAULT_OLLAMA_URL.to_string(),
            }),
            llm_api_key,
            llm_model: load_env_optional("LLM_MODEL")
                .or_else(|| load_env_optional("OPENROUTER_MODEL"))
                .unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string()),
            llm_temperature: parse_number("LLM_TEMPERATURE")?.unwrap_or(DEFAULT_LLM_TEMPERATURE),
            llm_structured_output: parse_bool("LLM_STRUCTURED_OUTPUT")?.unwrap_or(true),
            retrieval_top_k,
            snippet_chars: parse_number("SNIPPET_CHARS")?.unwrap_or(DEFAULT_SNIPPET_CHARS),
            theme_excerpt_chars: parse_number("THEME_EXCERPT_CHARS")?
                .unwrap_or(DEFAULT_THEME_EXCERPT_CHARS),
            theme_max_documents: parse_number("THEME_MAX_DOCUMENTS")?
                .unwrap_or(DEFAULT_THEME_MAX_DOCUMENTS),
            request_timeout_secs: parse_number("REQUEST_TIMEOUT_SECS")?
                .unwrap_or(DEFAULT_TIMEOUT_SECS),
            upload_dir: load_env_optional("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_UPLOAD_DIR)),
            ocr_command: load_env_optional("OCR_COMMAND").unwrap_or_else(|| "tesseract".into()),
            ocr_language: load_env_optional("OCR_LANGUAGE").unwrap_or_else(|| "eng".into()),
            session_idle_secs: parse_number("SESSION_IDLE_SECS")?
                .unwrap_or(DEFAULT_SESSION_IDLE_SECS),
            max_sessions,
            server_port: parse_number("SERVER_PORT")?,
        })
    }

    /// Timeout applied to provider round trips.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    /// Idle period after which a session may be dropped.
    pub fn session_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.session_idle_secs.max(1))
    }
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_optional<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    load_env_optional(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
}

fn parse_number<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    parse_optional(key)
}

fn parse_bool(key: &str) -> Result<Option<bool>, ConfigError> {
    load_env_optional(key)
        .map(|value| match value.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidValue(key.to_string())),
        })
        .transpose()
}

impl std::str::FromStr for StoreBackend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "qdrant" => Ok(Self::Qdrant),
            _ => Err(()),
        }
    }
}

impl std::str::FromStr for EmbeddingProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAI),
            "hash" => Ok(Self::Hash),
            _ => Err(()),
        }
    }
}

impl std::str::FromStr for LlmProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" | "openrouter" => Ok(Self::OpenAI),
            "ollama" => Ok(Self::Ollama),
            _ => Err(()),
        }
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() -> Result<&'static Config, ConfigError> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    tracing::debug!(
        store_backend = ?config.store_backend,
        store_path = %config.store_path.display(),
        embedding_provider = ?config.embedding_provider,
        embedding_model = %config.embedding_model,
        llm_provider = ?config.llm_provider,
        llm_model = %config.llm_model,
        server_port = ?config.server_port,
        "Loaded configuration"
    );
    Ok(CONFIG.get_or_init(|| config))
}

#[cfg(test)]
pub(crate) fn test_config(store_path: PathBuf, upload_dir: PathBuf) -> Config {
    Config {
        store_backend: StoreBackend::Sqlite,
        store_path,
        qdrant_url: None,
        qdrant_collection_name: DEFAULT_COLLECTION.into(),
        qdrant_api_key: None,
        embedding_provider: EmbeddingProvider::Hash,
        embedding_model: "hash".into(),
        embedding_dimension: 64,
        embedding_url: None,
        embedding_api_key: None,
        llm_provider: LlmProvider::Ollama,
        llm_url: "http://127.0.0.1:11434".into(),
        llm_api_key: None,
        llm_model: "test-model".into(),
        llm_temperature: DEFAULT_LLM_TEMPERATURE,
        llm_structured_output: true,
        retrieval_top_k: DEFAULT_TOP_K,
        snippet_chars: DEFAULT_SNIPPET_CHARS,
        theme_excerpt_chars: DEFAULT_THEME_EXCERPT_CHARS,
        theme_max_documents: DEFAULT_THEME_MAX_DOCUMENTS,
        request_timeout_secs: 5,
        upload_dir,
        ocr_command: "tesseract".into(),
        ocr_language: "eng".into(),
        session_idle_secs: DEFAULT_SESSION_IDLE_SECS,
        max_sessions: DEFAULT_MAX_SESSIONS,
        server_port: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_provider_names_case_insensitively() {
        assert_eq!("Ollama".parse(), Ok(EmbeddingProvider::Ollama));
        assert_eq!("HASH".parse(), Ok(EmbeddingProvider::Hash));
        assert_eq!("openrouter".parse(), Ok(LlmProvider::OpenAI));
        assert_eq!("qdrant".parse(), Ok(StoreBackend::Qdrant));
        assert!("chroma".parse::<StoreBackend>().is_err());
    }

    #[test]
    fn request_timeout_never_drops_to_zero() {
        let mut config = test_config("a.db".into(), "uploads".into());
        config.request_timeout_secs = 0;
        assert_eq!(config.request_timeout(), Duration::from_secs(1));
    }
}
