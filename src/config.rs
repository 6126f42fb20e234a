use std::env;
use std::path::PathBuf;
use thiserror::Error;

/// Default OpenAI-compatible API root used for embeddings and chat completions.
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
/// Default upload ceiling, matching the limit enforced by the browser front end.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the PDF question-answering server.
///
/// Built once at startup and handed to [`crate::processing::DocumentService::new`]; nothing in
/// the crate reads the environment after that.
#[derive(Debug, Clone)]
pub struct Config {
    /// Credential for the embedding and chat endpoints. Checked when a request needs it.
    pub openai_api_key: Option<String>,
    /// Root of the OpenAI-compatible API.
    pub openai_base_url: String,
    /// Embedding model identifier; also recorded in every index manifest.
    pub embedding_model: String,
    /// Chat model used for answer synthesis.
    pub chat_model: String,
    /// Sampling temperature passed to the chat model.
    pub chat_temperature: f32,
    /// Interface the HTTP server binds to.
    pub host: String,
    /// Port the HTTP server binds to.
    pub port: u16,
    /// Flat directory holding uploaded PDFs under their original names.
    pub upload_dir: PathBuf,
    /// Root directory holding one index directory per fingerprint.
    pub vector_store_dir: PathBuf,
    /// Maximum chunk length, measured in [`Config::text_splitter_unit`].
    pub text_splitter_chunk_size: usize,
    /// Overlap carried from the tail of one chunk into the next.
    pub text_splitter_chunk_overlap: usize,
    /// Unit used to measure chunk length.
    pub text_splitter_unit: ChunkUnit,
    /// Number of chunks retrieved per question.
    pub search_top_k: usize,
    /// Strategy used to combine retrieved chunks into an answer.
    pub answer_strategy: AnswerStrategy,
    /// Largest accepted upload, in bytes.
    pub max_upload_bytes: usize,
    /// Directory receiving one `run_<timestamp>/app.log` per process run.
    pub log_dir: PathBuf,
}

/// How chunk sizes are measured.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChunkUnit {
    /// Unicode scalar values.
    Characters,
    /// Tokens of the embedding model's tokenizer.
    Tokens,
}

/// Answer synthesis strategies for retrieved chunks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AnswerStrategy {
    /// Draft from the first chunk, then refine the draft once per remaining chunk.
    Refine,
    /// Put every retrieved chunk into a single prompt.
    Stuff,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            openai_base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            embedding_model: "text-embedding-ada-002".to_string(),
            chat_model: "gpt-3.5-turbo".to_string(),
            chat_temperature: 0.0,
            host: "0.0.0.0".to_string(),
            port: 8000,
            upload_dir: PathBuf::from("uploads"),
            vector_store_dir: PathBuf::from("vector_store"),
            text_splitter_chunk_size: 1000,
            text_splitter_chunk_overlap: 200,
            text_splitter_unit: ChunkUnit::Characters,
            search_top_k: 5,
            answer_strategy: AnswerStrategy::Refine,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            log_dir: PathBuf::from("logs"),
        }
    }
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    ///
    /// A `.env` file in the working directory is loaded first when present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup. Unset or blank keys keep their default.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let load = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let defaults = Self::default();

        let config = Self {
            openai_api_key: load("OPENAI_API_KEY"),
            openai_base_url: load("OPENAI_BASE_URL").unwrap_or(defaults.openai_base_url),
            embedding_model: load("EMBEDDING_MODEL").unwrap_or(defaults.embedding_model),
            chat_model: load("CHAT_MODEL").unwrap_or(defaults.chat_model),
            chat_temperature: parse_or("CHAT_TEMPERATURE", load("CHAT_TEMPERATURE"), 0.0)?,
            host: load("HOST").unwrap_or(defaults.host),
            port: parse_or("PORT", load("PORT"), defaults.port)?,
            upload_dir: load("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.upload_dir),
            vector_store_dir: load("VECTOR_STORE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.vector_store_dir),
            text_splitter_chunk_size: parse_or(
                "TEXT_SPLITTER_CHUNK_SIZE",
                load("TEXT_SPLITTER_CHUNK_SIZE"),
                defaults.text_splitter_chunk_size,
            )?,
            text_splitter_chunk_overlap: parse_or(
                "TEXT_SPLITTER_CHUNK_OVERLAP",
                load("TEXT_SPLITTER_CHUNK_OVERLAP"),
                defaults.text_splitter_chunk_overlap,
            )?,
            text_splitter_unit: parse_or(
                "TEXT_SPLITTER_UNIT",
                load("TEXT_SPLITTER_UNIT"),
                defaults.text_splitter_unit,
            )?,
            search_top_k: parse_or("SEARCH_TOP_K", load("SEARCH_TOP_K"), defaults.search_top_k)?,
            answer_strategy: parse_or(
                "ANSWER_STRATEGY",
                load("ANSWER_STRATEGY"),
                defaults.answer_strategy,
            )?,
            max_upload_bytes: parse_or(
                "MAX_UPLOAD_BYTES",
                load("MAX_UPLOAD_BYTES"),
                defaults.max_upload_bytes,
            )?,
            log_dir: load("PDFQA_LOG_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.log_dir),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.text_splitter_chunk_size == 0 {
            return Err(ConfigError::InvalidValue(
                "TEXT_SPLITTER_CHUNK_SIZE".to_string(),
            ));
        }
        if self.text_splitter_chunk_overlap >= self.text_splitter_chunk_size {
            return Err(ConfigError::InvalidValue(
                "TEXT_SPLITTER_CHUNK_OVERLAP".to_string(),
            ));
        }
        if self.search_top_k == 0 {
            return Err(ConfigError::InvalidValue("SEARCH_TOP_K".to_string()));
        }
        if !(0.0..=2.0).contains(&self.chat_temperature) {
            return Err(ConfigError::InvalidValue("CHAT_TEMPERATURE".to_string()));
        }
        if self.max_upload_bytes == 0 {
            return Err(ConfigError::InvalidValue("MAX_UPLOAD_BYTES".to_string()));
        }
        Ok(())
    }

    /// The configured API credential, if any.
    pub fn api_key(&self) -> Option<&str> {
        self.openai_api_key.as_deref()
    }
}

fn parse_or<T: std::str::FromStr>(
    key: &str,
    value: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match value {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key.to_string())),
        None => Ok(default),
    }
}

impl std::str::FromStr for ChunkUnit {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "chars" | "characters" => Ok(Self::Characters),
            "tokens" => Ok(Self::Tokens),
            _ => Err(()),
        }
    }
}

impl std::str::FromStr for AnswerStrategy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "refine" => Ok(Self::Refine),
            "stuff" => Ok(Self::Stuff),
            _ => Err(()),
        }
    }
}
