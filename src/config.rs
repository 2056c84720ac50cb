use std::env;
use std::path::PathBuf;
use thiserror::Error;

const DEFAULT_UPLOAD_DIRECTORY: &str = "uploads";
const DEFAULT_VECTOR_STORE_DIRECTORY: &str = "vector_store";
const DEFAULT_COLLECTION: &str = "pdf-rag";
const DEFAULT_EMBEDDING_MODEL: &str = "all-minilm";
const DEFAULT_EMBEDDING_DIMENSION: usize = 384;
const DEFAULT_EMBEDDING_API_URL: &str = "https://api.openai.com/v1";
const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";
const DEFAULT_LLM_MODEL: &str = "llama-3.1-8b-instant";
const GROQ_API_URL: &str = "https://api.groq.com/openai/v1";
const OPENAI_API_URL: &str = "https://api.openai.com/v1";
const DEFAULT_CHUNK_SIZE: usize = 1000;
const DEFAULT_CHUNK_OVERLAP: usize = 100;
const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Credential values shipped in sample configs that must never reach a provider.
const PLACEHOLDER_KEYS: [&str; 3] = ["api_key", "groq_api_key", "changeme"];

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

/// Runtime configuration for the PDF RAG server.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding uploaded PDFs by sanitized file name.
    pub upload_directory: PathBuf,
    /// Directory holding local vector index data.
    pub vector_store_directory: PathBuf,
    /// Vector index backend selection.
    pub vector_store_backend: VectorStoreBackend,
    /// Local file stem or Qdrant collection name.
    pub vector_store_collection: String,
    /// Base URL of the Qdrant instance (required for the Qdrant backend).
    pub qdrant_url: Option<String>,
    /// Optional API key required to access Qdrant.
    pub qdrant_api_key: Option<String>,
    /// Embedding provider used to generate vector representations.
    pub embedding_provider: EmbeddingProvider,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Dimensionality of the produced vectors.
    pub embedding_dimension: usize,
    /// Base URL of the OpenAI-compatible embeddings API.
    pub embedding_api_url: String,
    /// Credential for the OpenAI-compatible embeddings API.
    pub embedding_api_key: Option<String>,
    /// Base URL of the local Ollama runtime.
    pub ollama_url: String,
    /// Provider answering completion requests.
    pub llm_provider: LlmProvider,
    /// Completion model identifier.
    pub llm_model: String,
    /// Base URL of the OpenAI-compatible completion API.
    pub llm_api_url: String,
    /// Credential for the completion API.
    pub llm_api_key: Option<String>,
    /// Maximum chunk length, measured in `chunk_length_unit`.
    pub chunk_size: usize,
    /// Overlap between consecutive chunks, measured in `chunk_length_unit`.
    pub chunk_overlap: usize,
    /// Unit used to measure chunk length.
    pub chunk_length_unit: ChunkLengthUnit,
    /// Maximum accepted upload body size in bytes.
    pub max_upload_bytes: usize,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

/// Supported vector index backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VectorStoreBackend {
    /// JSON-lines store persisted under the vector store directory.
    Local,
    /// Remote Qdrant collection.
    Qdrant,
}

/// Supported embedding backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EmbeddingProvider {
    /// Local Ollama runtime.
    Ollama,
    /// OpenAI-compatible `/embeddings` endpoint.
    OpenAI,
    /// Deterministic in-process hashing embedder.
    Hashing,
}

/// Supported completion backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LlmProvider {
    /// Groq's OpenAI-compatible API.
    Groq,
    /// OpenAI or any other OpenAI-compatible API.
    OpenAI,
    /// Local Ollama runtime.
    Ollama,
}

/// Unit used when measuring chunk length.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChunkLengthUnit {
    /// Unicode scalar values.
    Characters,
    /// Tokens of the embedding model's tiktoken encoding.
    Tokens,
}

impl Config {
    /// Load configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup, validating values along the way.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(lookup);

        let vector_store_backend = vars.parsed_or("VECTOR_STORE_BACKEND", VectorStoreBackend::Local)?;
        let qdrant_url = vars.optional("QDRANT_URL");
        if vector_store_backend == VectorStoreBackend::Qdrant && qdrant_url.is_none() {
            return Err(ConfigError::MissingVariable("QDRANT_URL".into()));
        }

        let embedding_provider = vars.parsed_or("EMBEDDING_PROVIDER", EmbeddingProvider::Ollama)?;
        let embedding_api_key = vars.optional("EMBEDDING_API_KEY");
        if embedding_provider == EmbeddingProvider::OpenAI && embedding_api_key.is_none() {
            return Err(ConfigError::MissingVariable("EMBEDDING_API_KEY".into()));
        }
        let embedding_dimension = vars.number_or("EMBEDDING_DIMENSION", DEFAULT_EMBEDDING_DIMENSION)?;
        if embedding_dimension == 0 {
            return Err(ConfigError::InvalidValue("EMBEDDING_DIMENSION".into()));
        }

        let llm_provider = vars.parsed_or("LLM_PROVIDER", LlmProvider::Groq)?;
        let llm_api_key = vars
            .optional("LLM_API_KEY")
            .or_else(|| vars.optional("GROQ_API_KEY"));
        if llm_provider != LlmProvider::Ollama {
            match llm_api_key.as_deref() {
                None => return Err(ConfigError::MissingVariable("LLM_API_KEY".into())),
                Some(key) if PLACEHOLDER_KEYS.contains(&key.to_lowercase().as_str()) => {
                    return Err(ConfigError::InvalidValue("LLM_API_KEY".into()));
                }
                Some(_) => {}
            }
        }
        let llm_api_url = vars
            .optional("LLM_API_URL")
            .unwrap_or_else(|| match llm_provider {
                LlmProvider::Groq => GROQ_API_URL.to_string(),
                LlmProvider::OpenAI => OPENAI_API_URL.to_string(),
                LlmProvider::Ollama => vars
                    .optional("OLLAMA_URL")
                    .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string()),
            });

        let chunk_size = vars.number_or("CHUNK_SIZE", DEFAULT_CHUNK_SIZE)?;
        if chunk_size == 0 {
            return Err(ConfigError::InvalidValue("CHUNK_SIZE".into()));
        }
        let chunk_overlap = vars.number_or("CHUNK_OVERLAP", DEFAULT_CHUNK_OVERLAP)?;
        if chunk_overlap >= chunk_size {
            return Err(ConfigError::InvalidValue("CHUNK_OVERLAP".into()));
        }

        Ok(Self {
            upload_directory: vars
                .optional("UPLOAD_DIRECTORY")
                .unwrap_or_else(|| DEFAULT_UPLOAD_DIRECTORY.into())
                .into(),
            vector_store_directory: vars
                .optional("VECTOR_STORE_DIRECTORY")
                .unwrap_or_else(|| DEFAULT_VECTOR_STORE_DIRECTORY.into())
                .into(),
            vector_store_backend,
            vector_store_collection: vars
                .optional("VECTOR_STORE_COLLECTION")
                .unwrap_or_else(|| DEFAULT_COLLECTION.into()),
            qdrant_url,
            qdrant_api_key: vars.optional("QDRANT_API_KEY"),
            embedding_provider,
            embedding_model: vars
                .optional("EMBEDDING_MODEL")
                .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.into()),
            embedding_dimension,
            embedding_api_url: vars
                .optional("EMBEDDING_API_URL")
                .unwrap_or_else(|| DEFAULT_EMBEDDING_API_URL.into()),
            embedding_api_key,
            ollama_url: vars
                .optional("OLLAMA_URL")
                .unwrap_or_else(|| DEFAULT_OLLAMA_URL.into()),
            llm_provider,
            llm_model: vars
                .optional("LLM_MODEL")
                .unwrap_or_else(|| DEFAULT_LLM_MODEL.into()),
            llm_api_url,
            llm_api_key,
            chunk_size,
            chunk_overlap,
            chunk_length_unit: vars.parsed_or("CHUNK_LENGTH_UNIT", ChunkLengthUnit::Characters)?,
            max_upload_bytes: vars.number_or("MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?,
            server_port: vars
                .optional("SERVER_PORT")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|_| ConfigError::InvalidValue("SERVER_PORT".into()))
                })
                .transpose()?,
        })
    }

    /// Log the loaded configuration without exposing credentials.
    pub fn log_summary(&self) {
        tracing::debug!(
            upload_directory = %self.upload_directory.display(),
            vector_store_directory = %self.vector_store_directory.display(),
            backend = ?self.vector_store_backend,
            collection = %self.vector_store_collection,
            embedding_provider = ?self.embedding_provider,
            embedding_model = %self.embedding_model,
            embedding_dimension = self.embedding_dimension,
            llm_provider = ?self.llm_provider,
            llm_model = %self.llm_model,
            has_llm_api_key = self.llm_api_key.is_some(),
            has_qdrant_api_key = self.qdrant_api_key.is_some(),
            chunk_size = self.chunk_size,
            chunk_overlap = self.chunk_overlap,
            chunk_length_unit = ?self.chunk_length_unit,
            server_port = ?self.server_port,
            "Loaded configuration"
        );
    }
}

struct Vars<F>(F);

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn parsed_or<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: std::str::FromStr<Err = ()>,
    {
        match self.optional(key) {
            Some(value) => value
                .parse()
                .map_err(|()| ConfigError::InvalidValue(key.to_string())),
            None => Ok(default),
        }
    }

    fn number_or(&self, key: &str, default: usize) -> Result<usize, ConfigError> {
        match self.optional(key) {
            Some(value) => value
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string())),
            None => Ok(default),
        }
    }
}

impl std::str::FromStr for VectorStoreBackend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
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
            "hashing" => Ok(Self::Hashing),
            _ => Err(()),
        }
    }
}

impl std::str::FromStr for LlmProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "groq" => Ok(Self::Groq),
            "openai" => Ok(Self::OpenAI),
            "ollama" => Ok(Self::Ollama),
            _ => Err(()),
        }
    }
}

impl std::str::FromStr for ChunkLengthUnit {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "characters" | "chars" => Ok(Self::Characters),
            "tokens" => Ok(Self::Tokens),
            _ => Err(()),
        }
    }
}
