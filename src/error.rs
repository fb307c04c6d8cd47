use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Raised before any network call when the process is missing something it needs.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Store name must be provided or set in STORE_NAME environment variable")]
    MissingStore,
    #[error("Gemini API key is required (set GEMINI_API_KEY)")]
    MissingApiKey,
    #[error("Invalid Gemini base URL '{url}': {source}")]
    InvalidBaseUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("Failed to read persona file '{path}': {source}")]
    PersonaIo {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse persona file '{path}': {source}")]
    PersonaJson {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Failures of the remote knowledge service. Never retried locally.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Request to {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("Cannot build endpoint for '{path}': {source}")]
    InvalidEndpoint {
        path: String,
        #[source]
        source: url::ParseError,
    },
    #[error("{endpoint} returned HTTP {status}: {message}")]
    Api {
        endpoint: String,
        status: u16,
        message: String,
    },
    #[error("Malformed response from {endpoint}: {reason}")]
    Decode {
        endpoint: String,
        reason: String,
    },
    #[error("Prompt was blocked by the service: {0}")]
    Blocked(String),
    #[error("Model returned no text (finish reason: {0})")]
    EmptyResponse(String),
    #[error("Upload session was not opened: {0}")]
    UploadSession(String),
    #[error("No reply within {0:?}")]
    DeadlineExceeded(Duration),
    #[error("Operation {name} failed: {message}")]
    OperationFailed {
        name: String,
        message: String,
    },
    #[error("Operation {name} still running after {waited:?}")]
    OperationTimeout {
        name: String,
        waited: Duration,
    },
}

/// Grounding metadata that could not be read. Absorbed by citation extraction.
#[derive(Debug, Error)]
pub enum CitationError {
    #[error("Malformed grounding metadata: {0}")]
    Malformed(String),
    #[error("Malformed grounding chunk {index}: {reason}")]
    Chunk {
        index: usize,
        reason: String,
    },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("Failed to read '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Service(#[from] ServiceError),
}
