//! Error types for inbox-sweep.

use std::path::PathBuf;

/// Top-level error type for a filter run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Gmail error: {0}")]
    Gmail(#[from] GmailError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Gmail API errors.
#[derive(Debug, thiserror::Error)]
pub enum GmailError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Gmail API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Gmail rejected the access token")]
    Unauthorized,

    #[error("Invalid message ID: {0:?}")]
    InvalidMessageId(String),

    #[error("Token file {path}: {reason}")]
    Token { path: PathBuf, reason: String },

    #[error("Token refresh failed: {0}")]
    TokenRefresh(String),

    #[error("{operation} failed after {attempts} attempt(s): {source}")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        #[source]
        source: Box<GmailError>,
    },
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} is not reachable at {url}")]
    Unavailable { provider: String, url: String },
}

/// Result persistence errors.
#[derive(Debug, thiserror::Error)]
pub enum ResultsError {
    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for a filter run.
pub type Result<T> = std::result::Result<T, Error>;
