//! Error types for duobot-core

use thiserror::Error;

/// Main error type for duobot-core
#[derive(Error, Debug)]
pub enum Error {
    /// Empty or malformed turn content; never stored
    #[error("Invalid turn: {0}")]
    InvalidTurn(String),

    /// The completion service failed or timed out
    #[error("Completion unavailable: {0}")]
    CompletionUnavailable(String),

    #[error("LLM API error: {0}")]
    LlmApi(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for duobot-core
pub type Result<T> = std::result::Result<T, Error>;
