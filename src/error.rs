//! Error types for the smart audit service

use thiserror::Error;

/// Result type alias for service operations
pub type Result<T> = std::result::Result<T, ServiceError>;

#[derive(Error, Debug)]
pub enum ServiceError {

    // =============================
    // Startup / Offline Errors
    // =============================

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Knowledge base error: {0}")]
    Knowledge(String),

    #[error("Dataset error: {0}")]
    Dataset(String),

    // =============================
    // Agent Pipeline Errors
    // =============================

    #[error("Model API error ({status}): {message}")]
    ModelApi { status: u16, message: String },

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Session store error: {0}")]
    Session(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Tool round limit reached after {0} rounds")]
    ToolRoundLimit(u32),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    Http(reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

// Request URLs can carry credentials, so they never reach the message.
impl From<reqwest::Error> for ServiceError {
    fn from(e: reqwest::Error) -> Self {
        ServiceError::Http(e.without_url())
    }
}

impl ServiceError {
    /// Whether a failed model call is worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            ServiceError::ModelApi { status, .. } => {
                matches!(status, 408 | 429 | 500 | 502 | 503 | 504)
            }
            ServiceError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            _ => false,
        }
    }
}
