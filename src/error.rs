use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScraperError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP 429: rate limit exceeded after retries")]
    RateLimitExceeded,

    #[error("HTTP {status}")]
    HttpStatus { status: u16 },

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("API error: {message}")]
    Api { message: String },
}

impl ScraperError {
    /// Whether the failure may clear up on its own and is worth another attempt.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ScraperError::Network(_) | ScraperError::RateLimitExceeded | ScraperError::HttpStatus { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, ScraperError>;
