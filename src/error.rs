// Custom error types
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PriceError {
    #[error("Price not found for {symbol}/{currency}")]
    PriceNotFound { symbol: String, currency: String },

    #[error("Provider {provider} unavailable: {message}")]
    ProviderUnavailable { provider: String, message: String },

    #[error("Rate limit exceeded for {0}")]
    RateLimitExceeded(String),

    #[error("No price data available for {0}")]
    NoPriceData(String),

    /// The upstream source rejected the request with "too many requests".
    #[error("Throttled by {0}")]
    Throttled(String),

    #[error("Invalid price data: {0}")]
    InvalidPriceData(String),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl PriceError {
    /// Whether this failure is an upstream rejection for sending too many
    /// requests, as opposed to a data or transport problem.
    pub fn is_throttling(&self) -> bool {
        match self {
            PriceError::Throttled(_) => true,
            PriceError::HttpError(e) => {
                e.status() == Some(reqwest::StatusCode::TOO_MANY_REQUESTS)
            }
            PriceError::ProviderUnavailable { message, .. } => mentions_throttling(message),
            _ => false,
        }
    }
}

fn mentions_throttling(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("too many requests") || lower.contains("rate limit") || lower.contains("429")
}

/// A type alias for Result that uses our custom error type
pub type Result<T> = std::result::Result<T, PriceError>;
