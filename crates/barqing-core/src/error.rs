//! Error types shared by every barqing crate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BarqingError {
    #[error("Config error: {0}")]
    Config(String),

    /// The remote chat API answered, but not with a usable payload.
    /// `body` is the response text, kept verbatim for the logs.
    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Delivery queue closed")]
    QueueClosed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, BarqingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_keeps_body_verbatim() {
        let err = BarqingError::Api {
            status: 401,
            body: "{\"errors\":[\"unauthorized\"]}".into(),
        };
        assert_eq!(err.to_string(), "API error 401: {\"errors\":[\"unauthorized\"]}");
    }
}
