use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConciergeError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("http error: {0}")]
    Http(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    NotFound(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("{0}")]
    Conflict(String),
    #[error("runtime error: {0}")]
    Runtime(String),
}

impl From<serde_json::Error> for ConciergeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

pub use crate::Result;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_category_prefix() {
        let err = ConciergeError::Config("x".to_string());
        assert!(format!("{err}").contains("configuration error"));

        let err = ConciergeError::NotFound("Agent 'ghost' not found".to_string());
        assert_eq!(err.to_string(), "Agent 'ghost' not found");
    }

    #[test]
    fn serde_errors_convert_to_serialization() {
        let err: ConciergeError = serde_json::from_str::<serde_json::Value>("{bad")
            .unwrap_err()
            .into();
        assert!(matches!(err, ConciergeError::Serialization(_)));
    }
}
