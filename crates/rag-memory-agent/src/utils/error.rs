use thiserror::Error;

pub type Result<T> = std::result::Result<T, AgentError>;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Unknown chunking strategy: {0}")]
    UnknownStrategy(String),

    #[error("Invalid chunking config: chunk_size={chunk_size}, overlap={overlap}")]
    InvalidChunking { chunk_size: usize, overlap: usize },

    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Retrieval failed: {0:#}")]
    Retrieval(anyhow::Error),

    #[error("Generation failed: {0:#}")]
    Generation(anyhow::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<config::ConfigError> for AgentError {
    fn from(err: config::ConfigError) -> Self {
        AgentError::ConfigError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retrieval_error_keeps_context_chain() {
        let inner = anyhow::anyhow!("connection refused").context("vector index unreachable");
        let err = AgentError::Retrieval(inner);
        let text = err.to_string();
        assert!(text.contains("vector index unreachable"));
        assert!(text.contains("connection refused"));
    }

    #[test]
    fn test_invalid_chunking_message() {
        let err = AgentError::InvalidChunking { chunk_size: 10, overlap: 10 };
        assert_eq!(
            err.to_string(),
            "Invalid chunking config: chunk_size=10, overlap=10"
        );
    }
}
