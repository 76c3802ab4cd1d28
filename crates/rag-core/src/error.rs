//! Error types for the retrieval engine.

use thiserror::Error;

/// Result type alias using RagError.
pub type Result<T> = std::result::Result<T, RagError>;

/// Errors that can occur in the retrieval engine.
#[derive(Error, Debug)]
pub enum RagError {
    /// No index is loaded yet; queries cannot be served.
    #[error("Index not ready: {message}")]
    NotReady { message: String },

    /// Invalid argument provided.
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    /// Failed to load the source document.
    #[error("Failed to load content from {path}: {reason}")]
    LoadFailed { path: String, reason: String },

    /// Index construction or persistence error.
    #[error("Index error: {message}")]
    Index { message: String },

    /// Embedding model error.
    #[error("Embedding error: {message}")]
    Embedding { message: String },

    /// Reranking backend error.
    #[error("Rerank error: {message}")]
    Rerank { message: String },

    /// Chunking error.
    #[error("Chunking error: {message}")]
    Chunking { message: String },

    /// Answer or context generation error.
    #[error("Generation error: {message}")]
    Generation { message: String },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Internal error (unexpected).
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl RagError {
    /// Create a not-ready error.
    pub fn not_ready(message: impl Into<String>) -> Self {
        Self::NotReady {
            message: message.into(),
        }
    }

    /// Create an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create an index error.
    pub fn index(message: impl Into<String>) -> Self {
        Self::Index {
            message: message.into(),
        }
    }

    /// Create an embedding error.
    pub fn embedding(message: impl Into<String>) -> Self {
        Self::Embedding {
            message: message.into(),
        }
    }

    /// Create a rerank error.
    pub fn rerank(message: impl Into<String>) -> Self {
        Self::Rerank {
            message: message.into(),
        }
    }

    /// Create a chunking error.
    pub fn chunking(message: impl Into<String>) -> Self {
        Self::Chunking {
            message: message.into(),
        }
    }

    /// Create a generation error.
    pub fn generation(message: impl Into<String>) -> Self {
        Self::Generation {
            message: message.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the stable error code reported to callers.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotReady { .. } => "NOT_READY",
            Self::InvalidArgument { .. } => "INVALID_ARGUMENT",
            Self::LoadFailed { .. } => "LOAD_FAILED",
            Self::Index { .. } => "INDEX_ERROR",
            Self::Embedding { .. } => "EMBEDDING_ERROR",
            Self::Rerank { .. } => "RERANK_ERROR",
            Self::Chunking { .. } => "CHUNKING_ERROR",
            Self::Generation { .. } => "GENERATION_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Config { .. } => "CONFIG_ERROR",
            Self::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    /// HTTP-equivalent status for request handlers.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotReady { .. } => 503,
            Self::InvalidArgument { .. } => 400,
            _ => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RagError::LoadFailed {
            path: "data/doc.txt".to_string(),
            reason: "missing".to_string(),
        };
        assert!(err.to_string().contains("data/doc.txt"));
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(RagError::not_ready("building").error_code(), "NOT_READY");
        assert_eq!(RagError::index("corrupt").error_code(), "INDEX_ERROR");
        assert_eq!(RagError::rerank("timeout").error_code(), "RERANK_ERROR");
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(RagError::not_ready("x").status_code(), 503);
        assert_eq!(RagError::invalid_argument("k").status_code(), 400);
        assert_eq!(RagError::embedding("x").status_code(), 500);
    }
}
