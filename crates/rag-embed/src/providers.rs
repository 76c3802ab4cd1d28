//! Provider construction from configuration.

use std::sync::Arc;

use tracing::{info, warn};

use rag_core::{
    EmbeddingBackend, EmbeddingConfig, Embedder, RerankBackend, RerankConfig, Reranker, Result,
};

use crate::{LexicalOverlapReranker, MockEmbedder, OnnxEmbedder, OnnxReranker};

/// Build the configured embedder.
///
/// The embedder is required: failure here is fatal to startup.
pub fn embedder_from_config(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.backend {
        EmbeddingBackend::Onnx => Ok(Arc::new(OnnxEmbedder::from_config(config)?)),
        EmbeddingBackend::Mock => {
            warn!("Using mock embedder; dense retrieval is lexical hashing only");
            Ok(Arc::new(MockEmbedder::with_dimension(config.dimension)))
        }
    }
}

/// Build the configured reranker, if any.
///
/// Reranking is optional: a disabled or unloadable reranker yields `None`
/// and queries fall back to unranked fusion output.
pub fn reranker_from_config(config: &RerankConfig) -> Option<Arc<dyn Reranker>> {
    if !config.enabled {
        info!("Reranking disabled by configuration");
        return None;
    }

    match config.backend {
        RerankBackend::Lexical => Some(Arc::new(LexicalOverlapReranker::new())),
        RerankBackend::Onnx => match OnnxReranker::from_config(config) {
            Ok(reranker) => Some(Arc::new(reranker)),
            Err(e) => {
                warn!("Reranker unavailable, continuing without it: {}", e);
                None
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_embedder_uses_configured_dimension() {
        let config = EmbeddingConfig {
            backend: EmbeddingBackend::Mock,
            dimension: 48,
            ..Default::default()
        };
        let embedder = embedder_from_config(&config).unwrap();
        assert_eq!(embedder.dimension(), 48);
    }

    #[test]
    fn test_disabled_reranker_is_none() {
        let config = RerankConfig {
            enabled: false,
            ..Default::default()
        };
        assert!(reranker_from_config(&config).is_none());
    }

    #[test]
    fn test_unloadable_reranker_degrades_to_none() {
        let config = RerankConfig {
            backend: RerankBackend::Onnx,
            model_path: "/nonexistent/model.onnx".into(),
            ..Default::default()
        };
        assert!(reranker_from_config(&config).is_none());
    }

    #[test]
    fn test_lexical_reranker() {
        let config = RerankConfig {
            backend: RerankBackend::Lexical,
            ..Default::default()
        };
        let reranker = reranker_from_config(&config).unwrap();
        assert_eq!(reranker.name(), "lexical-overlap");
    }
}
