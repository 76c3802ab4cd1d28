//! Contextual chunk enrichment.

use tracing::{debug, info, warn};

use rag_core::{Chunk, ContextualPrefixer};

/// Prefix every chunk with a context that situates it in the document.
///
/// Chunks keep their ids and metadata. A chunk whose context request fails
/// is kept unchanged.
pub async fn contextualize(
    document_context: &str,
    chunks: Vec<Chunk>,
    prefixer: &dyn ContextualPrefixer,
) -> Vec<Chunk> {
    let total = chunks.len();
    let mut failures = 0usize;
    let mut enriched = Vec::with_capacity(total);

    for (i, mut chunk) in chunks.into_iter().enumerate() {
        match prefixer.context_for(document_context, &chunk.content).await {
            Ok(context) => {
                chunk.content = format!("{}\n\n{}", context.trim(), chunk.content);
            }
            Err(e) => {
                failures += 1;
                warn!("Context generation failed for chunk {}: {}", i, e);
            }
        }
        debug!("Contextualized {}/{}", i + 1, total);
        enriched.push(chunk);
    }

    info!(
        "Contextual enrichment done: {} chunks, {} kept unchanged",
        total, failures
    );
    enriched
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rag_core::{RagError, Result};

    struct FirstWordPrefixer;

    #[async_trait]
    impl ContextualPrefixer for FirstWordPrefixer {
        async fn context_for(&self, document_context: &str, chunk: &str) -> Result<String> {
            if chunk.contains("fail") {
                return Err(RagError::generation("upstream unavailable"));
            }
            let title = document_context.split_whitespace().next().unwrap_or("");
            Ok(format!("From {}.", title))
        }
    }

    #[tokio::test]
    async fn test_contextualize_prefixes_content() {
        let chunks = vec![
            Chunk::new(0, "Scaled dot-product attention."),
            Chunk::new(1, "this one will fail"),
        ];

        let enriched = contextualize("Transformer paper", chunks, &FirstWordPrefixer).await;

        assert_eq!(enriched.len(), 2);
        assert_eq!(
            enriched[0].content,
            "From Transformer.\n\nScaled dot-product attention."
        );
        assert_eq!(enriched[0].chunk_id, Some(0));
        assert_eq!(enriched[1].content, "this one will fail");
        assert_eq!(enriched[1].chunk_id, Some(1));
    }
}
