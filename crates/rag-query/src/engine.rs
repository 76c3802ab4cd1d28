//! Query engine for hybrid search.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use rag_core::{Chunk, RagError, Reranker, Result, SearchResults};
use rag_index::{DenseIndex, IndexMetadata, SparseIndex};

use crate::fusion::fuse;
use crate::rerank::rerank_candidates;

/// One loaded index generation.
#[derive(Debug)]
pub struct Indexes {
    pub dense: DenseIndex,

    /// Absent when no verified chunk set was available to build it from.
    pub sparse: Option<SparseIndex>,

    /// On-disk metadata of this generation, if readable.
    pub metadata: Option<IndexMetadata>,
}

/// Configuration for search queries.
#[derive(Debug, Clone)]
pub struct QueryConfig {
    /// Candidates fetched from each index per requested result.
    pub fetch_multiplier: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self { fetch_multiplier: 2 }
    }
}

/// Hybrid search query engine.
///
/// Runs dense and keyword search concurrently, fuses the two candidate
/// pools by provenance and orders them with the optional reranker.
pub struct QueryEngine {
    /// Relevance reranker; `None` returns fused order.
    reranker: Option<Arc<dyn Reranker>>,

    config: QueryConfig,
}

impl QueryEngine {
    /// Create a new query engine.
    pub fn new(reranker: Option<Arc<dyn Reranker>>, config: QueryConfig) -> Self {
        Self { reranker, config }
    }

    pub fn has_reranker(&self) -> bool {
        self.reranker.is_some()
    }

    /// Perform a hybrid search against one index generation.
    pub async fn search(&self, indexes: &Indexes, query: &str, k: usize) -> Result<SearchResults> {
        if k == 0 {
            return Err(RagError::invalid_argument("k must be positive"));
        }
        let start = Instant::now();
        let fetch_k = k.saturating_mul(self.config.fetch_multiplier.max(1));

        info!("Searching for: {:?} (k={}, fetch_k={})", query, k, fetch_k);

        // Perform searches in parallel
        let (dense_results, sparse_results) = tokio::join!(
            indexes.dense.search(query, fetch_k),
            self.keyword_search(indexes.sparse.as_ref(), query, fetch_k)
        );

        let dense_results = dense_results?;

        debug!(
            "Vector search returned {} results, keyword search returned {} results",
            dense_results.len(),
            sparse_results.len()
        );

        let candidates = fuse(dense_results, sparse_results);
        let pool = candidates.len();

        let (hits, reranked) =
            rerank_candidates(self.reranker.as_deref(), query, candidates, k).await;

        let latency_ms = start.elapsed().as_millis() as u64;

        info!(
            "Search completed in {}ms, returned {} of {} candidates",
            latency_ms,
            hits.len(),
            pool
        );

        Ok(SearchResults {
            query: query.to_string(),
            hits,
            candidates: pool,
            reranked,
            latency_ms,
        })
    }

    /// Keyword search; a missing or failing sparse index contributes nothing.
    async fn keyword_search(
        &self,
        sparse: Option<&SparseIndex>,
        query: &str,
        k: usize,
    ) -> Vec<Chunk> {
        let Some(sparse) = sparse else {
            return Vec::new();
        };

        match sparse.search(query, k) {
            Ok(chunks) => chunks,
            Err(e) => {
                warn!("Keyword search failed, continuing dense-only: {}", e);
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rag_core::{Embedder, RetrievalSource, ScoreKind};
    use rag_embed::{LexicalOverlapReranker, MockEmbedder};

    fn corpus() -> Vec<Chunk> {
        vec![
            Chunk::new(0, "The encoder maps symbol representations to continuous ones."),
            Chunk::new(1, "Positional encodings are added to the input embeddings."),
            Chunk::new(2, "Self-attention relates different positions of a single sequence."),
        ]
    }

    async fn indexes(with_sparse: bool) -> Indexes {
        let embedder: Arc<dyn Embedder> = Arc::new(MockEmbedder::with_dimension(1024));
        let chunks = corpus();
        let sparse = with_sparse.then(|| SparseIndex::build(&chunks).unwrap());
        Indexes {
            dense: DenseIndex::build(chunks, embedder, 32).await.unwrap(),
            sparse,
            metadata: None,
        }
    }

    #[test]
    fn test_query_config_default() {
        assert_eq!(QueryConfig::default().fetch_multiplier, 2);
    }

    #[tokio::test]
    async fn test_self_attention_is_hybrid() {
        let engine = QueryEngine::new(None, QueryConfig::default());
        let indexes = indexes(true).await;

        let results = engine
            .search(&indexes, "What is self-attention?", 5)
            .await
            .unwrap();

        assert_eq!(results.hits.len(), 3);
        let hit = results.hits.iter().find(|h| h.chunk_id == Some(2)).unwrap();
        assert_eq!(hit.source_method, RetrievalSource::Hybrid);
        let others = results.hits.iter().filter(|h| h.chunk_id != Some(2));
        assert!(others.into_iter().all(|h| h.source_method == RetrievalSource::Vector));
    }

    #[tokio::test]
    async fn test_dense_only_results_are_vector() {
        let engine = QueryEngine::new(None, QueryConfig::default());
        let indexes = indexes(false).await;

        let results = engine.search(&indexes, "self-attention", 2).await.unwrap();

        assert_eq!(results.hits.len(), 2);
        assert!(results
            .hits
            .iter()
            .all(|h| h.source_method == RetrievalSource::Vector));
        assert!(!results.reranked);
    }

    #[tokio::test]
    async fn test_each_chunk_appears_once() {
        let engine = QueryEngine::new(None, QueryConfig::default());
        let indexes = indexes(true).await;

        let results = engine
            .search(&indexes, "positional encodings input", 5)
            .await
            .unwrap();

        let mut ids: Vec<_> = results.hits.iter().map(|h| h.chunk_id).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), results.hits.len());
    }

    #[tokio::test]
    async fn test_reranker_does_not_change_candidate_set() {
        let plain = QueryEngine::new(None, QueryConfig::default());
        let ranked = QueryEngine::new(
            Some(Arc::new(LexicalOverlapReranker::new())),
            QueryConfig::default(),
        );
        let indexes = indexes(true).await;

        let a = plain.search(&indexes, "single sequence", 5).await.unwrap();
        let b = ranked.search(&indexes, "single sequence", 5).await.unwrap();

        assert_eq!(a.candidates, b.candidates);
        let mut ids_a: Vec<_> = a.hits.iter().map(|h| h.chunk_id).collect();
        let mut ids_b: Vec<_> = b.hits.iter().map(|h| h.chunk_id).collect();
        ids_a.sort();
        ids_b.sort();
        assert_eq!(ids_a, ids_b);

        assert!(b.reranked);
        assert_eq!(b.hits[0].chunk_id, Some(2));
        assert!(b.hits.iter().all(|h| h.score_kind == ScoreKind::Relevance));
        for pair in b.hits.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[tokio::test]
    async fn test_zero_k_is_rejected() {
        let engine = QueryEngine::new(None, QueryConfig::default());
        let indexes = indexes(true).await;
        assert!(engine.search(&indexes, "anything", 0).await.is_err());
    }
}
