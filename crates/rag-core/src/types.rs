//! Core domain types for the retrieval engine.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Identifier of a chunk within one indexed document generation.
pub type ChunkId = u32;

/// Metadata key holding the retrieval provenance of a fused candidate.
pub const META_RETRIEVAL_SOURCE: &str = "retrieval_source";

/// Metadata key holding the raw dense similarity of a fused candidate.
pub const META_ORIGINAL_SCORE: &str = "original_score";

/// Metadata key holding a relevance score assigned by a reranker.
pub const META_RELEVANCE_SCORE: &str = "relevance_score";

/// Metadata key holding the source document filename.
pub const META_SOURCE: &str = "source";

/// Metadata key holding the 0-based page number.
pub const META_PAGE: &str = "page";

/// A unit of retrievable text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Sequential identifier assigned at ingestion.
    ///
    /// `None` only for malformed input; ingestion rejects such chunks and
    /// fusion keeps each of them under its own key.
    pub chunk_id: Option<ChunkId>,

    /// Text payload, possibly prefixed with generated context.
    pub content: String,

    /// Auxiliary fields, annotated in place as the chunk moves through
    /// retrieval stages.
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Chunk {
    /// Create a chunk with an identifier and no metadata.
    pub fn new(chunk_id: ChunkId, content: impl Into<String>) -> Self {
        Self {
            chunk_id: Some(chunk_id),
            content: content.into(),
            metadata: HashMap::new(),
        }
    }

    /// Create a chunk that carries no identifier.
    pub fn without_id(content: impl Into<String>) -> Self {
        Self {
            chunk_id: None,
            content: content.into(),
            metadata: HashMap::new(),
        }
    }

    /// Builder-style metadata insertion.
    pub fn with_metadata(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// Read a numeric metadata field.
    pub fn metadata_f32(&self, key: &str) -> Option<f32> {
        self.metadata
            .get(key)
            .and_then(|v| v.as_f64())
            .map(|v| v as f32)
    }
}

/// Which retrieval method surfaced a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalSource {
    /// Found by the dense index only.
    Vector,
    /// Found by the sparse index only.
    Bm25,
    /// Found independently by both indexes.
    Hybrid,
}

impl RetrievalSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vector => "vector",
            Self::Bm25 => "bm25",
            Self::Hybrid => "hybrid",
        }
    }
}

impl std::fmt::Display for RetrievalSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The scale a score was produced on.
///
/// An unranked hit carries a placeholder, not a relevance score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreKind {
    /// Reranker relevance.
    Relevance,
    /// No ranking stage ran; the score is a 0.0 placeholder.
    Unranked,
}

/// A fused, provenance-tagged candidate. Lives for one query only.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalCandidate {
    /// The retrieved chunk, with provenance annotated in its metadata.
    pub chunk: Chunk,

    /// Which index (or both) surfaced it.
    pub retrieval_source: RetrievalSource,

    /// Dense similarity, or 0.0 when found only lexically.
    pub original_score: f32,
}

impl RetrievalCandidate {
    pub fn chunk_id(&self) -> Option<ChunkId> {
        self.chunk.chunk_id
    }
}

/// One entry of the final, ordered result list.
///
/// `chunk_id`, `content`, `score` and `source_method` form the stable
/// contract consumed by response formatting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub chunk_id: Option<ChunkId>,
    pub content: String,
    pub score: f32,
    pub source_method: RetrievalSource,
    pub score_kind: ScoreKind,
}

/// Results of one hybrid search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResults {
    /// The original query.
    pub query: String,

    /// Ordered hits, at most `k`.
    pub hits: Vec<SearchHit>,

    /// Size of the fused candidate pool before truncation.
    pub candidates: usize,

    /// Whether a reranker ordered the hits.
    pub reranked: bool,

    /// Search latency in milliseconds.
    pub latency_ms: u64,
}

/// Snapshot of the index state held by a service instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexStatus {
    /// A dense index is loaded and queries are accepted.
    pub ready: bool,

    /// A sparse index is built for the loaded generation.
    pub sparse_enabled: bool,

    /// A reranker is configured.
    pub rerank_enabled: bool,

    /// Number of chunks in the dense index.
    pub chunk_count: usize,

    /// Document recorded in the on-disk metadata.
    pub filename: Option<String>,

    /// Build generation recorded in the on-disk metadata.
    pub generation: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retrieval_source_serializes_lowercase() {
        let json = serde_json::to_string(&RetrievalSource::Bm25).unwrap();
        assert_eq!(json, "\"bm25\"");
        assert_eq!(RetrievalSource::Hybrid.to_string(), "hybrid");
    }

    #[test]
    fn test_chunk_metadata_f32() {
        let chunk = Chunk::new(3, "text")
            .with_metadata(META_RELEVANCE_SCORE, 0.75)
            .with_metadata(META_SOURCE, "doc.pdf");

        assert_eq!(chunk.metadata_f32(META_RELEVANCE_SCORE), Some(0.75));
        assert_eq!(chunk.metadata_f32(META_SOURCE), None);
        assert_eq!(chunk.metadata_f32("missing"), None);
    }

    #[test]
    fn test_chunk_deserializes_without_metadata() {
        let chunk: Chunk = serde_json::from_str(r#"{"chunk_id": 1, "content": "x"}"#).unwrap();
        assert_eq!(chunk.chunk_id, Some(1));
        assert!(chunk.metadata.is_empty());
    }
}
