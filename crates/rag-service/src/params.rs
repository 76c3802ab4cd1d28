//! Request and response types.

use serde::{Deserialize, Serialize};

use rag_core::{ChatMessage, SearchHit};

use crate::prompt::preview;

/// Query request parameters.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueryRequest {
    /// The question.
    pub q: String,

    /// Number of sources to retrieve (default: `search.default_k`).
    #[serde(default)]
    pub k: Option<usize>,
}

impl QueryRequest {
    pub fn new(q: impl Into<String>) -> Self {
        Self { q: q.into(), k: None }
    }

    pub fn with_k(mut self, k: usize) -> Self {
        self.k = Some(k);
        self
    }
}

/// One retrieved source as shown to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceItem {
    /// Chunk identifier; 0 when the chunk carried none.
    pub chunk_id: u32,

    pub score: f32,

    /// `vector`, `bm25` or `hybrid`.
    pub method: String,

    /// Leading characters of the chunk followed by `...`.
    pub preview: String,
}

impl SourceItem {
    pub fn from_hit(hit: &SearchHit, preview_chars: usize) -> Self {
        Self {
            chunk_id: hit.chunk_id.unwrap_or(0),
            score: hit.score,
            method: hit.source_method.to_string(),
            preview: preview(&hit.content, preview_chars),
        }
    }
}

/// Query response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    /// Generated answer, when an answer generator is configured.
    pub answer: Option<String>,

    pub sources: Vec<SourceItem>,

    /// `[Source i] content` block handed to the generator.
    pub context: String,

    /// Messages handed to the generator.
    pub messages: Vec<ChatMessage>,

    /// Whether a reranker ordered the sources.
    pub reranked: bool,
}

/// Result of a successful ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestReport {
    pub filename: String,
    pub chunk_count: usize,
}

/// How the service came up.
#[derive(Debug, Clone, PartialEq)]
pub enum StartupOutcome {
    /// A persisted index was loaded.
    Loaded,

    /// No index was on disk; the configured document was ingested.
    Ingested(IngestReport),

    /// Nothing could be loaded or ingested; queries are rejected.
    NotReady,
}

impl StartupOutcome {
    pub fn is_ready(&self) -> bool {
        !matches!(self, Self::NotReady)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rag_core::{RetrievalSource, ScoreKind};

    #[test]
    fn test_query_request_default_k() {
        let request: QueryRequest = serde_json::from_str(r#"{"q": "What is attention?"}"#).unwrap();
        assert_eq!(request.q, "What is attention?");
        assert_eq!(request.k, None);
    }

    #[test]
    fn test_source_item_from_hit() {
        let hit = SearchHit {
            chunk_id: None,
            content: "Multi-head attention allows the model to jointly attend.".to_string(),
            score: 0.25,
            source_method: RetrievalSource::Bm25,
            score_kind: ScoreKind::Relevance,
        };

        let item = SourceItem::from_hit(&hit, 10);

        assert_eq!(item.chunk_id, 0);
        assert_eq!(item.method, "bm25");
        assert_eq!(item.preview, "Multi-head...");
    }
}
