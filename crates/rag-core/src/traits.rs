//! Core traits defining the interfaces to external providers.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Embedding model trait.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of document texts.
    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single query text.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>>;

    /// Get the embedding dimension.
    fn dimension(&self) -> usize;
}

/// A relevance judgement for one passage, by position in the input slice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RerankHit {
    /// Index into the passages passed to [`Reranker::rerank`].
    pub index: usize,

    /// Relevance score. Backends may leave it unset.
    pub relevance_score: Option<f32>,
}

/// Cross-encoder style relevance scorer.
#[async_trait]
pub trait Reranker: Send + Sync {
    /// Score every passage against the query.
    async fn rerank(&self, query: &str, passages: &[&str]) -> Result<Vec<RerankHit>>;

    /// Short name used in logs.
    fn name(&self) -> &str;
}

/// Splitter configuration, in characters.
#[derive(Debug, Clone)]
pub struct ChunkConfig {
    /// Maximum characters per chunk.
    pub chunk_size: usize,

    /// Characters carried over between consecutive chunks.
    pub chunk_overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

/// Text splitting strategy trait.
pub trait Chunker: Send + Sync {
    /// Split document text into pieces.
    fn chunk(&self, content: &str, config: &ChunkConfig) -> Result<Vec<ChunkData>>;
}

/// Raw chunk data before ID assignment.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkData {
    /// Chunk text content.
    pub content: String,

    /// 0-based page the chunk was taken from.
    pub page: u32,
}

/// Produces a short context that situates a chunk within the document.
#[async_trait]
pub trait ContextualPrefixer: Send + Sync {
    async fn context_for(&self, document_context: &str, chunk: &str) -> Result<String>;
}

/// A chat message handed to the answer generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Language model that answers from the assembled prompt.
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    async fn generate(&self, messages: &[ChatMessage]) -> Result<String>;
}
