//! rag-embed - Embedding and reranking providers
//!
//! This crate provides the model-backed providers used by the retrieval
//! engine, plus deterministic model-free stand-ins.
//!
//! # Providers
//!
//! - [`OnnxEmbedder`]: sentence embeddings (all-MiniLM-L6-v2 or compatible)
//!   with mean pooling and L2 normalization
//! - [`MockEmbedder`]: feature-hashing bag-of-words embedder
//! - [`OnnxReranker`]: cross-encoder relevance scoring of (query, passage) pairs
//! - [`LexicalOverlapReranker`]: query-term coverage scoring

mod mock;
mod onnx;
mod providers;
mod rerank;

pub use mock::MockEmbedder;
pub use onnx::OnnxEmbedder;
pub use providers::{embedder_from_config, reranker_from_config};
pub use rerank::{LexicalOverlapReranker, OnnxReranker};

// Re-export the provider traits for convenience
pub use rag_core::{Embedder, RerankHit, Reranker};
