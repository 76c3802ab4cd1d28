//! rag-query - Search and index lifecycle
//!
//! This crate provides hybrid retrieval on top of `rag-index`: dense and
//! keyword search run concurrently, their candidates are fused by
//! provenance, and an optional reranker orders the result.
//!
//! # Features
//!
//! - Provenance-preserving fusion (`vector`, `bm25`, `hybrid`)
//! - Reranking that degrades to fused order instead of failing
//! - [`IndexManager`]: atomic build/publish, load, readiness and status
//!
//! # Example
//!
//! ```rust,ignore
//! use rag_query::{IndexManager, QueryConfig};
//!
//! let manager = IndexManager::new(&config.index, embedder, reranker, QueryConfig::default(), 32);
//! manager.build_index(chunks, "paper.pdf").await?;
//! let results = manager.search("What is self-attention?", 6).await?;
//! ```

mod engine;
mod fusion;
mod manager;
mod rerank;

pub use engine::{Indexes, QueryConfig, QueryEngine};
pub use fusion::fuse;
pub use manager::IndexManager;
pub use rerank::rerank_candidates;

// Re-export for convenience
pub use rag_core::{SearchHit, SearchResults};
