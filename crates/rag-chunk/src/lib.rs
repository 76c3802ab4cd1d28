//! rag-chunk - Document preparation
//!
//! Turns a source document into the identified chunk set that the indexes
//! are built from.
//!
//! # Pipeline
//!
//! - [`load_document`]: read the source text.
//! - [`RecursiveChunker`]: split into overlapping character windows,
//!   page by page.
//! - [`assign_chunk_ids`]: number chunks from 0 and attach source metadata.
//! - [`contextualize`]: optionally prefix each chunk with a short
//!   situating context.
//!
//! # Example
//!
//! ```rust
//! use rag_chunk::{assign_chunk_ids, Chunker, RecursiveChunker};
//! use rag_core::ChunkConfig;
//!
//! let pieces = RecursiveChunker::new()
//!     .chunk("Hello world", &ChunkConfig::default())
//!     .unwrap();
//! let chunks = assign_chunk_ids(pieces, "notes.txt");
//! assert_eq!(chunks[0].chunk_id, Some(0));
//! ```

mod contextual;
mod ids;
mod recursive;
mod source;

pub use contextual::contextualize;
pub use ids::assign_chunk_ids;
pub use recursive::RecursiveChunker;
pub use source::load_document;

// Re-export types for convenience
pub use rag_core::{ChunkConfig, ChunkData, Chunker, ContextualPrefixer};
