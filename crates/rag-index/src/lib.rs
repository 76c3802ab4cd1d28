//! rag-index - Retrieval indexes
//!
//! - [`DenseIndex`]: embedding nearest-neighbour search, persisted to a
//!   SQLite file inside the index directory.
//! - [`SparseIndex`]: BM25 keyword search over an in-memory FTS5 table,
//!   rebuilt from the chunk set on every start.
//! - [`IndexMetadata`]: the `metadata.json` record written next to the
//!   dense index.

mod dense;
mod metadata;
mod schema;
mod sparse;

pub use dense::{DenseIndex, DENSE_FILE};
pub use metadata::{fingerprint, IndexMetadata};
pub use sparse::SparseIndex;
