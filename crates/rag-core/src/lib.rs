//! rag-core - Core types and traits for the hybrid retrieval engine
//!
//! This crate provides the foundational types, provider traits, configuration
//! and error handling shared by the indexing, query and service crates.

pub mod config;
pub mod error;
pub mod text;
pub mod traits;
pub mod types;

pub use config::*;
pub use error::{RagError, Result};
pub use traits::*;
pub use types::*;
