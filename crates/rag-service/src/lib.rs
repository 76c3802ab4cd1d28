//! rag-service - Question answering service
//!
//! This crate wires document preparation, the index manager and prompt
//! assembly into the handlers a transport (HTTP, CLI) calls.
//!
//! # Handlers
//!
//! - `startup` - Load the persisted index, or ingest the configured document
//! - `ingest` - Split, optionally contextualize, and index a document
//! - `query` - Hybrid search plus prompt assembly (and answer, if a generator is set)
//! - `status` - Index readiness and provenance

mod params;
mod prompt;
mod service;

pub use params::{IngestReport, QueryRequest, QueryResponse, SourceItem, StartupOutcome};
pub use prompt::{build_messages, format_context, preview, SYSTEM_PROMPT};
pub use service::RagService;
