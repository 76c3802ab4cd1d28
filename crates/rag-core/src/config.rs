//! Configuration types for the retrieval service.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{RagError, Result};

/// Main configuration for the retrieval service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RagConfig {
    /// Index location.
    #[serde(default)]
    pub index: IndexConfig,

    /// Embedding configuration.
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Reranking configuration.
    #[serde(default)]
    pub rerank: RerankConfig,

    /// Search configuration.
    #[serde(default)]
    pub search: SearchConfig,

    /// Chunking configuration.
    #[serde(default)]
    pub chunking: ChunkingConfig,

    /// Source document.
    #[serde(default)]
    pub source: SourceConfig,
}

/// Where the persisted dense index lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Index directory.
    #[serde(default = "default_index_dir")]
    pub dir: PathBuf,

    /// Metadata file name, inside `dir`.
    #[serde(default = "default_metadata_file")]
    pub metadata_file: String,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dir: default_index_dir(),
            metadata_file: default_metadata_file(),
        }
    }
}

impl IndexConfig {
    /// Full path of the metadata file.
    pub fn metadata_path(&self) -> PathBuf {
        self.dir.join(&self.metadata_file)
    }
}

/// Embedding backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// ONNX Runtime sentence-embedding model.
    Onnx,
    /// Deterministic hashing embedder, no model files.
    Mock,
}

/// Embedding configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_backend")]
    pub backend: EmbeddingBackend,

    /// Path to the ONNX model file.
    #[serde(default = "default_embedding_model_path")]
    pub model_path: PathBuf,

    /// Path to tokenizer.json.
    #[serde(default = "default_embedding_tokenizer_path")]
    pub tokenizer_path: PathBuf,

    /// Embedding dimension.
    #[serde(default = "default_dimension")]
    pub dimension: usize,

    /// Maximum tokens per input.
    #[serde(default = "default_embedding_max_tokens")]
    pub max_tokens: usize,

    /// Batch size for embedding.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Number of threads for CPU inference.
    #[serde(default = "default_num_threads")]
    pub num_threads: usize,

    /// Prefix prepended to documents (asymmetric models only).
    #[serde(default)]
    pub document_prefix: String,

    /// Prefix prepended to queries (asymmetric models only).
    #[serde(default)]
    pub query_prefix: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: default_embedding_backend(),
            model_path: default_embedding_model_path(),
            tokenizer_path: default_embedding_tokenizer_path(),
            dimension: 384,
            max_tokens: 256,
            batch_size: 32,
            num_threads: 4,
            document_prefix: String::new(),
            query_prefix: String::new(),
        }
    }
}

/// Reranker backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RerankBackend {
    /// ONNX Runtime cross-encoder.
    Onnx,
    /// Query-term coverage, no model files.
    Lexical,
}

/// Reranking configuration. The reranker is optional; a misconfigured
/// reranker disables reranking instead of failing startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_rerank_backend")]
    pub backend: RerankBackend,

    /// Path to the cross-encoder ONNX model.
    #[serde(default = "default_rerank_model_path")]
    pub model_path: PathBuf,

    /// Path to the cross-encoder tokenizer.json.
    #[serde(default = "default_rerank_tokenizer_path")]
    pub tokenizer_path: PathBuf,

    /// Maximum tokens per (query, passage) pair.
    #[serde(default = "default_rerank_max_tokens")]
    pub max_tokens: usize,

    /// Intra-op threads for the cross-encoder session.
    #[serde(default = "default_num_threads")]
    pub num_threads: usize,
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: default_rerank_backend(),
            model_path: default_rerank_model_path(),
            tokenizer_path: default_rerank_tokenizer_path(),
            max_tokens: 512,
            num_threads: default_num_threads(),
        }
    }
}

/// Search configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Number of results when the request does not say.
    #[serde(default = "default_k")]
    pub default_k: usize,

    /// Largest accepted `k`.
    #[serde(default = "default_max_k")]
    pub max_k: usize,

    /// Each index is asked for `k * fetch_multiplier` candidates.
    #[serde(default = "default_fetch_multiplier")]
    pub fetch_multiplier: usize,

    /// Characters of chunk content shown in source previews.
    #[serde(default = "default_preview_chars")]
    pub preview_chars: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_k: 6,
            max_k: 50,
            fetch_multiplier: 2,
            preview_chars: 80,
        }
    }
}

/// Chunking configuration, in characters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

/// The single document this service answers questions about.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_document")]
    pub document: PathBuf,

    /// Document-level summary handed to the contextual prefixer.
    #[serde(default = "default_document_context")]
    pub context: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            document: default_document(),
            context: default_document_context(),
        }
    }
}

// Default value functions

fn default_true() -> bool {
    true
}

fn default_index_dir() -> PathBuf {
    PathBuf::from("data").join("index")
}

fn default_metadata_file() -> String {
    "metadata.json".to_string()
}

fn default_embedding_backend() -> EmbeddingBackend {
    EmbeddingBackend::Onnx
}

fn default_rerank_backend() -> RerankBackend {
    RerankBackend::Onnx
}

fn default_dimension() -> usize {
    384
}

fn default_embedding_max_tokens() -> usize {
    256
}

fn default_batch_size() -> usize {
    32
}

fn default_num_threads() -> usize {
    4
}

fn default_rerank_max_tokens() -> usize {
    512
}

fn default_k() -> usize {
    6
}

fn default_max_k() -> usize {
    50
}

fn default_fetch_multiplier() -> usize {
    2
}

fn default_preview_chars() -> usize {
    80
}

fn default_chunk_size() -> usize {
    1000
}

fn default_chunk_overlap() -> usize {
    200
}

fn default_document_context() -> String {
    "This document presents the Transformer architecture.".to_string()
}

fn default_document() -> PathBuf {
    PathBuf::from("data").join("attention_is_all_you_need.txt")
}

fn models_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("rag-hybrid")
        .join("models")
}

fn default_embedding_model_path() -> PathBuf {
    models_dir().join("all-MiniLM-L6-v2").join("model.onnx")
}

fn default_embedding_tokenizer_path() -> PathBuf {
    models_dir().join("all-MiniLM-L6-v2").join("tokenizer.json")
}

fn default_rerank_model_path() -> PathBuf {
    models_dir().join("ms-marco-MiniLM-L-6-v2").join("model.onnx")
}

fn default_rerank_tokenizer_path() -> PathBuf {
    models_dir().join("ms-marco-MiniLM-L-6-v2").join("tokenizer.json")
}

impl RagConfig {
    /// Load configuration from file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| RagError::config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from default paths.
    pub fn load_default() -> Result<Self> {
        // Try user config first
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("rag-hybrid").join("config.toml");
            if user_config.exists() {
                return Self::load(&user_config);
            }
        }

        // Try local config
        let local_config = PathBuf::from("rag.toml");
        if local_config.exists() {
            return Self::load(&local_config);
        }

        Ok(Self::default())
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.chunking.chunk_size == 0 {
            return Err(RagError::config("chunking.chunk_size must be positive"));
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            return Err(RagError::config(
                "chunking.chunk_overlap must be smaller than chunking.chunk_size",
            ));
        }
        if self.search.fetch_multiplier == 0 {
            return Err(RagError::config("search.fetch_multiplier must be positive"));
        }
        if self.search.default_k == 0 || self.search.default_k > self.search.max_k {
            return Err(RagError::config(
                "search.default_k must be between 1 and search.max_k",
            ));
        }
        if self.embedding.batch_size == 0 {
            return Err(RagError::config("embedding.batch_size must be positive"));
        }
        Ok(())
    }
}
