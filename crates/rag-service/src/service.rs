//! Service state and request handlers.

use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use rag_chunk::{assign_chunk_ids, contextualize, load_document, Chunker, RecursiveChunker};
use rag_core::{
    AnswerGenerator, ChunkConfig, ContextualPrefixer, Embedder, IndexStatus, RagConfig, RagError,
    Reranker, Result,
};
use rag_embed::{embedder_from_config, reranker_from_config};
use rag_query::{IndexManager, QueryConfig};

use crate::params::{IngestReport, QueryRequest, QueryResponse, SourceItem, StartupOutcome};
use crate::prompt::{build_messages, format_context};

/// Question answering service state.
pub struct RagService {
    config: RagConfig,

    /// Index lifecycle and search.
    manager: IndexManager,

    chunker: RecursiveChunker,

    /// Optional contextual enrichment at ingestion.
    prefixer: Option<Arc<dyn ContextualPrefixer>>,

    /// Optional answer generation at query time.
    generator: Option<Arc<dyn AnswerGenerator>>,
}

impl RagService {
    /// Create a service with explicit providers.
    pub fn new(
        config: RagConfig,
        embedder: Arc<dyn Embedder>,
        reranker: Option<Arc<dyn Reranker>>,
    ) -> Self {
        let manager = IndexManager::new(
            &config.index,
            embedder,
            reranker,
            QueryConfig {
                fetch_multiplier: config.search.fetch_multiplier,
            },
            config.embedding.batch_size,
        );

        Self {
            config,
            manager,
            chunker: RecursiveChunker::new(),
            prefixer: None,
            generator: None,
        }
    }

    /// Create a service with providers built from the configuration.
    ///
    /// Fails when the embedder cannot be loaded; an unavailable reranker
    /// only disables reranking.
    pub fn from_config(config: RagConfig) -> Result<Self> {
        config.validate()?;
        let embedder = embedder_from_config(&config.embedding)?;
        let reranker = reranker_from_config(&config.rerank);
        Ok(Self::new(config, embedder, reranker))
    }

    pub fn with_prefixer(mut self, prefixer: Arc<dyn ContextualPrefixer>) -> Self {
        self.prefixer = Some(prefixer);
        self
    }

    pub fn with_generator(mut self, generator: Arc<dyn AnswerGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    pub fn manager(&self) -> &IndexManager {
        &self.manager
    }

    /// Bring the service up: reuse the persisted index when there is one,
    /// otherwise ingest the configured source document.
    pub async fn startup(&self) -> StartupOutcome {
        info!("Initializing service, index dir {:?}", self.config.index.dir);

        let document = self.config.source.document.clone();

        if self.manager.restore().await {
            let expected = document
                .file_name()
                .map(|name| name.to_string_lossy().into_owned());
            let indexed = self.manager.get_indexed_filename();
            if indexed.is_some() && indexed == expected {
                info!("Persisted index loaded, ready");
                return StartupOutcome::Loaded;
            }

            if !document.exists() {
                warn!(
                    "Index was built from {:?} but {:?} is configured and missing; serving the existing index",
                    indexed, document
                );
                return StartupOutcome::Loaded;
            }

            warn!(
                "Index was built from {:?}, re-ingesting configured document {:?}",
                indexed, document
            );
            return match self.ingest(&document).await {
                Ok(report) => StartupOutcome::Ingested(report),
                Err(e) => {
                    warn!("Re-ingestion failed, serving the existing index: {}", e);
                    StartupOutcome::Loaded
                }
            };
        }

        if !document.exists() {
            warn!(
                "No index and source document {:?} not found; not ready",
                document
            );
            return StartupOutcome::NotReady;
        }

        warn!("No index found, ingesting {:?}", document);
        match self.ingest(&document).await {
            Ok(report) => StartupOutcome::Ingested(report),
            Err(e) => {
                warn!("Startup ingestion failed; not ready: {}", e);
                StartupOutcome::NotReady
            }
        }
    }

    /// Load, split, optionally contextualize and index a document.
    pub async fn ingest(&self, path: &Path) -> Result<IngestReport> {
        let text = load_document(path)?;
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| RagError::invalid_argument(format!("not a file: {:?}", path)))?;

        let chunk_config = ChunkConfig {
            chunk_size: self.config.chunking.chunk_size,
            chunk_overlap: self.config.chunking.chunk_overlap,
        };
        let pieces = self.chunker.chunk(&text, &chunk_config)?;
        if pieces.is_empty() {
            return Err(RagError::chunking(format!("{} produced no chunks", filename)));
        }

        let mut chunks = assign_chunk_ids(pieces, &filename);
        if let Some(prefixer) = &self.prefixer {
            info!("Generating context for {} chunks", chunks.len());
            chunks = contextualize(&self.config.source.context, chunks, prefixer.as_ref()).await;
        }

        let chunk_count = chunks.len();
        self.manager.build_index(chunks, &filename).await?;

        Ok(IngestReport {
            filename,
            chunk_count,
        })
    }

    /// Retrieve sources for a question and assemble the generator prompt.
    pub async fn query(&self, request: QueryRequest) -> Result<QueryResponse> {
        let question = request.q.trim();
        if question.is_empty() {
            return Err(RagError::invalid_argument("question must not be empty"));
        }

        let search = &self.config.search;
        let k = request.k.unwrap_or(search.default_k);
        if k == 0 || k > search.max_k {
            return Err(RagError::invalid_argument(format!(
                "k must be between 1 and {}, got {}",
                search.max_k, k
            )));
        }

        let results = self.manager.search(question, k).await?;

        let context = format_context(&results.hits);
        let messages = build_messages(&context, question);

        let answer = match &self.generator {
            Some(generator) => Some(generator.generate(&messages).await?),
            None => None,
        };

        let sources = results
            .hits
            .iter()
            .map(|hit| SourceItem::from_hit(hit, search.preview_chars))
            .collect();

        Ok(QueryResponse {
            answer,
            sources,
            context,
            messages,
            reranked: results.reranked,
        })
    }

    pub async fn status(&self) -> IndexStatus {
        self.manager.status().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rag_core::{ChatMessage, EmbeddingBackend, RerankBackend};
    use std::path::PathBuf;

    const DOCUMENT: &str = "The Transformer follows an encoder-decoder structure.\n\n\
Self-attention relates different positions of a single sequence in order to compute a representation.\n\n\
Positional encodings are added to the input embeddings at the bottoms of the stacks.";

    struct EchoGenerator;

    #[async_trait]
    impl AnswerGenerator for EchoGenerator {
        async fn generate(&self, messages: &[ChatMessage]) -> Result<String> {
            Ok(format!("{} messages [Source 1]", messages.len()))
        }
    }

    struct FailingGenerator;

    #[async_trait]
    impl AnswerGenerator for FailingGenerator {
        async fn generate(&self, _messages: &[ChatMessage]) -> Result<String> {
            Err(RagError::generation("quota exceeded"))
        }
    }

    struct TopicPrefixer;

    #[async_trait]
    impl ContextualPrefixer for TopicPrefixer {
        async fn context_for(&self, document_context: &str, _chunk: &str) -> Result<String> {
            Ok(format!("Context: {}", document_context))
        }
    }

    fn config(root: &Path) -> RagConfig {
        let mut config = RagConfig::default();
        config.index.dir = root.join("index");
        config.source.document = root.join("paper.txt");
        config.embedding.backend = EmbeddingBackend::Mock;
        config.embedding.dimension = 1024;
        config.rerank.backend = RerankBackend::Lexical;
        config.chunking.chunk_size = 120;
        config.chunking.chunk_overlap = 20;
        config
    }

    fn write_document(root: &Path) -> PathBuf {
        let path = root.join("paper.txt");
        std::fs::write(&path, DOCUMENT).unwrap();
        path
    }

    #[tokio::test]
    async fn test_startup_without_document_is_not_ready() {
        let dir = tempfile::tempdir().unwrap();
        let service = RagService::from_config(config(dir.path())).unwrap();

        assert_eq!(service.startup().await, StartupOutcome::NotReady);

        let err = service
            .query(QueryRequest::new("What is self-attention?"))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 503);
    }

    #[tokio::test]
    async fn test_startup_ingests_then_loads() {
        let dir = tempfile::tempdir().unwrap();
        write_document(dir.path());

        let first = RagService::from_config(config(dir.path())).unwrap();
        let report = match first.startup().await {
            StartupOutcome::Ingested(report) => report,
            other => panic!("expected ingestion, got {:?}", other),
        };
        assert_eq!(report.filename, "paper.txt");
        assert_eq!(report.chunk_count, 3);

        let second = RagService::from_config(config(dir.path())).unwrap();
        assert_eq!(second.startup().await, StartupOutcome::Loaded);

        let status = second.status().await;
        assert!(status.ready);
        assert!(status.sparse_enabled);
        assert!(status.rerank_enabled);
        assert_eq!(status.filename.as_deref(), Some("paper.txt"));
    }

    #[tokio::test]
    async fn test_startup_reingests_when_document_changes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), DOCUMENT).unwrap();
        std::fs::write(
            dir.path().join("b.txt"),
            "Scaled dot-product attention divides by the square root of the key dimension.",
        )
        .unwrap();

        let mut first_config = config(dir.path());
        first_config.source.document = dir.path().join("a.txt");
        let first = RagService::from_config(first_config).unwrap();
        assert!(matches!(first.startup().await, StartupOutcome::Ingested(_)));

        let mut second_config = config(dir.path());
        second_config.source.document = dir.path().join("b.txt");
        let second = RagService::from_config(second_config).unwrap();
        let report = match second.startup().await {
            StartupOutcome::Ingested(report) => report,
            other => panic!("expected re-ingestion, got {:?}", other),
        };

        assert_eq!(report.filename, "b.txt");
        assert_eq!(report.chunk_count, 1);
        assert_eq!(second.manager().get_indexed_filename().as_deref(), Some("b.txt"));
        assert_eq!(second.status().await.filename.as_deref(), Some("b.txt"));
    }

    #[tokio::test]
    async fn test_startup_keeps_index_when_configured_document_is_missing() {
        let dir = tempfile::tempdir().unwrap();
        write_document(dir.path());
        let first = RagService::from_config(config(dir.path())).unwrap();
        assert!(matches!(first.startup().await, StartupOutcome::Ingested(_)));

        let mut moved = config(dir.path());
        moved.source.document = dir.path().join("renamed.txt");
        let second = RagService::from_config(moved).unwrap();

        assert_eq!(second.startup().await, StartupOutcome::Loaded);
        assert_eq!(second.status().await.filename.as_deref(), Some("paper.txt"));
    }

    #[tokio::test]
    async fn test_query_returns_sources_and_prompt() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_document(dir.path());
        let service = RagService::from_config(config(dir.path()))
            .unwrap()
            .with_generator(Arc::new(EchoGenerator));
        service.ingest(&path).await.unwrap();

        let response = service
            .query(QueryRequest::new("What is self-attention?").with_k(2))
            .await
            .unwrap();

        assert_eq!(response.sources.len(), 2);
        assert_eq!(response.sources[0].chunk_id, 1);
        assert_eq!(response.sources[0].method, "hybrid");
        assert!(response.sources[0].preview.ends_with("..."));
        assert!(response.context.starts_with("[Source 1] Self-attention"));
        assert_eq!(response.messages.len(), 2);
        assert!(response.messages[1].content.ends_with("QUESTION:\nWhat is self-attention?"));
        assert_eq!(response.answer.as_deref(), Some("2 messages [Source 1]"));
        assert!(response.reranked);
    }

    #[tokio::test]
    async fn test_query_uses_default_k() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_document(dir.path());
        let service = RagService::from_config(config(dir.path())).unwrap();
        service.ingest(&path).await.unwrap();

        let response = service.query(QueryRequest::new("encoder")).await.unwrap();

        // default_k is 6 but only 3 chunks exist
        assert_eq!(response.sources.len(), 3);
        assert!(response.answer.is_none());
    }

    #[tokio::test]
    async fn test_query_rejects_bad_k() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_document(dir.path());
        let service = RagService::from_config(config(dir.path())).unwrap();
        service.ingest(&path).await.unwrap();

        let zero = service
            .query(QueryRequest::new("encoder").with_k(0))
            .await
            .unwrap_err();
        assert_eq!(zero.status_code(), 400);

        let huge = service
            .query(QueryRequest::new("encoder").with_k(51))
            .await
            .unwrap_err();
        assert_eq!(huge.status_code(), 400);
    }

    #[tokio::test]
    async fn test_generator_failure_is_server_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_document(dir.path());
        let service = RagService::from_config(config(dir.path()))
            .unwrap()
            .with_generator(Arc::new(FailingGenerator));
        service.ingest(&path).await.unwrap();

        let err = service.query(QueryRequest::new("encoder")).await.unwrap_err();
        assert_eq!(err.status_code(), 500);
    }

    #[tokio::test]
    async fn test_ingest_with_prefixer() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_document(dir.path());
        let service = RagService::from_config(config(dir.path()))
            .unwrap()
            .with_prefixer(Arc::new(TopicPrefixer));
        service.ingest(&path).await.unwrap();

        let response = service
            .query(QueryRequest::new("Transformer architecture").with_k(3))
            .await
            .unwrap();

        assert!(response
            .context
            .contains("Context: This document presents the Transformer architecture.\n\n"));
    }

    #[tokio::test]
    async fn test_ingest_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let service = RagService::from_config(config(dir.path())).unwrap();

        let err = service
            .ingest(&dir.path().join("absent.txt"))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "LOAD_FAILED");
        assert!(!service.status().await.ready);
    }
}
