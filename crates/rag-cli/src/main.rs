//! RAG CLI - Command-line interface for the hybrid retrieval service.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::{debug, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use rag_core::{IndexStatus, RagConfig};
use rag_service::{QueryRequest, RagService, StartupOutcome};

/// RAG - Hybrid dense and keyword retrieval over a single document
#[derive(Parser)]
#[command(name = "rag")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (default: user config dir, then ./rag.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the index from a document, replacing any previous index
    Ingest {
        /// Document to ingest (default: the configured source document)
        path: Option<PathBuf>,
    },

    /// Search the index
    Search {
        /// Question or search query
        query: String,

        /// Number of sources to return
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Print the full response as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show index status
    Status,
}

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::WARN };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();
}

fn load_config(path: Option<PathBuf>) -> Result<RagConfig, Box<dyn std::error::Error>> {
    let config = match path {
        Some(path) => RagConfig::load(&path)?,
        None => RagConfig::load_default()?,
    };
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    let config = load_config(cli.config)?;
    let service = RagService::from_config(config)?;

    match cli.command {
        Commands::Ingest { path } => {
            let path = path.unwrap_or_else(|| service.config().source.document.clone());
            ingest(&service, &path).await?;
        }
        Commands::Search {
            query,
            top_k,
            json,
        } => {
            search(&service, query, top_k, json).await?;
        }
        Commands::Status => {
            status(&service).await?;
        }
    }

    Ok(())
}

async fn ingest(service: &RagService, path: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    println!("Ingesting {}...", path.display());

    let report = service.ingest(path).await?;
    println!(
        "Indexed {} chunks from {} into {}",
        report.chunk_count,
        report.filename,
        service.config().index.dir.display()
    );
    Ok(())
}

async fn search(
    service: &RagService,
    query: String,
    top_k: Option<usize>,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if let StartupOutcome::NotReady = service.startup().await {
        eprintln!("No index available. Run 'rag ingest <path>' first.");
        std::process::exit(1);
    }

    let request = QueryRequest { q: query, k: top_k };
    let response = match service.query(request).await {
        Ok(response) => response,
        Err(e) => {
            eprintln!("Error [{}]: {}", e.error_code(), e);
            std::process::exit(1);
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    if response.sources.is_empty() {
        println!("No results found.");
        return Ok(());
    }

    let ordering = if response.reranked { "reranked" } else { "fused order" };
    println!("Found {} sources ({}):\n", response.sources.len(), ordering);
    for (i, source) in response.sources.iter().enumerate() {
        println!(
            "[Source {}] chunk {} | {} | score {:.4}",
            i + 1,
            source.chunk_id,
            source.method,
            source.score
        );
        println!("  {}\n", source.preview);
    }

    if let Some(answer) = &response.answer {
        println!("Answer:\n{}", answer);
    }

    Ok(())
}

/// Load the persisted index, if any, without ingesting anything.
async fn restored_status(service: &RagService) -> IndexStatus {
    let restored = service.manager().restore().await;
    debug!("Persisted index restored: {}", restored);
    service.status().await
}

async fn status(service: &RagService) -> Result<(), Box<dyn std::error::Error>> {
    let status = restored_status(service).await;

    println!("Index directory: {}", service.config().index.dir.display());
    println!("Ready:           {}", status.ready);
    println!("Chunks:          {}", status.chunk_count);
    println!("Keyword search:  {}", status.sparse_enabled);
    println!("Reranking:       {}", status.rerank_enabled);
    println!(
        "Document:        {}",
        status.filename.as_deref().unwrap_or("-")
    );
    println!(
        "Generation:      {}",
        status.generation.as_deref().unwrap_or("-")
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rag_core::{EmbeddingBackend, RerankBackend};

    fn config(root: &std::path::Path) -> RagConfig {
        let mut config = RagConfig::default();
        config.index.dir = root.join("index");
        config.source.document = root.join("paper.txt");
        config.embedding.backend = EmbeddingBackend::Mock;
        config.embedding.dimension = 256;
        config.rerank.backend = RerankBackend::Lexical;
        config
    }

    #[tokio::test]
    async fn test_status_without_index() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("paper.txt"), "Attention is all you need.").unwrap();
        let service = RagService::from_config(config(dir.path())).unwrap();

        let status = restored_status(&service).await;

        assert!(!status.ready);
        assert!(!dir.path().join("index").exists());
    }

    #[tokio::test]
    async fn test_status_restores_persisted_index() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("paper.txt");
        std::fs::write(&path, "Attention is all you need.").unwrap();
        RagService::from_config(config(dir.path()))
            .unwrap()
            .ingest(&path)
            .await
            .unwrap();

        let service = RagService::from_config(config(dir.path())).unwrap();
        let status = restored_status(&service).await;

        assert!(status.ready);
        assert_eq!(status.chunk_count, 1);
        assert_eq!(status.filename.as_deref(), Some("paper.txt"));
    }
}
