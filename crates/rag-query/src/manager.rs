//! Index lifecycle: build, publish, load and serve.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use ulid::Ulid;

use rag_core::{
    Chunk, Embedder, IndexConfig, IndexStatus, RagError, Reranker, Result, SearchResults,
};
use rag_index::{fingerprint, DenseIndex, IndexMetadata, SparseIndex};

use crate::engine::{Indexes, QueryConfig, QueryEngine};

/// Owns the loaded index generation and its on-disk directory.
///
/// Queries share the current generation through an `Arc` taken under the
/// read lock; builds and loads are serialised by a separate mutex and only
/// take the write lock to swap in the finished generation.
pub struct IndexManager {
    index_dir: PathBuf,
    metadata_file: String,
    embedder: Arc<dyn Embedder>,
    batch_size: usize,
    engine: QueryEngine,
    current: RwLock<Option<Arc<Indexes>>>,
    build_lock: Mutex<()>,
}

impl IndexManager {
    pub fn new(
        index: &IndexConfig,
        embedder: Arc<dyn Embedder>,
        reranker: Option<Arc<dyn Reranker>>,
        query: QueryConfig,
        batch_size: usize,
    ) -> Self {
        Self {
            index_dir: index.dir.clone(),
            metadata_file: index.metadata_file.clone(),
            embedder,
            batch_size: batch_size.max(1),
            engine: QueryEngine::new(reranker, query),
            current: RwLock::new(None),
            build_lock: Mutex::new(()),
        }
    }

    pub fn index_dir(&self) -> &Path {
        &self.index_dir
    }

    fn metadata_path(&self, dir: &Path) -> PathBuf {
        dir.join(&self.metadata_file)
    }

    /// Build dense and sparse indexes from `chunks`, publish them to the
    /// index directory and make them current.
    ///
    /// On failure neither the directory nor the loaded generation changes.
    pub async fn build_index(&self, chunks: Vec<Chunk>, filename: &str) -> Result<()> {
        let _guard = self.build_lock.lock().await;
        info!("Building index for {} ({} chunks)", filename, chunks.len());

        let sparse = match SparseIndex::build(&chunks) {
            Ok(sparse) => Some(sparse),
            Err(e) => {
                warn!("Keyword index unavailable for this build: {}", e);
                None
            }
        };
        let metadata = IndexMetadata::new(filename, &chunks);
        let dense = DenseIndex::build(chunks, self.embedder.clone(), self.batch_size).await?;

        self.publish(&dense, &metadata)?;

        let indexes = Indexes {
            dense,
            sparse,
            metadata: Some(metadata),
        };
        *self.current.write().await = Some(Arc::new(indexes));

        info!("Index for {} is live", filename);
        Ok(())
    }

    /// Write a generation to a staging directory, then swap it into place.
    fn publish(&self, dense: &DenseIndex, metadata: &IndexMetadata) -> Result<()> {
        let staging = self.sibling("staging")?;

        if let Some(parent) = staging.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let written = dense
            .save(&staging)
            .and_then(|_| metadata.write(&self.metadata_path(&staging)));
        if let Err(e) = written {
            let _ = std::fs::remove_dir_all(&staging);
            return Err(e);
        }

        let backup = self.sibling("old")?;
        if let Err(e) = swap_into_place(&staging, &self.index_dir, &backup) {
            let _ = std::fs::remove_dir_all(&staging);
            return Err(e.into());
        }

        debug!("Published index generation to {:?}", self.index_dir);
        Ok(())
    }

    /// A unique path next to the index directory, e.g. `index.old-<ulid>`.
    fn sibling(&self, tag: &str) -> Result<PathBuf> {
        let name = self
            .index_dir
            .file_name()
            .ok_or_else(|| RagError::config(format!("invalid index dir {:?}", self.index_dir)))?
            .to_string_lossy()
            .into_owned();
        Ok(self
            .index_dir
            .with_file_name(format!("{}.{}-{}", name, tag, Ulid::new())))
    }

    /// Put back a previous generation left behind by an interrupted swap.
    fn recover_backup(&self) {
        if self.index_dir.exists() {
            return;
        }
        let Some(name) = self.index_dir.file_name() else {
            return;
        };
        let parent = match self.index_dir.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let prefix = format!("{}.old-", name.to_string_lossy());

        let Ok(entries) = std::fs::read_dir(parent) else {
            return;
        };
        let mut backups: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(&prefix))
            .map(|e| e.path())
            .collect();
        // ULID suffixes sort by creation time
        backups.sort();

        if let Some(latest) = backups.pop() {
            match std::fs::rename(&latest, &self.index_dir) {
                Ok(()) => warn!("Recovered previous index generation from {:?}", latest),
                Err(e) => warn!("Failed to recover index from {:?}: {}", latest, e),
            }
        }
    }

    /// Load the dense index from disk and, when `chunks` are supplied and
    /// match the persisted chunk set, rebuild the sparse index from them.
    ///
    /// Returns `false` when no usable index is on disk; never errors.
    pub async fn load_index(&self, chunks: Option<Vec<Chunk>>) -> bool {
        self.load(ChunkSource::from(chunks)).await
    }

    /// Load the dense index and rebuild the sparse index from the chunk
    /// payloads stored with it.
    pub async fn restore(&self) -> bool {
        self.load(ChunkSource::Stored).await
    }

    async fn load(&self, source: ChunkSource) -> bool {
        let _guard = self.build_lock.lock().await;
        self.recover_backup();

        let Some(dense) = DenseIndex::load(&self.index_dir, self.embedder.clone()) else {
            info!("No usable index in {:?}", self.index_dir);
            return false;
        };

        let metadata = IndexMetadata::read(&self.metadata_path(&self.index_dir));
        if metadata.is_none() {
            warn!("Index metadata missing in {:?}", self.index_dir);
        }

        let chunks = match source {
            ChunkSource::None => None,
            ChunkSource::Stored => Some(dense.chunks().to_vec()),
            ChunkSource::Supplied(chunks) => {
                if chunks_match(&dense, metadata.as_ref(), &chunks) {
                    Some(chunks)
                } else {
                    warn!("Supplied chunks do not match the persisted index; keyword search disabled");
                    None
                }
            }
        };

        let sparse = chunks.and_then(|chunks| match SparseIndex::build(&chunks) {
            Ok(sparse) => Some(sparse),
            Err(e) => {
                warn!("Keyword index unavailable: {}", e);
                None
            }
        });

        if sparse.is_none() {
            info!("Serving dense-only results");
        }

        let indexes = Indexes {
            dense,
            sparse,
            metadata,
        };
        *self.current.write().await = Some(Arc::new(indexes));
        true
    }

    /// Document recorded in the on-disk metadata.
    pub fn get_indexed_filename(&self) -> Option<String> {
        IndexMetadata::read(&self.metadata_path(&self.index_dir)).map(|m| m.filename)
    }

    /// Hybrid search against the current generation.
    pub async fn search(&self, query: &str, k: usize) -> Result<SearchResults> {
        let indexes = self.current.read().await.clone().ok_or_else(|| {
            RagError::not_ready("no index loaded; ingest a document first")
        })?;
        self.engine.search(&indexes, query, k).await
    }

    pub async fn is_ready(&self) -> bool {
        self.current.read().await.is_some()
    }

    pub async fn status(&self) -> IndexStatus {
        let current = self.current.read().await.clone();
        let rerank_enabled = self.engine.has_reranker();
        match current {
            Some(indexes) => IndexStatus {
                ready: true,
                sparse_enabled: indexes.sparse.is_some(),
                rerank_enabled,
                chunk_count: indexes.dense.len(),
                filename: indexes.metadata.as_ref().map(|m| m.filename.clone()),
                generation: indexes.metadata.as_ref().and_then(|m| m.generation.clone()),
            },
            None => IndexStatus {
                rerank_enabled,
                ..Default::default()
            },
        }
    }
}

/// Replace `target` with `staging`, keeping the previous generation at
/// `backup` until the new one is in place.
///
/// If the second rename fails the previous generation is moved back, so
/// `target` is never left missing by an error.
fn swap_into_place(staging: &Path, target: &Path, backup: &Path) -> std::io::Result<()> {
    let previous = if target.exists() {
        std::fs::rename(target, backup)?;
        Some(backup)
    } else {
        None
    };

    if let Err(e) = std::fs::rename(staging, target) {
        if let Some(previous) = previous {
            if let Err(restore) = std::fs::rename(previous, target) {
                warn!(
                    "Failed to restore previous index from {:?}: {}",
                    previous, restore
                );
            }
        }
        return Err(e);
    }

    if let Some(previous) = previous {
        if let Err(e) = std::fs::remove_dir_all(previous) {
            warn!("Failed to remove previous index {:?}: {}", previous, e);
        }
    }
    Ok(())
}

/// Where the sparse index's chunk set comes from on load.
enum ChunkSource {
    None,
    Stored,
    Supplied(Vec<Chunk>),
}

impl From<Option<Vec<Chunk>>> for ChunkSource {
    fn from(chunks: Option<Vec<Chunk>>) -> Self {
        match chunks {
            Some(chunks) => Self::Supplied(chunks),
            None => Self::None,
        }
    }
}

/// Supplied chunks must be the set the dense index was built from.
fn chunks_match(dense: &DenseIndex, metadata: Option<&IndexMetadata>, chunks: &[Chunk]) -> bool {
    match metadata {
        Some(m) if m.fingerprint.is_some() => m.matches(chunks),
        _ => fingerprint(dense.chunks()) == fingerprint(chunks),
    }
}
