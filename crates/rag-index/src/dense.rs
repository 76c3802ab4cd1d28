//! Dense (embedding) index.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use tracing::{debug, info, warn};

use rag_core::{Chunk, ChunkId, Embedder, RagError, Result};

use crate::schema::{DENSE_SCHEMA, FORMAT_VERSION};

/// File name of the dense index inside the index directory.
pub const DENSE_FILE: &str = "dense.sqlite";

/// Brute-force cosine index over chunk embeddings.
///
/// Holds the embedder it was built with so that queries are embedded into
/// the same vector space.
pub struct DenseIndex {
    chunks: Vec<Chunk>,
    vectors: Vec<Vec<f32>>,
    norms: Vec<f32>,
    dimension: usize,
    embedder: Arc<dyn Embedder>,
}

impl std::fmt::Debug for DenseIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DenseIndex")
            .field("chunks", &self.chunks.len())
            .field("dimension", &self.dimension)
            .finish()
    }
}

impl DenseIndex {
    /// Embed every chunk and build the index.
    ///
    /// Fails without side effects on an empty chunk set, a chunk without an
    /// id, colliding ids, or any embedding failure.
    pub async fn build(
        chunks: Vec<Chunk>,
        embedder: Arc<dyn Embedder>,
        batch_size: usize,
    ) -> Result<Self> {
        if chunks.is_empty() {
            return Err(RagError::invalid_argument("cannot build an index from no chunks"));
        }
        validate_ids(&chunks)?;

        let mut vectors = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(batch_size.max(1)) {
            let texts: Vec<&str> = batch.iter().map(|c| c.content.as_str()).collect();
            let embedded = embedder.embed_documents(&texts).await?;
            if embedded.len() != texts.len() {
                return Err(RagError::embedding(format!(
                    "requested {} embeddings, received {}",
                    texts.len(),
                    embedded.len()
                )));
            }
            vectors.extend(embedded);
            debug!("Embedded {}/{} chunks", vectors.len(), chunks.len());
        }

        let dimension = vectors.first().map(Vec::len).unwrap_or(0);
        if dimension == 0 || vectors.iter().any(|v| v.len() != dimension) {
            return Err(RagError::embedding(
                "embeddings have inconsistent or zero dimension",
            ));
        }

        info!("Dense index built: {} chunks, dim={}", chunks.len(), dimension);
        Ok(Self::from_parts(chunks, vectors, dimension, embedder))
    }

    fn from_parts(
        chunks: Vec<Chunk>,
        vectors: Vec<Vec<f32>>,
        dimension: usize,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        let norms = vectors.iter().map(|v| norm(v)).collect();
        Self {
            chunks,
            vectors,
            norms,
            dimension,
            embedder,
        }
    }

    /// Up to `k` nearest chunks with their cosine similarity, descending.
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<(Chunk, f32)>> {
        if k == 0 {
            return Err(RagError::invalid_argument("k must be positive"));
        }

        let query_vec = self.embedder.embed_query(query).await?;
        if query_vec.len() != self.dimension {
            return Err(RagError::embedding(format!(
                "query embedding has dimension {}, index has {}",
                query_vec.len(),
                self.dimension
            )));
        }
        let query_norm = norm(&query_vec);

        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .zip(&self.norms)
            .enumerate()
            .map(|(i, (v, n))| (i, cosine(&query_vec, query_norm, v, *n)))
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then_with(|| self.chunks[a.0].chunk_id.cmp(&self.chunks[b.0].chunk_id))
        });
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(i, score)| (self.chunks[i].clone(), score))
            .collect())
    }

    /// Indexed chunks in build order.
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Write the index into `dir`, replacing any previous dense file there.
    pub fn save(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(DENSE_FILE);
        if path.exists() {
            std::fs::remove_file(&path)?;
        }

        let mut conn = Connection::open(&path)
            .map_err(|e| RagError::index(format!("Failed to open {:?}: {}", path, e)))?;
        conn.execute_batch(DENSE_SCHEMA)
            .map_err(|e| RagError::index(format!("Failed to initialize schema: {}", e)))?;

        let tx = conn
            .transaction()
            .map_err(|e| RagError::index(e.to_string()))?;
        {
            let mut info_stmt = tx
                .prepare("INSERT INTO index_info (key, value) VALUES (?1, ?2)")
                .map_err(|e| RagError::index(e.to_string()))?;
            info_stmt
                .execute(params!["format_version", FORMAT_VERSION])
                .map_err(|e| RagError::index(e.to_string()))?;
            info_stmt
                .execute(params!["dimension", self.dimension.to_string()])
                .map_err(|e| RagError::index(e.to_string()))?;

            let mut chunk_stmt = tx
                .prepare("INSERT INTO chunks (id, content, metadata) VALUES (?1, ?2, ?3)")
                .map_err(|e| RagError::index(e.to_string()))?;
            let mut vec_stmt = tx
                .prepare("INSERT INTO embeddings (chunk_id, vector) VALUES (?1, ?2)")
                .map_err(|e| RagError::index(e.to_string()))?;

            for (chunk, vector) in self.chunks.iter().zip(&self.vectors) {
                let id = chunk
                    .chunk_id
                    .ok_or_else(|| RagError::internal("indexed chunk without id"))?;
                let metadata = serde_json::to_string(&chunk.metadata)?;
                chunk_stmt
                    .execute(params![id, chunk.content, metadata])
                    .map_err(|e| RagError::index(format!("Failed to write chunk: {}", e)))?;
                vec_stmt
                    .execute(params![id, vec_to_bytes(vector)])
                    .map_err(|e| RagError::index(format!("Failed to write embedding: {}", e)))?;
            }
        }
        tx.commit()
            .map_err(|e| RagError::index(format!("Failed to commit index: {}", e)))?;

        info!("Dense index saved to {:?}", path);
        Ok(())
    }

    /// Restore an index saved with [`DenseIndex::save`].
    ///
    /// Returns `None` when the directory holds no index, the file is
    /// unreadable or corrupt, or the stored dimension differs from the
    /// embedder's.
    pub fn load(dir: &Path, embedder: Arc<dyn Embedder>) -> Option<Self> {
        let path = dir.join(DENSE_FILE);
        if !path.exists() {
            debug!("No dense index at {:?}", path);
            return None;
        }

        match Self::read(&path, embedder) {
            Ok(index) => {
                info!("Dense index loaded: {} chunks", index.len());
                Some(index)
            }
            Err(e) => {
                warn!("Ignoring unreadable dense index {:?}: {}", path, e);
                None
            }
        }
    }

    fn read(path: &Path, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .map_err(|e| RagError::index(format!("Failed to open database: {}", e)))?;

        let info = |key: &str| -> Result<Option<String>> {
            conn.query_row(
                "SELECT value FROM index_info WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| RagError::index(e.to_string()))
        };

        let version = info("format_version")?;
        if version.as_deref() != Some(FORMAT_VERSION) {
            return Err(RagError::index(format!(
                "unsupported format version {:?}",
                version
            )));
        }

        let dimension: usize = info("dimension")?
            .and_then(|d| d.parse().ok())
            .ok_or_else(|| RagError::index("missing dimension"))?;
        if dimension != embedder.dimension() {
            return Err(RagError::index(format!(
                "index dimension {} does not match embedder dimension {}",
                dimension,
                embedder.dimension()
            )));
        }

        let mut stmt = conn
            .prepare(
                r#"
                SELECT c.id, c.content, c.metadata, e.vector
                FROM chunks c
                JOIN embeddings e ON e.chunk_id = c.id
                ORDER BY c.id
                "#,
            )
            .map_err(|e| RagError::index(e.to_string()))?;

        let rows = stmt
            .query_map([], |row| {
                let id: u32 = row.get(0)?;
                let content: String = row.get(1)?;
                let metadata: String = row.get(2)?;
                let vector: Vec<u8> = row.get(3)?;
                Ok((id, content, metadata, vector))
            })
            .map_err(|e| RagError::index(e.to_string()))?;

        let mut chunks = Vec::new();
        let mut vectors = Vec::new();
        for row in rows {
            let (id, content, metadata, blob) = row.map_err(|e| RagError::index(e.to_string()))?;
            if blob.len() != dimension * 4 {
                return Err(RagError::index(format!(
                    "embedding for chunk {} has {} bytes, expected {}",
                    id,
                    blob.len(),
                    dimension * 4
                )));
            }
            let metadata: HashMap<String, serde_json::Value> = serde_json::from_str(&metadata)?;
            chunks.push(Chunk {
                chunk_id: Some(id),
                content,
                metadata,
            });
            vectors.push(bytes_to_vec(&blob));
        }

        if chunks.is_empty() {
            return Err(RagError::index("index holds no chunks"));
        }

        Ok(Self::from_parts(chunks, vectors, dimension, embedder))
    }
}

/// Every chunk must carry a unique id before it can be indexed.
fn validate_ids(chunks: &[Chunk]) -> Result<()> {
    let mut seen: HashSet<ChunkId> = HashSet::with_capacity(chunks.len());
    for (position, chunk) in chunks.iter().enumerate() {
        let id = chunk.chunk_id.ok_or_else(|| {
            RagError::invalid_argument(format!("chunk at position {} has no chunk_id", position))
        })?;
        if !seen.insert(id) {
            return Err(RagError::invalid_argument(format!(
                "duplicate chunk_id {}",
                id
            )));
        }
    }
    Ok(())
}

fn norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

fn cosine(a: &[f32], a_norm: f32, b: &[f32], b_norm: f32) -> f32 {
    if a_norm == 0.0 || b_norm == 0.0 {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    dot / (a_norm * b_norm)
}

fn vec_to_bytes(v: &[f32]) -> Vec<u8> {
    v.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn bytes_to_vec(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}
