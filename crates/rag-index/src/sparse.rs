//! Sparse (keyword) index.

use std::sync::Mutex;

use rusqlite::{params, Connection};
use tracing::debug;

use rag_core::text::terms;
use rag_core::{Chunk, RagError, Result};

use crate::schema::SPARSE_SCHEMA;

/// BM25 keyword index over an in-memory FTS5 table.
///
/// Never persisted: it is rebuilt from the chunk set whenever that set
/// changes.
pub struct SparseIndex {
    conn: Mutex<Connection>,
    chunks: Vec<Chunk>,
}

impl std::fmt::Debug for SparseIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SparseIndex")
            .field("chunks", &self.chunks.len())
            .finish()
    }
}

impl SparseIndex {
    /// Tokenize and index the chunk contents.
    pub fn build(chunks: &[Chunk]) -> Result<Self> {
        let mut conn = Connection::open_in_memory()
            .map_err(|e| RagError::index(format!("Failed to open in-memory database: {}", e)))?;
        conn.execute_batch(SPARSE_SCHEMA)
            .map_err(|e| RagError::index(format!("Failed to create keyword table: {}", e)))?;

        let tx = conn
            .transaction()
            .map_err(|e| RagError::index(e.to_string()))?;
        {
            let mut stmt = tx
                .prepare("INSERT INTO chunks_fts (rowid, content) VALUES (?1, ?2)")
                .map_err(|e| RagError::index(e.to_string()))?;
            // rowid is the 1-based position in `chunks`
            for (position, chunk) in chunks.iter().enumerate() {
                stmt.execute(params![position as i64 + 1, chunk.content])
                    .map_err(|e| RagError::index(format!("Failed to index chunk: {}", e)))?;
            }
        }
        tx.commit().map_err(|e| RagError::index(e.to_string()))?;

        debug!("Sparse index built: {} chunks", chunks.len());
        Ok(Self {
            conn: Mutex::new(conn),
            chunks: chunks.to_vec(),
        })
    }

    /// Up to `k` chunks matching any query term, best BM25 first.
    ///
    /// A query without indexable terms matches nothing.
    pub fn search(&self, query: &str, k: usize) -> Result<Vec<Chunk>> {
        if k == 0 {
            return Err(RagError::invalid_argument("k must be positive"));
        }

        let Some(match_expr) = match_expression(query) else {
            return Ok(Vec::new());
        };

        let conn = self
            .conn
            .lock()
            .map_err(|e| RagError::index(format!("Failed to lock keyword index: {}", e)))?;

        // bm25() is lower-is-better
        let mut stmt = conn
            .prepare(
                r#"
                SELECT rowid, bm25(chunks_fts) AS score
                FROM chunks_fts
                WHERE chunks_fts MATCH ?1
                ORDER BY score, rowid
                LIMIT ?2
                "#,
            )
            .map_err(|e| RagError::index(e.to_string()))?;

        let rows = stmt
            .query_map(params![match_expr, k as i64], |row| row.get::<_, i64>(0))
            .map_err(|e| RagError::index(format!("Keyword search failed: {}", e)))?;

        let mut results = Vec::new();
        for rowid in rows {
            let rowid = rowid.map_err(|e| RagError::index(e.to_string()))?;
            let chunk = usize::try_from(rowid - 1)
                .ok()
                .and_then(|position| self.chunks.get(position))
                .ok_or_else(|| RagError::internal(format!("unknown keyword rowid {}", rowid)))?;
            results.push(chunk.clone());
        }

        debug!("Keyword search '{}' matched {} chunks", query, results.len());
        Ok(results)
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

/// Quote each term and OR them together so any single term may match.
fn match_expression(query: &str) -> Option<String> {
    let quoted: Vec<String> = terms(query)
        .into_iter()
        .map(|term| format!("\"{}\"", term.replace('"', "\"\"")))
        .collect();

    if quoted.is_empty() {
        None
    } else {
        Some(quoted.join(" OR "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus() -> Vec<Chunk> {
        vec![
            Chunk::new(0, "The encoder is composed of a stack of identical layers."),
            Chunk::new(1, "The decoder also uses a stack of layers."),
            Chunk::new(2, "Self-attention relates different positions of a single sequence."),
        ]
    }

    #[test]
    fn test_match_expression() {
        assert_eq!(
            match_expression("What is self-attention?").unwrap(),
            "\"what\" OR \"is\" OR \"self\" OR \"attention\""
        );
        assert!(match_expression("?!").is_none());
    }

    #[test]
    fn test_keyword_search_finds_term() {
        let index = SparseIndex::build(&corpus()).unwrap();
        let results = index.search("What is self-attention?", 4).unwrap();

        // "is" also matches chunk 0, but the rarer terms rank chunk 2 first
        assert_eq!(results[0].chunk_id, Some(2));
        assert!(results.iter().all(|c| c.chunk_id != Some(1)));
    }

    #[test]
    fn test_keyword_search_ranks_and_limits() {
        let index = SparseIndex::build(&corpus()).unwrap();

        let results = index.search("encoder stack", 4).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].chunk_id, Some(0));

        let limited = index.search("stack layers", 1).unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[test]
    fn test_query_without_terms() {
        let index = SparseIndex::build(&corpus()).unwrap();
        assert!(index.search("???", 4).unwrap().is_empty());
    }

    #[test]
    fn test_special_characters_are_inert() {
        let index = SparseIndex::build(&corpus()).unwrap();
        let results = index.search("decoder AND (NOT \"stack*", 4).unwrap();
        assert!(results.iter().any(|c| c.chunk_id == Some(1)));
    }

    #[test]
    fn test_zero_k_is_rejected() {
        let index = SparseIndex::build(&corpus()).unwrap();
        assert!(index.search("encoder", 0).is_err());
    }
}
