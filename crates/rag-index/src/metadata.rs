//! Persisted index metadata.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use ulid::Ulid;

use rag_core::{Chunk, Result};

/// Contents of `metadata.json`.
///
/// Only `filename` is required on read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexMetadata {
    /// Document the index was built from.
    pub filename: String,

    /// Identifier minted for each build.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_count: Option<usize>,

    /// Hex blake3 digest of the indexed chunk set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
}

impl IndexMetadata {
    /// Metadata for a fresh build of `chunks`.
    pub fn new(filename: impl Into<String>, chunks: &[Chunk]) -> Self {
        Self {
            filename: filename.into(),
            generation: Some(Ulid::new().to_string()),
            chunk_count: Some(chunks.len()),
            fingerprint: Some(fingerprint(chunks)),
        }
    }

    /// Whether `chunks` is the chunk set this index was built from.
    ///
    /// Metadata without a fingerprint cannot be checked and is accepted.
    pub fn matches(&self, chunks: &[Chunk]) -> bool {
        match &self.fingerprint {
            Some(expected) => *expected == fingerprint(chunks),
            None => true,
        }
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Read metadata, treating a missing or malformed file as absent.
    pub fn read(path: &Path) -> Option<Self> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) => {
                debug!("No index metadata at {:?}: {}", path, e);
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(metadata) => Some(metadata),
            Err(e) => {
                warn!("Ignoring malformed index metadata {:?}: {}", path, e);
                None
            }
        }
    }
}

/// Hex blake3 digest over the ids and contents of a chunk set, in order.
pub fn fingerprint(chunks: &[Chunk]) -> String {
    let mut hasher = blake3::Hasher::new();
    for chunk in chunks {
        match chunk.chunk_id {
            Some(id) => {
                hasher.update(&[1]);
                hasher.update(&id.to_le_bytes());
            }
            None => {
                hasher.update(&[0]);
            }
        }
        hasher.update(&(chunk.content.len() as u64).to_le_bytes());
        hasher.update(chunk.content.as_bytes());
    }
    hex::encode(hasher.finalize().as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metadata.json");
        let chunks = vec![Chunk::new(0, "a"), Chunk::new(1, "b")];

        let metadata = IndexMetadata::new("doc.pdf", &chunks);
        metadata.write(&path).unwrap();

        let read = IndexMetadata::read(&path).unwrap();
        assert_eq!(read, metadata);
        assert_eq!(read.chunk_count, Some(2));
        assert!(read.matches(&chunks));
    }

    #[test]
    fn test_bare_filename_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metadata.json");
        std::fs::write(&path, r#"{"filename": "paper.pdf"}"#).unwrap();

        let read = IndexMetadata::read(&path).unwrap();
        assert_eq!(read.filename, "paper.pdf");
        assert!(read.generation.is_none());
        assert!(read.matches(&[Chunk::new(0, "anything")]));
    }

    #[test]
    fn test_malformed_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metadata.json");
        std::fs::write(&path, "{not json").unwrap();

        assert!(IndexMetadata::read(&path).is_none());
        assert!(IndexMetadata::read(&dir.path().join("missing.json")).is_none());
    }

    #[test]
    fn test_fingerprint_tracks_content_and_ids() {
        let base = vec![Chunk::new(0, "a"), Chunk::new(1, "b")];
        let edited = vec![Chunk::new(0, "a"), Chunk::new(1, "c")];
        let renumbered = vec![Chunk::new(0, "a"), Chunk::new(2, "b")];

        assert_eq!(fingerprint(&base), fingerprint(&base.clone()));
        assert_ne!(fingerprint(&base), fingerprint(&edited));
        assert_ne!(fingerprint(&base), fingerprint(&renumbered));
        assert_eq!(fingerprint(&base).len(), 64);
    }
}
