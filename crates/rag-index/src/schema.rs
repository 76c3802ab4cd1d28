//! Database schema definitions.

/// Version of the dense index on-disk layout.
pub const FORMAT_VERSION: &str = "1";

/// Schema of the persisted dense index.
pub const DENSE_SCHEMA: &str = r#"
-- Index-wide settings (format_version, dimension)
CREATE TABLE IF NOT EXISTS index_info (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

-- Chunk payloads
CREATE TABLE IF NOT EXISTS chunks (
    id INTEGER PRIMARY KEY,
    content TEXT NOT NULL,
    metadata TEXT NOT NULL DEFAULT '{}'
);

-- One little-endian f32 vector per chunk
CREATE TABLE IF NOT EXISTS embeddings (
    chunk_id INTEGER PRIMARY KEY REFERENCES chunks(id) ON DELETE CASCADE,
    vector BLOB NOT NULL
);
"#;

/// Schema of the in-memory keyword index.
pub const SPARSE_SCHEMA: &str = r#"
CREATE VIRTUAL TABLE chunks_fts USING fts5(
    content,
    tokenize = 'unicode61'
);
"#;
