//! Chunk identity assignment.

use rag_core::{Chunk, ChunkData, META_PAGE, META_SOURCE};

/// Number chunks from 0 in document order and record where each came from.
pub fn assign_chunk_ids(pieces: Vec<ChunkData>, source: &str) -> Vec<Chunk> {
    pieces
        .into_iter()
        .enumerate()
        .map(|(i, piece)| {
            Chunk::new(i as u32, piece.content)
                .with_metadata(META_SOURCE, source)
                .with_metadata(META_PAGE, piece.page)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_follow_document_order() {
        let pieces = vec![
            ChunkData {
                content: "first".to_string(),
                page: 0,
            },
            ChunkData {
                content: "second".to_string(),
                page: 2,
            },
        ];

        let chunks = assign_chunk_ids(pieces, "paper.pdf");

        assert_eq!(chunks[0].chunk_id, Some(0));
        assert_eq!(chunks[1].chunk_id, Some(1));
        assert_eq!(chunks[1].content, "second");
        assert_eq!(chunks[1].metadata[META_SOURCE], "paper.pdf");
        assert_eq!(chunks[1].metadata[META_PAGE], 2);
    }
}
