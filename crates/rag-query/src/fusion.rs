//! Provenance-preserving fusion of dense and sparse results.

use std::collections::HashMap;

use rag_core::{
    Chunk, ChunkId, RetrievalCandidate, RetrievalSource, META_ORIGINAL_SCORE,
    META_RETRIEVAL_SOURCE,
};

/// Merge key. A chunk without an id never merges with another chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum FusionKey {
    Id(ChunkId),
    Anonymous(usize),
}

/// Merge dense and sparse candidates, deduplicating by `chunk_id`.
///
/// Scores are never blended: a chunk found by both indexes is relabelled
/// `hybrid` and keeps its dense score. Output is dense candidates in dense
/// order followed by lexical-only candidates in lexical order.
pub fn fuse(dense: Vec<(Chunk, f32)>, sparse: Vec<Chunk>) -> Vec<RetrievalCandidate> {
    let mut anonymous = 0usize;
    let mut key_for = |chunk: &Chunk| match chunk.chunk_id {
        Some(id) => FusionKey::Id(id),
        None => {
            anonymous += 1;
            FusionKey::Anonymous(anonymous)
        }
    };

    let mut positions: HashMap<FusionKey, usize> = HashMap::new();
    let mut fused: Vec<RetrievalCandidate> = Vec::with_capacity(dense.len() + sparse.len());

    for (chunk, score) in dense {
        let key = key_for(&chunk);
        if positions.contains_key(&key) {
            continue;
        }
        positions.insert(key, fused.len());
        fused.push(RetrievalCandidate {
            chunk,
            retrieval_source: RetrievalSource::Vector,
            original_score: score,
        });
    }

    for chunk in sparse {
        let key = key_for(&chunk);
        match positions.get(&key) {
            Some(&position) => {
                let existing = &mut fused[position];
                if existing.retrieval_source == RetrievalSource::Vector {
                    existing.retrieval_source = RetrievalSource::Hybrid;
                }
            }
            None => {
                positions.insert(key, fused.len());
                fused.push(RetrievalCandidate {
                    chunk,
                    retrieval_source: RetrievalSource::Bm25,
                    original_score: 0.0,
                });
            }
        }
    }

    for candidate in &mut fused {
        candidate.chunk.metadata.insert(
            META_RETRIEVAL_SOURCE.to_string(),
            candidate.retrieval_source.as_str().into(),
        );
        candidate.chunk.metadata.insert(
            META_ORIGINAL_SCORE.to_string(),
            f64::from(candidate.original_score).into(),
        );
    }

    fused
}
