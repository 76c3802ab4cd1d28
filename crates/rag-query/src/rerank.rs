//! Rerank stage with graceful degradation.

use std::collections::HashSet;

use tracing::{debug, warn};

use rag_core::{
    RetrievalCandidate, Reranker, ScoreKind, SearchHit, META_RELEVANCE_SCORE,
};

/// Order fused candidates by relevance and keep the best `k`.
///
/// Returns the hits and whether a reranker produced their order. Without a
/// reranker, or when it fails, the fused order is kept and every score is
/// 0.0; this path never errors.
pub async fn rerank_candidates(
    reranker: Option<&dyn Reranker>,
    query: &str,
    candidates: Vec<RetrievalCandidate>,
    k: usize,
) -> (Vec<SearchHit>, bool) {
    let Some(reranker) = reranker else {
        debug!("No reranker configured, returning fused order");
        return (unranked(candidates, k), false);
    };

    if candidates.is_empty() {
        return (Vec::new(), true);
    }

    let passages: Vec<&str> = candidates.iter().map(|c| c.chunk.content.as_str()).collect();
    let hits = match reranker.rerank(query, &passages).await {
        Ok(hits) => hits,
        Err(e) => {
            warn!("Reranker {} failed, returning fused order: {}", reranker.name(), e);
            return (unranked(candidates, k), false);
        }
    };

    let mut seen = HashSet::new();
    let mut scored: Vec<(usize, f32)> = Vec::with_capacity(hits.len());
    for hit in hits {
        if hit.index >= candidates.len() {
            warn!(
                "Reranker {} returned out-of-range index {}",
                reranker.name(),
                hit.index
            );
            continue;
        }
        if !seen.insert(hit.index) {
            continue;
        }
        let score = relevance(hit.relevance_score, &candidates[hit.index]);
        scored.push((hit.index, round4(score)));
    }

    if scored.is_empty() {
        warn!(
            "Reranker {} returned no usable scores, returning fused order",
            reranker.name()
        );
        return (unranked(candidates, k), false);
    }

    // Equal relevance keeps fused order
    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.0.cmp(&b.0))
    });
    scored.truncate(k);

    let hits = scored
        .into_iter()
        .map(|(index, score)| {
            let candidate = &candidates[index];
            SearchHit {
                chunk_id: candidate.chunk_id(),
                content: candidate.chunk.content.clone(),
                score,
                source_method: candidate.retrieval_source,
                score_kind: ScoreKind::Relevance,
            }
        })
        .collect();

    (hits, true)
}

/// Backend score, else the chunk's recorded relevance, else 0.0.
fn relevance(backend: Option<f32>, candidate: &RetrievalCandidate) -> f32 {
    match backend {
        Some(score) if score != 0.0 && score.is_finite() => score,
        _ => candidate
            .chunk
            .metadata_f32(META_RELEVANCE_SCORE)
            .filter(|s| s.is_finite())
            .unwrap_or(0.0),
    }
}

fn round4(score: f32) -> f32 {
    (score * 10_000.0).round() / 10_000.0
}

fn unranked(candidates: Vec<RetrievalCandidate>, k: usize) -> Vec<SearchHit> {
    candidates
        .into_iter()
        .take(k)
        .map(|candidate| SearchHit {
            chunk_id: candidate.chunk.chunk_id,
            content: candidate.chunk.content,
            score: 0.0,
            source_method: candidate.retrieval_source,
            score_kind: ScoreKind::Unranked,
        })
        .collect()
}
