//! Relevance rerankers.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ort::session::Session;
use ort::value::Tensor;
use tokenizers::Tokenizer;
use tracing::{debug, info};

use rag_core::text::terms;
use rag_core::{RagError, RerankConfig, RerankHit, Reranker, Result};

use crate::onnx::{load_session, load_tokenizer, BatchInputs};

/// Pairs scored per inference call.
const RERANK_BATCH: usize = 16;

/// Cross-encoder reranker (ms-marco-MiniLM-L-6-v2 or compatible).
///
/// Each (query, passage) pair is encoded jointly; the single logit is mapped
/// through a sigmoid so relevance lands in `[0, 1]`.
pub struct OnnxReranker {
    session: Mutex<Session>,
    tokenizer: Arc<Tokenizer>,
    max_tokens: usize,
}

impl OnnxReranker {
    /// Create a reranker from the rerank section of the configuration.
    pub fn from_config(config: &RerankConfig) -> Result<Self> {
        info!("Loading cross-encoder from {:?}", config.model_path);
        let session = load_session(&config.model_path, config.num_threads)?;
        let tokenizer = load_tokenizer(&config.tokenizer_path)?;

        Ok(Self {
            session: Mutex::new(session),
            tokenizer: Arc::new(tokenizer),
            max_tokens: config.max_tokens,
        })
    }

    fn score_batch(&self, query: &str, passages: &[&str]) -> Result<Vec<f32>> {
        let pairs: Vec<(&str, &str)> = passages.iter().map(|p| (query, *p)).collect();

        let encodings = self
            .tokenizer
            .encode_batch(pairs, true)
            .map_err(|e| RagError::rerank(format!("Tokenization failed: {}", e)))?;

        let inputs = BatchInputs::from_encodings(&encodings, self.max_tokens);
        let shape = vec![inputs.batch_size, inputs.max_len];

        let input_ids = Tensor::from_array((shape.clone(), inputs.input_ids))
            .map_err(|e| RagError::rerank(format!("Failed to create input tensor: {}", e)))?;
        let attention_mask = Tensor::from_array((shape.clone(), inputs.attention_mask))
            .map_err(|e| RagError::rerank(format!("Failed to create mask tensor: {}", e)))?;
        let token_type_ids = Tensor::from_array((shape, inputs.token_type_ids))
            .map_err(|e| RagError::rerank(format!("Failed to create token type tensor: {}", e)))?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| RagError::rerank(format!("Failed to lock session: {}", e)))?;

        let outputs = session
            .run(ort::inputs![
                "input_ids" => input_ids,
                "attention_mask" => attention_mask,
                "token_type_ids" => token_type_ids
            ])
            .map_err(|e| RagError::rerank(format!("Inference failed: {}", e)))?;

        let (_, output) = outputs
            .iter()
            .next()
            .ok_or_else(|| RagError::rerank("No output tensor found"))?;

        let view = output
            .try_extract_array::<f32>()
            .map_err(|e| RagError::rerank(format!("Failed to extract logits: {}", e)))?;

        // Logits are (batch, 1) or (batch,)
        let logits: Vec<f32> = view.iter().copied().collect();
        if logits.len() != passages.len() {
            return Err(RagError::rerank(format!(
                "Expected {} logits, got {} (shape {:?})",
                passages.len(),
                logits.len(),
                view.shape()
            )));
        }

        Ok(logits.into_iter().map(sigmoid).collect())
    }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

#[async_trait]
impl Reranker for OnnxReranker {
    async fn rerank(&self, query: &str, passages: &[&str]) -> Result<Vec<RerankHit>> {
        let mut hits = Vec::with_capacity(passages.len());
        for (batch_idx, batch) in passages.chunks(RERANK_BATCH).enumerate() {
            let scores = self.score_batch(query, batch)?;
            for (offset, score) in scores.into_iter().enumerate() {
                hits.push(RerankHit {
                    index: batch_idx * RERANK_BATCH + offset,
                    relevance_score: Some(score),
                });
            }
        }
        debug!("Cross-encoder scored {} passages", hits.len());
        Ok(hits)
    }

    fn name(&self) -> &str {
        "onnx-cross-encoder"
    }
}

/// Scores a passage by the fraction of distinct query terms it contains.
#[derive(Debug, Default, Clone, Copy)]
pub struct LexicalOverlapReranker;

impl LexicalOverlapReranker {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Reranker for LexicalOverlapReranker {
    async fn rerank(&self, query: &str, passages: &[&str]) -> Result<Vec<RerankHit>> {
        let query_terms: HashSet<String> = terms(query).into_iter().collect();

        Ok(passages
            .iter()
            .enumerate()
            .map(|(index, passage)| {
                let relevance_score = if query_terms.is_empty() {
                    None
                } else {
                    let passage_terms: HashSet<String> = terms(passage).into_iter().collect();
                    let covered = query_terms.intersection(&passage_terms).count();
                    Some(covered as f32 / query_terms.len() as f32)
                };
                RerankHit {
                    index,
                    relevance_score,
                }
            })
            .collect())
    }

    fn name(&self) -> &str {
        "lexical-overlap"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sigmoid_bounds() {
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-6);
        assert!(sigmoid(10.0) > 0.99);
        assert!(sigmoid(-10.0) < 0.01);
    }

    #[tokio::test]
    async fn test_lexical_overlap_scores() {
        let reranker = LexicalOverlapReranker::new();
        let passages = [
            "The encoder stack is identical layers.",
            "Self-attention relates positions of a single sequence.",
        ];

        let hits = reranker.rerank("self attention", &passages).await.unwrap();

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].index, 0);
        assert_eq!(hits[0].relevance_score, Some(0.0));
        assert_eq!(hits[1].relevance_score, Some(1.0));
    }

    #[tokio::test]
    async fn test_lexical_overlap_empty_query_leaves_scores_unset() {
        let reranker = LexicalOverlapReranker::new();
        let hits = reranker.rerank("??", &["anything"]).await.unwrap();
        assert_eq!(hits[0].relevance_score, None);
    }

    #[test]
    fn test_missing_cross_encoder_is_config_error() {
        let config = RerankConfig {
            model_path: "/nonexistent/model.onnx".into(),
            tokenizer_path: "/nonexistent/tokenizer.json".into(),
            ..Default::default()
        };
        let err = OnnxReranker::from_config(&config).err().unwrap();
        assert_eq!(err.error_code(), "CONFIG_ERROR");
    }
}
