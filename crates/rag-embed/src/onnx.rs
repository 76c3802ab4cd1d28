//! ONNX-based embedding model implementation.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ndarray::ArrayViewD;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use tokenizers::Tokenizer;
use tracing::{debug, info};

use rag_core::{Embedder, EmbeddingConfig, RagError, Result};

/// Load an ONNX session with the given thread count.
pub(crate) fn load_session(model_path: &Path, num_threads: usize) -> Result<Session> {
    Session::builder()
        .map_err(|e| RagError::config(format!("Failed to create session builder: {}", e)))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| RagError::config(format!("Failed to set optimization level: {}", e)))?
        .with_intra_threads(num_threads)
        .map_err(|e| RagError::config(format!("Failed to set thread count: {}", e)))?
        .commit_from_file(model_path)
        .map_err(|e| RagError::config(format!("Failed to load model {:?}: {}", model_path, e)))
}

/// Load a HuggingFace tokenizer.json.
pub(crate) fn load_tokenizer(tokenizer_path: &Path) -> Result<Tokenizer> {
    Tokenizer::from_file(tokenizer_path).map_err(|e| {
        RagError::config(format!(
            "Failed to load tokenizer {:?}: {}",
            tokenizer_path, e
        ))
    })
}

/// Padded BERT-style input tensors for one batch.
pub(crate) struct BatchInputs {
    pub input_ids: Vec<i64>,
    pub attention_mask: Vec<i64>,
    pub token_type_ids: Vec<i64>,
    pub batch_size: usize,
    pub max_len: usize,
}

impl BatchInputs {
    /// Pad encodings to the longest one, capped at `max_tokens`.
    pub fn from_encodings(encodings: &[tokenizers::Encoding], max_tokens: usize) -> Self {
        let max_len = encodings
            .iter()
            .map(|e| e.get_ids().len())
            .max()
            .unwrap_or(0)
            .min(max_tokens)
            .max(1);

        let batch_size = encodings.len();
        let mut input_ids = vec![0i64; batch_size * max_len];
        let mut attention_mask = vec![0i64; batch_size * max_len];
        let mut token_type_ids = vec![0i64; batch_size * max_len];

        for (i, encoding) in encodings.iter().enumerate() {
            let ids = encoding.get_ids();
            let mask = encoding.get_attention_mask();
            let types = encoding.get_type_ids();
            let len = ids.len().min(max_len);

            for j in 0..len {
                input_ids[i * max_len + j] = ids[j] as i64;
                attention_mask[i * max_len + j] = mask[j] as i64;
                token_type_ids[i * max_len + j] = types[j] as i64;
            }
        }

        Self {
            input_ids,
            attention_mask,
            token_type_ids,
            batch_size,
            max_len,
        }
    }
}

/// ONNX-based sentence embedder (all-MiniLM-L6-v2 or another BERT-family model).
pub struct OnnxEmbedder {
    /// ONNX inference session (wrapped in Mutex for interior mutability).
    session: Mutex<Session>,

    /// Tokenizer for the model.
    tokenizer: Arc<Tokenizer>,

    /// Embedding dimension.
    dimension: usize,

    /// Maximum token count per input.
    max_tokens: usize,

    /// Inputs per inference call.
    batch_size: usize,

    document_prefix: String,
    query_prefix: String,
}

impl OnnxEmbedder {
    /// Create an embedder from the embedding section of the configuration.
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self> {
        info!("Loading ONNX embedding model from {:?}", config.model_path);
        let session = load_session(&config.model_path, config.num_threads)?;

        info!("Loading tokenizer from {:?}", config.tokenizer_path);
        let tokenizer = load_tokenizer(&config.tokenizer_path)?;

        info!(
            "Embedder initialized: dim={}, max_tokens={}",
            config.dimension, config.max_tokens
        );

        Ok(Self {
            session: Mutex::new(session),
            tokenizer: Arc::new(tokenizer),
            dimension: config.dimension,
            max_tokens: config.max_tokens,
            batch_size: config.batch_size.max(1),
            document_prefix: config.document_prefix.clone(),
            query_prefix: config.query_prefix.clone(),
        })
    }

    /// Embed texts with a given prefix, `batch_size` texts per inference.
    fn embed_with_prefix(&self, texts: &[&str], prefix: &str) -> Result<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            embeddings.extend(self.embed_batch(batch, prefix)?);
        }
        Ok(embeddings)
    }

    /// Embed a single batch of texts.
    fn embed_batch(&self, texts: &[&str], prefix: &str) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let prefixed: Vec<String> = texts.iter().map(|t| format!("{}{}", prefix, t)).collect();
        let prefixed_refs: Vec<&str> = prefixed.iter().map(|s| s.as_str()).collect();

        let encodings = self
            .tokenizer
            .encode_batch(prefixed_refs, true)
            .map_err(|e| RagError::embedding(format!("Tokenization failed: {}", e)))?;

        let inputs = BatchInputs::from_encodings(&encodings, self.max_tokens);
        let (batch_size, max_len) = (inputs.batch_size, inputs.max_len);

        debug!("Embedding batch: size={}, max_len={}", batch_size, max_len);

        let input_ids_tensor = Tensor::from_array((vec![batch_size, max_len], inputs.input_ids))
            .map_err(|e| RagError::embedding(format!("Failed to create input tensor: {}", e)))?;

        let attention_mask_tensor =
            Tensor::from_array((vec![batch_size, max_len], inputs.attention_mask))
                .map_err(|e| RagError::embedding(format!("Failed to create mask tensor: {}", e)))?;

        let token_type_tensor =
            Tensor::from_array((vec![batch_size, max_len], inputs.token_type_ids)).map_err(
                |e| RagError::embedding(format!("Failed to create token type tensor: {}", e)),
            )?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| RagError::embedding(format!("Failed to lock session: {}", e)))?;

        let outputs = session
            .run(ort::inputs![
                "input_ids" => input_ids_tensor,
                "attention_mask" => attention_mask_tensor,
                "token_type_ids" => token_type_tensor
            ])
            .map_err(|e| RagError::embedding(format!("Inference failed: {}", e)))?;

        // First output is either token embeddings or an already pooled vector
        let (_, output) = outputs
            .iter()
            .next()
            .ok_or_else(|| RagError::embedding("No output tensor found"))?;

        let view = output
            .try_extract_array::<f32>()
            .map_err(|e| RagError::embedding(format!("Failed to extract tensor: {}", e)))?;

        let shape_dims: Vec<usize> = view.shape().to_vec();
        debug!("Output shape: {:?}", shape_dims);

        let embeddings = if shape_dims.len() == 3 {
            // (batch_size, seq_len, hidden_dim) - need mean pooling
            mean_pool_3d(&view, &encodings, max_len)
        } else if shape_dims.len() == 2 {
            // (batch_size, hidden_dim) - already pooled
            let hidden_dim = shape_dims[1];
            (0..batch_size)
                .map(|i| l2_normalize((0..hidden_dim).map(|j| view[[i, j]]).collect()))
                .collect()
        } else {
            return Err(RagError::embedding(format!(
                "Unexpected output shape: {:?}",
                shape_dims
            )));
        };

        if let Some(bad) = embeddings.iter().find(|e| e.len() != self.dimension) {
            return Err(RagError::embedding(format!(
                "Model produced {}-dimensional embeddings, configured dimension is {}",
                bad.len(),
                self.dimension
            )));
        }

        Ok(embeddings)
    }
}

/// Mean pooling over the sequence dimension with attention mask.
///
/// Works with an ndarray view of shape [batch, seq, hidden].
fn mean_pool_3d(
    tensor: &ArrayViewD<'_, f32>,
    encodings: &[tokenizers::Encoding],
    max_len: usize,
) -> Vec<Vec<f32>> {
    let shape = tensor.shape();
    let seq_len = shape[1];
    let hidden_dim = shape[2];

    let mut embeddings = Vec::with_capacity(encodings.len());

    for (i, encoding) in encodings.iter().enumerate() {
        let attention_mask = encoding.get_attention_mask();
        let limit = max_len.min(seq_len).min(attention_mask.len());

        let mut sum = vec![0.0f32; hidden_dim];
        let mut valid = 0usize;
        for j in 0..limit {
            if attention_mask[j] == 1 {
                valid += 1;
                for (k, s) in sum.iter_mut().enumerate() {
                    *s += tensor[[i, j, k]];
                }
            }
        }

        if valid == 0 {
            embeddings.push(vec![0.0; hidden_dim]);
            continue;
        }

        let mean: Vec<f32> = sum.iter().map(|s| s / valid as f32).collect();
        embeddings.push(l2_normalize(mean));
    }

    embeddings
}

/// L2 normalize a vector.
pub(crate) fn l2_normalize(mut v: Vec<f32>) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut v {
            *x /= norm;
        }
    }
    v
}

#[async_trait]
impl Embedder for OnnxEmbedder {
    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        // Run embedding synchronously (Session is not Send)
        self.embed_with_prefix(texts, &self.document_prefix)
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let results = self.embed_with_prefix(&[text], &self.query_prefix)?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| RagError::embedding("No embedding returned"))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_l2_normalize() {
        let v = l2_normalize(vec![3.0, 4.0]);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_l2_normalize_zero_vector() {
        assert_eq!(l2_normalize(vec![0.0, 0.0]), vec![0.0, 0.0]);
    }

    #[test]
    fn test_missing_model_is_config_error() {
        let config = EmbeddingConfig {
            model_path: PathBuf::from("/nonexistent/model.onnx"),
            tokenizer_path: PathBuf::from("/nonexistent/tokenizer.json"),
            ..Default::default()
        };
        let err = OnnxEmbedder::from_config(&config).err().unwrap();
        assert_eq!(err.error_code(), "CONFIG_ERROR");
    }
}
