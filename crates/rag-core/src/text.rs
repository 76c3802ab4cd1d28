//! Term extraction shared by lexical scoring and the hashing embedder.

/// Split text into lowercase alphanumeric terms.
///
/// Anything that is not alphanumeric separates terms, so `self-attention`
/// yields `self` and `attention`.
pub fn terms(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}
