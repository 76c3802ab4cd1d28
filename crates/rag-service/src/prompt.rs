//! Prompt assembly.

use rag_core::{ChatMessage, SearchHit};

/// Instructions that confine the answer to the retrieved context.
pub const SYSTEM_PROMPT: &str = "You are an expert on the research paper 'Attention Is All You Need'. \
Answer the user's question using ONLY the context provided below. \
Strict rules:\n\
1. Answer in English.\n\
2. If the answer is not in the context, say exactly: 'I cannot answer this based on the provided context.'\n\
3. Do not use outside knowledge.\n\
4. Always cite the source index (e.g., [Source 1]).";

/// Number the hits as `[Source i] content`, 1-based, blank-line separated.
pub fn format_context(hits: &[SearchHit]) -> String {
    hits.iter()
        .enumerate()
        .map(|(i, hit)| format!("[Source {}] {}", i + 1, hit.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// System prompt plus the context-and-question user message.
pub fn build_messages(context: &str, question: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(SYSTEM_PROMPT),
        ChatMessage::user(format!("CONTEXT:\n{}\n\nQUESTION:\n{}", context, question)),
    ]
}

/// First `chars` characters of `content` followed by `...`.
pub fn preview(content: &str, chars: usize) -> String {
    let head: String = content.chars().take(chars).collect();
    format!("{}...", head)
}
