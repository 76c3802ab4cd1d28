//! Source document loading.

use std::path::Path;

use tracing::info;

use rag_core::{RagError, Result};

/// Read a UTF-8 text document.
///
/// Form feeds in the text are treated as page breaks by the splitter.
pub fn load_document(path: &Path) -> Result<String> {
    let text = std::fs::read_to_string(path).map_err(|e| RagError::LoadFailed {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;

    if text.trim().is_empty() {
        return Err(RagError::LoadFailed {
            path: path.display().to_string(),
            reason: "document is empty".to_string(),
        });
    }

    info!("Loaded {} ({} chars)", path.display(), text.chars().count());
    Ok(text)
}
