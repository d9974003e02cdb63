//! Memory-pipeline error taxonomy.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("memory store error: {0}")]
    Store(String),

    #[error("extraction failed: {0}")]
    Extraction(String),

    #[error("entry not found: {0}")]
    NotFound(String),
}
