/// Errors surfaced by a [`crate::ResourceStore`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("not_found: {0}")]
    NotFound(String),
    /// Optimistic-concurrency check failed; the next cycle recomputes from scratch.
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("internal: {0}")]
    Internal(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

/// Malformed configuration payload.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid jsonConfig - {0}")]
pub struct ValidationError(pub String);
