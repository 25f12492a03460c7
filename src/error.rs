//! Error taxonomy for storage and vector operations.
//!
//! Storage backends surface [`StoreError`], which keeps the "not found"
//! condition distinct from generic backend failures so the repository's
//! empty-model recovery applies only where intended. Vector backends
//! surface [`VectorStoreError`], which keeps "collection missing" distinct
//! so the index writer can create-and-retry exactly once.
//!
//! Configuration and argument errors are always surfaced to the caller and
//! never retried.

use thiserror::Error;

/// Errors raised by [`ModelStore`](crate::store::ModelStore) backends.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Required backend settings absent or invalid. Raised before any I/O.
    #[error("storage configuration error: {0}")]
    Config(String),

    /// Manifest or entity document absent at the given location.
    #[error("not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Any other backend failure (network, database, malformed response).
    #[error("backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Whether this error means "the model/entity does not exist", as
    /// opposed to a failed attempt to find out.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

/// Errors raised by [`VectorCollectionStore`](crate::vector::VectorCollectionStore)
/// backends and the services layered on them.
#[derive(Error, Debug)]
pub enum VectorStoreError {
    /// The named collection does not exist. The index writer treats this
    /// as a create/write race and retries once after creating it.
    #[error("vector collection '{0}' does not exist")]
    CollectionMissing(String),

    /// Invalid call parameters (non-positive `top_k` and the like).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("vector backend error: {0}")]
    Backend(String),
}

/// Batch validation failure for vector infrastructure configuration.
///
/// Collects every violated constraint so a misconfiguration is reported
/// in one pass rather than one error per run.
#[derive(Error, Debug)]
pub struct ValidationErrors(pub Vec<String>);

impl std::fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid vector infrastructure configuration: ")?;
        for (i, msg) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}", msg)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_detection() {
        assert!(StoreError::NotFound("x".into()).is_not_found());
        assert!(!StoreError::Backend("x".into()).is_not_found());
        assert!(!StoreError::Config("x".into()).is_not_found());
    }

    #[test]
    fn test_validation_errors_display_joins_all() {
        let err = ValidationErrors(vec!["endpoint missing".into(), "bad distance".into()]);
        let rendered = err.to_string();
        assert!(rendered.contains("endpoint missing"));
        assert!(rendered.contains("bad distance"));
    }
}
