//! Error type shared by the index builder, the query engine and the predictors.

use std::collections::TryReserveError;
use thiserror::Error;

/// Broad category of a [`KnnError`], for callers that only care about the class of failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    InvalidArgument,
    Allocation,
    NotFitted,
}

#[derive(Debug, Error)]
pub enum KnnError {
    /// Malformed or empty training data. No partial model is produced.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// A bad argument to a single call. The model stays valid and reusable.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("allocation failed: {0}")]
    Allocation(#[from] TryReserveError),
    #[error("estimator has not been fitted; call `fit` before `predict`")]
    NotFitted,
}

impl KnnError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            KnnError::InvalidInput(_) => ErrorKind::InvalidInput,
            KnnError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            KnnError::Allocation(_) => ErrorKind::Allocation,
            KnnError::NotFitted => ErrorKind::NotFitted,
        }
    }
}

pub type Result<T> = std::result::Result<T, KnnError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_matches_variant() {
        assert_eq!(KnnError::InvalidInput("x".into()).kind(), ErrorKind::InvalidInput);
        assert_eq!(KnnError::InvalidArgument("x".into()).kind(), ErrorKind::InvalidArgument);
        assert_eq!(KnnError::NotFitted.kind(), ErrorKind::NotFitted);
    }

    #[test]
    fn test_allocation_error_converts() {
        let mut v: Vec<u64> = Vec::new();
        let reserve_err = v.try_reserve(usize::MAX).unwrap_err();
        let err: KnnError = reserve_err.into();
        assert_eq!(err.kind(), ErrorKind::Allocation);
        assert!(err.to_string().starts_with("allocation failed"));
    }

    #[test]
    fn test_messages_carry_context() {
        let err = KnnError::InvalidArgument("k must be at least 1".into());
        assert_eq!(err.to_string(), "invalid argument: k must be at least 1");
    }
}
