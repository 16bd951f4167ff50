use redenv_payload::{DecodeError, ReconcileError};
use thiserror::Error;

pub type IngestResult<T> = Result<T, IngestError>;

/// Failure reported by the persistence layer. Opaque to the pipeline.
#[derive(Error, Debug)]
#[error(transparent)]
pub struct StorageError(#[from] pub anyhow::Error);

impl StorageError {
    pub fn msg(message: impl std::fmt::Display + std::fmt::Debug + Send + Sync + 'static) -> Self {
        Self(anyhow::Error::msg(message))
    }
}

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("decode failed: {0}")]
    Decode(#[from] DecodeError),

    #[error("timestamp reconciliation failed: {0}")]
    Reconcile(#[from] ReconcileError),

    #[error("storage failed: {0}")]
    Storage(#[from] StorageError),
}

impl IngestError {
    /// Short label used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            IngestError::Decode(DecodeError::UnknownFormat { .. }) => "unknown_format",
            IngestError::Decode(DecodeError::Malformed(_)) => "malformed",
            IngestError::Reconcile(ReconcileError::InvalidDate { .. }) => "invalid_date",
            IngestError::Reconcile(ReconcileError::InvalidArrivalTime(_)) => "invalid_arrival_time",
            IngestError::Storage(_) => "storage",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversions_and_kinds() {
        let err: IngestError = DecodeError::UnknownFormat { length: 36 }.into();
        assert_eq!(err.kind(), "unknown_format");
        assert_eq!(
            err.to_string(),
            "decode failed: unknown wire format: no layout is 36 bytes long"
        );

        let err: IngestError = StorageError::msg("connection refused").into();
        assert_eq!(err.kind(), "storage");
        assert_eq!(err.to_string(), "storage failed: connection refused");
    }
}
