use thiserror::Error;

use crate::dimensions::DimensionError;
use crate::fact_store::FactStoreError;
use crate::source::SourceError;

/// Batch failure. Nothing was committed when a batch returns this.
#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    FactStore(#[from] FactStoreError),

    #[error(transparent)]
    Dimension(#[from] DimensionError),
}

impl PipelineError {
    /// Whether rerunning the whole batch may succeed.
    ///
    /// Collaborator unavailability and commit timeouts are transient. An
    /// unreachable target store, an irreconcilable schema, malformed source
    /// rows, and misconfigured dimensions are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            PipelineError::Source(SourceError::Unavailable(_)) => true,
            PipelineError::Source(SourceError::Malformed(_)) => false,
            PipelineError::FactStore(e) => e.is_transient(),
            PipelineError::Dimension(e) => e.is_transient(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_failures_are_retryable() {
        assert!(PipelineError::from(SourceError::Unavailable("down".into())).is_retryable());
        assert!(PipelineError::from(FactStoreError::Timeout("slow".into())).is_retryable());
        assert!(PipelineError::from(DimensionError::Unavailable("down".into())).is_retryable());
    }

    #[test]
    fn fatal_failures_are_not_retryable() {
        assert!(!PipelineError::from(FactStoreError::Unavailable("gone".into())).is_retryable());
        assert!(
            !PipelineError::from(FactStoreError::SchemaIncompatible("type".into())).is_retryable()
        );
        assert!(!PipelineError::from(FactStoreError::InvalidRow("bad".into())).is_retryable());
        assert!(!PipelineError::from(SourceError::Malformed("bad".into())).is_retryable());
        assert!(
            !PipelineError::from(DimensionError::Misconfigured("no table".into())).is_retryable()
        );
    }
}
