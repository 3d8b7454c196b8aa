//! Actor Error Types
//!
//! The one distinction the consumer loop cares about: a task that
//! failed (this work item is lost, the worker lives on) versus an
//! infrastructure failure (the worker is done for).

use thiserror::Error;
use transport::TransportError;

#[derive(Error, Debug)]
pub enum TaskError {
    /// A single work item could not be processed. Recoverable: the
    /// loop calls `failure()` and moves on.
    #[error("Task failed: {reason}")]
    Failed {
        reason: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Anything that must take the worker down.
    #[error(transparent)]
    Fatal(#[from] TransportError),
}

impl TaskError {
    /// Create a recoverable task failure
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
            source: None,
        }
    }

    /// Create a recoverable task failure with source
    pub fn failed_with_source(
        reason: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Failed {
            reason: reason.into(),
            source: Some(Box::new(source)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_is_distinguishable_from_fatal() {
        let failed = TaskError::failed("bad item");
        assert!(matches!(failed, TaskError::Failed { .. }));

        let fatal: TaskError = TransportError::protocol("wrong tag").into();
        assert!(matches!(fatal, TaskError::Fatal(_)));
    }
}
