//! Reserve-core error types.
//!
//! [`ReserveError`] is the central error type for the crate. Variants map
//! onto the recovery taxonomy callers rely on: `NotFound` is retried later,
//! `Validation` and `Conflict` are surfaced for correction upstream, and
//! `Storage` is a transient I/O failure that is safe to retry with backoff.

/// Central error enum for all reserve-core operations.
#[derive(Debug, thiserror::Error)]
pub enum ReserveError {
    /// The queried version, activity, or confirmed transaction does not
    /// exist (yet). Callers typically poll and retry later.
    #[error("not found: {0}")]
    NotFound(String),

    /// Caller-supplied input is invalid (range too wide, malformed
    /// identifier, out-of-range timestamp). Not retried automatically.
    #[error("invalid request: {0}")]
    Validation(String),

    /// Duplicate insertion of an identifier that already exists. Treated
    /// as a logic error upstream, never auto-resolved.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Storage engine I/O failure (connection drop, timeout, constraint
    /// other than uniqueness). Safe to retry; must not be mistaken for
    /// [`ReserveError::NotFound`].
    #[error("storage error during {operation}: {message}")]
    Storage {
        /// The logical operation that failed (e.g. `"store snapshot"`).
        operation: &'static str,
        /// Driver-level failure description.
        message: String,
    },

    /// Payload could not be serialized or deserialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invariant violation or unexpected internal state.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ReserveError {
    /// Builds a [`ReserveError::Storage`] from any driver error.
    pub fn storage(operation: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Storage {
            operation,
            message: err.to_string(),
        }
    }

    /// Returns `true` if the operation may be retried with backoff
    /// without caller-side changes.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage { .. } | Self::NotFound(_))
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn storage_errors_are_retryable() {
        let err = ReserveError::storage("store snapshot", "connection reset");
        assert!(err.is_retryable());
    }

    #[test]
    fn validation_errors_are_not_retryable() {
        let err = ReserveError::Validation("time range is too broad".to_string());
        assert!(!err.is_retryable());
    }

    #[test]
    fn storage_error_names_the_operation() {
        let err = ReserveError::storage("promote intermediate tx", "deadlock");
        let msg = err.to_string();
        assert!(msg.contains("promote intermediate tx"));
        assert!(msg.contains("deadlock"));
    }
}
