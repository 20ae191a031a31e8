//! Dispatch error types.

use prism_llm::AdapterError;
use prism_store::StoreError;

/// Result type alias for dispatch operations.
pub type Result<T> = std::result::Result<T, DispatchError>;

/// Errors surfaced by the dispatcher and service layer.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// Store operation failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Adapter operation failed.
    #[error(transparent)]
    Adapter(#[from] AdapterError),

    /// A targeted column already has an in-flight dispatch.
    #[error("column {column_id} has an in-flight dispatch")]
    Conflict {
        /// The busy column.
        column_id: String,
    },

    /// Referenced provider does not exist.
    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    /// The provider's key reference points at nothing in the secret store.
    #[error("provider {0} has no API key in the secret store")]
    MissingApiKey(String),
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_formats() {
        assert_eq!(
            DispatchError::Conflict {
                column_id: "col_1".into()
            }
            .to_string(),
            "column col_1 has an in-flight dispatch"
        );
        assert_eq!(
            DispatchError::UnknownProvider("prov_x".into()).to_string(),
            "unknown provider: prov_x"
        );
    }

    #[test]
    fn store_errors_pass_through() {
        let err: DispatchError = StoreError::SessionNotFound("sess_1".into()).into();
        assert_eq!(err.to_string(), "session not found: sess_1");
    }
}
