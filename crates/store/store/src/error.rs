use metahub_core::HubError;
use thiserror::Error;

/// Errors surfaced by storage backends.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The referenced row does not exist (or is soft-deleted).
    #[error("not found: {0}")]
    NotFound(String),

    /// A conditional update lost the race: the row was not in the expected
    /// state. Workers treat this as "another worker claimed it".
    #[error("conflict: expected status {expected}, found {found}")]
    Conflict { expected: String, found: String },

    /// The requested transition is not an edge of the state machine.
    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    /// An append violated an append-only invariant (attempt numbering,
    /// attempt budget).
    #[error("invalid append: {0}")]
    InvalidAppend(String),

    /// The backend rejected the operation.
    #[error("backend error: {0}")]
    Backend(String),

    /// The backend is unreachable.
    #[error("connection error: {0}")]
    Connection(String),
}

impl From<StoreError> for HubError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(msg) => Self::NotFound(msg),
            StoreError::Conflict { expected, found } => {
                Self::Conflict(format!("expected status {expected}, found {found}"))
            }
            StoreError::InvalidTransition(msg) | StoreError::InvalidAppend(msg) => {
                Self::Validation(msg)
            }
            StoreError::Backend(msg) | StoreError::Connection(msg) => Self::Transient(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_maps_to_hub_conflict() {
        let err: HubError = StoreError::Conflict {
            expected: "pending".into(),
            found: "processing".into(),
        }
        .into();
        assert!(matches!(err, HubError::Conflict(_)));
    }

    #[test]
    fn backend_maps_to_transient() {
        let err: HubError = StoreError::Backend("pool timeout".into()).into();
        assert!(matches!(err, HubError::Transient(_)));
    }
}
