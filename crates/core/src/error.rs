use thiserror::Error;

/// Shared error taxonomy of the hub.
///
/// Errors are values everywhere inside the core; the HTTP layer is the only
/// place that turns them into status codes. `Conflict` never escapes the
/// delivery worker, and `Upstream` is recorded as an attempt rather than
/// surfaced to callers.
#[derive(Debug, Error)]
pub enum HubError {
    /// Caller-supplied input fails a contract (missing id, unknown enum).
    #[error("validation error: {0}")]
    Validation(String),

    /// Missing or invalid session, or caller is not a member of the tenant.
    #[error("unauthorized: {0}")]
    Auth(String),

    /// Referenced resource absent or soft-deleted.
    #[error("not found: {0}")]
    NotFound(String),

    /// Optimistic concurrency failure during a state transition. Workers
    /// treat this as "someone else claimed it" and move on.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Meta Graph API or a customer destination misbehaved.
    #[error("upstream error: {0}")]
    Upstream(String),

    /// Database timeout, connection reset or similar recoverable failure.
    #[error("transient error: {0}")]
    Transient(String),

    /// Misconfiguration detected at startup.
    #[error("fatal: {0}")]
    Fatal(String),
}

impl HubError {
    /// A `NotFound` for a resource kind and identifier.
    #[must_use]
    pub fn not_found(kind: &str, id: impl std::fmt::Display) -> Self {
        Self::NotFound(format!("{kind} {id}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        assert_eq!(
            HubError::Validation("missing event_id".into()).to_string(),
            "validation error: missing event_id"
        );
        assert_eq!(
            HubError::not_found("destination", "d-1").to_string(),
            "not found: destination d-1"
        );
    }
}
