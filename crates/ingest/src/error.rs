use metahub_core::HubError;
use metahub_store::StoreError;
use thiserror::Error;

/// Errors of the ingestion surface.
///
/// Almost nothing here is an error: malformed envelopes are acknowledged,
/// enrichment failures degrade, mapping problems degrade. Only a failed
/// enqueue escapes, so Meta retries the webhook.
#[derive(Debug, Error)]
pub enum IngestError {
    /// A storage operation failed while persisting or resolving.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl From<IngestError> for HubError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::Store(e) => e.into(),
        }
    }
}
