use metahub_core::HubError;
use metahub_store::StoreError;
use thiserror::Error;

/// Errors of the delivery worker surface.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// A storage operation failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The referenced event or destination does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The event is not in a state the operation accepts.
    #[error("invalid state: {0}")]
    InvalidState(String),
}

impl From<DeliveryError> for HubError {
    fn from(err: DeliveryError) -> Self {
        match err {
            DeliveryError::Store(e) => e.into(),
            DeliveryError::NotFound(msg) => Self::NotFound(msg),
            DeliveryError::InvalidState(msg) => Self::Validation(msg),
        }
    }
}
