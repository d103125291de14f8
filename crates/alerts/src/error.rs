use metahub_core::HubError;
use metahub_store::StoreError;
use thiserror::Error;

/// Errors of the alert evaluator surface.
#[derive(Debug, Error)]
pub enum AlertError {
    /// A storage operation failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The SMTP side call was rejected.
    #[error("email dispatch failed: {0}")]
    Email(String),

    /// The notification webhook call failed.
    #[error("notification webhook failed: {0}")]
    Http(#[from] reqwest::Error),
}

impl From<AlertError> for HubError {
    fn from(err: AlertError) -> Self {
        match err {
            AlertError::Store(e) => e.into(),
            AlertError::Email(msg) => Self::Upstream(msg),
            AlertError::Http(e) => Self::Upstream(e.to_string()),
        }
    }
}
