use metahub_core::HubError;
use thiserror::Error;

/// Errors of the Meta OAuth and Graph API surface.
#[derive(Debug, Error)]
pub enum MetaError {
    /// The OAuth state parameter is malformed or carries a bad signature.
    #[error("invalid oauth state: {0}")]
    InvalidState(String),

    /// The OAuth state is older than the acceptance window.
    #[error("oauth state expired")]
    StateExpired,

    /// The HTTP transport failed.
    #[error("graph request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The Graph API answered with a non-success status.
    #[error("graph api returned {status}: {body}")]
    Upstream { status: u16, body: String },
}

impl From<MetaError> for HubError {
    fn from(err: MetaError) -> Self {
        match err {
            MetaError::InvalidState(msg) => Self::Validation(msg),
            MetaError::StateExpired => Self::Validation("oauth state expired".to_owned()),
            MetaError::Http(e) => Self::Upstream(e.to_string()),
            MetaError::Upstream { status, body } => {
                Self::Upstream(format!("graph api {status}: {body}"))
            }
        }
    }
}
