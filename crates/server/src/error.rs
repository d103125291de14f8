use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use metahub_core::HubError;
use thiserror::Error;

/// Error type of every API handler; wraps the shared taxonomy and maps it
/// onto HTTP statuses.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or unresolvable session. 401.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    /// A core error, mapped per its kind.
    #[error(transparent)]
    Hub(#[from] HubError),
}

impl ApiError {
    /// A 400 with the given message.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Hub(HubError::Validation(message.into()))
    }
}

impl From<metahub_store::StoreError> for ApiError {
    fn from(err: metahub_store::StoreError) -> Self {
        Self::Hub(err.into())
    }
}

impl From<metahub_delivery::DeliveryError> for ApiError {
    fn from(err: metahub_delivery::DeliveryError) -> Self {
        Self::Hub(err.into())
    }
}

impl From<metahub_ingest::IngestError> for ApiError {
    fn from(err: metahub_ingest::IngestError) -> Self {
        Self::Hub(err.into())
    }
}

impl From<metahub_meta::MetaError> for ApiError {
    fn from(err: metahub_meta::MetaError) -> Self {
        Self::Hub(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if matches!(
            &self,
            Self::Hub(
                HubError::Conflict(_)
                    | HubError::Upstream(_)
                    | HubError::Transient(_)
                    | HubError::Fatal(_)
            )
        ) {
            tracing::error!(error = %self, "request failed");
        }
        let status = match &self {
            Self::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            Self::Hub(hub) => match hub {
                HubError::Validation(_) => StatusCode::BAD_REQUEST,
                HubError::Auth(_) => StatusCode::FORBIDDEN,
                HubError::NotFound(_) => StatusCode::NOT_FOUND,
                // Conflicts, upstream failures and everything transient
                // are an internal concern by the time a caller sees them.
                HubError::Conflict(_)
                | HubError::Upstream(_)
                | HubError::Transient(_)
                | HubError::Fatal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        };
        let body = serde_json::json!({ "error": self.to_string() });
        (status, Json(body)).into_response()
    }
}
