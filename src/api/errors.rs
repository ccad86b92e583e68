//! Gateway error taxonomy and its HTTP mapping

use crate::colorizer::ColorizeError;
use crate::storage::StorageError;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::warn;

/// Every failure a request can end in. Converted to a response at the
/// handler boundary; nothing outlives the request that produced it.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    #[error("Bad path: {0}")]
    InvalidPath(String),

    #[error("object not found: {0}")]
    ObjectNotFound(String),

    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("fetch failed: {0}")]
    FetchError(String),

    #[error("transform failed: {0}")]
    TransformError(String),

    #[error("Error reading body: {0}")]
    BodyReadError(String),

    #[error("payload exceeds the {limit} byte limit")]
    PayloadTooLarge { limit: u64 },

    #[error("Error reading file: {0}")]
    FileNotFound(String),

    #[error("Error reading page: {0}")]
    PageUnavailable(String),

    #[error("object storage is not configured")]
    StorageNotConfigured,

    /// A failure annotated with what the handler was doing.
    #[error("Error {action}: {source}")]
    During {
        action: String,
        #[source]
        source: Box<GatewayError>,
    },
}

impl GatewayError {
    /// Prefix the error with the operation that failed, e.g. "uploading picture".
    pub fn during(self, action: impl Into<String>) -> Self {
        GatewayError::During {
            action: action.into(),
            source: Box::new(self),
        }
    }

    /// Get the HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::InvalidPath(_) | GatewayError::FileNotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            GatewayError::During { source, .. } => source.status_code(),
            GatewayError::MalformedRequest(_)
            | GatewayError::ObjectNotFound(_)
            | GatewayError::StorageUnavailable(_)
            | GatewayError::FetchError(_)
            | GatewayError::TransformError(_)
            | GatewayError::BodyReadError(_)
            | GatewayError::PageUnavailable(_)
            | GatewayError::StorageNotConfigured => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Wrap a storage failure that happened while fetching an object.
    pub fn fetch(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(what) => GatewayError::ObjectNotFound(what),
            other => GatewayError::FetchError(other.to_string()),
        }
    }
}

impl From<StorageError> for GatewayError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(what) => GatewayError::ObjectNotFound(what),
            StorageError::TooLarge { max } => GatewayError::PayloadTooLarge { limit: max },
            other => GatewayError::StorageUnavailable(other.to_string()),
        }
    }
}

impl From<ColorizeError> for GatewayError {
    fn from(err: ColorizeError) -> Self {
        GatewayError::TransformError(err.to_string())
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = self.to_string();
        warn!("{} -> {}", body, status);

        (
            status,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            body,
        )
            .into_response()
    }
}
