//! Custom Axum extractors for request path validation

use super::errors::GatewayError;
use crate::types::ObjectReference;
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

/// Route prefix served by the stream relay
pub const IMAGE_PREFIX: &str = "/image/";

/// Validated object key taken from an `/image/{id}` request.
///
/// Works on the raw request target rather than the router's decoded
/// parameter: the query string is dropped, the rest percent-decoded, and any
/// `..` is rejected with `InvalidPath` before a handler runs. Needs no state,
/// so the check holds even when storage is not configured.
///
/// # Example
/// ```ignore
/// async fn stream_image(
///     State(state): State<Arc<AppState>>,
///     ImageKey(key): ImageKey,
/// ) -> Result<Response, GatewayError> {
///     // key is free of traversal tokens here
/// }
/// ```
#[derive(Debug, Clone)]
pub struct ImageKey(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for ImageKey
where
    S: Send + Sync,
{
    type Rejection = GatewayError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let target = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or_else(|| parts.uri.path());

        let raw = target
            .find(IMAGE_PREFIX)
            .map(|idx| &target[idx + IMAGE_PREFIX.len()..])
            .ok_or_else(|| GatewayError::InvalidPath(target.to_string()))?;

        let key = ObjectReference::key_from_path(raw)
            .map_err(|e| GatewayError::InvalidPath(e.to_string()))?;
        Ok(ImageKey(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(uri: &str) -> Result<ImageKey, GatewayError> {
        let (mut parts, _) = Request::builder().uri(uri).body(()).unwrap().into_parts();
        ImageKey::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn test_extracts_key_without_query() {
        let ImageKey(key) = extract("/image/gallery-pic-1.png?ts=99").await.unwrap();
        assert_eq!(key, "gallery-pic-1.png");
    }

    #[tokio::test]
    async fn test_extracts_nested_and_encoded_key() {
        let ImageKey(key) = extract("/image/folder/my%20pic.png").await.unwrap();
        assert_eq!(key, "folder/my pic.png");
    }

    #[tokio::test]
    async fn test_rejects_traversal() {
        for uri in [
            "/image/../Cargo.toml",
            "/image/a/../../b",
            "/image/%2e%2e/secret",
            "/image/x..y",
        ] {
            let err = extract(uri).await.unwrap_err();
            assert!(matches!(err, GatewayError::InvalidPath(_)), "{uri}");
        }
    }
}
