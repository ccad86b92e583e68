//! Single-object handlers: upload and streaming relay.

use super::{done_response, AppState, GatewayError};
use crate::api::body::collect_body;
use crate::api::extractors::ImageKey;
use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Content type recorded for every gallery upload
const UPLOAD_CONTENT_TYPE: &str = "image/png";

/// Upload handler
/// POST /upload
///
/// Stores the raw request body as a new object under a freshly generated key.
#[instrument(skip(state, body))]
pub async fn upload(State(state): State<Arc<AppState>>, body: Body) -> Result<Response, GatewayError> {
    let storage = state.storage().map_err(|e| e.during("uploading picture"))?;

    let data = collect_body(body, state.max_object_size)
        .await
        .map_err(|e| e.during("uploading picture"))?;

    let key = state.upload_keys.next_key();
    info!("Uploading {} bytes as {}/{}", data.len(), storage.bucket, key);

    storage
        .bridge
        .put_object(&storage.bucket, &key, data, UPLOAD_CONTENT_TYPE)
        .await
        .map_err(|e| GatewayError::from(e).during("uploading picture"))?;

    debug!("Uploaded {}/{}", storage.bucket, key);
    Ok(done_response())
}

/// Stream relay
/// GET /image/{id}
///
/// Hands the storage chunk stream straight to the response body, so objects
/// of any size pass through without being held in memory.
#[instrument(skip(state))]
pub async fn stream_image(
    State(state): State<Arc<AppState>>,
    ImageKey(key): ImageKey,
) -> Result<Response, GatewayError> {
    let storage = state
        .storage()
        .map_err(|e| e.during("streaming bucket content"))?;

    info!("Render image from storage '{}'", key);

    let object = storage
        .bridge
        .fetch_stream(&storage.bucket, &key)
        .await
        .map_err(|e| GatewayError::from(e).during("streaming bucket content"))?;

    let mut headers = HeaderMap::new();
    let content_type = object
        .content_type
        .clone()
        .or_else(|| mime_guess::from_path(&key).first_raw().map(str::to_string))
        .unwrap_or_else(|| "application/octet-stream".to_string());
    if let Ok(value) = HeaderValue::from_str(&content_type) {
        headers.insert(header::CONTENT_TYPE, value);
    }
    if let Some(len) = object.content_length {
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    }

    debug!("Streaming {}/{} ({:?} bytes)", storage.bucket, key, object.content_length);
    Ok((StatusCode::OK, headers, Body::from_stream(object.stream)).into_response())
}
