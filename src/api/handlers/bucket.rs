//! Bucket-wide handlers: listing and bulk deletion.

use super::{done_response, AppState, GatewayError};
use crate::types::ObjectEntry;
use axum::extract::State;
use axum::response::Response;
use axum::Json;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// List handler
/// GET /list-bucket-content
#[instrument(skip(state))]
pub async fn list_bucket_content(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ObjectEntry>>, GatewayError> {
    let storage = state
        .storage()
        .map_err(|e| e.during("listing bucket content"))?;

    let entries = storage
        .bridge
        .list_objects(&storage.bucket, "")
        .await
        .map_err(|e| GatewayError::from(e).during("listing bucket content"))?;

    debug!("Listed {} objects in {}", entries.len(), storage.bucket);
    Ok(Json(entries))
}

/// Bulk delete handler
/// GET /delete-bucket-content
///
/// Two separate storage calls: list, then one batched delete of exactly the
/// listed keys. Not atomic. Objects written between the two calls are not in
/// the batch and survive; keys removed concurrently by someone else are not
/// reported as failures.
#[instrument(skip(state))]
pub async fn delete_bucket_content(
    State(state): State<Arc<AppState>>,
) -> Result<Response, GatewayError> {
    let storage = state
        .storage()
        .map_err(|e| e.during("deleting bucket content"))?;

    info!("Delete entire bucket content of {}", storage.bucket);

    let keys: Vec<String> = storage
        .bridge
        .list_objects(&storage.bucket, "")
        .await
        .map_err(|e| GatewayError::from(e).during("deleting bucket content"))?
        .into_iter()
        .map(|entry| entry.key)
        .collect();

    storage
        .bridge
        .delete_objects(&storage.bucket, &keys)
        .await
        .map_err(|e| GatewayError::from(e).during("deleting bucket content"))?;

    info!("Deleted {} objects from {}", keys.len(), storage.bucket);
    Ok(done_response())
}
