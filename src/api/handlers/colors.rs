//! Recolor pipeline: fetch an image, recolor it, write it back in place.
//!
//! A job moves through
//! `Idle -> BodyCollected -> Fetched -> Materialized -> Transformed -> Uploaded -> Done`
//! and stops at the first failing stage. Nothing is written unless the
//! transform succeeded, so a failed job leaves the stored object as it was.

use super::{AppState, BucketHandle, GatewayError};
use crate::api::body::collect_body;
use crate::colorizer::Recolor;
use crate::types::ObjectReference;
use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Body of a `/change-colors` request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeColorsRequest {
    pub image_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Idle,
    BodyCollected,
    Fetched,
    Materialized,
    Transformed,
    Uploaded,
    Done,
}

/// State of one recolor request. Owned by the handler invocation that
/// created it and dropped with it.
struct TransformJob<'a> {
    storage: &'a BucketHandle,
    source: ObjectReference,
    stage: Stage,
}

impl<'a> TransformJob<'a> {
    fn new(storage: &'a BucketHandle, image_id: &str) -> Result<Self, GatewayError> {
        let source = ObjectReference::new(&storage.bucket, image_id)
            .map_err(|e| GatewayError::MalformedRequest(e.to_string()))?;
        Ok(Self {
            storage,
            source,
            stage: Stage::Idle,
        })
    }

    fn advance(&mut self, next: Stage) {
        debug!("{}: {:?} -> {:?}", self.source, self.stage, next);
        self.stage = next;
    }

    async fn run(
        mut self,
        recolor: Arc<dyn Recolor>,
        max_object_size: u64,
    ) -> Result<(), GatewayError> {
        self.advance(Stage::BodyCollected);
        let storage = self.storage;
        let bridge = &storage.bridge;

        let object = bridge
            .fetch_stream(&self.source.bucket, &self.source.key)
            .await
            .map_err(GatewayError::fetch)?;
        self.advance(Stage::Fetched);
        info!("Downloaded '{}'", self.source.key);

        // Pixel data is positional, so chunks must stay in arrival order.
        let working = object
            .collect(max_object_size)
            .await
            .map_err(GatewayError::fetch)?;
        self.advance(Stage::Materialized);
        info!(
            "Converted to a buffer of size {:.1} KB",
            working.len() as f64 / 1024.0
        );

        let result = tokio::task::spawn_blocking(move || recolor.recolor(&working))
            .await
            .map_err(|e| GatewayError::TransformError(format!("worker failed: {}", e)))??;
        self.advance(Stage::Transformed);
        info!(
            "Adjusted colors of '{}' - new size {:.1} KB",
            self.source.key,
            result.len() as f64 / 1024.0
        );

        bridge
            .put_object(
                &self.source.bucket,
                &self.source.key,
                Bytes::from(result),
                &self.source.content_type(),
            )
            .await
            .map_err(|e| GatewayError::StorageUnavailable(e.to_string()))?;
        self.advance(Stage::Uploaded);
        info!("Uploaded updated '{}'", self.source.key);

        self.advance(Stage::Done);
        Ok(())
    }
}

/// Recolor handler
/// POST /change-colors with `{"imageId": "<key>"}`
///
/// Responds 200 with an empty body once the recolored image is stored.
#[instrument(skip(state, body))]
pub async fn change_colors(
    State(state): State<Arc<AppState>>,
    body: Body,
) -> Result<Response, GatewayError> {
    let storage = state
        .storage()
        .map_err(|e| e.during("changing color of image"))?;

    let payload = collect_body(body, state.max_object_size)
        .await
        .map_err(|e| e.during("changing color of image"))?;
    debug!("received '{}' as input data", String::from_utf8_lossy(&payload));

    let request: ChangeColorsRequest = serde_json::from_slice(&payload)
        .map_err(|e| GatewayError::MalformedRequest(e.to_string()).during("changing color of image"))?;

    let during = format!("changing color of image '{}'", request.image_id);
    let job = TransformJob::new(storage, &request.image_id).map_err(|e| e.during(&during))?;
    job.run(state.recolor.clone(), state.max_object_size)
        .await
        .map_err(|e| e.during(&during))?;

    info!("Colorizer finished for '{}'", request.image_id);
    Ok(StatusCode::OK.into_response())
}
