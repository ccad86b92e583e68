//! Gateway request handlers
//!
//! Split into submodules by domain:
//! - `object` - upload and streaming of single objects
//! - `bucket` - listing and bulk deletion of bucket contents
//! - `colors` - the fetch, recolor and re-upload pipeline
//! - `pages` - landing page, feature flags and static files

mod bucket;
mod colors;
mod object;
mod pages;

use super::errors::GatewayError;
use crate::colorizer::Recolor;
use crate::storage::ObjectBridge;
use crate::types::FeatureFlags;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub use bucket::{delete_bucket_content, list_bucket_content};
pub use colors::{change_colors, ChangeColorsRequest};
pub use object::{stream_image, upload};
pub use pages::{features, landing_page, static_file};

/// Application state shared across handlers. Immutable after startup.
pub struct AppState {
    /// Bucket and bridge, present only when storage is configured
    pub storage: Option<BucketHandle>,
    pub features: FeatureFlags,
    pub recolor: Arc<dyn Recolor>,
    pub upload_keys: UploadKeys,
    pub static_root: PathBuf,
    pub max_object_size: u64,
}

/// The configured bucket together with the bridge that reaches it.
#[derive(Clone)]
pub struct BucketHandle {
    pub bucket: String,
    pub bridge: Arc<dyn ObjectBridge>,
}

impl AppState {
    /// Storage for handlers that need it.
    pub fn storage(&self) -> Result<&BucketHandle, GatewayError> {
        self.storage
            .as_ref()
            .ok_or(GatewayError::StorageNotConfigured)
    }
}

/// Generates `gallery-pic-<millis>.png` keys for uploads.
///
/// Keys come from the wall clock in milliseconds but are strictly increasing
/// within the process, so two uploads landing in the same millisecond still
/// get distinct keys.
#[derive(Debug, Default)]
pub struct UploadKeys {
    last: AtomicU64,
}

impl UploadKeys {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_key(&self) -> String {
        let now = chrono::Utc::now().timestamp_millis().max(0) as u64;
        let mut last = self.last.load(Ordering::Relaxed);
        loop {
            let candidate = now.max(last + 1);
            match self
                .last
                .compare_exchange_weak(last, candidate, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => return format!("gallery-pic-{}.png", candidate),
                Err(actual) => last = actual,
            }
        }
    }
}

/// The `{"done": "true"}` acknowledgement the browser client expects.
fn done_response() -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        r#"{"done": "true"}"#,
    )
        .into_response()
}
