//! Landing page, feature flags and static assets.

use super::{AppState, GatewayError};
use crate::types::FeatureFlags;
use axum::extract::State;
use axum::http::{header, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, instrument, warn};

/// Landing page served for `/`
const LANDING_PAGE: &str = "page.html";

/// Landing page handler
/// GET /
pub async fn landing_page(State(state): State<Arc<AppState>>) -> Result<Response, GatewayError> {
    let content = fs::read(state.static_root.join(LANDING_PAGE))
        .await
        .map_err(|e| GatewayError::PageUnavailable(e.to_string()))?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
        content,
    )
        .into_response())
}

/// Feature flags handler
/// GET /features
pub async fn features(State(state): State<Arc<AppState>>) -> Json<FeatureFlags> {
    Json(state.features.clone())
}

/// Static file fallback for every path no other route claims.
///
/// Paths containing `..` are refused before the filesystem is touched.
#[instrument(skip(state))]
pub async fn static_file(State(state): State<Arc<AppState>>, uri: Uri) -> Result<Response, GatewayError> {
    let relative = uri.path().trim_start_matches('/');
    if relative.contains("..") {
        warn!("Bad path \"{}\"", relative);
        return Err(GatewayError::InvalidPath(relative.to_string()));
    }

    let decoded = urlencoding::decode(relative)
        .map_err(|_| GatewayError::InvalidPath(relative.to_string()))?;
    let decoded = decoded.trim_start_matches('/');
    if decoded.contains("..") {
        warn!("Bad path \"{}\"", decoded);
        return Err(GatewayError::InvalidPath(decoded.to_string()));
    }

    let path = state.static_root.join(decoded);
    let content = fs::read(&path)
        .await
        .map_err(|e| GatewayError::FileNotFound(e.to_string()))?;

    let mime = mime_guess::from_path(&path)
        .first_raw()
        .unwrap_or("text/plain");
    debug!("Serving {:?} as {}", path, mime);

    Ok((StatusCode::OK, [(header::CONTENT_TYPE, mime)], content).into_response())
}
