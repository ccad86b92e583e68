//! HTTP surface of the gateway

mod body;
mod errors;
mod extractors;
pub mod handlers;

pub use errors::GatewayError;
pub use extractors::ImageKey;

use axum::extract::Request;
use axum::http::uri::{PathAndQuery, Uri};
use axum::routing::{get, post};
use axum::{middleware, Router};
use handlers::{
    change_colors, delete_bucket_content, features, landing_page, list_bucket_content,
    static_file, stream_image, upload, AppState,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Build the gateway router.
///
/// Routes:
///   GET  /                      - landing page
///   GET  /features              - enabled optional endpoints
///   POST /change-colors         - recolor an image in place
///   POST /upload                - store the body as a new image
///   GET  /list-bucket-content   - bucket listing as JSON
///   GET  /delete-bucket-content - delete everything listed
///   GET  /image/{key}           - stream an object
///   *    anything else          - static file under the static root
pub fn router(state: Arc<AppState>) -> Router {
    let routes = Router::new()
        .route("/", get(landing_page))
        .route("/features", get(features))
        .route("/change-colors", post(change_colors))
        .route("/upload", post(upload))
        .route("/list-bucket-content", get(list_bucket_content))
        .route("/delete-bucket-content", get(delete_bucket_content))
        .route("/image/*key", get(stream_image))
        .fallback(static_file)
        .with_state(state);

    // Path rewriting has to happen before routing, so the route table sits
    // behind an outer router whose only job is to run the rewrite.
    Router::new()
        .fallback_service(routes)
        .layer(middleware::map_request(collapse_leading_double_slash))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// `//upload` is treated as `/upload`. Only the first slash is dropped.
async fn collapse_leading_double_slash(mut req: Request) -> Request {
    if let Some(uri) = strip_double_slash(req.uri()) {
        *req.uri_mut() = uri;
    }
    req
}

fn strip_double_slash(uri: &Uri) -> Option<Uri> {
    let pq = uri.path_and_query()?;
    if !pq.path().starts_with("//") {
        return None;
    }
    let mut parts = uri.clone().into_parts();
    parts.path_and_query = Some(PathAndQuery::try_from(&pq.as_str()[1..]).ok()?);
    Uri::from_parts(parts).ok()
}
