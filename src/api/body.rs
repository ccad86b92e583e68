//! Inbound request body accumulation

use super::errors::GatewayError;
use axum::body::{Body, Bytes};
use bytes::BytesMut;
use futures::{Stream, StreamExt};
use tracing::debug;

/// Read a request body to completion.
///
/// Chunks are appended in arrival order and the buffer is returned only once
/// the body signals its end. The first transport error ends the read, as
/// does crossing `limit`; nothing after that is consumed.
pub async fn collect_body(body: Body, limit: u64) -> Result<Bytes, GatewayError> {
    collect_chunks(body.into_data_stream(), limit).await
}

async fn collect_chunks<S, E>(chunks: S, limit: u64) -> Result<Bytes, GatewayError>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: std::fmt::Display,
{
    let mut chunks = std::pin::pin!(chunks);
    let mut buf = BytesMut::new();
    let mut count = 0usize;

    while let Some(chunk) = chunks.next().await {
        let chunk = chunk.map_err(|e| GatewayError::BodyReadError(e.to_string()))?;
        if (buf.len() + chunk.len()) as u64 > limit {
            return Err(GatewayError::PayloadTooLarge { limit });
        }
        buf.extend_from_slice(&chunk);
        count += 1;
    }

    debug!("Collected request body: {} bytes in {} chunks", buf.len(), count);
    Ok(buf.freeze())
}
