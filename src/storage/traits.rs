//! Storage bridge trait definitions

use crate::types::ObjectEntry;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::stream::BoxStream;
use futures::StreamExt;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Invalid object key: {0}")]
    InvalidKey(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Object too large: more than {max} bytes")]
    TooLarge { max: u64 },

    #[error("S3 error: {0}")]
    S3(String),

    #[error("Storage error: {0}")]
    Other(String),
}

/// Chunked object content, yielded in storage order.
pub type ObjectStream = BoxStream<'static, Result<Bytes, StorageError>>;

/// A stored object opened for reading.
pub struct ObjectBody {
    pub stream: ObjectStream,
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
}

impl std::fmt::Debug for ObjectBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectBody")
            .field("content_type", &self.content_type)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

impl ObjectBody {
    /// Concatenate every chunk in arrival order into one buffer.
    ///
    /// Fails with `TooLarge` as soon as more than `max` bytes have arrived.
    pub async fn collect(self, max: u64) -> Result<Bytes, StorageError> {
        let mut stream = self.stream;
        let mut buf = match self.content_length {
            Some(len) if len <= max => BytesMut::with_capacity(len as usize),
            _ => BytesMut::new(),
        };
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            if (buf.len() + chunk.len()) as u64 > max {
                return Err(StorageError::TooLarge { max });
            }
            buf.extend_from_slice(&chunk);
        }
        Ok(buf.freeze())
    }
}

/// Object storage capabilities the gateway depends on.
///
/// One instance is shared by every request; implementations carry no
/// per-request state. This trait is object-safe and is used as
/// `Arc<dyn ObjectBridge>`.
#[async_trait]
pub trait ObjectBridge: Send + Sync {
    /// Short backend label for logs
    fn name(&self) -> &'static str;

    /// Open an object as a chunk stream without reading it into memory
    async fn fetch_stream(&self, bucket: &str, key: &str) -> Result<ObjectBody, StorageError>;

    /// Store a complete buffer as an object, replacing any previous content
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<(), StorageError>;

    /// List every object under a prefix, ordered by key
    async fn list_objects(&self, bucket: &str, prefix: &str)
        -> Result<Vec<ObjectEntry>, StorageError>;

    /// Delete a batch of keys.
    ///
    /// Best-effort: a backend may remove only some of the keys. Only the
    /// overall outcome of the call is reported. An empty batch is a no-op.
    async fn delete_objects(&self, bucket: &str, keys: &[String]) -> Result<(), StorageError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body_of(chunks: Vec<&'static [u8]>, content_length: Option<u64>) -> ObjectBody {
        let stream = futures::stream::iter(
            chunks
                .into_iter()
                .map(|c| Ok::<_, StorageError>(Bytes::from_static(c))),
        );
        ObjectBody {
            stream: Box::pin(stream),
            content_type: None,
            content_length,
        }
    }

    #[tokio::test]
    async fn test_collect_keeps_chunk_order() {
        let body = body_of(vec![b"ab", b"cd", b"e"], Some(5));
        let data = body.collect(1024).await.unwrap();
        assert_eq!(&data[..], b"abcde");
    }

    #[tokio::test]
    async fn test_collect_rejects_oversized_stream() {
        let body = body_of(vec![b"0123", b"4567", b"89"], None);
        let err = body.collect(8).await.unwrap_err();
        assert!(matches!(err, StorageError::TooLarge { max: 8 }));
    }

    #[tokio::test]
    async fn test_collect_stops_at_first_error() {
        let stream = futures::stream::iter(vec![
            Ok(Bytes::from_static(b"ok")),
            Err(StorageError::S3("connection reset".to_string())),
            Ok(Bytes::from_static(b"never")),
        ]);
        let body = ObjectBody {
            stream: Box::pin(stream),
            content_type: None,
            content_length: None,
        };
        let err = body.collect(1024).await.unwrap_err();
        assert!(err.to_string().contains("connection reset"));
    }
}
