//! Storage bridge abstraction

mod filesystem;
mod s3;
mod traits;

pub use filesystem::FilesystemBackend;
pub use s3::S3Backend;
pub use traits::{ObjectBody, ObjectBridge, ObjectStream, StorageError};

use crate::config::StorageConfig;
use std::sync::Arc;

/// Construct the configured backend. Called once at startup; the returned
/// bridge is shared by every request.
pub async fn connect(config: &StorageConfig) -> Result<Arc<dyn ObjectBridge>, StorageError> {
    match config {
        StorageConfig::Filesystem { path } => {
            Ok(Arc::new(FilesystemBackend::new(path.clone()).await?))
        }
        StorageConfig::S3 { .. } => Ok(Arc::new(S3Backend::new(config)?)),
    }
}
