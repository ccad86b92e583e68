//! Filesystem-based storage backend for local development and tests

use super::traits::{ObjectBody, ObjectBridge, StorageError};
use crate::types::ObjectEntry;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::fs;
use tokio_util::io::ReaderStream;
use tracing::{debug, instrument, warn};

/// Prefix of in-flight temp files; never reported by listings.
const TMP_PREFIX: &str = ".tmp";

/// Atomically write data to a file using write-to-temp + fsync + rename.
async fn atomic_write(path: &Path, data: Bytes) -> Result<(), StorageError> {
    let parent = path
        .parent()
        .ok_or_else(|| StorageError::Other("Cannot atomic-write to a path with no parent".into()))?
        .to_path_buf();
    let path = path.to_path_buf();

    tokio::task::spawn_blocking(move || {
        let mut tmp = tempfile::Builder::new()
            .prefix(TMP_PREFIX)
            .tempfile_in(&parent)?;
        tmp.write_all(&data)?;
        tmp.as_file().sync_all()?;
        persist(tmp, &path)
    })
    .await
    .map_err(|e| StorageError::Other(format!("spawn_blocking join failed: {}", e)))?
}

fn persist(tmp: NamedTempFile, path: &Path) -> Result<(), StorageError> {
    tmp.persist(path).map_err(|e| StorageError::Io(e.error))?;
    Ok(())
}

/// Filesystem storage backend
///
/// Storage layout:
/// ```text
/// {root}/{bucket}/{key}
/// ```
///
/// Keys containing `/` become nested directories. Buckets are created on
/// first write.
pub struct FilesystemBackend {
    /// Root directory for all data
    root: PathBuf,
}

impl FilesystemBackend {
    /// Create a new filesystem backend with the given root directory.
    pub async fn new(root: PathBuf) -> Result<Self, StorageError> {
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    /// Resolve a bucket directory, refusing anything but a single plain name.
    fn bucket_dir(&self, bucket: &str) -> Result<PathBuf, StorageError> {
        let mut components = Path::new(bucket).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Ok(self.root.join(bucket)),
            _ => Err(StorageError::InvalidKey(format!("bucket \"{}\"", bucket))),
        }
    }

    /// Resolve the data file for a key. Only plain path components are
    /// accepted, so no key can address a file outside its bucket.
    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(key);
        let plain = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !plain {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.bucket_dir(bucket)?.join(relative))
    }

    /// Collect every regular file under a bucket directory.
    async fn walk_bucket(&self, bucket_dir: &Path) -> Result<Vec<ObjectEntry>, StorageError> {
        let mut entries = Vec::new();
        let mut pending = vec![bucket_dir.to_path_buf()];

        while let Some(dir) = pending.pop() {
            let mut read_dir = match fs::read_dir(&dir).await {
                Ok(rd) => rd,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            while let Some(entry) = read_dir.next_entry().await? {
                let path = entry.path();
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    pending.push(path);
                    continue;
                }
                if !file_type.is_file() {
                    continue;
                }
                if entry.file_name().to_string_lossy().starts_with(TMP_PREFIX) {
                    continue;
                }
                let Some(key) = relative_key(bucket_dir, &path) else {
                    warn!("Skipping non UTF-8 path {:?}", path);
                    continue;
                };
                let meta = entry.metadata().await?;
                let last_modified: DateTime<Utc> = meta
                    .modified()
                    .map(DateTime::<Utc>::from)
                    .unwrap_or_else(|_| Utc::now());
                entries.push(ObjectEntry {
                    key,
                    size: meta.len(),
                    last_modified,
                    etag: None,
                });
            }
        }

        entries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(entries)
    }

    /// Remove empty directories left behind by deletes, stopping at the bucket.
    async fn prune_empty_parents(&self, bucket_dir: &Path, path: &Path) {
        let mut current = path.parent();
        while let Some(dir) = current {
            if dir == bucket_dir || !dir.starts_with(bucket_dir) {
                break;
            }
            if fs::remove_dir(dir).await.is_err() {
                break;
            }
            current = dir.parent();
        }
    }
}

/// Key of a file relative to its bucket directory, always `/`-separated.
fn relative_key(bucket_dir: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(bucket_dir).ok()?;
    let parts: Option<Vec<&str>> = relative.components().map(|c| c.as_os_str().to_str()).collect();
    Some(parts?.join("/"))
}

#[async_trait]
impl ObjectBridge for FilesystemBackend {
    fn name(&self) -> &'static str {
        "filesystem"
    }

    #[instrument(skip(self))]
    async fn fetch_stream(&self, bucket: &str, key: &str) -> Result<ObjectBody, StorageError> {
        let path = self.object_path(bucket, key)?;
        let file = match fs::File::open(&path).await {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(format!("{}/{}", bucket, key)));
            }
            Err(e) => return Err(e.into()),
        };
        let meta = file.metadata().await?;
        if !meta.is_file() {
            return Err(StorageError::NotFound(format!("{}/{}", bucket, key)));
        }

        let stream = ReaderStream::new(file).map(|chunk| chunk.map_err(StorageError::Io));
        debug!("Opened file stream for {}/{} ({} bytes)", bucket, key, meta.len());
        Ok(ObjectBody {
            stream: Box::pin(stream),
            content_type: mime_guess::from_path(key).first_raw().map(str::to_string),
            content_length: Some(meta.len()),
        })
    }

    #[instrument(skip(self, data))]
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<(), StorageError> {
        let path = self.object_path(bucket, key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let len = data.len();
        atomic_write(&path, data).await?;
        debug!("Wrote {}/{} ({} bytes, {})", bucket, key, len, content_type);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> Result<Vec<ObjectEntry>, StorageError> {
        let bucket_dir = self.bucket_dir(bucket)?;
        let mut entries = self.walk_bucket(&bucket_dir).await?;
        entries.retain(|e| e.key.starts_with(prefix));
        debug!("Listed {} objects in {}/{}", entries.len(), bucket, prefix);
        Ok(entries)
    }

    #[instrument(skip(self, keys), fields(count = keys.len()))]
    async fn delete_objects(&self, bucket: &str, keys: &[String]) -> Result<(), StorageError> {
        let bucket_dir = self.bucket_dir(bucket)?;
        for key in keys {
            let path = self.object_path(bucket, key)?;
            match fs::remove_file(&path).await {
                Ok(()) => self.prune_empty_parents(&bucket_dir, &path).await,
                // Already gone counts as deleted, like a batched S3 delete.
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        debug!("Deleted {} objects from {}", keys.len(), bucket);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn backend() -> (TempDir, FilesystemBackend) {
        let dir = TempDir::new().unwrap();
        let backend = FilesystemBackend::new(dir.path().to_path_buf()).await.unwrap();
        (dir, backend)
    }

    #[tokio::test]
    async fn test_put_then_fetch_round_trip() {
        let (_dir, backend) = backend().await;
        let data = Bytes::from((0..=255u8).cycle().take(200_000).collect::<Vec<u8>>());
        backend
            .put_object("gallery", "pics/a.png", data.clone(), "image/png")
            .await
            .unwrap();

        let body = backend.fetch_stream("gallery", "pics/a.png").await.unwrap();
        assert_eq!(body.content_length, Some(200_000));
        assert_eq!(body.content_type.as_deref(), Some("image/png"));
        let read = body.collect(u64::MAX).await.unwrap();
        assert_eq!(read, data);
    }

    #[tokio::test]
    async fn test_fetch_missing_is_not_found() {
        let (_dir, backend) = backend().await;
        let err = backend.fetch_stream("gallery", "missing.png").await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_rejects_escaping_keys() {
        let (_dir, backend) = backend().await;
        for key in ["../outside", "/abs", "a/../../b", ""] {
            let err = backend
                .put_object("gallery", key, Bytes::from_static(b"x"), "text/plain")
                .await
                .unwrap_err();
            assert!(matches!(err, StorageError::InvalidKey(_)), "key {:?}", key);
        }
        let err = backend.list_objects("../etc", "").await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidKey(_)));
    }

    #[tokio::test]
    async fn test_list_is_sorted_and_prefix_filtered() {
        let (_dir, backend) = backend().await;
        for key in ["b.png", "a.png", "nested/c.png"] {
            backend
                .put_object("gallery", key, Bytes::from_static(b"1234"), "image/png")
                .await
                .unwrap();
        }

        let all = backend.list_objects("gallery", "").await.unwrap();
        let keys: Vec<_> = all.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["a.png", "b.png", "nested/c.png"]);
        assert!(all.iter().all(|e| e.size == 4));

        let nested = backend.list_objects("gallery", "nested/").await.unwrap();
        assert_eq!(nested.len(), 1);
    }

    #[tokio::test]
    async fn test_list_missing_bucket_is_empty() {
        let (_dir, backend) = backend().await;
        assert!(backend.list_objects("nobody", "").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_objects_tolerates_missing_keys() {
        let (dir, backend) = backend().await;
        backend
            .put_object("gallery", "nested/c.png", Bytes::from_static(b"x"), "image/png")
            .await
            .unwrap();

        backend
            .delete_objects(
                "gallery",
                &["nested/c.png".to_string(), "gone.png".to_string()],
            )
            .await
            .unwrap();

        assert!(backend.list_objects("gallery", "").await.unwrap().is_empty());
        assert!(!dir.path().join("gallery/nested").exists());
        backend.delete_objects("gallery", &[]).await.unwrap();
    }
}
