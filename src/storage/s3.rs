//! S3 storage backend implementation using AWS SDK
//!
//! Works against AWS and S3-compatible object stores (IBM Cloud Object
//! Storage, MinIO, Ceph) using HMAC credentials.

use super::traits::{ObjectBody, ObjectBridge, StorageError};
use crate::config::StorageConfig;
use crate::types::ObjectEntry;
use async_trait::async_trait;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::BehaviorVersion;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::operation::list_objects_v2::ListObjectsV2Output;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{Delete, ObjectIdentifier};
use aws_sdk_s3::Client;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tracing::{debug, instrument, warn};

/// S3 storage backend
pub struct S3Backend {
    client: Client,
}

impl S3Backend {
    /// DeleteObjects accepts at most this many keys per request.
    const MAX_DELETE_BATCH: usize = 1000;

    /// Build an S3 client from a StorageConfig.
    pub fn build_client(config: &StorageConfig) -> Result<Client, StorageError> {
        let StorageConfig::S3 {
            endpoint,
            region,
            force_path_style,
            access_key_id,
            secret_access_key,
        } = config
        else {
            return Err(StorageError::Other(
                "S3Backend requires S3 configuration".to_string(),
            ));
        };

        // Require explicit credentials, never fall back to the default AWS credential chain
        let credentials = match (access_key_id, secret_access_key) {
            (Some(key_id), Some(secret)) => {
                Credentials::new(key_id, secret, None, None, "image_gateway-config")
            }
            _ => {
                return Err(StorageError::Other(
                    "S3 storage requires explicit credentials: set CLOUD_OBJECT_STORAGE_ACCESS_KEY_ID and CLOUD_OBJECT_STORAGE_SECRET_ACCESS_KEY".to_string(),
                ));
            }
        };

        let mut s3_config_builder = aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(aws_sdk_s3::config::Region::new(region.clone()))
            .credentials_provider(credentials)
            .force_path_style(*force_path_style);

        if let Some(ep) = endpoint {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint_url(ep));
        }

        Ok(Client::from_conf(s3_config_builder.build()))
    }

    /// Create a new S3 backend from configuration
    pub fn new(config: &StorageConfig) -> Result<Self, StorageError> {
        let client = Self::build_client(config)?;
        debug!("S3Backend initialized");
        Ok(Self { client })
    }

    /// Map an SDK error to a storage error with the failing operation as context.
    fn classify_s3_error(
        bucket: &str,
        e: &SdkError<impl std::fmt::Debug>,
        context: &str,
    ) -> StorageError {
        if let SdkError::ServiceError(ref svc) = e {
            let status = svc.raw().status().as_u16();
            if status == 404 {
                let debug_str = format!("{:?}", svc.err());
                if debug_str.contains("NoSuchBucket") {
                    return StorageError::NotFound(format!("bucket {}", bucket));
                }
            }
            return StorageError::S3(format!(
                "{} failed with status {}: {:?}",
                context,
                status,
                svc.err()
            ));
        }
        StorageError::S3(format!("{} failed: {}", context, e))
    }
}

/// Append one listing page to `results` and return the token for the next
/// page, or `None` when the listing is complete.
fn read_list_page(
    bucket: &str,
    page: &ListObjectsV2Output,
    results: &mut Vec<ObjectEntry>,
) -> Option<String> {
    for object in page.contents() {
        let Some(key) = object.key() else { continue };
        results.push(ObjectEntry {
            key: key.to_string(),
            size: object.size().unwrap_or(0).max(0) as u64,
            last_modified: object
                .last_modified()
                .and_then(to_chrono)
                .unwrap_or_else(Utc::now),
            etag: object.e_tag().map(|e| e.trim_matches('"').to_string()),
        });
    }

    if !page.is_truncated().unwrap_or(false) {
        return None;
    }
    let token = page.next_continuation_token().map(str::to_string);
    if token.is_none() {
        warn!("Truncated listing of {} without a continuation token", bucket);
    }
    token
}

/// Split keys into quiet `DeleteObjects` payloads of at most
/// `MAX_DELETE_BATCH` keys each, preserving order.
fn delete_batches(keys: &[String]) -> Result<Vec<Delete>, StorageError> {
    keys.chunks(S3Backend::MAX_DELETE_BATCH)
        .map(|batch| {
            let objects = batch
                .iter()
                .map(|key| ObjectIdentifier::builder().key(key).build())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| StorageError::Other(format!("Invalid delete key: {}", e)))?;
            Delete::builder()
                .set_objects(Some(objects))
                .quiet(true)
                .build()
                .map_err(|e| StorageError::Other(format!("Invalid delete request: {}", e)))
        })
        .collect()
}

/// Endpoints may be configured as bare host names.
fn endpoint_url(endpoint: &str) -> String {
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        endpoint.to_string()
    } else {
        format!("https://{}", endpoint)
    }
}

fn to_chrono(dt: &aws_sdk_s3::primitives::DateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(dt.secs(), dt.subsec_nanos())
}

#[async_trait]
impl ObjectBridge for S3Backend {
    fn name(&self) -> &'static str {
        "s3"
    }

    #[instrument(skip(self))]
    async fn fetch_stream(&self, bucket: &str, key: &str) -> Result<ObjectBody, StorageError> {
        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if let SdkError::ServiceError(service_error) = &e {
                    if matches!(
                        service_error.err(),
                        aws_sdk_s3::operation::get_object::GetObjectError::NoSuchKey(_)
                    ) {
                        return StorageError::NotFound(format!("{}/{}", bucket, key));
                    }
                }
                Self::classify_s3_error(bucket, &e, "get_object")
            })?;

        debug!("S3 GET stream {}/{}", bucket, key);

        let content_type = response.content_type().map(str::to_string);
        let content_length = response
            .content_length()
            .and_then(|len| u64::try_from(len).ok());

        // Stream chunks directly from the S3 response body without buffering.
        let stream = futures::stream::unfold(response.body, |mut body| async {
            match body.try_next().await {
                Ok(Some(chunk)) => Some((Ok(chunk), body)),
                Ok(None) => None,
                Err(e) => Some((
                    Err(StorageError::S3(format!(
                        "Failed to read response body: {}",
                        e
                    ))),
                    body,
                )),
            }
        });

        Ok(ObjectBody {
            stream: Box::pin(stream),
            content_type,
            content_length,
        })
    }

    #[instrument(skip(self, data), fields(size = data.len()))]
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<(), StorageError> {
        let len = data.len();
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(data))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| Self::classify_s3_error(bucket, &e, "put_object"))?;

        debug!("S3 PUT {}/{} ({} bytes)", bucket, key, len);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> Result<Vec<ObjectEntry>, StorageError> {
        let mut results = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut request = self.client.list_objects_v2().bucket(bucket).prefix(prefix);

            if let Some(token) = continuation_token {
                request = request.continuation_token(token);
            }

            let response = request
                .send()
                .await
                .map_err(|e| Self::classify_s3_error(bucket, &e, "list_objects_v2"))?;

            continuation_token = read_list_page(bucket, &response, &mut results);
            if continuation_token.is_none() {
                break;
            }
        }

        debug!("Listed {} objects in {}/{}", results.len(), bucket, prefix);
        Ok(results)
    }

    #[instrument(skip(self, keys), fields(count = keys.len()))]
    async fn delete_objects(&self, bucket: &str, keys: &[String]) -> Result<(), StorageError> {
        for delete in delete_batches(keys)? {
            let count = delete.objects().len();
            let response = self
                .client
                .delete_objects()
                .bucket(bucket)
                .delete(delete)
                .send()
                .await
                .map_err(|e| Self::classify_s3_error(bucket, &e, "delete_objects"))?;

            // Per-key failures are logged but do not fail the batch.
            for error in response.errors() {
                warn!(
                    "Failed to delete {}/{}: {}",
                    bucket,
                    error.key().unwrap_or("?"),
                    error.message().unwrap_or("unknown error")
                );
            }
            debug!("S3 DELETE batch of {} keys in {}", count, bucket);
        }
        Ok(())
    }
}
