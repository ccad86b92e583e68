//! Core types shared by the HTTP layer and the storage bridge

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Errors that can occur when validating a user-provided object key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValidationError(String);

impl fmt::Display for KeyValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for KeyValidationError {}

/// A (bucket, key) pair identifying one stored object.
///
/// The key never contains `..` and never starts with `/`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectReference {
    pub bucket: String,
    pub key: String,
}

impl ObjectReference {
    /// Build a reference from an already-decoded key.
    pub fn new(bucket: &str, key: &str) -> Result<Self, KeyValidationError> {
        Ok(Self {
            bucket: bucket.to_string(),
            key: validate_key(key)?,
        })
    }

    /// Resolve the raw text following a route prefix such as `/image/`.
    ///
    /// Drops any query string, percent-decodes, strips leading separators and
    /// then applies the key rules. Needs no bucket, so callers can reject a
    /// bad path before anything else is consulted.
    pub fn key_from_path(raw: &str) -> Result<String, KeyValidationError> {
        let raw = match raw.find('?') {
            Some(idx) => &raw[..idx],
            None => raw,
        };
        let decoded = urlencoding::decode(raw)
            .map_err(|_| KeyValidationError(format!("\"{}\" is not valid percent-encoding", raw)))?;
        validate_key(&decoded)
    }

    /// Content type for storing this object, derived from the key's extension
    pub fn content_type(&self) -> String {
        mime_guess::from_path(&self.key)
            .first_raw()
            .unwrap_or("application/octet-stream")
            .to_string()
    }
}

impl fmt::Display for ObjectReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bucket, self.key)
    }
}

/// Key rules: leading separators are dropped, `..` anywhere is rejected and
/// the result must not be empty.
fn validate_key(key: &str) -> Result<String, KeyValidationError> {
    let key = key.trim_start_matches('/');
    if key.contains("..") {
        return Err(KeyValidationError(format!("\"{}\" contains \"..\"", key)));
    }
    if key.is_empty() {
        return Err(KeyValidationError("Object key must not be empty".to_string()));
    }
    if key.contains('\0') {
        return Err(KeyValidationError(
            "Object key must not contain NUL".to_string(),
        ));
    }
    Ok(key.to_string())
}

/// One row of a bucket listing.
///
/// Field names follow the object-storage listing format the browser client
/// already understands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ObjectEntry {
    pub key: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
    #[serde(rename = "ETag", default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
}

/// Optional endpoint groups that are switched on by configuration.
///
/// Computed once at startup and never mutated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FeatureFlags {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cos: Option<CosFeature>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub colorizer: bool,
}

/// Object storage feature details handed to the browser client
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CosFeature {
    pub bucket: String,
    /// Polling interval for the gallery view, in milliseconds
    pub interval: u64,
}

impl FeatureFlags {
    /// Storage endpoints (and the colorizer, which needs storage) are enabled
    /// only when both a bucket and a storage backend are configured.
    pub fn new(bucket: Option<&str>, storage_configured: bool, interval: u64) -> Self {
        match bucket {
            Some(bucket) if storage_configured && !bucket.is_empty() => Self {
                cos: Some(CosFeature {
                    bucket: bucket.to_string(),
                    interval,
                }),
                colorizer: true,
            },
            _ => Self::default(),
        }
    }
}
