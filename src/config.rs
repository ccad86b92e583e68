//! Configuration for the image gateway

use crate::types::FeatureFlags;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Default IBM Cloud Object Storage endpoint used when only credentials are set.
pub const DEFAULT_COS_ENDPOINT: &str = "s3.eu-de.cloud-object-storage.appdomain.cloud";

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Address to listen on
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// Directory holding `page.html` and the other static assets
    #[serde(default = "default_static_root")]
    pub static_root: PathBuf,

    /// Largest request body or fetched object held in memory, in bytes
    #[serde(default = "default_max_object_size")]
    pub max_object_size: u64,

    /// Degrees the colorizer rotates every pixel's hue by
    #[serde(default = "default_hue_rotation")]
    pub hue_rotation: i32,

    /// Bucket holding the gallery. Storage endpoints are disabled without it.
    #[serde(default)]
    pub bucket: Option<String>,

    /// Gallery polling interval advertised to the browser, in milliseconds
    #[serde(default = "default_check_interval_ms")]
    pub check_interval_ms: u64,

    /// Storage backend. Storage endpoints are disabled without it.
    #[serde(default)]
    pub storage: Option<StorageConfig>,

    /// Log level filter string. Overridden by RUST_LOG.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Storage backend configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Local directory, for development and tests
    Filesystem {
        /// Directory for data storage
        path: PathBuf,
    },

    /// S3-compatible object storage
    S3 {
        /// Endpoint host or URL. Uses the AWS default endpoint when unset.
        #[serde(default)]
        endpoint: Option<String>,

        #[serde(default = "default_region")]
        region: String,

        /// Use path-style URLs (required for MinIO and most COS setups)
        #[serde(default = "default_force_path_style")]
        force_path_style: bool,

        #[serde(default)]
        access_key_id: Option<String>,

        #[serde(default)]
        secret_access_key: Option<String>,
    },
}

impl std::fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageConfig::Filesystem { path } => {
                f.debug_struct("Filesystem").field("path", path).finish()
            }
            StorageConfig::S3 {
                endpoint,
                region,
                force_path_style,
                access_key_id,
                secret_access_key,
            } => f
                .debug_struct("S3")
                .field("endpoint", endpoint)
                .field("region", region)
                .field("force_path_style", force_path_style)
                .field("access_key_id", &access_key_id.as_ref().map(|_| "*****"))
                .field("secret_access_key", &secret_access_key.as_ref().map(|_| "*****"))
                .finish(),
        }
    }
}

// Default value functions for serde
fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_static_root() -> PathBuf {
    PathBuf::from("./public")
}

fn default_max_object_size() -> u64 {
    20 * 1024 * 1024 // 20MB
}

fn default_hue_rotation() -> i32 {
    180
}

fn default_check_interval_ms() -> u64 {
    1_000
}

fn default_region() -> String {
    "eu-de".to_string()
}

fn default_force_path_style() -> bool {
    true
}

fn default_log_level() -> String {
    "image_gateway=debug,tower_http=debug".to_string()
}

/// `CHECK_INTERVAL` semantics: anything unparsable or zero falls back to the default.
fn parse_interval(raw: &str) -> u64 {
    match raw.trim().parse::<u64>() {
        Ok(0) | Err(_) => default_check_interval_ms(),
        Ok(ms) => ms,
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            static_root: default_static_root(),
            max_object_size: default_max_object_size(),
            hue_rotation: default_hue_rotation(),
            bucket: None,
            check_interval_ms: default_check_interval_ms(),
            storage: None,
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        let config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Ok(config)
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a configuration from any variable source.
    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(addr) = var("GW_LISTEN_ADDR") {
            if let Ok(parsed) = addr.parse() {
                config.listen_addr = parsed;
            }
        }

        if let Some(root) = var("GW_STATIC_ROOT") {
            config.static_root = PathBuf::from(root);
        }

        if let Some(size) = var("GW_MAX_OBJECT_SIZE") {
            if let Ok(parsed) = size.parse() {
                config.max_object_size = parsed;
            }
        }

        if let Some(degrees) = var("GW_HUE_ROTATION") {
            if let Ok(parsed) = degrees.parse() {
                config.hue_rotation = parsed;
            }
        }

        config.bucket = var("BUCKET").filter(|b| !b.is_empty());

        if let Some(interval) = var("CHECK_INTERVAL") {
            config.check_interval_ms = parse_interval(&interval);
        }

        // Object storage: HMAC credentials select S3, otherwise a local directory.
        if let Some(access_key_id) = var("CLOUD_OBJECT_STORAGE_ACCESS_KEY_ID") {
            config.storage = Some(StorageConfig::S3 {
                endpoint: Some(
                    var("CLOUD_OBJECT_STORAGE_ENDPOINT")
                        .unwrap_or_else(|| DEFAULT_COS_ENDPOINT.to_string()),
                ),
                region: var("CLOUD_OBJECT_STORAGE_REGION").unwrap_or_else(default_region),
                force_path_style: var("CLOUD_OBJECT_STORAGE_PATH_STYLE")
                    .map(|v| v == "true" || v == "1")
                    .unwrap_or(true),
                access_key_id: Some(access_key_id),
                secret_access_key: var("CLOUD_OBJECT_STORAGE_SECRET_ACCESS_KEY"),
            });
        } else if let Some(dir) = var("GW_DATA_DIR") {
            config.storage = Some(StorageConfig::Filesystem {
                path: PathBuf::from(dir),
            });
        }

        if let Some(level) = var("GW_LOG_LEVEL") {
            config.log_level = level;
        }

        config
    }

    /// Load configuration from file if it exists, otherwise from environment
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = std::env::var("GW_CONFIG") {
            return Self::from_file(&path);
        }

        for path in &["image_gateway.toml", "/etc/image_gateway/config.toml"] {
            if std::path::Path::new(path).exists() {
                return Self::from_file(path);
            }
        }

        Ok(Self::from_env())
    }

    /// Configured bucket name. An empty name counts as unset.
    pub fn bucket_name(&self) -> Option<&str> {
        self.bucket.as_deref().filter(|b| !b.is_empty())
    }

    /// Feature flags advertised on `/features`
    pub fn features(&self) -> FeatureFlags {
        FeatureFlags::new(
            self.bucket_name(),
            self.storage.is_some(),
            self.check_interval_ms,
        )
    }

    /// IAM-style COS variables that are set but cannot be used, because
    /// only HMAC credentials are supported.
    pub fn ignored_env_vars() -> Vec<&'static str> {
        ignored_vars_in(|name| std::env::var(name).ok())
    }
}

/// Variables ignored when no HMAC access key is present.
const IAM_ONLY_VARS: [&str; 2] = [
    "CLOUD_OBJECT_STORAGE_APIKEY",
    "CLOUD_OBJECT_STORAGE_RESOURCE_INSTANCE_ID",
];

fn ignored_vars_in(var: impl Fn(&str) -> Option<String>) -> Vec<&'static str> {
    if var("CLOUD_OBJECT_STORAGE_ACCESS_KEY_ID").is_some() {
        return Vec::new();
    }
    IAM_ONLY_VARS
        .into_iter()
        .filter(|&name| var(name).is_some())
        .collect()
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Parse error: {0}")]
    Parse(String),
}
