//! Shared test infrastructure for integration tests
//!
//! Provides TestServer (filesystem, S3 or no storage), HTTP helpers for the
//! gateway routes, image/data generators, and MinIO availability gating.

#![allow(dead_code)]

use aws_credential_types::Credentials;
use aws_sdk_s3::config::{BehaviorVersion, Region};
use aws_sdk_s3::Client;
use rand::{Rng, SeedableRng};
use serde_json::Value;
use std::io::Cursor;
use std::process::{Child, Command};
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::sleep;

/// Port counter to avoid conflicts between tests.
static PORT_COUNTER: AtomicU16 = AtomicU16::new(19400);

/// Bucket every filesystem-backed test server is configured with
pub const TEST_BUCKET: &str = "gallery";

/// MinIO configuration constants
pub const MINIO_ENDPOINT: &str = "http://localhost:9000";
pub const MINIO_BUCKET: &str = "image-gateway-test";
pub const MINIO_ACCESS_KEY: &str = "minioadmin";
pub const MINIO_SECRET_KEY: &str = "minioadmin";

/// Landing page written into each server's static root
pub const LANDING_PAGE: &str = "<!doctype html><title>gallery</title>";

/// Test server wrapper that spawns a real image_gateway binary
pub struct TestServer {
    process: Child,
    port: u16,
    data_dir: TempDir,
    _static_dir: TempDir,
    bucket: String,
}

impl TestServer {
    // ── Factory methods ──

    /// Start a test server backed by a local directory
    pub async fn filesystem() -> Self {
        Self::spawn_with_config("", Some(TEST_BUCKET), Backend::Filesystem).await
    }

    /// Start a test server with a custom max object size
    pub async fn filesystem_with_max_object_size(max_size: u64) -> Self {
        let extra = format!("max_object_size = {}\n", max_size);
        Self::spawn_with_config(&extra, Some(TEST_BUCKET), Backend::Filesystem).await
    }

    /// Start a test server with filesystem storage but the given bucket name
    pub async fn filesystem_with_bucket(bucket: &str) -> Self {
        Self::spawn_with_config("", Some(bucket), Backend::Filesystem).await
    }

    /// Start a test server against MinIO (needs MinIO running)
    pub async fn s3() -> Self {
        Self::s3_with_bucket(MINIO_BUCKET).await
    }

    /// Start a test server against a MinIO bucket, creating it if needed.
    pub async fn s3_with_bucket(bucket: &str) -> Self {
        let _ = minio_client().await.create_bucket().bucket(bucket).send().await;
        Self::spawn_with_config("", Some(bucket), Backend::S3).await
    }

    /// Start a test server with no object storage configured
    pub async fn without_storage() -> Self {
        Self::spawn_with_config("", None, Backend::Unconfigured).await
    }

    // ── Shared spawn logic ──

    /// Allocate a port, write a TOML config and static assets, spawn the
    /// gateway and wait for readiness. All factory methods delegate here.
    async fn spawn_with_config(extra: &str, bucket: Option<&str>, backend: Backend) -> Self {
        let port = PORT_COUNTER.fetch_add(1, Ordering::SeqCst);
        let data_dir = TempDir::new().expect("Failed to create temp dir");
        let static_dir = TempDir::new().expect("Failed to create static dir");

        std::fs::write(static_dir.path().join("page.html"), LANDING_PAGE)
            .expect("Failed to write page.html");
        std::fs::write(static_dir.path().join("app.js"), "window.gallery = {};\n")
            .expect("Failed to write app.js");
        std::fs::create_dir(static_dir.path().join("css")).expect("Failed to create css dir");
        std::fs::write(static_dir.path().join("css/site.css"), "body { margin: 0 }\n")
            .expect("Failed to write site.css");

        let mut config = format!(
            "listen_addr = \"127.0.0.1:{}\"\nstatic_root = \"{}\"\ncheck_interval_ms = 2500\n{}",
            port,
            static_dir.path().display(),
            extra
        );
        if let Some(bucket) = bucket {
            config.push_str(&format!("bucket = \"{}\"\n", bucket));
        }
        match backend {
            Backend::Filesystem => config.push_str(&format!(
                "\n[storage]\ntype = \"filesystem\"\npath = \"{}\"\n",
                data_dir.path().join("objects").display()
            )),
            Backend::S3 => config.push_str(&format!(
                concat!(
                    "\n[storage]\n",
                    "type = \"s3\"\n",
                    "endpoint = \"{}\"\n",
                    "region = \"us-east-1\"\n",
                    "force_path_style = true\n",
                    "access_key_id = \"{}\"\n",
                    "secret_access_key = \"{}\"\n",
                ),
                MINIO_ENDPOINT, MINIO_ACCESS_KEY, MINIO_SECRET_KEY,
            )),
            Backend::Unconfigured => {}
        }

        let config_path = data_dir.path().join("test.toml");
        std::fs::write(&config_path, &config).expect("Failed to write test config");

        let process = Command::new(env!("CARGO_BIN_EXE_image_gateway"))
            .env("GW_CONFIG", &config_path)
            .env("RUST_LOG", "image_gateway=warn")
            .spawn()
            .expect("Failed to start server");

        let mut server = Self {
            process,
            port,
            data_dir,
            _static_dir: static_dir,
            bucket: bucket.unwrap_or_default().to_string(),
        };
        server.wait_ready().await;
        server
    }

    // ── Instance methods ──

    async fn wait_ready(&mut self) {
        let addr = format!("127.0.0.1:{}", self.port);
        for _ in 0..150 {
            if std::net::TcpStream::connect(&addr).is_ok() {
                sleep(Duration::from_millis(100)).await;
                return;
            }

            if let Ok(Some(status)) = self.process.try_wait() {
                panic!("Server exited before becoming ready: {}", status);
            }
            sleep(Duration::from_millis(100)).await;
        }

        let _ = self.process.kill();
        panic!("Timed out waiting for server on {}", addr);
    }

    /// Get the HTTP endpoint URL
    pub fn endpoint(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    /// Build a URL for a path on this server
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.endpoint(), path)
    }

    /// Get the configured bucket name
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Write an object straight into the backing directory, bypassing HTTP.
    pub fn seed_object(&self, key: &str, data: &[u8]) {
        let path = self.data_dir.path().join("objects").join(&self.bucket).join(key);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create object dir");
        }
        std::fs::write(path, data).expect("Failed to seed object");
    }

    /// Read an object straight from the backing directory.
    pub fn stored_object(&self, key: &str) -> Vec<u8> {
        let path = self.data_dir.path().join("objects").join(&self.bucket).join(key);
        std::fs::read(path).expect("Failed to read stored object")
    }
}

/// Storage backend a test server is configured with
enum Backend {
    Filesystem,
    S3,
    Unconfigured,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.process.kill();
    }
}

// === Shared HTTP helpers (reqwest) ===

/// POST raw bytes to /upload and assert the acknowledgement.
pub async fn upload(client: &reqwest::Client, server: &TestServer, data: Vec<u8>) {
    let resp = client
        .post(server.url("/upload"))
        .body(data)
        .send()
        .await
        .expect("upload failed");
    assert_eq!(resp.status().as_u16(), 200, "upload failed");
    let ack: Value = resp.json().await.unwrap();
    assert_eq!(ack["done"], "true");
}

/// GET /list-bucket-content and return the parsed entries.
pub async fn list(client: &reqwest::Client, server: &TestServer) -> Vec<Value> {
    let resp = client
        .get(server.url("/list-bucket-content"))
        .send()
        .await
        .expect("list failed");
    assert_eq!(resp.status().as_u16(), 200, "list failed");
    resp.json().await.unwrap()
}

/// Keys of every listed object
pub async fn list_keys(client: &reqwest::Client, server: &TestServer) -> Vec<String> {
    list(client, server)
        .await
        .iter()
        .map(|entry| entry["Key"].as_str().unwrap().to_string())
        .collect()
}

/// GET /image/{key} and return the body bytes.
pub async fn get_image(client: &reqwest::Client, server: &TestServer, key: &str) -> Vec<u8> {
    let resp = client
        .get(server.url(&format!("/image/{}", key)))
        .send()
        .await
        .expect("GET failed");
    assert_eq!(resp.status().as_u16(), 200, "GET {} failed", key);
    resp.bytes().await.unwrap().to_vec()
}

/// POST /change-colors for one image and return the response.
pub async fn change_colors(
    client: &reqwest::Client,
    server: &TestServer,
    image_id: &str,
) -> reqwest::Response {
    client
        .post(server.url("/change-colors"))
        .header("content-type", "application/json")
        .body(serde_json::json!({ "imageId": image_id }).to_string())
        .send()
        .await
        .expect("change-colors failed")
}

// === Data generators ===

/// Generate deterministic binary data
pub fn generate_binary(size: usize, seed: u64) -> Vec<u8> {
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    let mut data = vec![0u8; size];
    rng.fill(&mut data[..]);
    data
}

/// Encode a solid-color image in the given format.
pub fn solid_image(width: u32, height: u32, rgb: [u8; 3], format: image::ImageFormat) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb(rgb));
    let mut out = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut out, format)
        .expect("Failed to encode test image");
    out.into_inner()
}

// === MinIO gating ===

/// Create an S3 client pointing directly at MinIO (not through the gateway)
pub async fn minio_client() -> Client {
    let credentials = Credentials::new(MINIO_ACCESS_KEY, MINIO_SECRET_KEY, None, None, "test");
    let config = aws_sdk_s3::Config::builder()
        .behavior_version(BehaviorVersion::latest())
        .region(Region::new("us-east-1"))
        .endpoint_url(MINIO_ENDPOINT)
        .credentials_provider(credentials)
        .force_path_style(true)
        .build();
    Client::from_conf(config)
}

/// Check if MinIO is available (TCP probe, then make sure the test bucket
/// exists with a 2s timeout)
pub async fn minio_available() -> bool {
    if std::net::TcpStream::connect("localhost:9000").is_err() {
        return false;
    }

    let client = minio_client().await;
    let _ = tokio::time::timeout(
        Duration::from_secs(2),
        client.create_bucket().bucket(MINIO_BUCKET).send(),
    )
    .await;
    let result = tokio::time::timeout(
        Duration::from_secs(2),
        client.head_bucket().bucket(MINIO_BUCKET).send(),
    )
    .await;
    matches!(result, Ok(Ok(_)))
}

/// Macro to skip a test if MinIO is not available.
/// Use at the start of any test that requires MinIO.
#[macro_export]
macro_rules! skip_unless_minio {
    () => {
        if !common::minio_available().await {
            eprintln!("MinIO not available, skipping test");
            return;
        }
    };
}
