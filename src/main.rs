//! Image gateway - HTTP front end for a bucket of gallery images

use clap::Parser;
use image_gateway::api::handlers::{AppState, BucketHandle, UploadKeys};
use image_gateway::api::router;
use image_gateway::colorizer::HueRotate;
use image_gateway::config::{Config, StorageConfig};
use image_gateway::storage;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Image gateway - upload, stream and recolor gallery images
#[derive(Parser, Debug)]
#[command(name = "image_gateway")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<String>,

    /// Listen address (overrides config)
    #[arg(short, long, value_name = "ADDR")]
    listen: Option<String>,

    /// Bucket name (overrides config)
    #[arg(short, long, value_name = "BUCKET")]
    bucket: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match cli.config {
        Some(ref path) => Config::from_file(path)?,
        None => Config::load()?,
    };

    // RUST_LOG wins over both the config file and --verbose.
    let log_level = if cli.verbose {
        "image_gateway=trace,tower_http=trace".to_string()
    } else {
        config.log_level.clone()
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // CLI overrides
    if let Some(ref addr) = cli.listen {
        config.listen_addr = addr.parse()?;
    }
    if let Some(ref bucket) = cli.bucket {
        config.bucket = Some(bucket.clone());
    }

    info!("Starting image gateway");
    info!("  Listen address: {}", config.listen_addr);
    info!("  Static root: {:?}", config.static_root);
    info!(
        "  Max object size: {} MB",
        config.max_object_size / 1024 / 1024
    );
    info!("  Hue rotation: {} degrees", config.hue_rotation);

    match &config.storage {
        Some(StorageConfig::Filesystem { path }) => {
            info!("  Storage: Filesystem");
            info!("  Data directory: {:?}", path);
        }
        Some(StorageConfig::S3 {
            endpoint, region, ..
        }) => {
            info!("  Storage: S3");
            info!("  Region: {}", region);
            if let Some(ep) = endpoint {
                info!("  Endpoint: {}", ep);
            }
            // Debug output masks the credentials.
            info!("  Settings: {:?}", config.storage);
        }
        None => warn!("  Storage: not configured, bucket endpoints will answer 503"),
    }
    for name in Config::ignored_env_vars() {
        warn!(
            "  {} is set but ignored: only HMAC credentials (CLOUD_OBJECT_STORAGE_ACCESS_KEY_ID) are supported",
            name
        );
    }

    let storage = match (&config.storage, config.bucket_name()) {
        (Some(storage_config), Some(bucket)) => {
            let bridge = storage::connect(storage_config).await?;
            info!("  Bucket: {} (via {})", bucket, bridge.name());
            Some(BucketHandle {
                bucket: bucket.to_string(),
                bridge,
            })
        }
        (Some(_), None) => {
            warn!("  Bucket: not set (BUCKET), bucket endpoints will answer 503");
            None
        }
        _ => None,
    };

    let state = Arc::new(AppState {
        storage,
        features: config.features(),
        recolor: Arc::new(HueRotate::new(config.hue_rotation)),
        upload_keys: UploadKeys::new(),
        static_root: config.static_root.clone(),
        max_object_size: config.max_object_size,
    });

    let app = router(state);

    // Start server with graceful shutdown
    let listener = TcpListener::bind(&config.listen_addr).await?;
    info!("Image gateway listening on http://{}", config.listen_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Handle shutdown signals (SIGINT, SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            warn!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            warn!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}
