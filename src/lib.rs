//! Image gateway - HTTP front end for a bucket of gallery images
//!
//! Uploads, lists, streams, bulk-deletes and recolors images held in an
//! S3-compatible object store, and serves the gallery's static assets.

pub mod api;
pub mod colorizer;
pub mod config;
pub mod storage;
pub mod types;
