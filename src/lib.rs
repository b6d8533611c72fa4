//! Picka: Batch Image Picking and Downloading
//!
//! Collects image URLs from every frame of one or more tabs, keeps fetched image bytes
//! in a reference-counted cache shared by pickers and downloads, and saves batches
//! through a bounded download queue with filenames rendered from `${...}` patterns.

pub mod aggregate;
pub mod api;
pub mod batch;
pub mod cache;
pub mod cli;
pub mod config;
pub mod download;
pub mod environment;
pub mod error;
pub mod host;
pub mod limiter;
pub mod logging;
pub mod template;
pub mod types;
