//! Integration tests for picking, caching and downloading

mod aggregation;
mod batch_download;
mod config_integration;
mod image_cache;
mod support;
