//! Error types for the picka image acquisition and download subsystem.

use crate::types::{BatchId, TabId};
use thiserror::Error;

/// Message the host platform uses when the user aborts a download.
pub const CANCELED_BY_USER: &str = "Download canceled by the user";

/// Errors raised while compiling or rendering a filename template
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TemplateError {
    #[error("Invalid expression `{expression}`: {message}")]
    Compile { expression: String, message: String },

    #[error("Failed to evaluate `{expression}`: {message}")]
    Render { expression: String, message: String },
}

/// Errors raised while fetching image bytes
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FetchError {
    #[error("Failed to fetch {url}: {message}")]
    Network { url: String, message: String },

    #[error("Failed to fetch {url}: HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("Failed to fetch {url} from its page ({direct}; {in_context})")]
    Fallback {
        url: String,
        direct: String,
        in_context: String,
    },

    #[error("Fetch of {url} was abandoned before it completed")]
    Abandoned { url: String },
}

impl FetchError {
    pub fn url(&self) -> &str {
        match self {
            FetchError::Network { url, .. }
            | FetchError::Status { url, .. }
            | FetchError::Fallback { url, .. }
            | FetchError::Abandoned { url } => url,
        }
    }
}

/// Errors reported by the platform download primitive
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DownloadError {
    #[error("{}", CANCELED_BY_USER)]
    Canceled,

    #[error("{0}")]
    Failed(String),

    #[error("Invalid download target: {0}")]
    InvalidTarget(String),

    #[error("Download I/O error: {0}")]
    Io(String),
}

impl DownloadError {
    /// Cancellation is a user action, not a fault.
    pub fn is_canceled(&self) -> bool {
        matches!(self, DownloadError::Canceled)
    }
}

impl From<std::io::Error> for DownloadError {
    fn from(err: std::io::Error) -> Self {
        DownloadError::Io(err.to_string())
    }
}

/// Errors reported by the browsing host (tabs, frames, permissions)
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HostError {
    #[error("Tab not found: {0}")]
    TabNotFound(TabId),

    #[error("Frame {frame_id} of tab {tab_id} is unreachable")]
    FrameUnreachable { tab_id: TabId, frame_id: i64 },

    #[error("Host request failed: {0}")]
    Request(String),
}

/// Top-level API errors
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("webNavigation permission is required for iframe information")]
    PermissionRequired,

    #[error("No images found")]
    NoImagesFound,

    #[error("Batch not found: {0}")]
    BatchNotFound(BatchId),

    #[error("Image is not cached: {0}")]
    NotCached(String),

    #[error("Invalid URL {url}: {message}")]
    InvalidUrl { url: String, message: String },

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Download(#[from] DownloadError),

    #[error(transparent)]
    Host(#[from] HostError),

    #[error("Download limiter closed")]
    LimiterClosed,

    #[error("Background task failed: {0}")]
    Task(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for ApiError {
    fn from(err: config::ConfigError) -> Self {
        ApiError::ConfigError(err.to_string())
    }
}
