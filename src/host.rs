//! Host boundary.
//!
//! The picker runs inside a browsing host that owns tabs, frames, permissions and the
//! platform download primitive. These traits are the whole of what the core needs
//! from it.

pub mod fs;
pub mod memory;

pub use fs::FsDownloader;
pub use memory::{LogNotifier, RecordingNotifier, StaticHost};

use crate::environment::Environment;
use crate::error::{DownloadError, HostError};
use crate::types::{BatchId, FrameInfo, FrameRef, ImageDescriptor, TabId, TabInfo};
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Permission needed to enumerate the frames of a tab
pub const FRAME_PERMISSION: &str = "webNavigation";

/// Tabs, frames and picker surfaces of the browsing host
#[async_trait]
pub trait BrowsingHost: Send + Sync {
    /// Images of one frame in document order
    async fn scrape_images(&self, frame: FrameRef) -> Result<Vec<ImageDescriptor>, HostError>;

    /// Page environment (`pageUrl`, `pageTitle`, ...) of one frame
    async fn scrape_environment(&self, frame: FrameRef) -> Result<Environment, HostError>;

    async fn enumerate_frames(&self, tab_id: TabId) -> Result<Vec<FrameInfo>, HostError>;

    /// Ask the user for an optional permission; `Ok(false)` when refused
    async fn request_permission(&self, name: &str) -> Result<bool, HostError>;

    /// All tabs of the window containing `tab_id`
    async fn window_tabs(&self, tab_id: TabId) -> Result<Vec<TabInfo>, HostError>;

    async fn close_tab(&self, tab_id: TabId) -> Result<(), HostError>;

    async fn activate_tab(&self, tab_id: TabId) -> Result<(), HostError>;

    /// Show the picker for a batch. Resolves when the picker is closed.
    async fn open_picker(&self, batch_id: BatchId, opener: TabId) -> Result<(), HostError>;
}

/// What to do when the target file already exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictAction {
    #[default]
    Uniquify,
    Overwrite,
    Prompt,
}

impl std::str::FromStr for ConflictAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "uniquify" => Ok(ConflictAction::Uniquify),
            "overwrite" => Ok(ConflictAction::Overwrite),
            "prompt" => Ok(ConflictAction::Prompt),
            other => Err(format!("unknown conflict action: {}", other)),
        }
    }
}

/// One call to the platform download primitive
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadRequest {
    pub url: String,
    /// Cached payload; when absent the platform downloads `url` itself
    pub blob: Option<Bytes>,
    pub mime: Option<String>,
    /// Relative path under the download directory
    pub filename: String,
    pub save_as: bool,
    pub conflict_action: ConflictAction,
}

/// Platform single-file download
#[async_trait]
pub trait PlatformDownloader: Send + Sync {
    /// Resolves once the download has completed or failed
    async fn download(&self, request: DownloadRequest) -> Result<(), DownloadError>;
}

/// User-facing error channel
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str);
}
