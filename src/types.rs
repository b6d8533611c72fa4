//! Core Types
//!
//! Identifiers and the picked-image data model shared by the aggregator, the batch
//! registry and the download orchestrator.

use crate::environment::Environment;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Browser tab identifier
pub type TabId = u64;

/// Frame identifier within a tab. The top-level frame is `0`; a parent id of `-1`
/// marks a frame without parent.
pub type FrameId = i64;

/// Identifier of the top-level frame of a tab
pub const MAIN_FRAME: FrameId = 0;

/// Identifier of one picking session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(u64);

impl BatchId {
    pub fn new(id: u64) -> Self {
        BatchId(id)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Address of one browsing context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameRef {
    pub tab_id: TabId,
    pub frame_id: FrameId,
}

impl FrameRef {
    pub fn new(tab_id: TabId, frame_id: FrameId) -> Self {
        Self { tab_id, frame_id }
    }

    pub fn main(tab_id: TabId) -> Self {
        Self::new(tab_id, MAIN_FRAME)
    }
}

/// An image candidate scraped from a page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageDescriptor {
    pub url: String,
    /// Filename hint extracted from the page (e.g. a `download` attribute)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

impl ImageDescriptor {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            filename: None,
        }
    }

    pub fn with_filename(url: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            filename: Some(filename.into()),
        }
    }
}

/// Picker entry points offered on the toolbar, the menus and keyboard commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PickAction {
    #[default]
    PickFromCurrentTab,
    PickFromRightTabs,
    PickFromRightTabsExcludeCurrent,
}

impl PickAction {
    pub const ALL: [PickAction; 3] = [
        PickAction::PickFromCurrentTab,
        PickAction::PickFromRightTabs,
        PickAction::PickFromRightTabsExcludeCurrent,
    ];

    pub fn label(self) -> &'static str {
        match self {
            PickAction::PickFromCurrentTab => "Pick images from current tab",
            PickAction::PickFromRightTabs => "Pick images from tabs to the right",
            PickAction::PickFromRightTabsExcludeCurrent => {
                "Pick images from tabs to the right (exclude current tab)"
            }
        }
    }
}

impl std::str::FromStr for PickAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().replace('-', "_").to_ascii_uppercase();
        match normalized.as_str() {
            "PICK_FROM_CURRENT_TAB" => Ok(PickAction::PickFromCurrentTab),
            "PICK_FROM_RIGHT_TABS" => Ok(PickAction::PickFromRightTabs),
            "PICK_FROM_RIGHT_TABS_EXCLUDE_CURRENT" => Ok(PickAction::PickFromRightTabsExcludeCurrent),
            _ => Err(format!("unknown pick action: {}", s)),
        }
    }
}

/// Images contributed by one frame, in document order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameResult {
    pub frame_id: FrameId,
    pub images: Vec<ImageDescriptor>,
}

/// Images contributed by one tab
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabResult {
    pub tab_id: TabId,
    pub frames: Vec<FrameResult>,
    #[serde(default)]
    pub env: Option<Environment>,
}

impl TabResult {
    pub fn new(tab_id: TabId) -> Self {
        Self {
            tab_id,
            frames: Vec::new(),
            env: None,
        }
    }

    pub fn has_images(&self) -> bool {
        self.frames.iter().any(|f| !f.images.is_empty())
    }

    pub fn image_count(&self) -> usize {
        self.frames.iter().map(|f| f.images.len()).sum()
    }

    /// All images of the tab, frame by frame
    pub fn images(&self) -> impl Iterator<Item = &ImageDescriptor> {
        self.frames.iter().flat_map(|f| f.images.iter())
    }
}

/// Frame topology entry reported by the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameInfo {
    pub frame_id: FrameId,
    pub parent_frame_id: FrameId,
    #[serde(default)]
    pub error_occurred: bool,
}

/// Tab entry of a browser window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabInfo {
    pub id: TabId,
    pub index: usize,
    #[serde(default)]
    pub discarded: bool,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub hidden: bool,
}

impl TabInfo {
    pub fn new(id: TabId, index: usize) -> Self {
        Self {
            id,
            index,
            discarded: false,
            pinned: false,
            hidden: false,
        }
    }

    /// Whether the tab can be scraped as part of a multi-tab pick
    pub fn is_pickable(&self) -> bool {
        !self.discarded && !self.pinned && !self.hidden
    }
}

/// One picking session as shown to the picker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    pub id: BatchId,
    pub env: Environment,
    pub tabs: Vec<TabResult>,
}

impl Batch {
    pub fn image_count(&self) -> usize {
        self.tabs.iter().map(TabResult::image_count).sum()
    }
}

/// Images of one tab selected for download
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadTab {
    pub tab_id: TabId,
    #[serde(default)]
    pub env: Option<Environment>,
    pub images: Vec<ImageDescriptor>,
}

/// User-confirmed subset of a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchDownloadRequest {
    pub batch_id: BatchId,
    pub env: Environment,
    pub tabs: Vec<DownloadTab>,
}

impl BatchDownloadRequest {
    /// Select every image of a batch
    pub fn from_batch(batch: &Batch) -> Self {
        Self {
            batch_id: batch.id,
            env: batch.env.clone(),
            tabs: batch
                .tabs
                .iter()
                .map(|tab| DownloadTab {
                    tab_id: tab.tab_id,
                    env: tab.env.clone(),
                    images: tab.images().cloned().collect(),
                })
                .collect(),
        }
    }

    pub fn image_count(&self) -> usize {
        self.tabs.iter().map(|t| t.images.len()).sum()
    }
}

/// Request to save one image from a page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SingleDownloadRequest {
    pub url: String,
    #[serde(default)]
    pub env: Option<Environment>,
    pub tab_id: TabId,
    #[serde(default)]
    pub frame_id: FrameId,
    #[serde(default)]
    pub no_referrer: bool,
}
