//! In-memory host.
//!
//! `StaticHost` serves tabs and frames from fixtures. The CLI uses it to model a
//! list of URLs as one page; tests use it to script frame trees and failures.

use super::{BrowsingHost, Notifier};
use crate::environment::Environment;
use crate::error::HostError;
use crate::types::{BatchId, FrameId, FrameInfo, FrameRef, ImageDescriptor, TabId, TabInfo, MAIN_FRAME};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::oneshot;
use tracing::warn;

/// One frame of a fixture tab
#[derive(Debug, Clone)]
pub struct FrameFixture {
    pub frame_id: FrameId,
    pub parent_frame_id: FrameId,
    pub images: Vec<ImageDescriptor>,
    pub env: Environment,
    /// Reported with `error_occurred` by frame enumeration
    pub error_occurred: bool,
    /// Scrape requests to this frame fail
    pub unreachable: bool,
}

impl FrameFixture {
    pub fn main(images: Vec<ImageDescriptor>) -> Self {
        Self::child(MAIN_FRAME, -1, images)
    }

    pub fn child(frame_id: FrameId, parent_frame_id: FrameId, images: Vec<ImageDescriptor>) -> Self {
        Self {
            frame_id,
            parent_frame_id,
            images,
            env: Environment::new(),
            error_occurred: false,
            unreachable: false,
        }
    }

    pub fn with_env(mut self, env: Environment) -> Self {
        self.env = env;
        self
    }

    pub fn unreachable(mut self) -> Self {
        self.unreachable = true;
        self
    }

    pub fn errored(mut self) -> Self {
        self.error_occurred = true;
        self
    }
}

/// One fixture tab
#[derive(Debug, Clone)]
pub struct TabFixture {
    pub info: TabInfo,
    pub frames: BTreeMap<FrameId, FrameFixture>,
}

impl TabFixture {
    pub fn new(info: TabInfo) -> Self {
        Self {
            info,
            frames: BTreeMap::new(),
        }
    }

    pub fn with_frame(mut self, frame: FrameFixture) -> Self {
        self.frames.insert(frame.frame_id, frame);
        self
    }
}

#[derive(Debug, Default)]
struct Activity {
    permission_requests: Vec<String>,
    closed: Vec<TabId>,
    activated: Vec<TabId>,
    pickers: Vec<(BatchId, TabId)>,
}

/// Fixture-backed `BrowsingHost`
#[derive(Debug)]
pub struct StaticHost {
    tabs: RwLock<BTreeMap<TabId, TabFixture>>,
    grant_permissions: bool,
    hold_pickers: bool,
    open_pickers: Mutex<HashMap<BatchId, oneshot::Sender<()>>>,
    activity: Mutex<Activity>,
}

impl StaticHost {
    pub fn new() -> Self {
        Self {
            tabs: RwLock::new(BTreeMap::new()),
            grant_permissions: true,
            hold_pickers: false,
            open_pickers: Mutex::new(HashMap::new()),
            activity: Mutex::new(Activity::default()),
        }
    }

    pub fn with_tab(self, tab: TabFixture) -> Self {
        self.tabs.write().insert(tab.info.id, tab);
        self
    }

    /// Refuse every permission request
    pub fn deny_permissions(mut self) -> Self {
        self.grant_permissions = false;
        self
    }

    /// Keep pickers open until `close_picker` is called
    pub fn hold_pickers(mut self) -> Self {
        self.hold_pickers = true;
        self
    }

    /// Close an open picker; returns whether one was open
    pub fn close_picker(&self, batch_id: BatchId) -> bool {
        match self.open_pickers.lock().remove(&batch_id) {
            Some(tx) => tx.send(()).is_ok(),
            None => false,
        }
    }

    pub fn closed_tabs(&self) -> Vec<TabId> {
        self.activity.lock().closed.clone()
    }

    pub fn activated_tabs(&self) -> Vec<TabId> {
        self.activity.lock().activated.clone()
    }

    pub fn opened_pickers(&self) -> Vec<(BatchId, TabId)> {
        self.activity.lock().pickers.clone()
    }

    pub fn permission_requests(&self) -> Vec<String> {
        self.activity.lock().permission_requests.clone()
    }

    fn frame<T>(
        &self,
        frame: FrameRef,
        read: impl FnOnce(&FrameFixture) -> T,
    ) -> Result<T, HostError> {
        let tabs = self.tabs.read();
        let tab = tabs
            .get(&frame.tab_id)
            .ok_or(HostError::TabNotFound(frame.tab_id))?;
        match tab.frames.get(&frame.frame_id) {
            Some(fixture) if !fixture.unreachable => Ok(read(fixture)),
            _ => Err(HostError::FrameUnreachable {
                tab_id: frame.tab_id,
                frame_id: frame.frame_id,
            }),
        }
    }
}

impl Default for StaticHost {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BrowsingHost for StaticHost {
    async fn scrape_images(&self, frame: FrameRef) -> Result<Vec<ImageDescriptor>, HostError> {
        self.frame(frame, |f| f.images.clone())
    }

    async fn scrape_environment(&self, frame: FrameRef) -> Result<Environment, HostError> {
        self.frame(frame, |f| f.env.clone())
    }

    async fn enumerate_frames(&self, tab_id: TabId) -> Result<Vec<FrameInfo>, HostError> {
        let tabs = self.tabs.read();
        let tab = tabs.get(&tab_id).ok_or(HostError::TabNotFound(tab_id))?;
        Ok(tab
            .frames
            .values()
            .map(|f| FrameInfo {
                frame_id: f.frame_id,
                parent_frame_id: f.parent_frame_id,
                error_occurred: f.error_occurred,
            })
            .collect())
    }

    async fn request_permission(&self, name: &str) -> Result<bool, HostError> {
        self.activity
            .lock()
            .permission_requests
            .push(name.to_string());
        Ok(self.grant_permissions)
    }

    async fn window_tabs(&self, tab_id: TabId) -> Result<Vec<TabInfo>, HostError> {
        let tabs = self.tabs.read();
        if !tabs.contains_key(&tab_id) {
            return Err(HostError::TabNotFound(tab_id));
        }
        let mut infos: Vec<TabInfo> = tabs.values().map(|t| t.info.clone()).collect();
        infos.sort_by_key(|t| t.index);
        Ok(infos)
    }

    async fn close_tab(&self, tab_id: TabId) -> Result<(), HostError> {
        self.tabs
            .write()
            .remove(&tab_id)
            .ok_or(HostError::TabNotFound(tab_id))?;
        self.activity.lock().closed.push(tab_id);
        Ok(())
    }

    async fn activate_tab(&self, tab_id: TabId) -> Result<(), HostError> {
        if !self.tabs.read().contains_key(&tab_id) {
            return Err(HostError::TabNotFound(tab_id));
        }
        self.activity.lock().activated.push(tab_id);
        Ok(())
    }

    async fn open_picker(&self, batch_id: BatchId, opener: TabId) -> Result<(), HostError> {
        self.activity.lock().pickers.push((batch_id, opener));
        if !self.hold_pickers {
            return Ok(());
        }
        let (tx, rx) = oneshot::channel();
        self.open_pickers.lock().insert(batch_id, tx);
        rx.await
            .map_err(|_| HostError::Request(format!("picker for batch {} went away", batch_id)))
    }
}

/// Notifier that writes to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, message: &str) {
        warn!(message = %message, "Image Picka");
    }
}

/// Notifier that keeps every message
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, message: &str) {
        self.messages.lock().push(message.to_string());
    }
}
