//! Picker API
//!
//! Single entry point the host talks to: pick actions, picker lifecycle, cache access
//! for preview surfaces, batch and single downloads, and the error channel. Every
//! user-facing failure of an action ends up in the one [`Notifier`].

use crate::aggregate::{FrameAggregator, TabSelection};
use crate::batch::BatchRegistry;
use crate::cache::{CachedImage, FetchRequest, ImageCache, ImageFetcher};
use crate::config::{DownloadSettings, PreferenceStore};
use crate::download::{BatchDownloadHandle, DownloadOrchestrator, DownloadOutcome, PlannedDownload};
use crate::environment::Environment;
use crate::error::ApiError;
use crate::host::{BrowsingHost, Notifier, PlatformDownloader, FRAME_PERMISSION};
use crate::limiter::DownloadLimiter;
use crate::types::{
    Batch, BatchDownloadRequest, BatchId, FrameId, PickAction, SingleDownloadRequest, TabId,
    TabResult, MAIN_FRAME,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Host-provided collaborators
pub struct PickaServices {
    pub host: Arc<dyn BrowsingHost>,
    /// Direct network fetches
    pub fetcher: Arc<dyn ImageFetcher>,
    /// Fetches from inside the originating page, tried when a direct fetch fails
    pub in_page_fetcher: Option<Arc<dyn ImageFetcher>>,
    pub downloader: Arc<dyn PlatformDownloader>,
    pub notifier: Arc<dyn Notifier>,
}

pub struct PickaApi {
    host: Arc<dyn BrowsingHost>,
    aggregator: FrameAggregator,
    batches: BatchRegistry,
    cache: Arc<ImageCache>,
    orchestrator: DownloadOrchestrator,
    notifier: Arc<dyn Notifier>,
    preferences: PreferenceStore,
}

impl PickaApi {
    /// Wire the services together. Any leftover cache content is evicted.
    pub fn new(services: PickaServices, preferences: PreferenceStore, download: &DownloadSettings) -> Self {
        let mut cache = ImageCache::new(services.fetcher);
        if let Some(fetcher) = services.in_page_fetcher {
            cache = cache.with_fallback(fetcher);
        }
        let cache = Arc::new(cache);
        let evicted = cache.clear_all();
        debug!(evicted, "Cleared image cache");

        let orchestrator = DownloadOrchestrator::new(
            Arc::clone(&cache),
            DownloadLimiter::new(download.max_active_downloads),
            services.downloader,
            Arc::clone(&services.host),
            Arc::clone(&services.notifier),
            preferences.clone(),
        )
        .with_release_delay(download.release_delay());

        Self {
            aggregator: FrameAggregator::new(Arc::clone(&services.host)),
            host: services.host,
            batches: BatchRegistry::new(),
            cache,
            orchestrator,
            notifier: services.notifier,
            preferences,
        }
    }

    pub fn preferences(&self) -> &PreferenceStore {
        &self.preferences
    }

    pub fn cache(&self) -> &ImageCache {
        &self.cache
    }

    pub fn batches(&self) -> &BatchRegistry {
        &self.batches
    }

    pub fn limiter(&self) -> &DownloadLimiter {
        self.orchestrator.limiter()
    }

    /// Child-frame collection needs the frame permission; ask for it first
    async fn ensure_frame_permission(&self) -> Result<bool, ApiError> {
        if !self.preferences.read(|p| p.collect_from_frames) {
            return Ok(false);
        }
        if self.host.request_permission(FRAME_PERMISSION).await? {
            Ok(true)
        } else {
            Err(ApiError::PermissionRequired)
        }
    }

    pub async fn pick_images(&self, tab_id: TabId, frame_id: FrameId) -> Result<TabResult, ApiError> {
        let collect_from_frames = self.ensure_frame_permission().await?;
        self.aggregator
            .pick_images(tab_id, frame_id, collect_from_frames)
            .await
    }

    pub async fn pick_images_across_tabs(
        &self,
        tab_id: TabId,
        exclude_current: bool,
    ) -> Result<TabSelection, ApiError> {
        let collect_from_frames = self.ensure_frame_permission().await?;
        self.aggregator
            .pick_images_across_tabs(tab_id, exclude_current, collect_from_frames)
            .await
    }

    /// Pick from one tab and open the picker on the result
    pub async fn pick_from_current(
        self: &Arc<Self>,
        tab_id: TabId,
        frame_id: Option<FrameId>,
    ) -> Result<BatchId, ApiError> {
        let result = self.pick_images(tab_id, frame_id.unwrap_or(MAIN_FRAME)).await?;
        let env = result.env.clone().unwrap_or_default();
        let batch = self.open_picker(env, vec![result], tab_id)?;
        Ok(batch.id)
    }

    /// Pick from the current tab and the tabs to its right and open the picker
    pub async fn pick_to_right(
        self: &Arc<Self>,
        tab_id: TabId,
        exclude_current: bool,
    ) -> Result<BatchId, ApiError> {
        let selection = self.pick_images_across_tabs(tab_id, exclude_current).await?;
        let batch = self.open_picker(selection.env, selection.tabs, tab_id)?;
        Ok(batch.id)
    }

    /// Register a batch and show it.
    ///
    /// The batch lives until the picker closes; then it is removed and the cache
    /// references it still owns are released.
    pub fn open_picker(
        self: &Arc<Self>,
        env: Environment,
        tabs: Vec<TabResult>,
        opener: TabId,
    ) -> Result<Arc<Batch>, ApiError> {
        let batch = self.batches.open(env, tabs)?;
        info!(batch_id = %batch.id, images = batch.image_count(), opener, "Opening picker");

        let api = Arc::clone(self);
        let batch_id = batch.id;
        tokio::spawn(async move {
            if let Err(e) = api.host.open_picker(batch_id, opener).await {
                warn!(batch_id = %batch_id, error = %e, "Picker ended with an error");
            }
            api.close_batch(batch_id);
        });
        Ok(batch)
    }

    /// Run a pick action; failures go to the notifier
    pub async fn run_action(
        self: &Arc<Self>,
        action: PickAction,
        tab_id: TabId,
        frame_id: Option<FrameId>,
    ) -> Option<BatchId> {
        let result = match action {
            PickAction::PickFromCurrentTab => self.pick_from_current(tab_id, frame_id).await,
            PickAction::PickFromRightTabs => self.pick_to_right(tab_id, false).await,
            PickAction::PickFromRightTabsExcludeCurrent => self.pick_to_right(tab_id, true).await,
        };
        match result {
            Ok(batch_id) => Some(batch_id),
            Err(e) => {
                self.notify_error(&e.to_string());
                None
            }
        }
    }

    /// Run the action bound to the toolbar button
    pub async fn toolbar_action(self: &Arc<Self>, tab_id: TabId) -> Option<BatchId> {
        let action = self.preferences.read(|p| p.browser_action);
        self.run_action(action, tab_id, None).await
    }

    pub fn get_batch(&self, batch_id: BatchId) -> Result<Arc<Batch>, ApiError> {
        self.batches
            .get(batch_id)
            .ok_or(ApiError::BatchNotFound(batch_id))
    }

    /// Fetch an image into the cache on behalf of a batch's picker
    pub async fn cache_image(
        &self,
        batch_id: BatchId,
        request: FetchRequest,
    ) -> Result<CachedImage, ApiError> {
        if !self.batches.contains(batch_id) {
            return Err(ApiError::BatchNotFound(batch_id));
        }
        Ok(self.cache.add(Some(batch_id), &request).await?)
    }

    /// Fetch an image for preview without taking a cache reference
    pub async fn fetch_image(&self, request: FetchRequest) -> Result<CachedImage, ApiError> {
        Ok(self.cache.fetch(&request).await?)
    }

    /// `data:` URL of a cached image
    pub fn get_cached_blob_url(&self, url: &str) -> Result<String, ApiError> {
        self.cache
            .preview_url(url)
            .ok_or_else(|| ApiError::NotCached(url.to_string()))
    }

    /// Filenames a batch download would produce
    pub fn plan_batch_download(&self, request: &BatchDownloadRequest) -> Result<Vec<PlannedDownload>, ApiError> {
        self.orchestrator.plan(request)
    }

    pub async fn batch_download(
        &self,
        request: BatchDownloadRequest,
    ) -> Result<BatchDownloadHandle, ApiError> {
        self.orchestrator
            .batch_download(request)
            .await
            .inspect_err(|e| self.notify_error(&e.to_string()))
    }

    pub async fn single_download(
        &self,
        request: SingleDownloadRequest,
    ) -> Result<DownloadOutcome, ApiError> {
        self.orchestrator
            .single_download(request)
            .await
            .inspect_err(|e| self.notify_error(&e.to_string()))
    }

    /// Destroy a batch and release its cache references
    pub fn close_batch(&self, batch_id: BatchId) -> bool {
        let removed = self.batches.remove(batch_id).is_some();
        let released = self.cache.release_batch(batch_id);
        debug!(batch_id = %batch_id, removed, released, "Closed batch");
        removed
    }

    /// Close a tab, returning focus to `opener` first
    pub async fn close_tab(&self, tab_id: TabId, opener: Option<TabId>) -> Result<(), ApiError> {
        if let Some(opener) = opener {
            self.host.activate_tab(opener).await?;
        }
        self.host.close_tab(tab_id).await?;
        Ok(())
    }

    pub fn notify_error(&self, message: &str) {
        self.notifier.notify(message);
    }
}
