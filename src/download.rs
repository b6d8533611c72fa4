//! Download Orchestrator
//!
//! Turns a user-confirmed selection into platform downloads. Filenames are rendered
//! up front from one shared environment; each image then runs as its own task under
//! the process-wide [`DownloadLimiter`]. A task releases the cache reference it owns
//! only after the platform download has settled, so a payload is never evicted while
//! it is being written.

use crate::cache::{FetchRequest, ImageCache};
use crate::config::{Preferences, PreferenceStore};
use crate::environment::{
    Environment, KEY_BASE, KEY_INDEX, KEY_PAGE_CONTENT_TYPE, KEY_URL,
};
use crate::error::{ApiError, DownloadError};
use crate::host::{BrowsingHost, ConflictAction, DownloadRequest, Notifier, PlatformDownloader};
use crate::limiter::DownloadLimiter;
use crate::template::Template;
use crate::types::{BatchDownloadRequest, BatchId, FrameRef, SingleDownloadRequest, TabId};
use chrono::{DateTime, Local, TimeZone};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// One image of a batch with its rendered filename
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedDownload {
    pub tab_id: TabId,
    pub url: String,
    pub filename: String,
    /// Value of `${index}` used for this image
    pub index: usize,
}

/// A download that did not complete
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadFailure {
    pub url: String,
    pub filename: String,
    pub error: DownloadError,
}

impl DownloadFailure {
    /// Text shown to the user
    pub fn message(&self) -> String {
        format!(
            "{}\nurl: {}\nfilename: {}",
            self.error, self.url, self.filename
        )
    }
}

/// Result of one download task
#[derive(Debug, Clone, PartialEq)]
pub enum DownloadOutcome {
    Completed,
    Canceled,
    Failed(DownloadFailure),
}

/// Summary of a settled batch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    pub scheduled: usize,
    pub completed: usize,
    pub canceled: usize,
    pub failures: Vec<DownloadFailure>,
}

impl BatchReport {
    fn record(&mut self, outcome: DownloadOutcome) {
        match outcome {
            DownloadOutcome::Completed => self.completed += 1,
            DownloadOutcome::Canceled => self.canceled += 1,
            DownloadOutcome::Failed(failure) => self.failures.push(failure),
        }
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Handle to a scheduled batch. Dropping it does not stop the downloads.
#[derive(Debug)]
pub struct BatchDownloadHandle {
    batch_id: BatchId,
    scheduled: usize,
    task: JoinHandle<BatchReport>,
}

impl BatchDownloadHandle {
    pub fn batch_id(&self) -> BatchId {
        self.batch_id
    }

    pub fn scheduled(&self) -> usize {
        self.scheduled
    }

    /// Wait until every download of the batch has settled
    pub async fn wait(self) -> Result<BatchReport, ApiError> {
        self.task
            .await
            .map_err(|e| ApiError::Task(format!("batch {}: {}", self.batch_id, e)))
    }
}

/// Everything a download task needs, detached from the orchestrator
#[derive(Clone)]
struct TaskContext {
    cache: Arc<ImageCache>,
    limiter: DownloadLimiter,
    downloader: Arc<dyn PlatformDownloader>,
    release_delay: Option<Duration>,
}

struct DownloadJob {
    url: String,
    filename: String,
    save_as: bool,
    conflict_action: ConflictAction,
    /// The task holds a cache reference it must release
    owns_cache_entry: bool,
}

impl TaskContext {
    async fn run(self, job: DownloadJob) -> DownloadOutcome {
        let result = match self.limiter.acquire().await {
            Ok(_slot) => {
                let cached = self.cache.get(&job.url);
                let request = DownloadRequest {
                    url: job.url.clone(),
                    mime: cached.as_ref().and_then(|c| c.mime.clone()),
                    blob: cached.map(|c| c.bytes),
                    filename: job.filename.clone(),
                    save_as: job.save_as,
                    conflict_action: job.conflict_action,
                };
                debug!(url = %job.url, filename = %job.filename, cached = request.blob.is_some(), "Starting download");
                self.downloader.download(request).await
            }
            Err(e) => Err(DownloadError::Failed(e.to_string())),
        };

        if job.owns_cache_entry {
            if let Some(delay) = self.release_delay {
                tokio::time::sleep(delay).await;
            }
            self.cache.release(&job.url);
        }

        match result {
            Ok(()) => DownloadOutcome::Completed,
            Err(error) if error.is_canceled() => {
                debug!(url = %job.url, "Download canceled by the user");
                DownloadOutcome::Canceled
            }
            Err(error) => {
                warn!(url = %job.url, filename = %job.filename, error = %error, "Download failed");
                DownloadOutcome::Failed(DownloadFailure {
                    url: job.url,
                    filename: job.filename,
                    error,
                })
            }
        }
    }
}

/// Render filenames for every image of a selection.
///
/// The shared environment is stamped with `now`. With `isolate_tabs` each tab's
/// environment is laid over the shared one and the index restarts at 1; otherwise
/// the index runs across tabs. Every image renders against its own copy.
pub fn plan_batch<Tz: TimeZone>(
    request: &BatchDownloadRequest,
    preferences: &Preferences,
    template: &Template,
    now: &DateTime<Tz>,
) -> Result<Vec<PlannedDownload>, ApiError>
where
    Tz::Offset: std::fmt::Display,
{
    let mut shared = request.env.clone();
    shared.stamp_date(now);
    let defaults = preferences.naming_defaults();

    let mut planned = Vec::with_capacity(request.image_count());
    let mut index = 0;
    for tab in &request.tabs {
        let tab_env = if preferences.isolate_tabs {
            index = 0;
            shared.overlaid(tab.env.as_ref())
        } else {
            shared.clone()
        };

        for image in &tab.images {
            index += 1;
            let mut env = tab_env.clone();
            env.set(KEY_URL, image.url.as_str());
            env.set(KEY_INDEX, index);
            match &image.filename {
                Some(filename) => env.set(KEY_BASE, filename.as_str()),
                None => {
                    env.remove(KEY_BASE);
                }
            }
            env.expand(&defaults)?;
            planned.push(PlannedDownload {
                tab_id: tab.tab_id,
                url: image.url.clone(),
                filename: template.render(&env)?,
                index,
            });
        }
    }
    Ok(planned)
}

pub struct DownloadOrchestrator {
    tasks: TaskContext,
    host: Arc<dyn BrowsingHost>,
    notifier: Arc<dyn Notifier>,
    preferences: PreferenceStore,
}

impl DownloadOrchestrator {
    pub fn new(
        cache: Arc<ImageCache>,
        limiter: DownloadLimiter,
        downloader: Arc<dyn PlatformDownloader>,
        host: Arc<dyn BrowsingHost>,
        notifier: Arc<dyn Notifier>,
        preferences: PreferenceStore,
    ) -> Self {
        Self {
            tasks: TaskContext {
                cache,
                limiter,
                downloader,
                release_delay: None,
            },
            host,
            notifier,
            preferences,
        }
    }

    /// Wait this long after a download settles before releasing its cache entry
    pub fn with_release_delay(mut self, delay: Option<Duration>) -> Self {
        self.tasks.release_delay = delay;
        self
    }

    pub fn limiter(&self) -> &DownloadLimiter {
        &self.tasks.limiter
    }

    /// Filenames a batch download would use, without downloading anything
    pub fn plan(&self, request: &BatchDownloadRequest) -> Result<Vec<PlannedDownload>, ApiError> {
        let preferences = self.preferences.get();
        let template = Template::compile(&preferences.file_pattern_batch, preferences.render_mode())?;
        plan_batch(request, &preferences, &template, &Local::now())
    }

    /// Schedule a batch.
    ///
    /// Returns once every image has a task; the downloads continue in the background.
    /// Failures are reported through the notifier after all tasks settle, except user
    /// cancellations. Template and naming errors fail the call before anything is
    /// scheduled.
    pub async fn batch_download(
        &self,
        request: BatchDownloadRequest,
    ) -> Result<BatchDownloadHandle, ApiError> {
        let preferences = self.preferences.get();
        let template = Template::compile(&preferences.file_pattern_batch, preferences.render_mode())?;
        let plan = plan_batch(&request, &preferences, &template, &Local::now())?;
        let batch_id = request.batch_id;

        let tasks: Vec<JoinHandle<DownloadOutcome>> = plan
            .into_iter()
            .map(|item| {
                let job = DownloadJob {
                    owns_cache_entry: self.tasks.cache.disown(batch_id, &item.url),
                    url: item.url,
                    filename: item.filename,
                    save_as: false,
                    conflict_action: preferences.filename_conflict_action,
                };
                tokio::spawn(self.tasks.clone().run(job))
            })
            .collect();
        let scheduled = tasks.len();
        info!(batch_id = %batch_id, scheduled, pattern = template.pattern(), "Scheduled batch download");

        let notifier = Arc::clone(&self.notifier);
        let task = tokio::spawn(async move {
            let mut report = BatchReport {
                scheduled,
                ..BatchReport::default()
            };
            for outcome in join_all(tasks).await {
                match outcome {
                    Ok(outcome) => report.record(outcome),
                    Err(e) => warn!(batch_id = %batch_id, error = %e, "Download task panicked"),
                }
            }
            for failure in &report.failures {
                notifier.notify(&failure.message());
            }
            info!(
                batch_id = %batch_id,
                completed = report.completed,
                canceled = report.canceled,
                failed = report.failures.len(),
                "Batch download settled"
            );
            report
        });

        if preferences.close_tabs_after_save {
            for tab in &request.tabs {
                if let Err(e) = self.host.close_tab(tab.tab_id).await {
                    warn!(tab_id = tab.tab_id, error = %e, "Failed to close tab after save");
                }
            }
        }

        Ok(BatchDownloadHandle {
            batch_id,
            scheduled,
            task,
        })
    }

    /// Save one image.
    ///
    /// The environment comes from the request or is scraped from the frame. With
    /// `use_cache` the image is fetched into the cache first and its server-suggested
    /// filename becomes `base`; the reference is released after the download settles.
    /// A download failure is reported through the notifier and returned as the outcome.
    pub async fn single_download(
        &self,
        request: SingleDownloadRequest,
    ) -> Result<DownloadOutcome, ApiError> {
        let preferences = self.preferences.get();
        let frame = FrameRef::new(request.tab_id, request.frame_id);
        let fetch = FetchRequest::from_frame(request.url.clone(), frame, request.no_referrer);

        let env_future = async {
            match &request.env {
                Some(env) => Ok(env.clone()),
                None => self.host.scrape_environment(frame).await,
            }
        };
        let cache_future = async {
            if preferences.use_cache {
                self.tasks.cache.add(None, &fetch).await.map(Some)
            } else {
                Ok(None)
            }
        };
        let (env, cached) = futures::join!(env_future, cache_future);
        let cached = cached?;
        let owns_cache_entry = cached.is_some();
        let env = match env {
            Ok(env) => env,
            Err(e) => {
                if owns_cache_entry {
                    self.tasks.cache.release(&request.url);
                }
                return Err(e.into());
            }
        };

        let filename = match self.render_single(&preferences, env, &request.url, cached.and_then(|c| c.filename)) {
            Ok(filename) => filename,
            Err(e) => {
                if owns_cache_entry {
                    self.tasks.cache.release(&request.url);
                }
                return Err(e);
            }
        };

        let job = DownloadJob {
            url: request.url,
            filename,
            save_as: preferences.save_as,
            conflict_action: preferences.filename_conflict_action,
            owns_cache_entry,
        };
        let outcome = self.tasks.clone().run(job).await;
        if let DownloadOutcome::Failed(failure) = &outcome {
            self.notifier.notify(&failure.message());
        }
        Ok(outcome)
    }

    fn render_single(
        &self,
        preferences: &Preferences,
        mut env: Environment,
        url: &str,
        base: Option<String>,
    ) -> Result<String, ApiError> {
        env.stamp_now();
        env.set(KEY_URL, url);
        match base {
            Some(base) => env.set(KEY_BASE, base),
            None => {
                env.remove(KEY_BASE);
            }
        }
        env.expand(&preferences.naming_defaults())?;

        let content_type = env.get_str(KEY_PAGE_CONTENT_TYPE).unwrap_or_default();
        let pattern = preferences.single_pattern(content_type);
        let template = Template::compile(pattern, preferences.render_mode())?;
        Ok(template.render(&env)?)
    }
}
