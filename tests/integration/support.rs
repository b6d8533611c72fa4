//! Shared fixtures for integration tests
//!
//! A scripted fetcher, a recording downloader and a builder that wires them into a
//! `PickaApi` over a `StaticHost`.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use picka::api::{PickaApi, PickaServices};
use picka::cache::{FetchRequest, FetchedImage, ImageFetcher};
use picka::config::{DownloadSettings, PreferenceStore, Preferences};
use picka::environment::{Environment, KEY_PAGE_TITLE, KEY_PAGE_URL};
use picka::error::{DownloadError, FetchError};
use picka::host::memory::{FrameFixture, TabFixture};
use picka::host::{DownloadRequest, PlatformDownloader, RecordingNotifier, StaticHost};
use picka::types::{ImageDescriptor, TabInfo};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Fetcher serving `bytes-of:<url>` for every URL except the failing ones
#[derive(Default)]
pub struct FakeFetcher {
    calls: AtomicUsize,
    delay: Option<Duration>,
    filenames: HashMap<String, String>,
    failing: Vec<String>,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Answer `url` with a content-disposition style filename
    pub fn with_filename(mut self, url: &str, filename: &str) -> Self {
        self.filenames.insert(url.to_string(), filename.to_string());
        self
    }

    pub fn failing(mut self, url: &str) -> Self {
        self.failing.push(url.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageFetcher for FakeFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchedImage, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.contains(&request.url) {
            return Err(FetchError::Status {
                url: request.url.clone(),
                status: 404,
            });
        }
        let mut image = FetchedImage::new(
            Bytes::from(format!("bytes-of:{}", request.url)),
            Some("image/png".to_string()),
        );
        image.filename = self.filenames.get(&request.url).cloned();
        Ok(image)
    }
}

/// Downloader that records requests and tracks its own concurrency
#[derive(Default)]
pub struct RecordingDownloader {
    requests: Mutex<Vec<DownloadRequest>>,
    outcomes: HashMap<String, DownloadError>,
    delay: Option<Duration>,
    gate: Option<Arc<Semaphore>>,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl RecordingDownloader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail downloads of `url` with `error`
    pub fn failing(mut self, url: &str, error: DownloadError) -> Self {
        self.outcomes.insert(url.to_string(), error);
        self
    }

    /// Hold every download until the returned semaphore gets permits
    pub fn gated(mut self) -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        self.gate = Some(Arc::clone(&gate));
        (self, gate)
    }

    pub fn requests(&self) -> Vec<DownloadRequest> {
        self.requests.lock().clone()
    }

    pub fn filenames(&self) -> Vec<String> {
        let mut names: Vec<String> = self.requests().into_iter().map(|r| r.filename).collect();
        names.sort();
        names
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PlatformDownloader for RecordingDownloader {
    async fn download(&self, request: DownloadRequest) -> Result<(), DownloadError> {
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(active, Ordering::SeqCst);
        let url = request.url.clone();
        self.requests.lock().push(request);

        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.active.fetch_sub(1, Ordering::SeqCst);
        match self.outcomes.get(&url) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

/// Everything a test needs to drive and observe the API
pub struct Harness {
    pub api: Arc<PickaApi>,
    pub host: Arc<StaticHost>,
    pub fetcher: Arc<FakeFetcher>,
    pub downloader: Arc<RecordingDownloader>,
    pub notifier: Arc<RecordingNotifier>,
}

pub struct HarnessBuilder {
    host: StaticHost,
    fetcher: FakeFetcher,
    downloader: RecordingDownloader,
    preferences: Preferences,
    download: DownloadSettings,
}

impl HarnessBuilder {
    pub fn new(host: StaticHost) -> Self {
        Self {
            host,
            fetcher: FakeFetcher::new(),
            downloader: RecordingDownloader::new(),
            preferences: Preferences::default(),
            download: DownloadSettings::default(),
        }
    }

    pub fn fetcher(mut self, fetcher: FakeFetcher) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn downloader(mut self, downloader: RecordingDownloader) -> Self {
        self.downloader = downloader;
        self
    }

    pub fn preferences(mut self, f: impl FnOnce(&mut Preferences)) -> Self {
        f(&mut self.preferences);
        self
    }

    pub fn max_active_downloads(mut self, max: usize) -> Self {
        self.download.max_active_downloads = max;
        self
    }

    pub fn build(self) -> Harness {
        let host = Arc::new(self.host);
        let fetcher = Arc::new(self.fetcher);
        let downloader = Arc::new(self.downloader);
        let notifier = Arc::new(RecordingNotifier::new());
        let services = PickaServices {
            host: host.clone(),
            fetcher: fetcher.clone(),
            in_page_fetcher: None,
            downloader: downloader.clone(),
            notifier: notifier.clone(),
        };
        let api = Arc::new(PickaApi::new(
            services,
            PreferenceStore::new(self.preferences),
            &self.download,
        ));
        Harness {
            api,
            host,
            fetcher,
            downloader,
            notifier,
        }
    }
}

pub fn images(urls: &[&str]) -> Vec<ImageDescriptor> {
    urls.iter().map(|url| ImageDescriptor::new(*url)).collect()
}

pub fn page_env(title: &str, url: &str) -> Environment {
    let mut env = Environment::new();
    env.set(KEY_PAGE_TITLE, title);
    env.set(KEY_PAGE_URL, url);
    env
}

/// A tab at `index` whose main frame holds `urls`
pub fn tab(id: u64, index: usize, title: &str, urls: &[&str]) -> TabFixture {
    TabFixture::new(TabInfo::new(id, index)).with_frame(
        FrameFixture::main(images(urls)).with_env(page_env(title, "https://pages.test/gallery")),
    )
}

/// Yield until `condition` holds, failing the test after a bounded number of turns
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..1000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("condition never became true");
}
