//! Image Cache
//!
//! URL-keyed store of fetched image payloads shared by the picker preview and the
//! download that follows it. Entries are reference counted and evicted at zero.
//! Each batch keeps its own ownership counter so a batch can only ever release the
//! references it took. Concurrent fetches of one URL are coalesced into a single
//! network request.

pub mod fetch;
pub mod http;

pub use fetch::{FetchRequest, FetchedImage, ImageFetcher};
pub use http::HttpFetcher;

use crate::error::FetchError;
use crate::types::BatchId;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Payload handed out by the cache
pub type CachedImage = FetchedImage;

type FetchWaiter = oneshot::Sender<Result<FetchedImage, FetchError>>;

#[derive(Debug)]
struct CacheEntry {
    image: FetchedImage,
    ref_count: usize,
}

/// Per-batch multiset of URLs the batch holds a reference to
#[derive(Debug, Default)]
struct UrlCounter {
    counts: HashMap<String, usize>,
}

impl UrlCounter {
    fn add(&mut self, url: &str) {
        *self.counts.entry(url.to_string()).or_insert(0) += 1;
    }

    fn take(&mut self, url: &str) -> bool {
        match self.counts.get_mut(url) {
            Some(count) if *count > 1 => {
                *count -= 1;
                true
            }
            Some(_) => {
                self.counts.remove(url);
                true
            }
            None => false,
        }
    }

    fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    /// URLs with a network fetch in progress, and the callers waiting on it
    inflight: HashMap<String, Vec<FetchWaiter>>,
    owners: HashMap<BatchId, UrlCounter>,
}

enum FetchSlot {
    Ready(FetchedImage),
    Wait(oneshot::Receiver<Result<FetchedImage, FetchError>>),
    Lead,
}

/// Clears the in-flight marker if the leading fetch is dropped before it settles.
/// Dropping the waiters' senders wakes them with `FetchError::Abandoned`.
struct InflightGuard<'a> {
    state: &'a Mutex<CacheState>,
    url: &'a str,
    armed: bool,
}

impl InflightGuard<'_> {
    /// Clear the marker, storing `stored` under the same lock so no new fetch can start
    /// between the two
    fn finish(mut self, stored: Option<(&FetchedImage, Option<BatchId>)>) -> Vec<FetchWaiter> {
        self.armed = false;
        let mut state = self.state.lock();
        if let Some((image, owner)) = stored {
            ImageCache::take_ref_locked(&mut state, self.url, image, owner);
        }
        state.inflight.remove(self.url).unwrap_or_default()
    }
}

impl Drop for InflightGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.state.lock().inflight.remove(self.url);
        }
    }
}

/// Reference-counted image cache
pub struct ImageCache {
    direct: Arc<dyn ImageFetcher>,
    in_context: Option<Arc<dyn ImageFetcher>>,
    state: Mutex<CacheState>,
}

impl ImageCache {
    pub fn new(direct: Arc<dyn ImageFetcher>) -> Self {
        Self {
            direct,
            in_context: None,
            state: Mutex::new(CacheState::default()),
        }
    }

    /// Use `fetcher` when a direct fetch fails and the request names its frame
    pub fn with_fallback(mut self, fetcher: Arc<dyn ImageFetcher>) -> Self {
        self.in_context = Some(fetcher);
        self
    }

    /// Fetch image bytes.
    ///
    /// A cached entry is returned as is. Otherwise at most one network fetch per URL
    /// is in flight; later callers wait for its result. The result is not stored; use
    /// [`ImageCache::add`] for that.
    pub async fn fetch(&self, request: &FetchRequest) -> Result<CachedImage, FetchError> {
        self.fetch_slot(request, None).await
    }

    /// With `take` set, a reference is taken (owned by the inner batch id, if any) in
    /// the same critical section that finds the entry or settles the in-flight fetch.
    async fn fetch_slot(
        &self,
        request: &FetchRequest,
        take: Option<Option<BatchId>>,
    ) -> Result<CachedImage, FetchError> {
        let url = request.url.as_str();
        let slot = {
            let mut state = self.state.lock();
            if let Some(image) = state.entries.get(url).map(|entry| entry.image.clone()) {
                if let Some(owner) = take {
                    Self::take_ref_locked(&mut state, url, &image, owner);
                }
                FetchSlot::Ready(image)
            } else if let Some(waiters) = state.inflight.get_mut(url) {
                let (tx, rx) = oneshot::channel();
                waiters.push(tx);
                FetchSlot::Wait(rx)
            } else {
                state.inflight.insert(url.to_string(), Vec::new());
                FetchSlot::Lead
            }
        };

        match slot {
            FetchSlot::Ready(image) => Ok(image),
            FetchSlot::Wait(rx) => {
                debug!(url = %url, "Joining in-flight fetch");
                let image = rx.await.map_err(|_| FetchError::Abandoned {
                    url: url.to_string(),
                })??;
                if let Some(owner) = take {
                    Self::take_ref_locked(&mut self.state.lock(), url, &image, owner);
                }
                Ok(image)
            }
            FetchSlot::Lead => {
                let guard = InflightGuard {
                    state: &self.state,
                    url,
                    armed: true,
                };
                let result = self.fetch_with_fallback(request).await;
                let stored = match (&result, take) {
                    (Ok(image), Some(owner)) => Some((image, owner)),
                    _ => None,
                };
                let waiters = guard.finish(stored);
                for tx in waiters {
                    let _ = tx.send(result.clone());
                }
                result
            }
        }
    }

    async fn fetch_with_fallback(&self, request: &FetchRequest) -> Result<FetchedImage, FetchError> {
        let direct_err = match self.direct.fetch(request).await {
            Ok(image) => return Ok(image),
            Err(err) => err,
        };
        let fallback = match (&self.in_context, &request.origin) {
            (Some(fetcher), Some(_)) => fetcher,
            _ => return Err(direct_err),
        };

        warn!(
            url = %request.url,
            error = %direct_err,
            no_referrer = request.no_referrer,
            "Direct fetch failed, retrying from the page"
        );
        fallback
            .fetch(request)
            .await
            .map_err(|err| FetchError::Fallback {
                url: request.url.clone(),
                direct: direct_err.to_string(),
                in_context: err.to_string(),
            })
    }

    /// Fetch and take one reference, recorded against `owner` when given
    pub async fn add(
        &self,
        owner: Option<BatchId>,
        request: &FetchRequest,
    ) -> Result<CachedImage, FetchError> {
        self.fetch_slot(request, Some(owner)).await
    }

    fn take_ref_locked(state: &mut CacheState, url: &str, image: &FetchedImage, owner: Option<BatchId>) {
        let ref_count = {
            let entry = state
                .entries
                .entry(url.to_string())
                .and_modify(|entry| entry.ref_count += 1)
                .or_insert_with(|| CacheEntry {
                    image: image.clone(),
                    ref_count: 1,
                });
            entry.ref_count
        };
        if let Some(batch_id) = owner {
            state.owners.entry(batch_id).or_default().add(url);
        }
        debug!(url = %url, ref_count, owner = ?owner, "Cached image");
    }

    /// Take another reference to an existing entry on behalf of `batch_id`
    pub fn retain(&self, batch_id: BatchId, url: &str) -> bool {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        match state.entries.get_mut(url) {
            Some(entry) => {
                entry.ref_count += 1;
                state.owners.entry(batch_id).or_default().add(url);
                true
            }
            None => false,
        }
    }

    /// Move one reference out of the batch's ownership set.
    ///
    /// Returns whether the batch held one. The caller then owns the reference and is
    /// responsible for releasing it.
    pub fn disown(&self, batch_id: BatchId, url: &str) -> bool {
        let mut state = self.state.lock();
        let Some(counter) = state.owners.get_mut(&batch_id) else {
            return false;
        };
        let taken = counter.take(url);
        if counter.is_empty() {
            state.owners.remove(&batch_id);
        }
        taken
    }

    /// Drop one reference; the entry is evicted at zero
    pub fn release(&self, url: &str) -> bool {
        let mut state = self.state.lock();
        Self::release_locked(&mut state, url)
    }

    fn release_locked(state: &mut CacheState, url: &str) -> bool {
        let Some(entry) = state.entries.get_mut(url) else {
            return false;
        };
        entry.ref_count = entry.ref_count.saturating_sub(1);
        if entry.ref_count == 0 {
            state.entries.remove(url);
            debug!(url = %url, "Evicted cached image");
        }
        true
    }

    pub fn release_many<I, S>(&self, urls: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut state = self.state.lock();
        urls.into_iter()
            .filter(|url| Self::release_locked(&mut state, url.as_ref()))
            .count()
    }

    /// Release every reference the batch still owns
    pub fn release_batch(&self, batch_id: BatchId) -> usize {
        let mut state = self.state.lock();
        let Some(counter) = state.owners.remove(&batch_id) else {
            return 0;
        };
        let mut released = 0;
        for (url, count) in counter.counts {
            for _ in 0..count {
                if Self::release_locked(&mut state, &url) {
                    released += 1;
                }
            }
        }
        debug!(batch_id = %batch_id, released, "Released batch cache references");
        released
    }

    /// Evict everything regardless of reference counts
    pub fn clear_all(&self) -> usize {
        let mut state = self.state.lock();
        let evicted = state.entries.len();
        state.entries.clear();
        state.owners.clear();
        evicted
    }

    pub fn get(&self, url: &str) -> Option<CachedImage> {
        self.state.lock().entries.get(url).map(|e| e.image.clone())
    }

    /// `data:` URL of a cached payload for preview surfaces
    pub fn preview_url(&self, url: &str) -> Option<String> {
        self.get(url).map(|image| data_url(&image))
    }

    pub fn ref_count(&self, url: &str) -> usize {
        self.state
            .lock()
            .entries
            .get(url)
            .map(|e| e.ref_count)
            .unwrap_or(0)
    }

    /// References the batch currently owns across all URLs
    pub fn owned_by(&self, batch_id: BatchId) -> usize {
        self.state
            .lock()
            .owners
            .get(&batch_id)
            .map(|c| c.counts.values().sum())
            .unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub fn data_url(image: &FetchedImage) -> String {
    let mime = image.mime.as_deref().unwrap_or("application/octet-stream");
    format!("data:{};base64,{}", mime, BASE64.encode(&image.bytes))
}
