//! Download limiter.
//!
//! Counting semaphore shared by every batch and by single downloads. At most
//! `max_active` downloads run at once; the rest wait in FIFO order.

use crate::error::ApiError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Default number of concurrent downloads
pub const DEFAULT_MAX_ACTIVE: usize = 5;

#[derive(Debug, Default)]
struct Counters {
    active: AtomicUsize,
    peak: AtomicUsize,
}

/// Process-wide bound on concurrent downloads
#[derive(Debug, Clone)]
pub struct DownloadLimiter {
    semaphore: Arc<Semaphore>,
    max_active: usize,
    counters: Arc<Counters>,
}

/// A held download slot; freed on drop
#[derive(Debug)]
pub struct DownloadSlot {
    _permit: OwnedSemaphorePermit,
    counters: Arc<Counters>,
}

impl Drop for DownloadSlot {
    fn drop(&mut self) {
        self.counters.active.fetch_sub(1, Ordering::SeqCst);
    }
}

impl DownloadLimiter {
    pub fn new(max_active: usize) -> Self {
        let max_active = max_active.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max_active)),
            max_active,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Wait for a free slot
    pub async fn acquire(&self) -> Result<DownloadSlot, ApiError> {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| ApiError::LimiterClosed)?;

        let active = self.counters.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.peak.fetch_max(active, Ordering::SeqCst);

        Ok(DownloadSlot {
            _permit: permit,
            counters: Arc::clone(&self.counters),
        })
    }

    pub fn max_active(&self) -> usize {
        self.max_active
    }

    /// Downloads currently holding a slot
    pub fn active(&self) -> usize {
        self.counters.active.load(Ordering::SeqCst)
    }

    /// Highest number of slots held at once since creation
    pub fn peak(&self) -> usize {
        self.counters.peak.load(Ordering::SeqCst)
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Stop handing out slots; pending and future `acquire` calls fail
    pub fn close(&self) {
        self.semaphore.close();
    }
}

impl Default for DownloadLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ACTIVE)
    }
}
