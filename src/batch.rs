//! Batch registry.
//!
//! Holds the batches currently shown in a picker. Ids are handed out in increasing
//! order starting at 0 and are never reused within a process.

use crate::aggregate::dedupe_tab;
use crate::environment::Environment;
use crate::error::ApiError;
use crate::types::{Batch, BatchId, TabResult};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Default)]
pub struct BatchRegistry {
    next_id: AtomicU64,
    batches: RwLock<HashMap<BatchId, Arc<Batch>>>,
}

impl BatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new batch.
    ///
    /// Fails with `NoImagesFound` when no tab contributed an image. Duplicate URLs
    /// within each tab are removed before the batch is stored.
    pub fn open(&self, env: Environment, mut tabs: Vec<TabResult>) -> Result<Arc<Batch>, ApiError> {
        if !tabs.iter().any(TabResult::has_images) {
            return Err(ApiError::NoImagesFound);
        }
        for tab in &mut tabs {
            dedupe_tab(tab);
        }

        let id = BatchId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        let batch = Arc::new(Batch { id, env, tabs });
        self.batches.write().insert(id, Arc::clone(&batch));
        debug!(batch_id = %id, images = batch.image_count(), "Opened batch");
        Ok(batch)
    }

    pub fn get(&self, id: BatchId) -> Option<Arc<Batch>> {
        self.batches.read().get(&id).cloned()
    }

    pub fn contains(&self, id: BatchId) -> bool {
        self.batches.read().contains_key(&id)
    }

    pub fn remove(&self, id: BatchId) -> Option<Arc<Batch>> {
        self.batches.write().remove(&id)
    }

    pub fn len(&self) -> usize {
        self.batches.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every batch. Ids keep counting up.
    pub fn clear(&self) {
        self.batches.write().clear();
    }
}
