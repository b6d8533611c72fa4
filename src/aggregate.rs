//! Frame Aggregator
//!
//! Collects image candidates from a tab's target frame and, optionally, from every
//! frame nested below it. The result is one `TabResult` whose first frame is the
//! frame the pick started from, with duplicate URLs removed across frames.

use crate::environment::Environment;
use crate::error::{ApiError, HostError};
use crate::host::BrowsingHost;
use crate::types::{FrameId, FrameInfo, FrameRef, FrameResult, TabId, TabResult, MAIN_FRAME};
use futures::future::join_all;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

/// Images gathered from several tabs, with the environment of the tab the pick
/// started from
#[derive(Debug, Clone, PartialEq)]
pub struct TabSelection {
    pub env: Environment,
    pub tabs: Vec<TabResult>,
}

pub struct FrameAggregator {
    host: Arc<dyn BrowsingHost>,
}

impl FrameAggregator {
    pub fn new(host: Arc<dyn BrowsingHost>) -> Self {
        Self { host }
    }

    /// Pick the images of one tab starting at `frame_id`.
    ///
    /// The target frame's images and environment are required. Child frames that
    /// cannot be reached contribute an empty frame.
    pub async fn pick_images(
        &self,
        tab_id: TabId,
        frame_id: FrameId,
        collect_from_frames: bool,
    ) -> Result<TabResult, ApiError> {
        let target = FrameRef::new(tab_id, frame_id);
        let (images, env, children) = futures::join!(
            self.host.scrape_images(target),
            self.host.scrape_environment(target),
            self.child_frame_results(tab_id, frame_id, collect_from_frames)
        );

        let mut frames = vec![FrameResult {
            frame_id,
            images: images?,
        }];
        frames.extend(children?);
        promote_frame(&mut frames, frame_id);

        let mut result = TabResult {
            tab_id,
            frames,
            env: Some(env?),
        };
        dedupe_tab(&mut result);
        debug!(
            tab_id,
            frame_id,
            frames = result.frames.len(),
            images = result.image_count(),
            "Picked images"
        );
        Ok(result)
    }

    async fn child_frame_results(
        &self,
        tab_id: TabId,
        frame_id: FrameId,
        collect_from_frames: bool,
    ) -> Result<Vec<FrameResult>, HostError> {
        if !collect_from_frames {
            return Ok(Vec::new());
        }
        let frames = self.host.enumerate_frames(tab_id).await?;
        let children = descendant_frames(&frames, frame_id);

        let scrapes = children.iter().map(|&child| async move {
            let images = match self.host.scrape_images(FrameRef::new(tab_id, child)).await {
                Ok(images) => images,
                Err(err) => {
                    warn!(tab_id, frame_id = child, error = %err, "Skipping unreachable frame");
                    Vec::new()
                }
            };
            FrameResult {
                frame_id: child,
                images,
            }
        });
        Ok(join_all(scrapes).await)
    }

    /// Environment of one frame without its images
    pub async fn pick_env(&self, tab_id: TabId, frame_id: FrameId) -> Result<(TabId, Environment), ApiError> {
        let env = self
            .host
            .scrape_environment(FrameRef::new(tab_id, frame_id))
            .await?;
        Ok((tab_id, env))
    }

    /// Pick from `current` and every eligible tab to its right.
    ///
    /// Eligible tabs sit at a higher index and are neither discarded, pinned nor
    /// hidden. A tab that cannot be picked is logged and left out. The current tab
    /// always provides the selection environment, even when its images are excluded.
    pub async fn pick_images_across_tabs(
        &self,
        current: TabId,
        exclude_current: bool,
        collect_from_frames: bool,
    ) -> Result<TabSelection, ApiError> {
        let tabs = self.host.window_tabs(current).await?;
        let current_index = tabs
            .iter()
            .find(|t| t.id == current)
            .map(|t| t.index)
            .ok_or(HostError::TabNotFound(current))?;
        let to_right: Vec<TabId> = tabs
            .iter()
            .filter(|t| t.index > current_index && t.is_pickable())
            .map(|t| t.id)
            .collect();

        let current_pick = async {
            if exclude_current {
                let (_, env) = self.pick_env(current, MAIN_FRAME).await?;
                Ok::<_, ApiError>((env, None))
            } else {
                let result = self.pick_images(current, MAIN_FRAME, collect_from_frames).await?;
                Ok((result.env.clone().unwrap_or_default(), Some(result)))
            }
        };
        let right_picks = join_all(to_right.iter().map(|&tab_id| async move {
            match self.pick_images(tab_id, MAIN_FRAME, collect_from_frames).await {
                Ok(result) => Some(result),
                Err(err) => {
                    warn!(tab_id, error = %err, "Skipping tab that could not be picked");
                    None
                }
            }
        }));

        let (current_result, right_results) = futures::join!(current_pick, right_picks);
        let (env, current_tab) = current_result?;

        let tabs = current_tab
            .into_iter()
            .chain(right_results.into_iter().flatten())
            .collect();
        Ok(TabSelection { env, tabs })
    }
}

/// All frames below `root` in depth-first pre-order, `root` excluded.
///
/// Frames reporting an error are left out of the tree together with their subtree.
pub fn descendant_frames(frames: &[FrameInfo], root: FrameId) -> Vec<FrameId> {
    let mut tree: HashMap<FrameId, Vec<FrameId>> = HashMap::new();
    for frame in frames {
        if frame.error_occurred || frame.parent_frame_id < 0 {
            continue;
        }
        tree.entry(frame.parent_frame_id)
            .or_default()
            .push(frame.frame_id);
    }

    let mut collected = Vec::new();
    let mut visited = HashSet::new();
    let mut stack = vec![root];
    while let Some(id) = stack.pop() {
        if !visited.insert(id) {
            continue;
        }
        if id != root {
            collected.push(id);
        }
        if let Some(children) = tree.get(&id) {
            stack.extend(children.iter().rev());
        }
    }
    collected
}

/// Swap the frame with `frame_id` into the first position. No-op when absent.
pub fn promote_frame(frames: &mut [FrameResult], frame_id: FrameId) {
    if let Some(index) = frames.iter().position(|f| f.frame_id == frame_id) {
        frames.swap(0, index);
    }
}

/// Drop repeated URLs across the frames of one tab; the first occurrence wins
pub fn dedupe_tab(tab: &mut TabResult) {
    let mut seen = HashSet::new();
    for frame in &mut tab.frames {
        frame.images.retain(|image| seen.insert(image.url.clone()));
    }
}
