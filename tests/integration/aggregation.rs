//! Integration tests for picking images across frames and tabs
//!
//! Tests cover:
//! - Frame ordering and per-tab URL dedupe
//! - Unreachable and errored frames
//! - The frame permission gate
//! - Picking from tabs to the right
//! - Action errors reaching the notifier

use super::support::{eventually, images, page_env, tab, HarnessBuilder};
use picka::environment::KEY_PAGE_TITLE;
use picka::error::ApiError;
use picka::host::memory::{FrameFixture, TabFixture};
use picka::host::{StaticHost, FRAME_PERMISSION};
use picka::types::{PickAction, TabInfo, MAIN_FRAME};

fn framed_host() -> StaticHost {
    StaticHost::new().with_tab(
        TabFixture::new(TabInfo::new(1, 0))
            .with_frame(
                FrameFixture::main(images(&["https://i.test/a.png", "https://i.test/b.png"]))
                    .with_env(page_env("Frames", "https://pages.test/frames")),
            )
            .with_frame(FrameFixture::child(
                1,
                0,
                images(&["https://i.test/b.png", "https://i.test/c.png"]),
            ))
            .with_frame(FrameFixture::child(2, 1, images(&["https://i.test/d.png"])))
            .with_frame(FrameFixture::child(3, 0, images(&["https://i.test/e.png"])).errored())
            .with_frame(FrameFixture::child(4, 0, images(&["https://i.test/f.png"])).unreachable()),
    )
}

fn urls_per_frame(result: &picka::types::TabResult) -> Vec<(i64, Vec<String>)> {
    result
        .frames
        .iter()
        .map(|f| (f.frame_id, f.images.iter().map(|i| i.url.clone()).collect()))
        .collect()
}

#[tokio::test]
async fn test_frames_in_tree_order_with_dedupe() {
    let harness = HarnessBuilder::new(framed_host())
        .preferences(|p| p.collect_from_frames = true)
        .build();

    let result = harness.api.pick_images(1, MAIN_FRAME).await.unwrap();

    assert_eq!(
        urls_per_frame(&result),
        vec![
            (0, vec!["https://i.test/a.png".to_string(), "https://i.test/b.png".to_string()]),
            (1, vec!["https://i.test/c.png".to_string()]),
            (2, vec!["https://i.test/d.png".to_string()]),
            (4, vec![]),
        ]
    );
    assert_eq!(
        result.env.unwrap().get_str(KEY_PAGE_TITLE),
        Some("Frames")
    );
    assert_eq!(harness.host.permission_requests(), vec![FRAME_PERMISSION.to_string()]);
}

#[tokio::test]
async fn test_pick_from_child_frame_puts_it_first() {
    let harness = HarnessBuilder::new(framed_host())
        .preferences(|p| p.collect_from_frames = true)
        .build();

    let result = harness.api.pick_images(1, 1).await.unwrap();

    let frame_ids: Vec<i64> = result.frames.iter().map(|f| f.frame_id).collect();
    assert_eq!(frame_ids, vec![1, 2]);
}

#[tokio::test]
async fn test_frames_skipped_without_collection() {
    let harness = HarnessBuilder::new(framed_host()).build();

    let result = harness.api.pick_images(1, MAIN_FRAME).await.unwrap();

    assert_eq!(result.frames.len(), 1);
    assert_eq!(result.image_count(), 2);
    assert!(harness.host.permission_requests().is_empty());
}

#[tokio::test]
async fn test_permission_refused() {
    let harness = HarnessBuilder::new(framed_host().deny_permissions())
        .preferences(|p| p.collect_from_frames = true)
        .build();

    let err = harness.api.pick_images(1, MAIN_FRAME).await.unwrap_err();
    assert!(matches!(err, ApiError::PermissionRequired));
}

#[tokio::test]
async fn test_unreachable_target_frame_fails() {
    let harness = HarnessBuilder::new(framed_host()).build();

    let err = harness.api.pick_images(1, 4).await.unwrap_err();
    assert!(matches!(err, ApiError::Host(_)));
}

fn window() -> StaticHost {
    let pinned = TabInfo {
        pinned: true,
        ..TabInfo::new(4, 3)
    };
    StaticHost::new()
        .with_tab(tab(1, 1, "Current", &["https://i.test/1.png"]))
        .with_tab(tab(2, 0, "Left", &["https://i.test/left.png"]))
        .with_tab(tab(3, 2, "Right", &["https://i.test/3.png", "https://i.test/1.png"]))
        .with_tab(TabFixture::new(pinned).with_frame(FrameFixture::main(images(&["https://i.test/4.png"]))))
        // No frames: scraping fails and the tab is skipped
        .with_tab(TabFixture::new(TabInfo::new(5, 4)))
        .with_tab(tab(6, 5, "Far right", &["https://i.test/6.png"]))
}

#[tokio::test]
async fn test_pick_across_tabs_to_the_right() {
    let harness = HarnessBuilder::new(window()).build();

    let selection = harness.api.pick_images_across_tabs(1, false).await.unwrap();

    let tab_ids: Vec<u64> = selection.tabs.iter().map(|t| t.tab_id).collect();
    assert_eq!(tab_ids, vec![1, 3, 6]);
    assert_eq!(selection.env.get_str(KEY_PAGE_TITLE), Some("Current"));
    // Dedupe is per tab, so tab 3 keeps its copy of 1.png
    assert_eq!(selection.tabs[1].image_count(), 2);
}

#[tokio::test]
async fn test_pick_across_tabs_excluding_current() {
    let harness = HarnessBuilder::new(window()).build();

    let selection = harness.api.pick_images_across_tabs(1, true).await.unwrap();

    let tab_ids: Vec<u64> = selection.tabs.iter().map(|t| t.tab_id).collect();
    assert_eq!(tab_ids, vec![3, 6]);
    assert_eq!(selection.env.get_str(KEY_PAGE_TITLE), Some("Current"));
}

#[tokio::test]
async fn test_run_action_opens_picker() {
    let harness = HarnessBuilder::new(window().hold_pickers()).build();

    let batch_id = harness
        .api
        .run_action(PickAction::PickFromRightTabs, 1, None)
        .await
        .unwrap();

    let batch = harness.api.get_batch(batch_id).unwrap();
    assert_eq!(batch.tabs.len(), 3);
    let host = harness.host.clone();
    eventually(|| host.opened_pickers() == vec![(batch_id, 1)]).await;
    assert!(harness.notifier.messages().is_empty());
}

#[tokio::test]
async fn test_empty_pick_is_notified() {
    let host = StaticHost::new().with_tab(tab(1, 0, "Empty", &[]));
    let harness = HarnessBuilder::new(host).build();

    assert!(harness.api.toolbar_action(1).await.is_none());
    assert_eq!(harness.notifier.messages(), vec!["No images found".to_string()]);
    assert!(harness.api.batches().is_empty());
    assert!(harness.host.opened_pickers().is_empty());
}

#[tokio::test]
async fn test_permission_error_is_notified() {
    let harness = HarnessBuilder::new(framed_host().deny_permissions())
        .preferences(|p| p.collect_from_frames = true)
        .build();

    let result = harness
        .api
        .run_action(PickAction::PickFromCurrentTab, 1, None)
        .await;

    assert!(result.is_none());
    assert_eq!(
        harness.notifier.messages(),
        vec![ApiError::PermissionRequired.to_string()]
    );
}
