//! Integration tests for batch downloads
//!
//! Tests cover:
//! - Frame dedupe through to the scheduled download count
//! - Filename planning across tabs, with and without isolated tabs
//! - Cache entries living until their download settles
//! - Bounded concurrency
//! - Failure notification and suppressed cancellations
//! - Closing tabs after save

use super::support::{
    eventually, images, page_env, tab, Harness, HarnessBuilder, RecordingDownloader,
};
use picka::cache::FetchRequest;
use picka::error::{ApiError, DownloadError};
use picka::host::memory::{FrameFixture, TabFixture};
use picka::host::StaticHost;
use picka::types::{
    Batch, BatchDownloadRequest, BatchId, DownloadTab, FrameRef, TabInfo, MAIN_FRAME,
};
use std::sync::Arc;
use std::time::Duration;

fn two_tabs() -> StaticHost {
    StaticHost::new()
        .with_tab(tab(1, 0, "First", &["https://i.test/a.png", "https://i.test/b.jpg"]))
        .with_tab(tab(2, 1, "Second", &["https://i.test/c.gif", "https://i.test/d"]))
}

async fn pick_all(harness: &Harness) -> Arc<Batch> {
    let selection = harness.api.pick_images_across_tabs(1, false).await.unwrap();
    harness.api.batches().open(selection.env, selection.tabs).unwrap()
}

#[tokio::test]
async fn test_duplicate_frame_image_downloaded_once() {
    let host = StaticHost::new()
        .with_tab(
            TabFixture::new(TabInfo::new(1, 0))
                .with_frame(
                    FrameFixture::main(images(&["https://i.test/x.jpg"]))
                        .with_env(page_env("A", "https://pages.test/a")),
                )
                .with_frame(FrameFixture::child(1, 0, images(&["https://i.test/x.jpg"]))),
        )
        .with_tab(tab(2, 1, "B", &["https://i.test/y.png"]));
    let harness = HarnessBuilder::new(host)
        .preferences(|p| p.collect_from_frames = true)
        .build();

    let batch = pick_all(&harness).await;
    let per_tab: Vec<usize> = batch.tabs.iter().map(|t| t.image_count()).collect();
    assert_eq!(per_tab, vec![1, 1]);

    let handle = harness
        .api
        .batch_download(BatchDownloadRequest::from_batch(&batch))
        .await
        .unwrap();
    assert_eq!(handle.scheduled(), 2);
    let report = handle.wait().await.unwrap();

    assert_eq!(report.completed, 2);
    assert_eq!(harness.downloader.requests().len(), 2);
}

#[tokio::test]
async fn test_index_runs_across_tabs() {
    let harness = HarnessBuilder::new(two_tabs())
        .preferences(|p| p.file_pattern_batch = "${pageTitle}/${index} - ${name}${ext}".to_string())
        .build();
    let batch = pick_all(&harness).await;

    let handle = harness
        .api
        .batch_download(BatchDownloadRequest::from_batch(&batch))
        .await
        .unwrap();
    assert_eq!(handle.scheduled(), 4);
    let report = handle.wait().await.unwrap();

    assert!(report.is_success());
    assert_eq!(report.completed, 4);
    assert_eq!(
        harness.downloader.filenames(),
        vec![
            "First/1 - a.png".to_string(),
            "First/2 - b.jpg".to_string(),
            "First/3 - c.gif".to_string(),
            "First/4 - d.jpg".to_string(),
        ]
    );
    assert!(harness.notifier.messages().is_empty());
}

#[tokio::test]
async fn test_isolated_tabs_use_their_own_env_and_index() {
    let harness = HarnessBuilder::new(two_tabs())
        .preferences(|p| {
            p.isolate_tabs = true;
            p.file_pattern_batch = "${pageTitle}/${index}${ext}".to_string();
        })
        .build();
    let batch = pick_all(&harness).await;

    let plans = harness
        .api
        .plan_batch_download(&BatchDownloadRequest::from_batch(&batch))
        .unwrap();

    let names: Vec<(u64, String)> = plans.into_iter().map(|p| (p.tab_id, p.filename)).collect();
    assert_eq!(
        names,
        vec![
            (1, "First/1.png".to_string()),
            (1, "First/2.jpg".to_string()),
            (2, "Second/1.gif".to_string()),
            (2, "Second/2.jpg".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_selection_subset() {
    let harness = HarnessBuilder::new(two_tabs())
        .preferences(|p| p.file_pattern_batch = "${index}-${name}${ext}".to_string())
        .build();
    let batch = pick_all(&harness).await;

    let mut request = BatchDownloadRequest::from_batch(&batch);
    request.tabs[0].images.remove(0);
    request.tabs.remove(1);
    let report = harness.api.batch_download(request).await.unwrap().wait().await.unwrap();

    assert_eq!(report.scheduled, 1);
    assert_eq!(harness.downloader.filenames(), vec!["1-b.jpg".to_string()]);
}

#[tokio::test]
async fn test_cache_entry_released_after_download() {
    let (downloader, gate) = RecordingDownloader::new().gated();
    let harness = HarnessBuilder::new(two_tabs()).downloader(downloader).build();
    let batch = pick_all(&harness).await;

    let origin = FrameRef::main(1);
    for url in ["https://i.test/a.png", "https://i.test/b.jpg"] {
        harness
            .api
            .cache_image(batch.id, FetchRequest::from_frame(url, origin, false))
            .await
            .unwrap();
    }
    assert_eq!(harness.api.cache().owned_by(batch.id), 2);

    let handle = harness
        .api
        .batch_download(BatchDownloadRequest::from_batch(&batch))
        .await
        .unwrap();

    // Ownership moved to the download tasks
    assert_eq!(harness.api.cache().owned_by(batch.id), 0);
    let downloader = harness.downloader.clone();
    eventually(|| downloader.requests().len() == 4).await;
    assert_eq!(harness.api.cache().ref_count("https://i.test/a.png"), 1);
    assert_eq!(harness.api.cache().ref_count("https://i.test/b.jpg"), 1);

    gate.add_permits(4);
    let report = handle.wait().await.unwrap();

    assert_eq!(report.completed, 4);
    assert!(harness.api.cache().is_empty());

    let blobs: Vec<bool> = {
        let mut requests = harness.downloader.requests();
        requests.sort_by(|a, b| a.url.cmp(&b.url));
        requests.iter().map(|r| r.blob.is_some()).collect()
    };
    assert_eq!(blobs, vec![true, true, false, false]);
}

#[tokio::test]
async fn test_closing_picker_keeps_entries_owned_by_downloads() {
    let (downloader, gate) = RecordingDownloader::new().gated();
    let harness = HarnessBuilder::new(two_tabs()).downloader(downloader).build();
    let batch = pick_all(&harness).await;
    harness
        .api
        .cache_image(
            batch.id,
            FetchRequest::from_frame("https://i.test/a.png", FrameRef::main(1), false),
        )
        .await
        .unwrap();

    let handle = harness
        .api
        .batch_download(BatchDownloadRequest::from_batch(&batch))
        .await
        .unwrap();
    assert!(harness.api.close_batch(batch.id));
    assert_eq!(harness.api.cache().ref_count("https://i.test/a.png"), 1);

    gate.add_permits(4);
    handle.wait().await.unwrap();
    assert!(harness.api.cache().is_empty());
}

#[tokio::test]
async fn test_concurrency_is_bounded() {
    let urls: Vec<String> = (0..10).map(|i| format!("https://i.test/{}.png", i)).collect();
    let url_refs: Vec<&str> = urls.iter().map(String::as_str).collect();
    let host = StaticHost::new().with_tab(tab(1, 0, "Many", &url_refs));
    let harness = HarnessBuilder::new(host)
        .downloader(RecordingDownloader::new().with_delay(Duration::from_millis(20)))
        .max_active_downloads(3)
        .build();

    let picked = harness.api.pick_images(1, MAIN_FRAME).await.unwrap();
    let batch = harness
        .api
        .batches()
        .open(picked.env.clone().unwrap_or_default(), vec![picked])
        .unwrap();
    let report = harness
        .api
        .batch_download(BatchDownloadRequest::from_batch(&batch))
        .await
        .unwrap()
        .wait()
        .await
        .unwrap();

    assert_eq!(report.completed, 10);
    assert!(harness.downloader.peak() <= 3);
    assert!(harness.api.limiter().peak() <= 3);
    assert_eq!(harness.api.limiter().active(), 0);
}

#[tokio::test]
async fn test_failures_are_notified_once_settled() {
    let harness = HarnessBuilder::new(two_tabs())
        .downloader(
            RecordingDownloader::new()
                .failing("https://i.test/b.jpg", DownloadError::Failed("Server error".to_string()))
                .failing("https://i.test/c.gif", DownloadError::Canceled),
        )
        .preferences(|p| p.file_pattern_batch = "${name}${ext}".to_string())
        .build();
    let batch = pick_all(&harness).await;

    let report = harness
        .api
        .batch_download(BatchDownloadRequest::from_batch(&batch))
        .await
        .unwrap()
        .wait()
        .await
        .unwrap();

    assert_eq!(report.completed, 2);
    assert_eq!(report.canceled, 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(
        harness.notifier.messages(),
        vec!["Server error\nurl: https://i.test/b.jpg\nfilename: b.jpg".to_string()]
    );
}

#[tokio::test]
async fn test_template_error_schedules_nothing() {
    let harness = HarnessBuilder::new(two_tabs()).build();
    let batch = pick_all(&harness).await;
    harness.api.preferences().update(|p| {
        p.use_expression = true;
        p.file_pattern_batch = "${index +}".to_string();
    });

    let err = harness
        .api
        .batch_download(BatchDownloadRequest::from_batch(&batch))
        .await
        .unwrap_err();

    assert!(matches!(err, ApiError::Template(_)));
    assert!(harness.downloader.requests().is_empty());
    assert_eq!(harness.notifier.messages(), vec![err.to_string()]);
}

#[tokio::test]
async fn test_close_tabs_after_save() {
    let harness = HarnessBuilder::new(two_tabs())
        .preferences(|p| p.close_tabs_after_save = true)
        .build();
    let batch = pick_all(&harness).await;

    harness
        .api
        .batch_download(BatchDownloadRequest::from_batch(&batch))
        .await
        .unwrap()
        .wait()
        .await
        .unwrap();

    assert_eq!(harness.host.closed_tabs(), vec![1, 2]);
}

#[tokio::test]
async fn test_unknown_batch_id_still_downloads() {
    let harness = HarnessBuilder::new(StaticHost::new())
        .preferences(|p| p.file_pattern_batch = "${pageTitle}-${name}${ext}".to_string())
        .build();
    let request = BatchDownloadRequest {
        batch_id: BatchId::new(99),
        env: page_env("Loose", "https://pages.test/"),
        tabs: vec![DownloadTab {
            tab_id: 9,
            env: None,
            images: images(&["https://i.test/x.png"]),
        }],
    };

    let report = harness.api.batch_download(request).await.unwrap().wait().await.unwrap();
    assert_eq!(report.completed, 1);
    assert_eq!(harness.downloader.filenames(), vec!["Loose-x.png".to_string()]);
}
