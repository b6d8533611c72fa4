//! Integration tests for the shared image cache
//!
//! Tests cover:
//! - Picker lifecycle releasing a batch's references
//! - Coalesced fetches across batches
//! - Preview URLs and preview-only fetches
//! - Fetch failures leaving no entry behind

use super::support::{eventually, tab, FakeFetcher, HarnessBuilder};
use picka::cache::FetchRequest;
use picka::error::{ApiError, FetchError};
use picka::host::StaticHost;
use picka::types::{BatchId, FrameRef, MAIN_FRAME};
use std::time::Duration;

const A: &str = "https://i.test/a.png";
const B: &str = "https://i.test/b.png";

fn host() -> StaticHost {
    StaticHost::new().with_tab(tab(1, 0, "Cache", &[A, B]))
}

fn request(url: &str) -> FetchRequest {
    FetchRequest::from_frame(url, FrameRef::main(1), false)
}

#[tokio::test]
async fn test_closing_picker_releases_batch_entries() {
    let harness = HarnessBuilder::new(host().hold_pickers()).build();

    let batch_id = harness.api.pick_from_current(1, None).await.unwrap();
    harness.api.cache_image(batch_id, request(A)).await.unwrap();
    harness.api.cache_image(batch_id, request(B)).await.unwrap();
    assert_eq!(harness.api.cache().len(), 2);
    assert_eq!(harness.api.cache().owned_by(batch_id), 2);

    let host = harness.host.clone();
    eventually(|| host.close_picker(batch_id)).await;

    let api = harness.api.clone();
    eventually(|| !api.batches().contains(batch_id)).await;
    assert!(harness.api.cache().is_empty());
    assert!(matches!(
        harness.api.get_batch(batch_id),
        Err(ApiError::BatchNotFound(_))
    ));
}

#[tokio::test]
async fn test_concurrent_batches_share_one_fetch() {
    let harness = HarnessBuilder::new(host())
        .fetcher(FakeFetcher::new().with_delay(Duration::from_millis(20)))
        .build();
    let picked = harness.api.pick_images(1, MAIN_FRAME).await.unwrap();
    let env = picked.env.clone().unwrap_or_default();
    let first = harness.api.batches().open(env.clone(), vec![picked.clone()]).unwrap();
    let second = harness.api.batches().open(env, vec![picked]).unwrap();

    let (a, b) = tokio::join!(
        harness.api.cache_image(first.id, request(A)),
        harness.api.cache_image(second.id, request(A))
    );

    assert_eq!(a.unwrap(), b.unwrap());
    assert_eq!(harness.fetcher.calls(), 1);
    assert_eq!(harness.api.cache().ref_count(A), 2);

    harness.api.close_batch(first.id);
    assert_eq!(harness.api.cache().ref_count(A), 1);
    harness.api.close_batch(second.id);
    assert!(harness.api.cache().is_empty());
}

#[tokio::test]
async fn test_blob_url_for_cached_image() {
    let harness = HarnessBuilder::new(host()).build();
    let batch_id = harness.api.pick_from_current(1, None).await.unwrap();
    harness.api.cache_image(batch_id, request(A)).await.unwrap();

    let blob_url = harness.api.get_cached_blob_url(A).unwrap();
    assert!(blob_url.starts_with("data:image/png;base64,"));
    assert!(matches!(
        harness.api.get_cached_blob_url(B),
        Err(ApiError::NotCached(url)) if url == B
    ));
}

#[tokio::test]
async fn test_preview_fetch_takes_no_reference() {
    let harness = HarnessBuilder::new(host()).build();

    let image = harness.api.fetch_image(FetchRequest::new(A)).await.unwrap();

    assert_eq!(image.mime.as_deref(), Some("image/png"));
    assert!(harness.api.cache().is_empty());
}

#[tokio::test]
async fn test_unknown_batch_is_rejected() {
    let harness = HarnessBuilder::new(host()).build();

    let err = harness
        .api
        .cache_image(BatchId::new(404), request(A))
        .await
        .unwrap_err();

    assert!(matches!(err, ApiError::BatchNotFound(_)));
    assert_eq!(harness.fetcher.calls(), 0);
}

#[tokio::test]
async fn test_failed_fetch_leaves_no_entry() {
    let harness = HarnessBuilder::new(host())
        .fetcher(FakeFetcher::new().failing(B))
        .build();
    let picked = harness.api.pick_images(1, MAIN_FRAME).await.unwrap();
    let batch = harness
        .api
        .batches()
        .open(picked.env.clone().unwrap_or_default(), vec![picked])
        .unwrap();

    let err = harness.api.cache_image(batch.id, request(B)).await.unwrap_err();
    assert!(matches!(
        err,
        ApiError::Fetch(FetchError::Status { status: 404, .. })
    ));
    assert_eq!(harness.api.cache().ref_count(B), 0);

    // Nothing was memoized, so a retry fetches again
    assert!(harness.api.cache_image(batch.id, request(B)).await.is_err());
    assert_eq!(harness.fetcher.calls(), 2);
}
