//! Property-based tests: cache reference counts follow add/release sequences

use async_trait::async_trait;
use picka::cache::{FetchRequest, FetchedImage, ImageCache, ImageFetcher};
use picka::error::FetchError;
use picka::types::BatchId;
use proptest::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;

struct EchoFetcher;

#[async_trait]
impl ImageFetcher for EchoFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchedImage, FetchError> {
        Ok(FetchedImage::new(request.url.clone().into_bytes(), None))
    }
}

#[derive(Debug, Clone)]
enum Op {
    Add(Option<u64>, usize),
    Release(usize),
    ReleaseBatch(u64),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (prop::option::of(0u64..3), 0usize..4).prop_map(|(owner, url)| Op::Add(owner, url)),
        (0usize..4).prop_map(Op::Release),
        (0u64..3).prop_map(Op::ReleaseBatch),
    ]
}

fn url(index: usize) -> String {
    format!("https://i.test/{}.png", index)
}

/// An entry exists exactly while the modelled count is positive
#[test]
fn test_ref_counts_match_model() {
    let mut runner = proptest::test_runner::TestRunner::default();
    let rt = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap();

    runner
        .run(&prop::collection::vec(op(), 0..40), |ops| {
            let cache = ImageCache::new(Arc::new(EchoFetcher));
            let mut counts: HashMap<usize, usize> = HashMap::new();
            let mut owned: HashMap<u64, HashMap<usize, usize>> = HashMap::new();

            for op in ops {
                match op {
                    Op::Add(owner, index) => {
                        rt.block_on(cache.add(owner.map(BatchId::new), &FetchRequest::new(url(index))))
                            .unwrap();
                        *counts.entry(index).or_default() += 1;
                        if let Some(owner) = owner {
                            *owned.entry(owner).or_default().entry(index).or_default() += 1;
                        }
                    }
                    Op::Release(index) => {
                        let count = counts.entry(index).or_default();
                        let released = cache.release(&url(index));
                        prop_assert_eq!(released, *count > 0);
                        *count = count.saturating_sub(1);
                    }
                    Op::ReleaseBatch(owner) => {
                        for (index, n) in owned.remove(&owner).unwrap_or_default() {
                            let count = counts.entry(index).or_default();
                            *count = count.saturating_sub(n);
                        }
                        cache.release_batch(BatchId::new(owner));
                    }
                }
            }

            for index in 0..4 {
                let expected = counts.get(&index).copied().unwrap_or(0);
                prop_assert_eq!(cache.ref_count(&url(index)), expected);
                prop_assert_eq!(cache.get(&url(index)).is_some(), expected > 0);
            }
            Ok(())
        })
        .unwrap();
}
