//! Image fetch abstraction.

use crate::error::FetchError;
use crate::types::FrameRef;
use async_trait::async_trait;
use bytes::Bytes;

/// A request for the bytes of one image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: String,
    /// Browsing context the image was found in, used for the in-page fallback
    pub origin: Option<FrameRef>,
    /// Ask the in-page fetch not to send a referrer
    pub no_referrer: bool,
}

impl FetchRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            origin: None,
            no_referrer: false,
        }
    }

    pub fn from_frame(url: impl Into<String>, origin: FrameRef, no_referrer: bool) -> Self {
        Self {
            url: url.into(),
            origin: Some(origin),
            no_referrer,
        }
    }
}

/// Bytes and metadata of a fetched image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedImage {
    pub bytes: Bytes,
    pub mime: Option<String>,
    /// Filename suggested by the server, if any
    pub filename: Option<String>,
}

impl FetchedImage {
    pub fn new(bytes: impl Into<Bytes>, mime: Option<String>) -> Self {
        Self {
            bytes: bytes.into(),
            mime,
            filename: None,
        }
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

/// Source of image bytes.
///
/// The cache uses one implementation for direct network fetches and, optionally, a
/// second one that fetches from inside the originating page.
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchedImage, FetchError>;
}
