//! Direct network fetches over HTTP.

use super::fetch::{FetchRequest, FetchedImage, ImageFetcher};
use crate::config::HttpSettings;
use crate::error::{ApiError, FetchError};
use async_trait::async_trait;
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

/// `ImageFetcher` backed by `reqwest`
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(settings: &HttpSettings) -> Result<Self, ApiError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(settings.connect_timeout_secs))
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .user_agent(settings.user_agent.clone())
            .build()
            .map_err(|e| ApiError::ConfigError(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

fn map_http_error(url: &str, error: reqwest::Error) -> FetchError {
    if let Some(status) = error.status() {
        FetchError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        }
    } else if error.is_timeout() {
        FetchError::Network {
            url: url.to_string(),
            message: format!("request timeout: {}", error),
        }
    } else if error.is_connect() {
        FetchError::Network {
            url: url.to_string(),
            message: format!("connection error: {}", error),
        }
    } else {
        FetchError::Network {
            url: url.to_string(),
            message: error.to_string(),
        }
    }
}

/// Filename from a `Content-Disposition` header, e.g. `attachment; filename="a.png"`
pub fn disposition_filename(header: &str) -> Option<String> {
    header.split(';').map(str::trim).find_map(|part| {
        let value = part.strip_prefix("filename=")?;
        let value = value.trim_matches('"').trim();
        (!value.is_empty()).then(|| value.to_string())
    })
}

#[async_trait]
impl ImageFetcher for HttpFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchedImage, FetchError> {
        let url = request.url.as_str();
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| map_http_error(url, e))?;

        let headers = response.headers();
        let mime = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string());
        let filename = headers
            .get(CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(disposition_filename);

        let bytes = response.bytes().await.map_err(|e| map_http_error(url, e))?;
        debug!(url = %url, size = bytes.len(), mime = ?mime, "Fetched image");

        Ok(FetchedImage {
            bytes,
            mime,
            filename,
        })
    }
}
