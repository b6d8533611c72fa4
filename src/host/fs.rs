//! Filesystem download target.

use super::{ConflictAction, DownloadRequest, PlatformDownloader};
use crate::cache::{FetchRequest, FetchedImage, ImageFetcher};
use crate::error::DownloadError;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Highest numeric suffix tried before giving up on a unique name
const MAX_UNIQUE_SUFFIX: u32 = 9999;

/// `PlatformDownloader` that writes into a directory.
///
/// Requests without a cached payload are fetched with the given fetcher first.
pub struct FsDownloader {
    root: PathBuf,
    fetcher: Arc<dyn ImageFetcher>,
}

impl FsDownloader {
    /// Create the download directory if needed and resolve it
    pub async fn open(root: impl AsRef<Path>, fetcher: Arc<dyn ImageFetcher>) -> Result<Self, DownloadError> {
        let root = root.as_ref();
        fs::create_dir_all(root).await?;
        let root = dunce::canonicalize(root)?;
        Ok(Self { root, fetcher })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a rendered filename under the root.
    ///
    /// Only plain components are accepted.
    pub fn target_path(&self, filename: &str) -> Result<PathBuf, DownloadError> {
        let relative = Path::new(filename);
        if filename.is_empty()
            || relative
                .components()
                .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(DownloadError::InvalidTarget(filename.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

/// `name.ext` -> `name (n).ext`
fn numbered(path: &Path, n: u32) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{} ({}).{}", stem, n, ext.to_string_lossy()),
        None => format!("{} ({})", stem, n),
    };
    path.with_file_name(name)
}

/// Create the first free name among `path`, `path (1)`, ... and return its handle.
///
/// `create_new` makes the claim atomic, so concurrent downloads never share a file.
async fn create_unique(path: &Path) -> Result<(PathBuf, fs::File), DownloadError> {
    let candidates = std::iter::once(path.to_path_buf())
        .chain((1..=MAX_UNIQUE_SUFFIX).map(|n| numbered(path, n)));
    for candidate in candidates {
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&candidate)
            .await
        {
            Ok(file) => return Ok((candidate, file)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Err(DownloadError::Failed(format!(
        "no free filename for {}",
        path.display()
    )))
}

#[async_trait]
impl PlatformDownloader for FsDownloader {
    async fn download(&self, request: DownloadRequest) -> Result<(), DownloadError> {
        let target = self.target_path(&request.filename)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }
        if request.save_as {
            debug!(filename = %request.filename, "Save-as dialog not available, saving directly");
        }

        let image = match request.blob {
            Some(bytes) => FetchedImage::new(bytes, request.mime.clone()),
            None => self
                .fetcher
                .fetch(&FetchRequest::new(request.url.clone()))
                .await
                .map_err(|e| DownloadError::Failed(e.to_string()))?,
        };

        let target = match request.conflict_action {
            ConflictAction::Overwrite => {
                fs::write(&target, &image.bytes).await?;
                target
            }
            ConflictAction::Uniquify | ConflictAction::Prompt => {
                if request.conflict_action == ConflictAction::Prompt {
                    debug!(filename = %request.filename, "No prompt surface, uniquifying");
                }
                let (path, mut file) = create_unique(&target).await?;
                let written = match file.write_all(&image.bytes).await {
                    Ok(()) => file.flush().await,
                    Err(e) => Err(e),
                };
                if let Err(e) = written {
                    drop(file);
                    let _ = fs::remove_file(&path).await;
                    return Err(e.into());
                }
                path
            }
        };
        info!(
            url = %request.url,
            path = %target.display(),
            size = image.size(),
            "Saved image"
        );
        Ok(())
    }
}
