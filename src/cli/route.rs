//! CLI route: single route table and run context. Dispatches to the picker API and presentation.

use crate::api::{PickaApi, PickaServices};
use crate::cache::{FetchRequest, HttpFetcher, ImageFetcher};
use crate::config::{ConfigLoader, PickaConfig, PreferenceStore};
use crate::environment::{Environment, KEY_PAGE_TITLE, KEY_PAGE_URL, KEY_URL};
use crate::error::ApiError;
use crate::host::{FsDownloader, LogNotifier, StaticHost};
use crate::host::memory::{FrameFixture, TabFixture};
use crate::template::{RenderMode, Template};
use crate::types::{BatchDownloadRequest, FrameRef, ImageDescriptor, TabInfo, MAIN_FRAME};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::cli::parse::Commands;
use crate::cli::presentation::{format_batch_report, format_download_plan, format_render_result};

/// Tab id the CLI gives the page its URLs are read from
const CLI_TAB: u64 = 1;

/// Runtime context for CLI execution: the effective configuration and where it came from.
pub struct RunContext {
    config: PickaConfig,
    config_path: Option<PathBuf>,
}

/// Arguments of `picka download`
struct DownloadArgs<'a> {
    urls: &'a [String],
    dir: &'a Path,
    page_url: Option<&'a str>,
    page_title: Option<&'a str>,
    dry_run: bool,
}

impl RunContext {
    /// Load and validate configuration. Uses ConfigLoader only.
    pub fn new(config_path: Option<PathBuf>) -> Result<Self, ApiError> {
        let config = ConfigLoader::load(config_path.as_deref())?.validated()?;
        Ok(Self {
            config,
            config_path,
        })
    }

    pub fn config(&self) -> &PickaConfig {
        &self.config
    }

    /// Execute a CLI command via the single route table.
    pub fn execute(&self, command: &Commands) -> Result<String, ApiError> {
        match command {
            Commands::Render {
                pattern,
                env,
                url,
                expression,
            } => self.handle_render(pattern, env, url.as_deref(), *expression),
            Commands::Download {
                urls,
                dir,
                pattern,
                page_url,
                page_title,
                expression,
                dry_run,
            } => {
                let mut preferences = self.config.preferences.clone();
                if let Some(pattern) = pattern {
                    preferences.file_pattern_batch = pattern.clone();
                }
                if *expression {
                    preferences.use_expression = true;
                }
                let args = DownloadArgs {
                    urls,
                    dir,
                    page_url: page_url.as_deref(),
                    page_title: page_title.as_deref(),
                    dry_run: *dry_run,
                };
                let runtime = tokio::runtime::Runtime::new()?;
                runtime.block_on(self.handle_download(args, PreferenceStore::new(preferences)))
            }
            Commands::Config { path } => self.handle_config(*path),
        }
    }

    fn handle_render(
        &self,
        pattern: &str,
        entries: &[(String, String)],
        url: Option<&str>,
        expression: bool,
    ) -> Result<String, ApiError> {
        let preferences = &self.config.preferences;
        let mode = if expression {
            RenderMode::Expression
        } else {
            preferences.render_mode()
        };
        let template = Template::compile(pattern, mode)?;

        let mut env = Environment::new();
        env.stamp_now();
        for (key, value) in entries {
            env.set(key.clone(), value.clone());
        }
        if let Some(url) = url {
            env.set(KEY_URL, url);
            env.expand(&preferences.naming_defaults())?;
        }
        Ok(format_render_result(&template.render(&env)?))
    }

    async fn handle_download(
        &self,
        args: DownloadArgs<'_>,
        preferences: PreferenceStore,
    ) -> Result<String, ApiError> {
        let mut page_env = Environment::new();
        if let Some(page_url) = args.page_url {
            page_env.set(KEY_PAGE_URL, page_url);
        }
        if let Some(page_title) = args.page_title {
            page_env.set(KEY_PAGE_TITLE, page_title);
        }
        let images = args.urls.iter().map(ImageDescriptor::new).collect();
        let host = Arc::new(StaticHost::new().with_tab(
            TabFixture::new(TabInfo::new(CLI_TAB, 0))
                .with_frame(FrameFixture::main(images).with_env(page_env)),
        ));

        let fetcher: Arc<dyn ImageFetcher> = Arc::new(HttpFetcher::new(&self.config.http)?);
        let downloader = Arc::new(FsDownloader::open(args.dir, Arc::clone(&fetcher)).await?);
        let services = PickaServices {
            host,
            fetcher,
            in_page_fetcher: None,
            downloader,
            notifier: Arc::new(LogNotifier),
        };
        let api = PickaApi::new(services, preferences, &self.config.download);

        let picked = api.pick_images(CLI_TAB, MAIN_FRAME).await?;
        let env = picked.env.clone().unwrap_or_default();
        let batch = api.batches().open(env, vec![picked])?;
        let request = BatchDownloadRequest::from_batch(&batch);

        if args.dry_run {
            let plans = api.plan_batch_download(&request);
            api.close_batch(batch.id);
            return Ok(format_download_plan(&plans?));
        }

        if api.preferences().read(|p| p.use_cache) {
            let origin = FrameRef::main(CLI_TAB);
            let urls: Vec<&str> = request
                .tabs
                .iter()
                .flat_map(|tab| tab.images.iter())
                .map(|image| image.url.as_str())
                .collect();
            let results = futures::future::join_all(urls.iter().map(|url| {
                api.cache_image(batch.id, FetchRequest::from_frame(*url, origin, false))
            }))
            .await;
            for (url, result) in urls.iter().zip(results) {
                if let Err(e) = result {
                    warn!(url = %url, error = %e, "Prefetch failed; downloading directly");
                }
            }
        }

        let report = api.batch_download(request).await?.wait().await;
        api.close_batch(batch.id);
        let report = report?;
        info!(
            completed = report.completed,
            failed = report.failures.len(),
            dir = %args.dir.display(),
            "Batch download finished"
        );
        Ok(format_batch_report(&report))
    }

    fn handle_config(&self, path_only: bool) -> Result<String, ApiError> {
        if path_only {
            let path = self
                .config_path
                .clone()
                .or_else(ConfigLoader::global_config_path)
                .ok_or_else(|| {
                    ApiError::ConfigError("No configuration directory available".to_string())
                })?;
            return Ok(path.display().to_string());
        }
        self.config.to_toml_string()
    }
}
