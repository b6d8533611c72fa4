//! Configuration System
//!
//! Layered configuration: built-in defaults, the global `picka/config.toml`, an
//! explicit file and `PICKA__*` environment variables, in increasing precedence.
//! Preferences can be changed at runtime through [`PreferenceStore`].

use crate::environment::NamingDefaults;
use crate::error::ApiError;
use crate::host::ConflictAction;
use crate::limiter::DEFAULT_MAX_ACTIVE;
use crate::logging::{validate_logging_config, LoggingConfig};
use crate::template::{RenderMode, Template};
use crate::types::PickAction;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

mod loader;
mod merge_policy;
mod sources;

pub use loader::ConfigLoader;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PickaConfig {
    #[serde(default)]
    pub preferences: Preferences,

    #[serde(default)]
    pub download: DownloadSettings,

    #[serde(default)]
    pub http: HttpSettings,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// User preferences.
///
/// Keys are snake_case in TOML; the camelCase names used by the browser host are
/// accepted as aliases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    /// Action bound to the toolbar button
    #[serde(alias = "browserAction")]
    pub browser_action: PickAction,

    /// Show the pick actions in page context menus
    #[serde(alias = "contextMenu")]
    pub context_menu: bool,

    pub enabled: bool,

    #[serde(alias = "collectFromFrames")]
    pub collect_from_frames: bool,

    /// Restart the image index for every tab of a batch
    #[serde(alias = "isolateTabs")]
    pub isolate_tabs: bool,

    #[serde(alias = "useExpression")]
    pub use_expression: bool,

    #[serde(alias = "filePatternBatch")]
    pub file_pattern_batch: String,

    #[serde(alias = "filePattern")]
    pub file_pattern: String,

    /// Pattern for images opened directly in a tab
    #[serde(alias = "filePatternStandalone")]
    pub file_pattern_standalone: String,

    #[serde(alias = "filePatternStandaloneEnabled")]
    pub file_pattern_standalone_enabled: bool,

    #[serde(alias = "useCache")]
    pub use_cache: bool,

    #[serde(alias = "saveAs")]
    pub save_as: bool,

    #[serde(alias = "filenameConflictAction")]
    pub filename_conflict_action: ConflictAction,

    #[serde(alias = "closeTabsAfterSave")]
    pub close_tabs_after_save: bool,

    #[serde(alias = "defaultName")]
    pub default_name: String,

    #[serde(alias = "defaultExt")]
    pub default_ext: String,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            browser_action: PickAction::PickFromCurrentTab,
            context_menu: true,
            enabled: true,
            collect_from_frames: false,
            isolate_tabs: false,
            use_expression: false,
            file_pattern_batch: "Image Picka/${pageTitle}/${index} - ${name}${ext}".to_string(),
            file_pattern: "Image Picka/${name}${ext}".to_string(),
            file_pattern_standalone: "Image Picka/${name}${ext}".to_string(),
            file_pattern_standalone_enabled: false,
            use_cache: true,
            save_as: false,
            filename_conflict_action: ConflictAction::Uniquify,
            close_tabs_after_save: false,
            default_name: "unnamed".to_string(),
            default_ext: ".jpg".to_string(),
        }
    }
}

impl Preferences {
    pub fn render_mode(&self) -> RenderMode {
        RenderMode::from_flag(self.use_expression)
    }

    pub fn naming_defaults(&self) -> NamingDefaults {
        NamingDefaults {
            default_name: self.default_name.clone(),
            default_ext: self.default_ext.clone(),
        }
    }

    /// Pattern for a single download given the page's content type
    pub fn single_pattern(&self, page_content_type: &str) -> &str {
        if self.file_pattern_standalone_enabled && page_content_type.starts_with("image/") {
            &self.file_pattern_standalone
        } else {
            &self.file_pattern
        }
    }

    fn validate(&self, errors: &mut Vec<ValidationError>) {
        let mode = self.render_mode();
        for (key, pattern) in [
            ("file_pattern_batch", &self.file_pattern_batch),
            ("file_pattern", &self.file_pattern),
            ("file_pattern_standalone", &self.file_pattern_standalone),
        ] {
            if pattern.trim().is_empty() {
                errors.push(ValidationError::Preference(
                    key.to_string(),
                    "pattern cannot be empty".to_string(),
                ));
            } else if let Err(e) = Template::compile(pattern, mode) {
                errors.push(ValidationError::Preference(key.to_string(), e.to_string()));
            }
        }
        if self.default_name.trim().is_empty() {
            errors.push(ValidationError::Preference(
                "default_name".to_string(),
                "cannot be empty".to_string(),
            ));
        }
        if !self.default_ext.is_empty() && !self.default_ext.starts_with('.') {
            errors.push(ValidationError::Preference(
                "default_ext".to_string(),
                format!("must start with '.', got '{}'", self.default_ext),
            ));
        }
    }
}

/// Download scheduling settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadSettings {
    /// Concurrent downloads across all batches
    pub max_active_downloads: usize,

    /// Extra wait between a download settling and its cache entry being released
    pub release_delay_ms: u64,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            max_active_downloads: DEFAULT_MAX_ACTIVE,
            release_delay_ms: 0,
        }
    }
}

impl DownloadSettings {
    pub fn release_delay(&self) -> Option<Duration> {
        (self.release_delay_ms > 0).then(|| Duration::from_millis(self.release_delay_ms))
    }
}

/// HTTP client settings for direct fetches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10,
            request_timeout_secs: 60,
            user_agent: format!("picka/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    Preference(String, String),
    Download(String),
    Http(String),
    Logging(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Preference(key, msg) => write!(f, "Preference '{}': {}", key, msg),
            ValidationError::Download(msg) => write!(f, "Download: {}", msg),
            ValidationError::Http(msg) => write!(f, "HTTP: {}", msg),
            ValidationError::Logging(msg) => write!(f, "Logging: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl PickaConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        self.preferences.validate(&mut errors);

        if self.download.max_active_downloads == 0 {
            errors.push(ValidationError::Download(
                "max_active_downloads must be at least 1".to_string(),
            ));
        }
        if self.http.request_timeout_secs == 0 {
            errors.push(ValidationError::Http(
                "request_timeout_secs must be at least 1".to_string(),
            ));
        }
        if let Err(e) = validate_logging_config(&self.logging) {
            errors.push(ValidationError::Logging(e));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validate and fold all errors into one `ApiError`
    pub fn validated(self) -> Result<Self, ApiError> {
        self.validate().map_err(|errors| {
            let error_msgs: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            ApiError::ConfigError(format!(
                "Configuration validation failed:\n{}",
                error_msgs.join("\n")
            ))
        })?;
        Ok(self)
    }

    /// Effective configuration as TOML
    pub fn to_toml_string(&self) -> Result<String, ApiError> {
        toml::to_string_pretty(self)
            .map_err(|e| ApiError::ConfigError(format!("Failed to render config: {}", e)))
    }
}

/// Shared, runtime-updatable preferences
#[derive(Debug, Clone, Default)]
pub struct PreferenceStore {
    inner: Arc<RwLock<Preferences>>,
}

impl PreferenceStore {
    pub fn new(preferences: Preferences) -> Self {
        Self {
            inner: Arc::new(RwLock::new(preferences)),
        }
    }

    /// Snapshot of the current preferences
    pub fn get(&self) -> Preferences {
        self.inner.read().clone()
    }

    /// Read one value without cloning the whole set
    pub fn read<T>(&self, f: impl FnOnce(&Preferences) -> T) -> T {
        f(&self.inner.read())
    }

    pub fn update(&self, f: impl FnOnce(&mut Preferences)) {
        f(&mut self.inner.write());
    }

    pub fn replace(&self, preferences: Preferences) {
        *self.inner.write() = preferences;
    }

    /// Apply a JSON object of changed keys, as sent by the host's preference bus
    pub fn apply_changes(&self, changes: &serde_json::Value) -> Result<(), ApiError> {
        let serde_json::Value::Object(changes) = changes else {
            return Err(ApiError::ConfigError(
                "preference changes must be an object".to_string(),
            ));
        };
        let mut merged = serde_json::to_value(self.get())
            .map_err(|e| ApiError::ConfigError(e.to_string()))?;
        if let serde_json::Value::Object(current) = &mut merged {
            for (key, value) in changes {
                current.insert(snake_case(key), value.clone());
            }
        }
        let updated: Preferences = serde_json::from_value(merged)
            .map_err(|e| ApiError::ConfigError(format!("Invalid preference change: {}", e)))?;
        self.replace(updated);
        Ok(())
    }

    /// Reload preferences from the config files
    pub fn reload(&self, explicit: Option<&Path>) -> Result<(), ApiError> {
        let config = ConfigLoader::load(explicit)?.validated()?;
        self.replace(config.preferences);
        Ok(())
    }
}

/// `filePatternBatch` -> `file_pattern_batch`
fn snake_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    for c in key.chars() {
        if c.is_ascii_uppercase() {
            out.push('_');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}
