//! Merge rules: defaults and override order.

use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

/// Create a Config builder with the built-in defaults applied.
///
/// Struct-level serde defaults cover every other key; these are the values other
/// layers most often override.
pub fn builder_with_defaults() -> Result<ConfigBuilder<config::builder::DefaultState>, ConfigError>
{
    Config::builder()
        .set_default("download.max_active_downloads", 5_i64)?
        .set_default("download.release_delay_ms", 0_i64)?
        .set_default("logging.level", "warn")?
        .set_default("logging.output", "stderr")
}
