//! Configuration loader: builds the layered `config` stack and deserializes it.

use super::merge_policy::builder_with_defaults;
use super::sources::{env_vars, explicit_file, global_file};
use super::PickaConfig;
use config::ConfigError;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Loads [`PickaConfig`] from defaults, files and the environment
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load the full stack.
    ///
    /// Precedence, lowest first: defaults, global file, `explicit` file, environment.
    pub fn load(explicit: Option<&Path>) -> Result<PickaConfig, ConfigError> {
        let mut builder = global_file::add_to_builder(builder_with_defaults()?)?;
        if let Some(path) = explicit {
            builder = explicit_file::add_to_builder(builder, path)?;
        }
        builder = env_vars::add_to_builder(builder);

        let config: PickaConfig = builder.build()?.try_deserialize()?;
        debug!(explicit = ?explicit, "Loaded configuration");
        Ok(config)
    }

    /// Load defaults plus one file, ignoring the global file and the environment
    pub fn load_from_file(path: &Path) -> Result<PickaConfig, ConfigError> {
        explicit_file::add_to_builder(builder_with_defaults()?, path)?
            .build()?
            .try_deserialize()
    }

    /// Defaults only
    pub fn defaults() -> Result<PickaConfig, ConfigError> {
        builder_with_defaults()?.build()?.try_deserialize()
    }

    pub fn global_config_path() -> Option<PathBuf> {
        global_file::global_config_path()
    }
}
