//! CLI parse: clap types for picka. No behavior; definitions only.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Picka CLI - render filename patterns and download images in batches
#[derive(Parser, Debug)]
#[command(name = "picka")]
#[command(about = "Batch image downloader with filename templates")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path (layered over the global config)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub verbose: bool,

    /// Disable logging
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long, global = true)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file)
    #[arg(long, global = true)]
    pub log_output: Option<String>,

    /// Log file path (if output is "file")
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Render a filename pattern against an environment
    Render {
        /// Pattern with ${...} placeholders
        pattern: String,

        /// Environment entry, repeatable: --env pageTitle=Cats
        #[arg(long = "env", value_parser = parse_key_value)]
        env: Vec<(String, String)>,

        /// Image URL; derives hostname, name and ext before rendering
        #[arg(long)]
        url: Option<String>,

        /// Evaluate placeholders as expressions
        #[arg(long)]
        expression: bool,
    },
    /// Download images as one batch
    Download {
        /// Image URLs, in order
        #[arg(required = true)]
        urls: Vec<String>,

        /// Download directory
        #[arg(long, default_value = ".")]
        dir: PathBuf,

        /// Batch filename pattern (defaults to the configured one)
        #[arg(long)]
        pattern: Option<String>,

        /// URL of the page the images came from
        #[arg(long)]
        page_url: Option<String>,

        /// Title of the page the images came from
        #[arg(long)]
        page_title: Option<String>,

        /// Evaluate placeholders as expressions
        #[arg(long)]
        expression: bool,

        /// Print the planned filenames without downloading
        #[arg(long)]
        dry_run: bool,
    },
    /// Show the effective configuration
    Config {
        /// Print the global config file path instead
        #[arg(long)]
        path: bool,
    },
}

/// `key=value` -> `(key, value)`
pub fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", s))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in '{}'", s));
    }
    Ok((key.to_string(), value.to_string()))
}
