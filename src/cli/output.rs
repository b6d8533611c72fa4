//! CLI output: error mapping from domain errors to the CLI surface.

use crate::error::ApiError;
use owo_colors::OwoColorize;

/// Render an error for the terminal, with a coloured prefix
pub fn map_error(e: &ApiError) -> String {
    format!("{} {}", "error:".red().bold(), e)
}
