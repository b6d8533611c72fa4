//! Configuration sources, lowest precedence first.

pub mod env_vars;
pub mod explicit_file;
pub mod global_file;
