//! CLI domain: parse, route, output and presentation only.
//! Route handlers drive the library through `PickaApi`.

mod output;
mod parse;
mod presentation;
mod route;

pub use output::map_error;
pub use parse::{parse_key_value, Cli, Commands};
pub use presentation::{format_batch_report, format_download_plan, format_render_result};
pub use route::RunContext;
