//! CLI presentation: text formatters for render results, download plans and batch reports.

use crate::download::{BatchReport, PlannedDownload};
use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;
use owo_colors::OwoColorize;

pub fn format_section_heading(title: &str) -> String {
    format!("{}", title.bold().underline())
}

pub fn format_render_result(filename: &str) -> String {
    filename.to_string()
}

/// Planned filenames, one row per image, in download order
pub fn format_download_plan(plans: &[PlannedDownload]) -> String {
    let mut out = String::new();
    out.push_str(&format!("{}\n\n", format_section_heading("Download plan")));
    if plans.is_empty() {
        out.push_str("Nothing to download.\n");
        return out;
    }
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Index", "Tab", "Filename", "URL"]);
    for plan in plans {
        table.add_row(vec![
            plan.index.to_string(),
            plan.tab_id.to_string(),
            plan.filename.clone(),
            plan.url.clone(),
        ]);
    }
    out.push_str(&format!("{}\n\n", table));
    out.push_str(&format!("Total: {} images.\n", plans.len()));
    out
}

/// Counts plus one row per failed download
pub fn format_batch_report(report: &BatchReport) -> String {
    let mut out = String::new();
    out.push_str(&format!("{}\n\n", format_section_heading("Batch download")));
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Scheduled", "Completed", "Canceled", "Failed"]);
    table.add_row(vec![
        report.scheduled.to_string(),
        report.completed.to_string(),
        report.canceled.to_string(),
        report.failures.len().to_string(),
    ]);
    out.push_str(&format!("{}\n", table));

    if !report.failures.is_empty() {
        out.push_str(&format!("\n{}\n\n", format_section_heading("Failures")));
        let mut failures = Table::new();
        failures.load_preset(UTF8_BORDERS_ONLY);
        failures.set_header(vec!["Filename", "URL", "Error"]);
        for failure in &report.failures {
            failures.add_row(vec![
                failure.filename.clone(),
                failure.url.clone(),
                failure.error.to_string(),
            ]);
        }
        out.push_str(&format!("{}\n", failures));
    }
    out
}
