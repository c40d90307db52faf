use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color, ContentArrangement, Row, Table};

use crate::diff::{DiffItem, DiffType};
use crate::monitor::{RunReport, TargetReport};
use crate::pipeline::PipelineOutcome;
use crate::snapshot::HistoryEntry;

const HIGH_SEVERITY: u8 = 70;

fn new_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

fn status_cell(report: &TargetReport) -> Cell {
    if report.error.is_some() {
        return Cell::new("FAILED").fg(Color::Red);
    }
    match &report.outcome {
        Some(PipelineOutcome::Baseline { .. }) => Cell::new("BASELINE").fg(Color::Cyan),
        Some(PipelineOutcome::Unchanged { .. }) => Cell::new("UNCHANGED"),
        Some(PipelineOutcome::Changed(result)) if result.is_duplicate => {
            Cell::new("DUPLICATE").fg(Color::DarkGrey)
        }
        Some(PipelineOutcome::Changed(_)) => Cell::new("CHANGED").fg(Color::Yellow),
        None => Cell::new("-"),
    }
}

pub fn render_run_table(run: &RunReport) -> String {
    let mut table = new_table();
    table.set_header(vec![
        "URL",
        "Profile",
        "Status",
        "Severity",
        "Change Type",
        "Diffs",
        "Notes",
    ]);

    for report in &run.reports {
        let analysis = report.outcome.as_ref().and_then(PipelineOutcome::analysis);
        let severity_cell = match analysis {
            Some(result) if result.severity_score >= HIGH_SEVERITY => {
                Cell::new(result.severity_score).fg(Color::Red)
            }
            Some(result) => Cell::new(result.severity_score),
            None => Cell::new("-"),
        };
        let misses = report.selector_misses();
        let notes = if let Some(error) = &report.error {
            error.clone()
        } else if !misses.is_empty() {
            format!("missed: {}", misses.join(", "))
        } else {
            String::new()
        };
        table.add_row(Row::from(vec![
            Cell::new(&report.url),
            Cell::new(&report.profile),
            status_cell(report),
            severity_cell,
            Cell::new(
                analysis
                    .map(|r| r.change_type.to_string())
                    .unwrap_or_else(|| "-".to_string()),
            ),
            Cell::new(analysis.map(|r| r.diffs.len()).unwrap_or(0)),
            Cell::new(notes),
        ]));
    }

    let stats = &run.stats;
    format!(
        "{table}\nChecked {} | changed {} | duplicates {} | failed {} | {} ms",
        stats.total, stats.changed, stats.filtered, stats.failed, stats.duration_ms
    )
}

pub fn render_diff_table(diffs: &[DiffItem]) -> String {
    let mut table = new_table();
    table.set_header(vec!["Type", "Path", "Selector", "Context", "Old", "New"]);
    for diff in diffs {
        let color = match diff.change_type {
            DiffType::Added => Color::Green,
            DiffType::Removed => Color::Red,
            DiffType::Modified => Color::Yellow,
        };
        table.add_row(Row::from(vec![
            Cell::new(diff.change_type).fg(color),
            Cell::new(&diff.path),
            Cell::new(&diff.selector),
            Cell::new(diff.context.as_deref().unwrap_or("-")),
            Cell::new(diff.old.as_deref().unwrap_or("-")),
            Cell::new(diff.new.as_deref().unwrap_or("-")),
        ]));
    }
    table.to_string()
}

pub fn render_history_table(entries: &[HistoryEntry]) -> String {
    let mut table = new_table();
    table.set_header(vec!["Captured", "URL", "Content Hash"]);
    for entry in entries {
        table.add_row(vec![
            entry.captured_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            entry.url.clone(),
            entry.html_hash.chars().take(16).collect::<String>(),
        ]);
    }
    table.to_string()
}
