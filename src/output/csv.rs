use anyhow::Result;

use crate::diff::DiffItem;
use crate::monitor::RunReport;
use crate::pipeline::PipelineOutcome;

pub fn run_to_csv(run: &RunReport) -> Result<String> {
    let mut writer = csv::Writer::from_writer(vec![]);
    writer.write_record([
        "url",
        "profile",
        "status",
        "severity",
        "change_type",
        "diffs",
        "duplicate",
        "fingerprint",
        "error",
    ])?;
    for report in &run.reports {
        let status = match (&report.error, &report.outcome) {
            (Some(_), _) => "failed",
            (None, Some(PipelineOutcome::Baseline { .. })) => "baseline",
            (None, Some(PipelineOutcome::Unchanged { .. })) => "unchanged",
            (None, Some(PipelineOutcome::Changed(_))) => "changed",
            (None, None) => "",
        };
        let analysis = report.outcome.as_ref().and_then(PipelineOutcome::analysis);
        writer.write_record([
            report.url.clone(),
            report.profile.clone(),
            status.to_string(),
            analysis
                .map(|r| r.severity_score.to_string())
                .unwrap_or_default(),
            analysis
                .map(|r| r.change_type.to_string())
                .unwrap_or_default(),
            analysis.map(|r| r.diffs.len().to_string()).unwrap_or_default(),
            analysis
                .map(|r| r.is_duplicate.to_string())
                .unwrap_or_default(),
            analysis.map(|r| r.fingerprint.clone()).unwrap_or_default(),
            report.error.clone().unwrap_or_default(),
        ])?;
    }
    let data = writer.into_inner()?;
    Ok(String::from_utf8_lossy(&data).to_string())
}

pub fn diffs_to_csv(diffs: &[DiffItem]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(vec![]);
    writer.write_record(["type", "path", "selector", "context", "old", "new"])?;
    for diff in diffs {
        writer.write_record([
            diff.change_type.as_str(),
            diff.path.as_str(),
            diff.selector.as_str(),
            diff.context.as_deref().unwrap_or_default(),
            diff.old.as_deref().unwrap_or_default(),
            diff.new.as_deref().unwrap_or_default(),
        ])?;
    }
    let data = writer.into_inner()?;
    Ok(String::from_utf8_lossy(&data).to_string())
}
