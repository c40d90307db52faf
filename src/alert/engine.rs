use serde::{Deserialize, Serialize};

use crate::alert::rules::{AlertEventKind, AlertRules};
use crate::analysis::is_price_decrease;
use crate::diff::DiffItem;
use crate::monitor::TargetReport;
use crate::pipeline::PipelineOutcome;

const MAX_DIFFS_IN_BODY: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub kind: AlertEventKind,
    pub url: String,
    pub title: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reasons: Vec<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub price_drop: bool,
}

impl AlertEvent {
    fn plain(kind: AlertEventKind, url: &str, title: String, body: String) -> Self {
        Self {
            kind,
            url: url.to_string(),
            title,
            body,
            severity: None,
            fingerprint: None,
            reasons: Vec::new(),
            price_drop: false,
        }
    }
}

/// Turns one run's reports into alerts. Duplicate changes and changes scored
/// below `min_severity` never alert.
pub fn evaluate_alerts(reports: &[TargetReport], min_severity: u8) -> Vec<AlertEvent> {
    let mut events = Vec::new();

    for report in reports {
        if let Some(error) = &report.error {
            events.push(AlertEvent::plain(
                AlertEventKind::RunFailed,
                &report.url,
                format!("Check failed for {}", report.url),
                error.clone(),
            ));
            continue;
        }

        match &report.outcome {
            Some(PipelineOutcome::Baseline { url, .. }) => events.push(AlertEvent::plain(
                AlertEventKind::BaselineCreated,
                url,
                format!("Baseline saved for {url}"),
                "Monitoring starts with the next run.".to_string(),
            )),
            Some(PipelineOutcome::Changed(result))
                if !result.is_duplicate && result.severity_score >= min_severity =>
            {
                events.push(AlertEvent {
                    kind: AlertEventKind::ChangeDetected,
                    url: result.url.clone(),
                    title: format!(
                        "Change detected on {} ({}/100, {})",
                        result.url, result.severity_score, result.change_type
                    ),
                    body: describe_diffs(&result.diffs),
                    severity: Some(result.severity_score),
                    fingerprint: Some(result.fingerprint.clone()),
                    reasons: result.reasons.clone(),
                    price_drop: is_price_decrease(&result.diffs),
                });
            }
            _ => {}
        }

        let misses = report.selector_misses();
        if !misses.is_empty() {
            events.push(AlertEvent::plain(
                AlertEventKind::SelectorMiss,
                &report.url,
                format!("Selectors matched nothing on {}", report.url),
                misses.join(", "),
            ));
        }
    }

    events
}

pub fn apply_alert_rules(alerts: Vec<AlertEvent>, rules: &AlertRules) -> Vec<AlertEvent> {
    alerts
        .into_iter()
        .filter(|event| rules.allows(event.kind))
        .collect()
}

pub fn describe_diffs(diffs: &[DiffItem]) -> String {
    let mut lines: Vec<String> = diffs
        .iter()
        .take(MAX_DIFFS_IN_BODY)
        .map(|d| {
            let label = d.context.as_deref().unwrap_or(&d.path);
            match (&d.old, &d.new) {
                (Some(old), Some(new)) => format!("{} {label}: {old} -> {new}", d.change_type),
                (None, Some(new)) => format!("{} {label}: {new}", d.change_type),
                (Some(old), None) => format!("{} {label}: {old}", d.change_type),
                (None, None) => format!("{} {label}", d.change_type),
            }
        })
        .collect();
    if diffs.len() > MAX_DIFFS_IN_BODY {
        lines.push(format!("... and {} more", diffs.len() - MAX_DIFFS_IN_BODY));
    }
    lines.join("\n")
}
