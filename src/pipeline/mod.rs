//! Per-URL change detection: normalize, compare against the stored baseline,
//! classify, score and fingerprint.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::analysis::{calculate_severity, classify, ChangeType};
use crate::dedup::{generate_event_hash, Deduplicator};
use crate::diff::{DiffItem, StructuralDiffer};
use crate::document::QueryError;
use crate::normalize::{extract_text, normalize};
use crate::profile::WatchRule;
use crate::snapshot::{HistoryRepository, SnapshotRepository, Store, StoreError};

pub const DEFAULT_COOLDOWN_MINUTES: i64 = 60;
pub const DEFAULT_HISTORY_DEPTH: usize = 5;
pub const MAX_HISTORY_DEPTH: usize = 20;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("empty page received for {url}")]
    EmptyInput { url: String },
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub url: String,
    pub timestamp: DateTime<Utc>,
    pub change_detected: bool,
    pub severity_score: u8,
    pub change_type: ChangeType,
    pub reasons: Vec<String>,
    pub diffs: Vec<DiffItem>,
    pub text_summary: String,
    pub is_duplicate: bool,
    pub fingerprint: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub selector_misses: Vec<String>,
    pub related_snapshots: Vec<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PipelineOutcome {
    Baseline {
        url: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        selector_misses: Vec<String>,
    },
    Unchanged {
        url: String,
        selector_misses: Vec<String>,
    },
    Changed(Box<AnalysisResult>),
}

impl PipelineOutcome {
    pub fn url(&self) -> &str {
        match self {
            Self::Baseline { url, .. } | Self::Unchanged { url, .. } => url,
            Self::Changed(result) => &result.url,
        }
    }

    pub fn selector_misses(&self) -> &[String] {
        match self {
            Self::Baseline {
                selector_misses, ..
            }
            | Self::Unchanged {
                selector_misses, ..
            } => selector_misses,
            Self::Changed(result) => &result.selector_misses,
        }
    }

    pub fn analysis(&self) -> Option<&AnalysisResult> {
        match self {
            Self::Changed(result) => Some(result),
            _ => None,
        }
    }
}

#[derive(Clone)]
pub struct Pipeline {
    snapshots: Arc<dyn SnapshotRepository>,
    history: Arc<dyn HistoryRepository>,
    dedup: Deduplicator,
    differ: Arc<StructuralDiffer>,
    cooldown: Duration,
    history_depth: usize,
}

impl Pipeline {
    pub fn new<S: Store + 'static>(store: Arc<S>) -> Self {
        Self {
            snapshots: store.clone(),
            history: store.clone(),
            dedup: Deduplicator::new(store),
            differ: Arc::new(StructuralDiffer::new()),
            cooldown: Duration::minutes(DEFAULT_COOLDOWN_MINUTES),
            history_depth: DEFAULT_HISTORY_DEPTH,
        }
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn with_history_depth(mut self, depth: usize) -> Self {
        self.history_depth = depth.clamp(1, MAX_HISTORY_DEPTH);
        self
    }

    pub fn history_depth(&self) -> usize {
        self.history_depth
    }

    pub fn process(
        &self,
        url: &str,
        raw_html: &str,
        rule: &WatchRule,
    ) -> Result<PipelineOutcome, PipelineError> {
        self.process_at(url, raw_html, rule, Utc::now())
    }

    pub fn process_at(
        &self,
        url: &str,
        raw_html: &str,
        rule: &WatchRule,
        now: DateTime<Utc>,
    ) -> Result<PipelineOutcome, PipelineError> {
        if raw_html.trim().is_empty() {
            return Err(PipelineError::EmptyInput {
                url: url.to_string(),
            });
        }

        let normalized = normalize(raw_html, &rule.exclude_selectors)?;
        let Some(previous) = self.snapshots.get_previous(url)? else {
            info!(url, "no previous snapshot, saving baseline");
            let selector_misses = self.differ.selector_misses(&normalized, rule)?;
            self.snapshots.save(url, &normalized)?;
            self.history
                .push_history(url, &normalized, now, self.history_depth)?;
            return Ok(PipelineOutcome::Baseline {
                url: url.to_string(),
                selector_misses,
            });
        };

        let report = self
            .differ
            .compare_report(&previous, &normalized, Some(rule))?;
        if report.diffs.is_empty() {
            debug!(url, "no changes");
            return Ok(PipelineOutcome::Unchanged {
                url: url.to_string(),
                selector_misses: report.selector_misses,
            });
        }

        let change_type = classify(&report.diffs, rule);
        let severity = calculate_severity(&report.diffs, rule);
        let fingerprint = generate_event_hash(url, &report.diffs, severity.score);
        let is_duplicate = self
            .dedup
            .is_duplicate_at(&fingerprint, self.cooldown, now)?;

        // The baseline advances on every change, duplicate or not. The event
        // is recorded last so a failed write leaves it deliverable on retry.
        self.snapshots.save(url, &normalized)?;
        self.history
            .push_history(url, &normalized, now, self.history_depth)?;
        if !is_duplicate {
            self.dedup.record_event_at(&fingerprint, now)?;
        }
        let related_snapshots = self
            .history
            .history(url)?
            .into_iter()
            .map(|entry| entry.captured_at)
            .collect();

        info!(
            url,
            score = severity.score,
            change_type = %change_type,
            diffs = report.diffs.len(),
            duplicate = is_duplicate,
            "change detected"
        );

        Ok(PipelineOutcome::Changed(Box::new(AnalysisResult {
            url: url.to_string(),
            timestamp: now,
            change_detected: true,
            severity_score: severity.score,
            change_type,
            reasons: severity.reasons,
            diffs: report.diffs,
            text_summary: extract_text(&normalized),
            is_duplicate,
            fingerprint,
            selector_misses: report.selector_misses,
            related_snapshots,
        })))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use chrono::{DateTime, Duration, Utc};

    use crate::analysis::ChangeType;
    use crate::diff::DiffType;
    use crate::pipeline::{Pipeline, PipelineError, PipelineOutcome};
    use crate::profile::WatchRule;
    use crate::snapshot::{
        DedupRepository, HistoryEntry, HistoryRepository, MemoryStore, SnapshotRepository,
        StoreError,
    };

    const URL: &str = "https://shop.test/item";

    fn price_rule() -> WatchRule {
        WatchRule::new([".price"], [".ads"], ["sale"])
    }

    fn page(price: &str) -> String {
        format!(
            r#"<html><body><h2>Widget</h2>
            <div class="price">{price}</div>
            <div class="ads">Buy now {price}</div><script>var t = 1;</script></body></html>"#
        )
    }

    #[test]
    fn first_observation_saves_baseline() {
        let store = Arc::new(MemoryStore::new());
        let pipeline = Pipeline::new(store.clone());

        let outcome = pipeline
            .process(URL, &page("$10"), &price_rule())
            .expect("process");
        assert_eq!(
            outcome,
            PipelineOutcome::Baseline {
                url: URL.to_string(),
                selector_misses: Vec::new(),
            }
        );
        let saved = store.get_previous(URL).expect("get").expect("baseline");
        assert!(!saved.contains("script"));
        assert!(!saved.contains("Buy now"));
        assert_eq!(store.history(URL).expect("history").len(), 1);
    }

    #[test]
    fn unchanged_page_terminates_early() {
        let pipeline = Pipeline::new(Arc::new(MemoryStore::new()));
        let rule = price_rule();
        pipeline.process(URL, &page("$10"), &rule).expect("baseline");

        let outcome = pipeline.process(URL, &page("$10"), &rule).expect("process");
        assert!(matches!(outcome, PipelineOutcome::Unchanged { .. }));
        assert!(outcome.analysis().is_none());
    }

    #[test]
    fn ignores_changes_inside_excluded_markup() {
        let pipeline = Pipeline::new(Arc::new(MemoryStore::new()));
        let rule = price_rule();
        let before = r#"<body><p>Stable</p><div class="ads"><p>Ad one</p></div></body>"#;
        let after = r#"<body><p>Stable</p><div class="ads"><p>Ad two</p></div></body>"#;
        pipeline.process(URL, before, &rule).expect("baseline");
        let outcome = pipeline.process(URL, after, &rule).expect("process");
        assert!(matches!(outcome, PipelineOutcome::Unchanged { .. }));
    }

    #[test]
    fn price_change_is_scored_and_recorded() {
        let store = Arc::new(MemoryStore::new());
        let pipeline = Pipeline::new(store.clone());
        let rule = price_rule();
        pipeline.process(URL, &page("$10"), &rule).expect("baseline");

        let outcome = pipeline.process(URL, &page("$12"), &rule).expect("process");
        let result = outcome.analysis().expect("changed");
        assert!(result.change_detected);
        assert!(!result.is_duplicate);
        assert_eq!(result.change_type, ChangeType::ContentModified);
        assert_eq!(result.severity_score, 60);
        assert_eq!(result.diffs.len(), 1);
        assert_eq!(result.diffs[0].change_type, DiffType::Modified);
        assert_eq!(result.diffs[0].context.as_deref(), Some("Widget"));
        assert_eq!(result.text_summary, "Widget $12");
        assert_eq!(result.related_snapshots.len(), 2);
        assert!(store
            .get_last_seen(&result.fingerprint)
            .expect("get")
            .is_some());
        assert!(store
            .get_previous(URL)
            .expect("get")
            .expect("snapshot")
            .contains("$12"));
    }

    #[test]
    fn repeated_event_within_cooldown_is_duplicate() {
        let store = Arc::new(MemoryStore::new());
        let pipeline = Pipeline::new(store.clone()).with_cooldown(Duration::minutes(30));
        let rule = price_rule();
        let t0 = Utc::now();

        pipeline
            .process_at(URL, &page("$10"), &rule, t0)
            .expect("baseline");
        let first = pipeline
            .process_at(URL, &page("$12"), &rule, t0)
            .expect("first");
        let first_seen = store
            .get_last_seen(&first.analysis().expect("changed").fingerprint)
            .expect("get");

        pipeline
            .process_at(URL, &page("$10"), &rule, t0)
            .expect("revert");
        let repeat = pipeline
            .process_at(URL, &page("$12"), &rule, t0 + Duration::minutes(10))
            .expect("repeat");
        let repeat = repeat.analysis().expect("changed");
        assert!(repeat.is_duplicate);
        assert_eq!(
            store.get_last_seen(&repeat.fingerprint).expect("get"),
            first_seen
        );
        assert!(store
            .get_previous(URL)
            .expect("get")
            .expect("snapshot")
            .contains("$12"));

        pipeline
            .process_at(URL, &page("$10"), &rule, t0)
            .expect("revert");
        let later = pipeline
            .process_at(URL, &page("$12"), &rule, t0 + Duration::minutes(45))
            .expect("later");
        assert!(!later.analysis().expect("changed").is_duplicate);
    }

    #[test]
    fn exposes_selector_misses() {
        let pipeline = Pipeline::new(Arc::new(MemoryStore::new()));
        let rule = WatchRule::new([".stock"], Vec::<String>::new(), Vec::<String>::new());
        let baseline = pipeline
            .process(URL, "<body><p>One</p></body>", &rule)
            .expect("baseline");
        assert!(matches!(baseline, PipelineOutcome::Baseline { .. }));
        assert_eq!(baseline.selector_misses(), [".stock".to_string()]);

        let unchanged = pipeline
            .process(URL, "<body><p>One</p></body>", &rule)
            .expect("unchanged");
        assert_eq!(unchanged.selector_misses(), [".stock".to_string()]);

        let outcome = pipeline
            .process(URL, "<body><p>Two</p></body>", &rule)
            .expect("process");
        assert_eq!(outcome.selector_misses(), [".stock".to_string()]);
    }

    #[test]
    fn rejects_empty_input() {
        let pipeline = Pipeline::new(Arc::new(MemoryStore::new()));
        let err = pipeline
            .process(URL, "  \n ", &WatchRule::default())
            .expect_err("empty");
        assert!(matches!(err, PipelineError::EmptyInput { .. }));
    }

    #[test]
    fn clamps_history_depth() {
        let pipeline = Pipeline::new(Arc::new(MemoryStore::new()));
        assert_eq!(pipeline.clone().with_history_depth(0).history_depth(), 1);
        assert_eq!(pipeline.with_history_depth(99).history_depth(), 20);
    }

    #[derive(Default)]
    struct FaultyStore {
        inner: MemoryStore,
        dedup_down: bool,
        saves_down: AtomicBool,
    }

    impl SnapshotRepository for FaultyStore {
        fn get_previous(&self, url: &str) -> Result<Option<String>, StoreError> {
            self.inner.get_previous(url)
        }

        fn save(&self, url: &str, html: &str) -> Result<(), StoreError> {
            if self.saves_down.load(Ordering::SeqCst) {
                return Err(StoreError::Poisoned);
            }
            self.inner.save(url, html)
        }
    }

    impl DedupRepository for FaultyStore {
        fn get_last_seen(&self, fingerprint: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
            if self.dedup_down {
                return Err(StoreError::Poisoned);
            }
            self.inner.get_last_seen(fingerprint)
        }

        fn set_last_seen(&self, fingerprint: &str, seen_at: DateTime<Utc>) -> Result<(), StoreError> {
            if self.dedup_down {
                return Err(StoreError::Poisoned);
            }
            self.inner.set_last_seen(fingerprint, seen_at)
        }
    }

    impl HistoryRepository for FaultyStore {
        fn push_history(
            &self,
            url: &str,
            html: &str,
            captured_at: DateTime<Utc>,
            depth: usize,
        ) -> Result<(), StoreError> {
            self.inner.push_history(url, html, captured_at, depth)
        }

        fn history(&self, url: &str) -> Result<Vec<HistoryEntry>, StoreError> {
            self.inner.history(url)
        }
    }

    #[test]
    fn propagates_dedup_store_failures() {
        let store = Arc::new(FaultyStore {
            dedup_down: true,
            ..FaultyStore::default()
        });
        let pipeline = Pipeline::new(store.clone());
        let rule = price_rule();
        pipeline.process(URL, &page("$10"), &rule).expect("baseline");

        let err = pipeline
            .process(URL, &page("$12"), &rule)
            .expect_err("store failure");
        assert!(matches!(err, PipelineError::Store(StoreError::Poisoned)));
        assert!(store
            .get_previous(URL)
            .expect("get")
            .expect("snapshot")
            .contains("$10"));
    }

    #[test]
    fn failed_baseline_write_keeps_event_deliverable() {
        let store = Arc::new(FaultyStore::default());
        let pipeline = Pipeline::new(store.clone());
        let rule = price_rule();
        pipeline.process(URL, &page("$10"), &rule).expect("baseline");

        store.saves_down.store(true, Ordering::SeqCst);
        let err = pipeline
            .process(URL, &page("$12"), &rule)
            .expect_err("save failure");
        assert!(matches!(err, PipelineError::Store(StoreError::Poisoned)));

        store.saves_down.store(false, Ordering::SeqCst);
        let retry = pipeline.process(URL, &page("$12"), &rule).expect("retry");
        assert!(!retry.analysis().expect("changed").is_duplicate);
    }

    #[test]
    fn history_uses_observation_time() {
        let pipeline = Pipeline::new(Arc::new(MemoryStore::new()));
        let rule = price_rule();
        let t0 = DateTime::parse_from_rfc3339("2024-03-01T10:00:00Z")
            .expect("timestamp")
            .with_timezone(&Utc);
        let t1 = t0 + Duration::minutes(5);

        pipeline
            .process_at(URL, &page("$10"), &rule, t0)
            .expect("baseline");
        let outcome = pipeline
            .process_at(URL, &page("$12"), &rule, t1)
            .expect("change");
        let result = outcome.analysis().expect("changed");
        assert_eq!(result.timestamp, t1);
        assert_eq!(result.related_snapshots, vec![t1, t0]);
    }
}
