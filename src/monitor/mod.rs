//! Runs many targets concurrently. Each URL is processed independently; a
//! failure on one never aborts the others.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::discovery::{discover_variants, VariantQueue};
use crate::fetch::{select_target_html, PageFetcher};
use crate::pipeline::{Pipeline, PipelineOutcome};
use crate::profile::WatchRule;

pub const DEFAULT_CONCURRENCY: usize = 4;
pub const DEFAULT_MAX_VARIANTS: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorTarget {
    pub url: String,
    pub profile: String,
    pub rule: WatchRule,
    pub css_selector: Option<String>,
    pub discover_variants: bool,
}

impl MonitorTarget {
    pub fn new(url: impl Into<String>, profile: impl Into<String>, rule: WatchRule) -> Self {
        Self {
            url: url.into(),
            profile: profile.into(),
            rule,
            css_selector: None,
            discover_variants: false,
        }
    }

    fn variant(&self, url: String) -> Self {
        Self {
            url,
            discover_variants: false,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetReport {
    pub url: String,
    pub profile: String,
    pub outcome: Option<PipelineOutcome>,
    pub error: Option<String>,
    pub missed_target_selector: Option<String>,
    pub variants: Vec<String>,
}

impl TargetReport {
    fn failed(target: &MonitorTarget, err: &anyhow::Error) -> Self {
        Self {
            url: target.url.clone(),
            profile: target.profile.clone(),
            outcome: None,
            error: Some(format!("{err:#}")),
            missed_target_selector: None,
            variants: Vec::new(),
        }
    }

    pub fn selector_misses(&self) -> Vec<String> {
        let mut misses: Vec<String> = self.missed_target_selector.iter().cloned().collect();
        if let Some(outcome) = &self.outcome {
            misses.extend(outcome.selector_misses().iter().cloned());
        }
        misses
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub total: usize,
    pub changed: usize,
    pub filtered: usize,
    pub failed: usize,
    pub duration_ms: u64,
}

impl RunStats {
    fn record(&mut self, report: &TargetReport) {
        self.total += 1;
        if report.error.is_some() {
            self.failed += 1;
        }
        if let Some(result) = report.outcome.as_ref().and_then(PipelineOutcome::analysis) {
            if result.is_duplicate {
                self.filtered += 1;
            } else {
                self.changed += 1;
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub reports: Vec<TargetReport>,
    pub stats: RunStats,
}

#[derive(Clone)]
pub struct Monitor {
    pipeline: Pipeline,
    fetcher: Arc<dyn PageFetcher>,
    concurrency: usize,
    max_variants: usize,
}

impl Monitor {
    pub fn new(pipeline: Pipeline, fetcher: Arc<dyn PageFetcher>) -> Self {
        Self {
            pipeline,
            fetcher,
            concurrency: DEFAULT_CONCURRENCY,
            max_variants: DEFAULT_MAX_VARIANTS,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_max_variants(mut self, max_variants: usize) -> Self {
        self.max_variants = max_variants;
        self
    }

    pub async fn run(&self, targets: &[MonitorTarget]) -> RunReport {
        let started = Instant::now();
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut queue = VariantQueue::new(self.max_variants);
        let mut by_url: HashMap<String, MonitorTarget> = HashMap::new();
        for target in targets {
            if queue.seed(target.url.clone()) {
                by_url.insert(target.url.clone(), target.clone());
            }
        }

        let mut tasks = JoinSet::new();
        let mut run = RunReport::default();
        loop {
            while let Some(url) = queue.pop() {
                let Some(target) = by_url.remove(&url) else {
                    continue;
                };
                let monitor = self.clone();
                let semaphore = semaphore.clone();
                tasks.spawn(async move {
                    let _permit = semaphore.acquire_owned().await;
                    monitor.check(target).await
                });
            }

            let Some(joined) = tasks.join_next().await else {
                break;
            };
            let report = match joined {
                Ok(report) => report,
                Err(err) => {
                    warn!("monitor task aborted: {err}");
                    run.stats.total += 1;
                    run.stats.failed += 1;
                    continue;
                }
            };
            if !report.variants.is_empty() {
                if let Some(parent) = targets.iter().find(|t| t.url == report.url) {
                    for variant in &report.variants {
                        if queue.offer(variant.clone()) {
                            by_url.insert(variant.clone(), parent.variant(variant.clone()));
                        }
                    }
                }
            }
            run.stats.record(&report);
            run.reports.push(report);
        }

        run.stats.duration_ms = duration_ms(started.elapsed());
        info!(
            total = run.stats.total,
            changed = run.stats.changed,
            filtered = run.stats.filtered,
            failed = run.stats.failed,
            variants = queue.discovered(),
            "run finished"
        );
        run
    }

    async fn check(&self, target: MonitorTarget) -> TargetReport {
        match self.check_inner(&target).await {
            Ok(report) => report,
            Err(err) => {
                warn!("check failed for {}: {err:#}", target.url);
                TargetReport::failed(&target, &err)
            }
        }
    }

    async fn check_inner(&self, target: &MonitorTarget) -> Result<TargetReport> {
        let raw = self.fetcher.fetch(&target.url).await?;
        let narrowed = select_target_html(&raw, target.css_selector.as_deref())?;
        let variants = if target.discover_variants {
            discover_variants(&raw, &target.url)
        } else {
            Vec::new()
        };

        let missed_target_selector = if narrowed.selector_missed {
            target.css_selector.clone()
        } else {
            None
        };

        let pipeline = self.pipeline.clone();
        let url = target.url.clone();
        let rule = target.rule.clone();
        let html = narrowed.html;
        let outcome = tokio::task::spawn_blocking(move || pipeline.process(&url, &html, &rule))
            .await
            .context("pipeline task panicked")??;

        Ok(TargetReport {
            url: target.url.clone(),
            profile: target.profile.clone(),
            outcome: Some(outcome),
            error: None,
            missed_target_selector,
            variants,
        })
    }
}

fn duration_ms(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}
