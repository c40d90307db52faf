use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use pagewatch::alert::{apply_alert_rules, evaluate_alerts, AlertSink, StdoutSink, WebhookSink};
use pagewatch::analysis::{calculate_severity, classify};
use pagewatch::config::{Config, ConfigOverrides};
use pagewatch::diff::{DiffItem, StructuralDiffer};
use pagewatch::document::ParsedHtml;
use pagewatch::fetch::HttpFetcher;
use pagewatch::monitor::{Monitor, RunReport};
use pagewatch::normalize::normalize;
use pagewatch::output::csv::{diffs_to_csv, run_to_csv};
use pagewatch::output::json::{render_json, render_json_lines};
use pagewatch::output::table::{render_diff_table, render_history_table, render_run_table};
use pagewatch::pipeline::Pipeline;
use pagewatch::snapshot::{HistoryRepository, SqliteStore};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
    /// One JSON document per target.
    Jsonl,
    Csv,
}

#[derive(Debug, Parser)]
#[command(
    name = "pagewatch",
    about = "Structural web page change detection"
)]
struct Cli {
    #[arg(short, long)]
    config: Option<PathBuf>,
    #[arg(long)]
    db: Option<String>,
    /// Check only this URL instead of the configured targets.
    #[arg(short, long)]
    url: Option<String>,
    /// Profile (custom or preset) applied to every target.
    #[arg(short, long)]
    profile: Option<String>,
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
    output: OutputFormat,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Fetch every target once.
    Check,
    /// Fetch every target repeatedly.
    Watch {
        #[arg(long, default_value_t = 300)]
        interval_secs: u64,
        #[arg(long, default_value_t = 1)]
        iterations: u32,
    },
    /// Compare two local HTML files.
    Diff {
        old: PathBuf,
        new: PathBuf,
    },
    History {
        #[arg(long)]
        url: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    Config {
        #[arg(long)]
        init: bool,
        #[arg(long)]
        show: bool,
    },
}

#[derive(Debug, Serialize)]
struct DiffSummary {
    change_type: String,
    severity_score: u8,
    reasons: Vec<String>,
    diffs: Vec<DiffItem>,
    selector_misses: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let mut config = Config::load(Some(&config_path))?;
    config.apply_overrides(ConfigOverrides {
        db_path: cli.db.clone(),
        url: cli.url.clone(),
        profile: cli.profile.clone(),
    });

    match &cli.command {
        Commands::Config { init, show } => {
            if *init {
                Config::write_template(&config_path)?;
                println!("Wrote config template to {}", config_path.display());
            }
            if *show || !*init {
                println!("{}", render_json(&config)?);
            }
        }
        Commands::Diff { old, new } => {
            let profile = cli
                .profile
                .clone()
                .unwrap_or_else(|| "competitor-pricing".to_string());
            run_offline_diff(&config, &profile, old, new, cli.output)?;
        }
        Commands::History { url, limit } => {
            let store = SqliteStore::open(&config.resolved_db_path())?;
            let url = url
                .clone()
                .or_else(|| config.targets.first().map(|t| t.url.clone()))
                .context("no URL given and no targets configured")?;
            let mut entries = store.history(&url)?;
            entries.truncate(*limit);
            match cli.output {
                OutputFormat::Table => println!("{}", render_history_table(&entries)),
                OutputFormat::Json => println!("{}", render_json(&entries)?),
                OutputFormat::Jsonl => print!("{}", render_json_lines(&entries)?),
                OutputFormat::Csv => {
                    warn!("CSV output for history not implemented, using JSON");
                    println!("{}", render_json(&entries)?);
                }
            }
        }
        Commands::Check => {
            let monitor = build_monitor(&config)?;
            let sinks = build_sinks(&config)?;
            let run = run_once(&monitor, &config, &sinks).await?;
            print_run(&run, cli.output)?;
        }
        Commands::Watch {
            interval_secs,
            iterations,
        } => {
            let monitor = build_monitor(&config)?;
            let sinks = build_sinks(&config)?;
            let interval = Duration::from_secs((*interval_secs).max(1));
            let total_iterations = (*iterations).max(1);
            for i in 0..total_iterations {
                info!("watch iteration {}", i + 1);
                let run = run_once(&monitor, &config, &sinks).await?;
                print_run(&run, cli.output)?;
                if i + 1 < total_iterations {
                    tokio::time::sleep(interval).await;
                }
            }
        }
    }

    Ok(())
}

fn build_monitor(config: &Config) -> Result<Monitor> {
    let store = Arc::new(SqliteStore::open(&config.resolved_db_path())?);
    let pipeline = Pipeline::new(store)
        .with_cooldown(config.cooldown())
        .with_history_depth(config.history_depth());
    Ok(Monitor::new(pipeline, Arc::new(HttpFetcher))
        .with_concurrency(config.monitor.concurrency)
        .with_max_variants(config.monitor.max_variants))
}

fn build_sinks(config: &Config) -> Result<Vec<Box<dyn AlertSink>>> {
    let mut sinks: Vec<Box<dyn AlertSink>> = Vec::new();
    if config.alerts.enable_stdout {
        sinks.push(Box::new(StdoutSink));
    }
    if !config.alerts.webhook_url.trim().is_empty() {
        sinks.push(Box::new(WebhookSink::new(
            config.alerts.webhook_url.clone(),
            Some(config.alerts.auth_header.clone()),
        )?));
    }
    Ok(sinks)
}

async fn run_once(
    monitor: &Monitor,
    config: &Config,
    sinks: &[Box<dyn AlertSink>],
) -> Result<RunReport> {
    let targets = config.monitor_targets()?;
    let run = monitor.run(&targets).await;
    let alerts = evaluate_alerts(&run.reports, config.monitor.min_severity_to_alert);
    let alerts = apply_alert_rules(alerts, &config.alerts.rules);
    for alert in &alerts {
        for sink in sinks {
            if let Err(err) = sink.send(alert).await {
                warn!("failed sending alert: {err:#}");
            }
        }
    }
    Ok(run)
}

fn run_offline_diff(
    config: &Config,
    profile: &str,
    old: &Path,
    new: &Path,
    format: OutputFormat,
) -> Result<()> {
    let rule = config.resolve_rule(profile)?;
    let read = |path: &Path| {
        fs::read_to_string(path).with_context(|| format!("failed reading {}", path.display()))
    };
    let old_html = normalize(&read(old)?, &rule.exclude_selectors)?;
    let new_html = normalize(&read(new)?, &rule.exclude_selectors)?;
    let report = StructuralDiffer::<ParsedHtml>::new().compare_report(&old_html, &new_html, Some(&rule))?;
    let severity = calculate_severity(&report.diffs, &rule);
    let summary = DiffSummary {
        change_type: classify(&report.diffs, &rule).to_string(),
        severity_score: severity.score,
        reasons: severity.reasons,
        diffs: report.diffs,
        selector_misses: report.selector_misses,
    };

    match format {
        OutputFormat::Table => {
            println!("{}", render_diff_table(&summary.diffs));
            println!(
                "{} | severity {}/100",
                summary.change_type, summary.severity_score
            );
            for reason in &summary.reasons {
                println!("- {reason}");
            }
            if !summary.selector_misses.is_empty() {
                println!("Selectors with no match: {}", summary.selector_misses.join(", "));
            }
        }
        OutputFormat::Json => println!("{}", render_json(&summary)?),
        OutputFormat::Jsonl => print!("{}", render_json_lines(&summary.diffs)?),
        OutputFormat::Csv => print!("{}", diffs_to_csv(&summary.diffs)?),
    }
    Ok(())
}

fn print_run(run: &RunReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => println!("{}", render_run_table(run)),
        OutputFormat::Json => println!("{}", render_json(run)?),
        OutputFormat::Jsonl => print!("{}", render_json_lines(&run.reports)?),
        OutputFormat::Csv => print!("{}", run_to_csv(run)?),
    }
    Ok(())
}
