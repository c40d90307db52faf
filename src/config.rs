use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::alert::AlertRules;
use crate::monitor::{MonitorTarget, DEFAULT_CONCURRENCY, DEFAULT_MAX_VARIANTS};
use crate::pipeline::{DEFAULT_COOLDOWN_MINUTES, DEFAULT_HISTORY_DEPTH, MAX_HISTORY_DEPTH};
use crate::profile::{Preset, WatchRule};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub targets: Vec<TargetConfig>,
    #[serde(default)]
    pub profiles: BTreeMap<String, WatchRule>,
    #[serde(default)]
    pub alerts: AlertsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_cooldown_minutes")]
    pub cooldown_minutes: i64,
    #[serde(default = "default_history_depth")]
    pub history_depth: usize,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_min_severity")]
    pub min_severity_to_alert: u8,
    #[serde(default = "default_max_variants")]
    pub max_variants: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TargetConfig {
    pub url: String,
    #[serde(default = "default_profile")]
    pub profile: String,
    #[serde(default)]
    pub css_selector: Option<String>,
    #[serde(default)]
    pub discover_variants: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertsConfig {
    #[serde(default)]
    pub webhook_url: String,
    #[serde(default)]
    pub auth_header: String,
    #[serde(default = "default_enable_stdout")]
    pub enable_stdout: bool,
    #[serde(default)]
    pub rules: AlertRules,
}

#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub db_path: Option<String>,
    pub url: Option<String>,
    pub profile: Option<String>,
}

impl Config {
    pub fn default_path() -> PathBuf {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        home.join(".config/pagewatch/config.toml")
    }

    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path
            .map(|p| p.to_path_buf())
            .unwrap_or_else(Self::default_path);
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = fs::read_to_string(&path)
            .with_context(|| format!("failed reading config: {}", path.display()))?;
        let parsed: Self = toml::from_str(&data)
            .with_context(|| format!("failed parsing TOML config: {}", path.display()))?;
        Ok(parsed)
    }

    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(db_path) = overrides.db_path {
            self.storage.db_path = db_path;
        }
        if let Some(url) = overrides.url {
            let template = self.targets.iter().find(|t| t.url == url).cloned();
            self.targets = vec![template.unwrap_or(TargetConfig {
                url,
                profile: default_profile(),
                css_selector: None,
                discover_variants: false,
            })];
        }
        if let Some(profile) = overrides.profile {
            for target in &mut self.targets {
                target.profile = profile.clone();
            }
        }
    }

    pub fn write_template(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed creating config directory: {}", parent.display())
            })?;
        }
        fs::write(path, Self::default_template())
            .with_context(|| format!("failed writing config template: {}", path.display()))
    }

    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }

    pub fn cooldown(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.monitor.cooldown_minutes.max(0))
    }

    pub fn history_depth(&self) -> usize {
        self.monitor.history_depth.clamp(1, MAX_HISTORY_DEPTH)
    }

    pub fn resolve_rule(&self, profile: &str) -> Result<WatchRule> {
        let rule = match self.profiles.get(profile) {
            Some(custom) => custom.clone(),
            None => WatchRule::preset(Preset::from_str(profile)?),
        };
        rule.validate()
            .with_context(|| format!("invalid watch rule for profile {profile}"))?;
        Ok(rule)
    }

    pub fn monitor_targets(&self) -> Result<Vec<MonitorTarget>> {
        if self.targets.is_empty() {
            return Err(anyhow!(
                "no targets configured; add [[targets]] to the config or pass --url"
            ));
        }
        self.targets
            .iter()
            .map(|target| {
                Ok(MonitorTarget {
                    url: target.url.clone(),
                    profile: target.profile.clone(),
                    rule: self.resolve_rule(&target.profile)?,
                    css_selector: target.css_selector.clone(),
                    discover_variants: target.discover_variants,
                })
            })
            .collect()
    }

    pub fn default_template() -> String {
        let template = r##"[storage]
db_path = "~/.local/share/pagewatch/pagewatch.db"

[monitor]
cooldown_minutes = 60
history_depth = 5
concurrency = 4
min_severity_to_alert = 50
max_variants = 10

[[targets]]
url = "https://example.com/product"
profile = "competitor-pricing"
# css_selector = "#product"
discover_variants = false

# Custom profiles shadow the built-in presets of the same name.
[profiles.release-notes]
include_selectors = [".release", ".changelog li"]
exclude_selectors = ["nav", "footer"]
keywords = ["breaking", "deprecated", "security"]

[alerts]
webhook_url = ""
auth_header = ""
enable_stdout = true

[alerts.rules]
change_detected = true
baseline_created = false
selector_miss = true
run_failed = true
"##;
        template.to_string()
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            cooldown_minutes: default_cooldown_minutes(),
            history_depth: default_history_depth(),
            concurrency: default_concurrency(),
            min_severity_to_alert: default_min_severity(),
            max_variants: default_max_variants(),
        }
    }
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            webhook_url: String::new(),
            auth_header: String::new(),
            enable_stdout: default_enable_stdout(),
            rules: AlertRules::default(),
        }
    }
}

fn default_db_path() -> String {
    "~/.local/share/pagewatch/pagewatch.db".to_string()
}

fn default_cooldown_minutes() -> i64 {
    DEFAULT_COOLDOWN_MINUTES
}

fn default_history_depth() -> usize {
    DEFAULT_HISTORY_DEPTH
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

fn default_min_severity() -> u8 {
    50
}

fn default_max_variants() -> usize {
    DEFAULT_MAX_VARIANTS
}

fn default_profile() -> String {
    Preset::CompetitorPricing.as_slug().to_string()
}

fn default_enable_stdout() -> bool {
    true
}
