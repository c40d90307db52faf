use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AlertEventKind {
    ChangeDetected,
    BaselineCreated,
    SelectorMiss,
    RunFailed,
}

impl AlertEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ChangeDetected => "change_detected",
            Self::BaselineCreated => "baseline_created",
            Self::SelectorMiss => "selector_miss",
            Self::RunFailed => "run_failed",
        }
    }
}

impl Display for AlertEventKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AlertRules {
    #[serde(default = "default_true")]
    pub change_detected: bool,
    #[serde(default)]
    pub baseline_created: bool,
    #[serde(default = "default_true")]
    pub selector_miss: bool,
    #[serde(default = "default_true")]
    pub run_failed: bool,
}

impl AlertRules {
    pub fn allows(&self, kind: AlertEventKind) -> bool {
        match kind {
            AlertEventKind::ChangeDetected => self.change_detected,
            AlertEventKind::BaselineCreated => self.baseline_created,
            AlertEventKind::SelectorMiss => self.selector_miss,
            AlertEventKind::RunFailed => self.run_failed,
        }
    }
}

impl Default for AlertRules {
    fn default() -> Self {
        Self {
            change_detected: true,
            baseline_created: false,
            selector_miss: true,
            run_failed: true,
        }
    }
}

fn default_true() -> bool {
    true
}
