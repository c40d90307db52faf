pub mod engine;
pub mod rules;
pub mod sink;

pub use engine::{apply_alert_rules, evaluate_alerts, AlertEvent};
pub use rules::{AlertEventKind, AlertRules};
pub use sink::{AlertSink, StdoutSink, WebhookFormat, WebhookSink};
