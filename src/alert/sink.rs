use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, Url};
use serde_json::{json, Value};
use tracing::info;

use crate::alert::engine::AlertEvent;
use crate::alert::rules::AlertEventKind;

const SLACK_GREEN: &str = "#36a64f";
const SLACK_YELLOW: &str = "#e8a800";
const SLACK_RED: &str = "#ff0000";
const DISCORD_GREEN: u32 = 0x36a64f;
const DISCORD_YELLOW: u32 = 0xe8a800;
const DISCORD_RED: u32 = 0xff0000;
const WARN_SEVERITY: u8 = 50;

#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn send(&self, event: &AlertEvent) -> Result<()>;
}

pub struct StdoutSink;

#[async_trait]
impl AlertSink for StdoutSink {
    async fn send(&self, event: &AlertEvent) -> Result<()> {
        println!("[{}] {}\n{}", event.kind, event.title, event.body);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookFormat {
    Slack,
    Discord,
    Json,
}

impl WebhookFormat {
    pub fn detect(url: &str) -> Self {
        if url.contains("hooks.slack.com") {
            Self::Slack
        } else if url.contains("discord.com/api/webhooks")
            || url.contains("discordapp.com/api/webhooks")
        {
            Self::Discord
        } else {
            Self::Json
        }
    }
}

pub struct WebhookSink {
    client: Client,
    url: String,
    auth_header: Option<String>,
    format: WebhookFormat,
}

impl WebhookSink {
    pub fn new(url: impl Into<String>, auth_header: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("pagewatch/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(10))
            .build()
            .context("failed to build webhook HTTP client")?;
        let url = url.into();
        Ok(Self {
            client,
            format: WebhookFormat::detect(&url),
            auth_header: auth_header.filter(|h| !h.trim().is_empty()),
            url,
        })
    }
}

#[async_trait]
impl AlertSink for WebhookSink {
    async fn send(&self, event: &AlertEvent) -> Result<()> {
        let mut req = self
            .client
            .post(&self.url)
            .json(&webhook_payload(self.format, event));
        if let Some(auth) = &self.auth_header {
            req = req.header(AUTHORIZATION, auth);
        }
        req.send()
            .await
            .with_context(|| format!("failed POST to webhook for {}", event.url))?
            .error_for_status()?;
        info!("webhook delivered: {} {}", event.kind, event.url);
        Ok(())
    }
}

pub fn webhook_payload(format: WebhookFormat, event: &AlertEvent) -> Value {
    match format {
        WebhookFormat::Slack => slack_payload(event),
        WebhookFormat::Discord => discord_payload(event),
        WebhookFormat::Json => json!(event),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tone {
    Good,
    Warning,
    Bad,
}

fn tone(event: &AlertEvent) -> Tone {
    let body = event.body.to_lowercase();
    if event.kind == AlertEventKind::RunFailed
        || body.contains("out of stock")
        || body.contains("sold out")
    {
        return Tone::Bad;
    }
    if event.price_drop {
        return Tone::Good;
    }
    if event.kind == AlertEventKind::SelectorMiss || event.severity.unwrap_or(0) > WARN_SEVERITY {
        return Tone::Warning;
    }
    Tone::Good
}

fn display_host(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.trim_start_matches("www.").to_string()))
        .unwrap_or_else(|| url.to_string())
}

fn slack_payload(event: &AlertEvent) -> Value {
    let color = match tone(event) {
        Tone::Good => SLACK_GREEN,
        Tone::Warning => SLACK_YELLOW,
        Tone::Bad => SLACK_RED,
    };
    let severity = event
        .severity
        .map(|s| format!("{s}/100"))
        .unwrap_or_else(|| "-".to_string());
    json!({
        "attachments": [{
            "color": color,
            "blocks": [
                {
                    "type": "header",
                    "text": {
                        "type": "plain_text",
                        "text": format!("{}: {}", event.kind, display_host(&event.url)),
                    }
                },
                {
                    "type": "section",
                    "fields": [
                        { "type": "mrkdwn", "text": format!("*Severity:*\n{severity}") },
                        { "type": "mrkdwn", "text": format!("*Kind:*\n{}", event.kind) },
                    ]
                },
                {
                    "type": "section",
                    "text": { "type": "mrkdwn", "text": format!("*{}*\n{}", event.title, event.body) }
                },
                {
                    "type": "actions",
                    "elements": [{
                        "type": "button",
                        "text": { "type": "plain_text", "text": "View Page" },
                        "url": event.url,
                        "style": "primary",
                    }]
                }
            ]
        }]
    })
}

fn discord_payload(event: &AlertEvent) -> Value {
    let color = match tone(event) {
        Tone::Good => DISCORD_GREEN,
        Tone::Warning => DISCORD_YELLOW,
        Tone::Bad => DISCORD_RED,
    };
    let mut fields = vec![json!({ "name": "Kind", "value": event.kind.as_str(), "inline": true })];
    if let Some(severity) = event.severity {
        fields.push(json!({ "name": "Severity", "value": format!("{severity}/100"), "inline": true }));
    }
    if !event.reasons.is_empty() {
        fields.push(json!({ "name": "Reasons", "value": event.reasons.join("\n") }));
    }
    json!({
        "embeds": [{
            "title": event.title,
            "url": event.url,
            "description": event.body,
            "color": color,
            "fields": fields,
        }]
    })
}
