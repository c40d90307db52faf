use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use reqwest::{Client, StatusCode};
use scraper::Html;
use tracing::{debug, warn};

use crate::document::html::parse_selector;
use crate::document::QueryError;

const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
const MAX_ATTEMPTS: u32 = 3;
const RETRY_BACKOFF_MS: u64 = 500;
const RETRYABLE_STATUS: [u16; 7] = [403, 404, 429, 500, 502, 503, 504];

static HTTP_CLIENT: Lazy<Client> = Lazy::new(|| {
    Client::builder()
        .user_agent(concat!("pagewatch/", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS))
        .connect_timeout(Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS))
        .build()
        .expect("failed to build HTTP client")
});

#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HttpFetcher;

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        let mut attempt = 1;
        loop {
            match fetch_once(url).await {
                Ok(body) => return Ok(body),
                Err(FetchFailure::Retryable(err)) if attempt < MAX_ATTEMPTS => {
                    warn!("attempt {attempt} for {url} failed: {err:#}");
                    tokio::time::sleep(Duration::from_millis(RETRY_BACKOFF_MS * attempt as u64))
                        .await;
                    attempt += 1;
                }
                Err(FetchFailure::Retryable(err) | FetchFailure::Fatal(err)) => return Err(err),
            }
        }
    }
}

enum FetchFailure {
    Retryable(anyhow::Error),
    Fatal(anyhow::Error),
}

async fn fetch_once(url: &str) -> std::result::Result<String, FetchFailure> {
    let response = HTTP_CLIENT
        .get(url)
        .send()
        .await
        .with_context(|| format!("failed GET request: {url}"))
        .map_err(FetchFailure::Retryable)?;
    let status = response.status();
    let body = response
        .text()
        .await
        .with_context(|| format!("failed reading response body: {url}"))
        .map_err(FetchFailure::Retryable)?;
    if !status.is_success() {
        let preview: String = body.chars().take(180).collect();
        let err = anyhow!("GET {url} returned {status}: {preview}");
        return Err(if is_retryable(status) {
            FetchFailure::Retryable(err)
        } else {
            FetchFailure::Fatal(err)
        });
    }
    debug!("fetched {url} ({} bytes)", body.len());
    Ok(body)
}

fn is_retryable(status: StatusCode) -> bool {
    RETRYABLE_STATUS.contains(&status.as_u16())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetHtml {
    pub html: String,
    pub selector_missed: bool,
}

/// Outer HTML of every match of `selector`; the full page, flagged, when
/// nothing matches.
pub fn select_target_html(html: &str, selector: Option<&str>) -> Result<TargetHtml, QueryError> {
    let Some(selector) = selector.filter(|s| !s.trim().is_empty()) else {
        return Ok(TargetHtml {
            html: html.trim().to_string(),
            selector_missed: false,
        });
    };

    let parsed = parse_selector(selector)?;
    let document = Html::parse_document(html);
    let fragments: Vec<String> = document.select(&parsed).map(|el| el.html()).collect();
    if fragments.is_empty() {
        debug!("target selector `{selector}` matched nothing, keeping full page");
        return Ok(TargetHtml {
            html: html.trim().to_string(),
            selector_missed: true,
        });
    }
    Ok(TargetHtml {
        html: fragments.join("\n"),
        selector_missed: false,
    })
}

#[cfg(test)]
mod tests {
    use reqwest::StatusCode;

    use crate::document::QueryError;
    use crate::fetch::{is_retryable, select_target_html};

    const PAGE: &str = r#"<html><body><nav>Menu</nav>
        <div class="card"><h2>A</h2><span class="price">$1</span></div>
        <div class="card"><h2>B</h2><span class="price">$2</span></div>
        </body></html>"#;

    #[test]
    fn keeps_full_page_without_selector() {
        let target = select_target_html(PAGE, None).expect("select");
        assert_eq!(target.html, PAGE.trim());
        assert!(!target.selector_missed);
        assert!(!select_target_html(PAGE, Some("  "))
            .expect("select")
            .selector_missed);
    }

    #[test]
    fn narrows_to_matching_fragments() {
        let target = select_target_html(PAGE, Some(".card")).expect("select");
        assert!(!target.selector_missed);
        assert!(!target.html.contains("Menu"));
        assert_eq!(target.html.matches("class=\"card\"").count(), 2);
        assert!(target.html.contains("$2"));
    }

    #[test]
    fn falls_back_and_flags_missing_target() {
        let target = select_target_html(PAGE, Some("#gone")).expect("select");
        assert!(target.selector_missed);
        assert!(target.html.contains("Menu"));
    }

    #[test]
    fn reports_invalid_target_selector() {
        let err = select_target_html(PAGE, Some("div[")).expect_err("invalid");
        assert!(matches!(err, QueryError::InvalidSelector { .. }));
    }

    #[test]
    fn retries_transient_statuses_only() {
        assert!(is_retryable(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable(StatusCode::BAD_GATEWAY));
        assert!(!is_retryable(StatusCode::UNAUTHORIZED));
        assert!(!is_retryable(StatusCode::GONE));
    }
}
