use std::collections::{HashSet, VecDeque};

use reqwest::Url;
use scraper::{Html, Selector};

const SWATCH_SELECTORS: [&str; 5] = [
    "li[data-dp-url] a",
    "li.swatchAvailable a",
    "#variation_color_name a",
    "#variation_size_name a",
    "#variation_style_name a",
];
const PRODUCT_PATH_MARKER: &str = "/dp/";
const VARIANT_TEXT_HINTS: [&str; 3] = ["gb", "tb", "color"];

pub fn discover_variants(html: &str, base_url: &str) -> Vec<String> {
    let base = Url::parse(base_url).ok();
    let document = Html::parse_document(html);
    let mut found: Vec<String> = Vec::new();
    let mut push = |href: &str| {
        let resolved = resolve(base.as_ref(), href);
        if resolved != base_url && !found.contains(&resolved) {
            found.push(resolved);
        }
    };

    for raw in SWATCH_SELECTORS {
        let Ok(selector) = Selector::parse(raw) else {
            continue;
        };
        for link in document.select(&selector) {
            if let Some(href) = link.value().attr("href") {
                if href.contains(PRODUCT_PATH_MARKER) {
                    push(href);
                }
            }
        }
    }

    if let Ok(anchors) = Selector::parse("a[href]") {
        for link in document.select(&anchors) {
            let text = link.text().collect::<String>().to_lowercase();
            if !VARIANT_TEXT_HINTS.iter().any(|hint| text.contains(hint)) {
                continue;
            }
            if let Some(href) = link.value().attr("href") {
                push(href);
            }
        }
    }

    found
}

fn resolve(base: Option<&Url>, href: &str) -> String {
    base.and_then(|b| b.join(href).ok())
        .map(|url| url.to_string())
        .unwrap_or_else(|| href.to_string())
}

#[derive(Debug, Default)]
pub struct VariantQueue {
    pending: VecDeque<String>,
    visited: HashSet<String>,
    discovered: usize,
    max_discovered: usize,
}

impl VariantQueue {
    pub fn new(max_discovered: usize) -> Self {
        Self {
            max_discovered,
            ..Self::default()
        }
    }

    pub fn seed(&mut self, url: impl Into<String>) -> bool {
        let url = url.into();
        if !self.visited.insert(url.clone()) {
            return false;
        }
        self.pending.push_back(url);
        true
    }

    pub fn offer(&mut self, url: impl Into<String>) -> bool {
        if self.discovered >= self.max_discovered {
            return false;
        }
        let url = url.into();
        if !self.visited.insert(url.clone()) {
            return false;
        }
        self.discovered += 1;
        self.pending.push_back(url);
        true
    }

    pub fn pop(&mut self) -> Option<String> {
        self.pending.pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn discovered(&self) -> usize {
        self.discovered
    }
}
