use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::document::html::parse_selector;
use crate::document::QueryError;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct WatchRule {
    #[serde(default)]
    pub include_selectors: Vec<String>,
    #[serde(default)]
    pub exclude_selectors: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RuleError {
    #[error("empty selector in {0}")]
    EmptySelector(&'static str),
    #[error("empty keyword")]
    EmptyKeyword,
    #[error(transparent)]
    Query(#[from] QueryError),
}

impl WatchRule {
    pub fn new<I, E, K>(include: I, exclude: E, keywords: K) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
        E: IntoIterator,
        E::Item: Into<String>,
        K: IntoIterator,
        K::Item: Into<String>,
    {
        Self {
            include_selectors: dedup_ordered(include.into_iter().map(Into::into)),
            exclude_selectors: dedup_ordered(exclude.into_iter().map(Into::into)),
            keywords: dedup_ordered(keywords.into_iter().map(Into::into)),
        }
    }

    pub fn preset(preset: Preset) -> Self {
        match preset {
            Preset::CompetitorPricing => Self::new(
                [
                    ".price",
                    ".amount",
                    "[itemprop=\"price\"]",
                    ".offer",
                    ".product-price",
                    ".discount",
                    ".fare",
                ],
                [".related-products", ".ads", "nav", "footer", ".menu", ".cookie-banner"],
                [
                    "price",
                    "cost",
                    "save",
                    "discount",
                    "off",
                    "subscription",
                    "monthly",
                    "yearly",
                    "sale",
                ],
            ),
            Preset::InventoryTracker => Self::new(
                [
                    "h1",
                    "h2",
                    ".product-title",
                    ".features",
                    ".pricing",
                    ".badge",
                    ".stock-status",
                    ".availability",
                ],
                ["nav", "footer", ".suggested-content"],
                [
                    "new",
                    "launch",
                    "beta",
                    "sold out",
                    "upcoming",
                    "upgrade",
                    "integrates",
                    "in stock",
                    "out of stock",
                ],
            ),
            Preset::SeoIntelligence => Self::new(
                [
                    "title",
                    "meta[name=\"description\"]",
                    "h1",
                    "link[rel=\"canonical\"]",
                ],
                Vec::<String>::new(),
                ["seo", "title", "meta", "description", "canonical", "optimized"],
            ),
            Preset::Generic => Self::new(
                ["body"],
                [
                    "script", "style", "noscript", "svg", "header", "footer", "nav", ".menu",
                    ".ads",
                ],
                Vec::<String>::new(),
            ),
        }
    }

    pub fn validate(&self) -> Result<(), RuleError> {
        for selector in &self.include_selectors {
            if selector.trim().is_empty() {
                return Err(RuleError::EmptySelector("include_selectors"));
            }
            parse_selector(selector)?;
        }
        for selector in &self.exclude_selectors {
            if selector.trim().is_empty() {
                return Err(RuleError::EmptySelector("exclude_selectors"));
            }
            parse_selector(selector)?;
        }
        if self.keywords.iter().any(|k| k.trim().is_empty()) {
            return Err(RuleError::EmptyKeyword);
        }
        Ok(())
    }
}

fn dedup_ordered(items: impl Iterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for item in items {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "kebab-case")]
pub enum Preset {
    CompetitorPricing,
    InventoryTracker,
    SeoIntelligence,
    Generic,
}

impl Preset {
    pub const ALL: [Preset; 4] = [
        Preset::CompetitorPricing,
        Preset::InventoryTracker,
        Preset::SeoIntelligence,
        Preset::Generic,
    ];

    pub fn as_slug(&self) -> &'static str {
        match self {
            Self::CompetitorPricing => "competitor-pricing",
            Self::InventoryTracker => "inventory-tracker",
            Self::SeoIntelligence => "seo-intelligence",
            Self::Generic => "generic",
        }
    }
}

impl Display for Preset {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_slug())
    }
}

#[derive(Debug, Error)]
#[error("unknown profile: {0}")]
pub struct PresetParseError(pub String);

impl FromStr for Preset {
    type Err = PresetParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        match normalized.as_str() {
            "competitor-pricing" | "pricing" => Ok(Self::CompetitorPricing),
            "inventory-tracker" | "inventory" => Ok(Self::InventoryTracker),
            "seo-intelligence" | "seo" => Ok(Self::SeoIntelligence),
            "generic" => Ok(Self::Generic),
            _ => Err(PresetParseError(s.to_string())),
        }
    }
}
