//! HTML canonicalization ahead of diffing. Feeding the output back through
//! [`normalize`] yields the same string.

use std::collections::HashSet;

use ego_tree::{NodeId, NodeRef};
use scraper::node::Node;
use scraper::{Html, Selector};

use crate::document::html::parse_selector;
use crate::document::{HtmlDocument, ParsedHtml, QueryError};

pub const NOISE_SELECTORS: [&str; 10] = [
    "script", "style", "noscript", "svg", "iframe", "ins", "ad", ".ads", ".ad-unit",
    "plaintext",
];

const VOLATILE_ATTR_PREFIXES: [&str; 9] = [
    "data-react",
    "data-v-",
    "data-uid",
    "data-id",
    "data-test",
    "data-svelte",
    "_ngcontent",
    "_nghost",
    "ng-reflect-",
];

const MEANINGFUL_EMPTY_TAGS: [&str; 4] = ["br", "hr", "img", "input"];

const VOID_TAGS: [&str; 13] = [
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source",
    "track", "wbr",
];

const RAW_TEXT_TAGS: [&str; 7] = [
    "script", "style", "xmp", "iframe", "noembed", "noframes", "plaintext",
];

pub fn normalize(html: &str, exclude_selectors: &[String]) -> Result<String, QueryError> {
    let selectors = NOISE_SELECTORS
        .iter()
        .copied()
        .chain(exclude_selectors.iter().map(String::as_str))
        .map(parse_selector)
        .collect::<Result<Vec<_>, _>>()?;

    // Positional selectors (`li:first-child`, `p + p`) can match again once
    // their first target is gone, so removal repeats until nothing changes.
    // Every pass that changes the output removes at least one element.
    let mut current = normalize_pass(html, &selectors);
    loop {
        let next = normalize_pass(&current, &selectors);
        if next == current {
            return Ok(current);
        }
        current = next;
    }
}

fn normalize_pass(html: &str, selectors: &[Selector]) -> String {
    let document = Html::parse_document(html);

    let mut removed = HashSet::new();
    for selector in selectors {
        removed.extend(document.select(selector).map(|el| el.id()));
    }

    let mut out = String::with_capacity(html.len());
    for child in document.tree.root().children() {
        if let Some(rendered) = render(child, &removed, false) {
            out.push_str(&rendered.markup);
        }
    }
    collapse_whitespace(&out).trim().to_string()
}

pub fn extract_text(html: &str) -> String {
    let document = ParsedHtml::parse(html);
    let Ok(bodies) = document.query("body") else {
        return String::new();
    };
    let text = bodies
        .into_iter()
        .map(ParsedHtml::text)
        .collect::<Vec<_>>()
        .join(" ");
    collapse_whitespace(&text).trim().to_string()
}

pub fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_run = false;
    for ch in text.chars() {
        if ch.is_whitespace() {
            if !in_run {
                out.push(' ');
            }
            in_run = true;
        } else {
            out.push(ch);
            in_run = false;
        }
    }
    out
}

pub fn is_volatile_attribute(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    if VOLATILE_ATTR_PREFIXES
        .iter()
        .any(|prefix| lower.starts_with(prefix))
    {
        return true;
    }
    lower.len() > 2
        && lower.starts_with("on")
        && lower[2..].chars().all(|c| c.is_ascii_alphabetic())
}

pub fn canonical_class(value: &str) -> String {
    let mut tokens: Vec<&str> = value.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.dedup();
    tokens.join(" ")
}

struct Rendered {
    markup: String,
    significant: bool,
}

fn render(node: NodeRef<'_, Node>, removed: &HashSet<NodeId>, raw_text: bool) -> Option<Rendered> {
    match node.value() {
        Node::Doctype(doctype) => Some(Rendered {
            markup: format!("<!DOCTYPE {}>", doctype.name()),
            significant: false,
        }),
        Node::Text(text) => {
            let collapsed = collapse_whitespace(text);
            if collapsed.is_empty() {
                return None;
            }
            let significant = !collapsed.trim().is_empty();
            let markup = if raw_text {
                collapsed
            } else {
                escape_text(&collapsed)
            };
            Some(Rendered {
                markup,
                significant,
            })
        }
        Node::Element(element) => {
            if removed.contains(&node.id()) {
                return None;
            }
            let name = element.name();
            let raw_children = RAW_TEXT_TAGS.contains(&name);

            let mut inner = String::new();
            let mut significant = false;
            for child in node.children() {
                if let Some(rendered) = render(child, removed, raw_children) {
                    significant |= rendered.significant;
                    inner.push_str(&rendered.markup);
                }
            }
            if !significant && !MEANINGFUL_EMPTY_TAGS.contains(&name) {
                return None;
            }

            let mut markup = String::with_capacity(inner.len() + 32);
            markup.push('<');
            markup.push_str(name);
            for (attr, value) in stable_attributes(element.attrs()) {
                markup.push(' ');
                markup.push_str(&attr);
                markup.push_str("=\"");
                markup.push_str(&escape_attribute(&value));
                markup.push('"');
            }
            markup.push('>');
            if !VOID_TAGS.contains(&name) {
                markup.push_str(&inner);
                markup.push_str("</");
                markup.push_str(name);
                markup.push('>');
            }
            Some(Rendered {
                markup,
                significant: true,
            })
        }
        _ => None,
    }
}

fn stable_attributes<'a>(attrs: impl Iterator<Item = (&'a str, &'a str)>) -> Vec<(String, String)> {
    let mut kept: Vec<(String, String)> = attrs
        .filter(|(name, _)| !is_volatile_attribute(name))
        .filter_map(|(name, value)| {
            if name == "class" {
                let sorted = canonical_class(value);
                if sorted.is_empty() {
                    return None;
                }
                return Some((name.to_string(), sorted));
            }
            Some((name.to_string(), collapse_whitespace(value)))
        })
        .collect();
    kept.sort();
    kept
}

fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    out
}

fn escape_attribute(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}
