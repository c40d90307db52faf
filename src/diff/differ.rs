use std::marker::PhantomData;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::diff::lcs::{align, EditOp};
use crate::diff::{DiffItem, DiffType, ExtractedNode};
use crate::document::{HtmlDocument, ParsedHtml, QueryError, HEADING_TAGS};
use crate::profile::WatchRule;

pub const STRUCTURAL_SELECTORS: [&str; 5] = ["h1", "h2", "h3", "p", "li"];

pub const DEFAULT_SELECTORS: [&str; 7] = ["h1", "h2", "h3", "p", ".price", ".amount", "li"];

const MAX_CONTEXT_DEPTH: usize = 5;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffReport {
    pub diffs: Vec<DiffItem>,
    pub selector_misses: Vec<String>,
}

pub struct StructuralDiffer<D: HtmlDocument = ParsedHtml> {
    _document: PhantomData<fn() -> D>,
}

impl<D: HtmlDocument> Default for StructuralDiffer<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: HtmlDocument> StructuralDiffer<D> {
    pub fn new() -> Self {
        Self {
            _document: PhantomData,
        }
    }

    pub fn compare(
        &self,
        old_html: &str,
        new_html: &str,
        rule: Option<&WatchRule>,
    ) -> Result<Vec<DiffItem>, QueryError> {
        self.compare_report(old_html, new_html, rule)
            .map(|report| report.diffs)
    }

    pub fn compare_report(
        &self,
        old_html: &str,
        new_html: &str,
        rule: Option<&WatchRule>,
    ) -> Result<DiffReport, QueryError> {
        let old_doc = D::parse(old_html);
        let new_doc = D::parse(new_html);

        let mut report = DiffReport::default();
        for selector in selector_set(rule) {
            let old_nodes = extract_nodes(&old_doc, &selector)?;
            let new_nodes = extract_nodes(&new_doc, &selector)?;
            report
                .diffs
                .extend(diff_nodes(&selector, old_nodes, &new_nodes));
        }

        if let Some(rule) = rule {
            report.selector_misses = misses_in(&new_doc, rule)?;
        }
        Ok(report)
    }

    pub fn selector_misses(
        &self,
        html: &str,
        rule: &WatchRule,
    ) -> Result<Vec<String>, QueryError> {
        misses_in(&D::parse(html), rule)
    }
}

fn misses_in<D: HtmlDocument>(doc: &D, rule: &WatchRule) -> Result<Vec<String>, QueryError> {
    let mut misses = Vec::new();
    for selector in &rule.include_selectors {
        if doc.query(selector)?.is_empty() {
            debug!("selector matched nothing: {selector}");
            misses.push(selector.clone());
        }
    }
    Ok(misses)
}

pub fn compare(
    old_html: &str,
    new_html: &str,
    rule: Option<&WatchRule>,
) -> Result<Vec<DiffItem>, QueryError> {
    StructuralDiffer::<ParsedHtml>::new().compare(old_html, new_html, rule)
}

pub fn selector_set(rule: Option<&WatchRule>) -> Vec<String> {
    let Some(rule) = rule else {
        return DEFAULT_SELECTORS.iter().map(|s| s.to_string()).collect();
    };
    let mut selectors: Vec<String> = Vec::new();
    let candidates = rule
        .include_selectors
        .iter()
        .map(String::as_str)
        .chain(STRUCTURAL_SELECTORS);
    for selector in candidates {
        if !selectors.iter().any(|s| s == selector) {
            selectors.push(selector.to_string());
        }
    }
    selectors
}

pub fn extract_nodes<D: HtmlDocument>(
    doc: &D,
    selector: &str,
) -> Result<Vec<ExtractedNode>, QueryError> {
    let matches = doc.query(selector)?;
    Ok(matches
        .into_iter()
        .enumerate()
        .map(|(index, node)| {
            let (context, context_path) = discover_context::<D>(node).unzip();
            ExtractedNode {
                path: format!("{}[{index}]", D::tag_name(node)),
                text: D::text(node),
                context,
                context_path,
            }
        })
        .collect())
}

/// Nearest heading found by searching each ancestor's subtree, closest
/// ancestor first.
fn discover_context<D: HtmlDocument>(node: D::Node<'_>) -> Option<(String, String)> {
    for ancestor in D::ancestors(node).into_iter().take(MAX_CONTEXT_DEPTH) {
        if let Some(heading) = D::descendants_matching(ancestor, &HEADING_TAGS)
            .into_iter()
            .next()
        {
            let path = format!("{}[{}]", D::tag_name(heading), D::sibling_index(heading));
            return Some((D::text(heading), path));
        }
    }
    None
}

fn diff_nodes(selector: &str, old: Vec<ExtractedNode>, new: &[ExtractedNode]) -> Vec<DiffItem> {
    let old_text: Vec<&str> = old.iter().map(|n| n.text.as_str()).collect();
    let new_text: Vec<&str> = new.iter().map(|n| n.text.as_str()).collect();

    let mut raw = Vec::new();
    for op in align(&old_text, &new_text) {
        match op {
            EditOp::Keep { .. } => {}
            EditOp::Insert(j) => raw.push(DiffItem::added(selector, new[j].clone())),
            EditOp::Delete(i) => raw.push(DiffItem::removed(selector, old[i].clone())),
        }
    }
    coalesce_pairs(raw)
}

fn coalesce_pairs(items: Vec<DiffItem>) -> Vec<DiffItem> {
    let mut out = Vec::with_capacity(items.len());
    let mut index = 0;
    while index < items.len() {
        let current = &items[index];
        if current.change_type == DiffType::Removed {
            if let Some(next) = items.get(index + 1) {
                if let Some(merged) = DiffItem::coalesce(current, next) {
                    out.push(merged);
                    index += 2;
                    continue;
                }
            }
        }
        out.push(current.clone());
        index += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use crate::diff::differ::{compare, selector_set, StructuralDiffer};
    use crate::diff::DiffType;
    use crate::document::ParsedHtml;
    use crate::profile::WatchRule;

    fn price_rule() -> WatchRule {
        WatchRule::new([".price"], Vec::<String>::new(), Vec::<String>::new())
    }

    #[test]
    fn identical_documents_produce_no_diff() {
        let html = "<div><h2>Title</h2><p>Body</p><ul><li>A</li></ul></div>";
        assert!(compare(html, html, None).expect("compare").is_empty());
        assert!(compare(html, html, Some(&price_rule()))
            .expect("compare")
            .is_empty());
    }

    #[test]
    fn appended_item_is_single_addition() {
        let diffs = compare(
            "<ul><li>A</li><li>B</li></ul>",
            "<ul><li>A</li><li>B</li><li>C</li></ul>",
            None,
        )
        .expect("compare");
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].change_type, DiffType::Added);
        assert_eq!(diffs[0].new.as_deref(), Some("C"));
        assert_eq!(diffs[0].path, "li[2]");
    }

    #[test]
    fn prepended_item_is_single_addition() {
        let diffs = compare(
            "<ul><li>A</li><li>B</li></ul>",
            "<ul><li>C</li><li>A</li><li>B</li></ul>",
            None,
        )
        .expect("compare");
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].change_type, DiffType::Added);
        assert_eq!(diffs[0].new.as_deref(), Some("C"));
    }

    #[test]
    fn removed_middle_item_is_single_removal() {
        let diffs = compare(
            "<ul><li>A</li><li>B</li><li>C</li></ul>",
            "<ul><li>A</li><li>C</li></ul>",
            None,
        )
        .expect("compare");
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].change_type, DiffType::Removed);
        assert_eq!(diffs[0].old.as_deref(), Some("B"));
        assert!(diffs[0].new.is_none());
    }

    #[test]
    fn value_substitution_is_single_modification() {
        let diffs = compare(
            r#"<div class="price">$10</div>"#,
            r#"<div class="price">$12</div>"#,
            Some(&price_rule()),
        )
        .expect("compare");
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].change_type, DiffType::Modified);
        assert_eq!(diffs[0].selector, ".price");
        assert_eq!(diffs[0].old.as_deref(), Some("$10"));
        assert_eq!(diffs[0].new.as_deref(), Some("$12"));
    }

    #[test]
    fn swap_at_edges_coalesces_into_modification() {
        let diffs = compare(
            "<ul><li>A</li><li>B</li></ul>",
            "<ul><li>B</li><li>C</li></ul>",
            None,
        )
        .expect("compare");
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].change_type, DiffType::Modified);
        assert_eq!(diffs[0].old.as_deref(), Some("A"));
        assert_eq!(diffs[0].new.as_deref(), Some("C"));
    }

    #[test]
    fn one_sided_selector_reports_pure_changes() {
        let diffs = compare("<div></div>", "<ul><li>X</li><li>Y</li></ul>", None)
            .expect("compare");
        assert_eq!(diffs.len(), 2);
        assert!(diffs.iter().all(|d| d.change_type == DiffType::Added));

        let diffs = compare("<ul><li>X</li></ul>", "<div></div>", None).expect("compare");
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].change_type, DiffType::Removed);
    }

    #[test]
    fn attributes_change_to_nearest_product_heading() {
        let old = r#"
            <div class="product"><h2>iPhone 15</h2><p class="price">$799</p></div>
            <div class="product"><h2>iPhone 15 Pro</h2><p class="price">$999</p></div>"#;
        let new = r#"
            <div class="product"><h2>iPhone 15</h2><p class="price">$799</p></div>
            <div class="product"><h2>iPhone 15 Pro</h2><p class="price">$949</p></div>"#;
        let diffs = compare(old, new, Some(&price_rule())).expect("compare");
        let price = diffs
            .iter()
            .find(|d| d.selector == ".price")
            .expect("price diff missing");
        assert_eq!(price.change_type, DiffType::Modified);
        assert_eq!(price.context.as_deref(), Some("iPhone 15 Pro"));
        assert_eq!(price.context_path.as_deref(), Some("h2[0]"));
    }

    #[test]
    fn reports_selector_misses() {
        let rule = WatchRule::new([".price", ".stock"], Vec::<String>::new(), Vec::<String>::new());
        let report = StructuralDiffer::<ParsedHtml>::new()
            .compare_report(
                r#"<p class="price">$1</p>"#,
                r#"<p class="price">$1</p>"#,
                Some(&rule),
            )
            .expect("compare");
        assert!(report.diffs.is_empty());
        assert_eq!(report.selector_misses, vec![".stock"]);
    }

    #[test]
    fn invalid_rule_selector_is_an_error() {
        let rule = WatchRule::new(["p["], Vec::<String>::new(), Vec::<String>::new());
        assert!(compare("<p>a</p>", "<p>b</p>", Some(&rule)).is_err());
    }

    #[test]
    fn merges_rule_selectors_with_structural_defaults() {
        let rule = WatchRule::new([".price", "p"], Vec::<String>::new(), Vec::<String>::new());
        assert_eq!(
            selector_set(Some(&rule)),
            vec![".price", "p", "h1", "h2", "h3", "li"]
        );
        assert!(selector_set(None).contains(&".amount".to_string()));
    }
}
