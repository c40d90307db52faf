use serde::{Deserialize, Serialize};

use crate::analysis::classifier::matches_keywords;
use crate::diff::DiffItem;
use crate::profile::WatchRule;

const BASE_SCORE: u32 = 10;
const SELECTOR_SCORE: u32 = 40;
const KEYWORD_BONUS: u32 = 30;
const NUMERIC_BONUS: u32 = 20;
const MAX_SCORE: u32 = 100;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityResult {
    pub score: u8,
    pub reasons: Vec<String>,
}

pub fn calculate_severity(diffs: &[DiffItem], rule: &WatchRule) -> SeverityResult {
    if diffs.is_empty() {
        return SeverityResult::default();
    }

    let mut score = 0;
    let mut reasons: Vec<String> = Vec::new();
    let mut add_reason = |reason: String| {
        if !reasons.contains(&reason) {
            reasons.push(reason);
        }
    };

    for diff in diffs {
        let mut item_score = if rule
            .include_selectors
            .iter()
            .any(|s| diff.selector.contains(s.as_str()))
        {
            add_reason(format!("High-priority selector matched: {}", diff.selector));
            SELECTOR_SCORE
        } else {
            BASE_SCORE
        };

        if matches_keywords(diff, &rule.keywords) {
            item_score += KEYWORD_BONUS;
            add_reason(format!("Critical keyword match found in: {}", diff.path));
        }

        if let (Some(old), Some(new)) = (diff.old.as_deref(), diff.new.as_deref()) {
            if is_numeric_change(old, new) {
                item_score += NUMERIC_BONUS;
                add_reason(format!("Numeric value change detected: {old} -> {new}"));
            }
        }

        score = score.max(item_score);
    }

    SeverityResult {
        score: score.min(MAX_SCORE) as u8,
        reasons,
    }
}

fn numeric_part(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect()
}

pub fn is_numeric_change(old: &str, new: &str) -> bool {
    let old_num = numeric_part(old);
    let new_num = numeric_part(new);
    !old_num.is_empty() && !new_num.is_empty() && old_num != new_num
}

pub fn is_price_decrease(diffs: &[DiffItem]) -> bool {
    diffs.iter().any(|diff| {
        let (Some(old), Some(new)) = (diff.old.as_deref(), diff.new.as_deref()) else {
            return false;
        };
        let price_like = old.contains('$')
            || new.contains('$')
            || diff.selector.to_lowercase().contains("price");
        if !price_like || !is_numeric_change(old, new) {
            return false;
        }
        match (numeric_part(old).parse::<f64>(), numeric_part(new).parse::<f64>()) {
            (Ok(old), Ok(new)) => new < old,
            _ => false,
        }
    })
}

#[cfg(test)]
mod tests {
    use crate::analysis::scorer::{calculate_severity, is_numeric_change, is_price_decrease};
    use crate::diff::{DiffItem, DiffType};
    use crate::profile::WatchRule;

    fn modified(selector: &str, old: &str, new: &str) -> DiffItem {
        DiffItem {
            path: "div[0]".to_string(),
            selector: selector.to_string(),
            context: None,
            context_path: None,
            old: Some(old.to_string()),
            new: Some(new.to_string()),
            change_type: DiffType::Modified,
        }
    }

    #[test]
    fn empty_diff_scores_zero() {
        let result = calculate_severity(&[], &WatchRule::default());
        assert_eq!(result.score, 0);
        assert!(result.reasons.is_empty());
    }

    #[test]
    fn price_change_on_watched_selector_scores_sixty() {
        let rule = WatchRule::new([".price"], Vec::<String>::new(), Vec::<String>::new());
        let result = calculate_severity(&[modified(".price", "$10", "$12")], &rule);
        assert_eq!(result.score, 60);
        assert_eq!(result.reasons.len(), 2);
        assert!(result.reasons[1].contains("$10 -> $12"));
    }

    #[test]
    fn takes_maximum_not_sum() {
        let rule = WatchRule::new([".price"], Vec::<String>::new(), Vec::<String>::new());
        let noise = modified("p", "hello", "world");
        let many_noise = vec![noise.clone(), noise.clone(), noise];
        assert_eq!(calculate_severity(&many_noise, &rule).score, 10);

        let mut mixed = many_noise.clone();
        mixed.push(modified(".price", "$10", "$12"));
        assert_eq!(calculate_severity(&mixed, &rule).score, 60);
    }

    #[test]
    fn caps_at_one_hundred() {
        let rule = WatchRule::new([".price"], Vec::<String>::new(), ["sale"]);
        let result = calculate_severity(&[modified(".price", "$10", "Sale $8")], &rule);
        assert_eq!(result.score, 90);
        let rule = WatchRule::new(["p", ".price"], Vec::<String>::new(), ["sale"]);
        assert!(calculate_severity(&[modified(".price", "$10", "Sale $8")], &rule).score <= 100);
    }

    #[test]
    fn keywords_never_lower_the_score() {
        let diffs = vec![
            modified("p", "a", "b"),
            modified(".price", "$10", "$12"),
            modified("li", "launch soon", "launched"),
        ];
        let without = WatchRule::new([".price"], Vec::<String>::new(), Vec::<String>::new());
        let with = WatchRule::new([".price"], Vec::<String>::new(), ["launch"]);
        assert!(
            calculate_severity(&diffs, &with).score >= calculate_severity(&diffs, &without).score
        );
    }

    #[test]
    fn reasons_are_deduplicated() {
        let rule = WatchRule::new([".price"], Vec::<String>::new(), Vec::<String>::new());
        let diffs = vec![
            modified(".price", "$10", "$12"),
            modified(".price", "$10", "$12"),
        ];
        assert_eq!(calculate_severity(&diffs, &rule).reasons.len(), 2);
    }

    #[test]
    fn detects_numeric_changes() {
        assert!(is_numeric_change("$1,299.00", "$1,199.00"));
        assert!(!is_numeric_change("$10", "USD 10"));
        assert!(!is_numeric_change("free", "$10"));
    }

    #[test]
    fn detects_price_decreases() {
        assert!(is_price_decrease(&[modified(".price", "$10", "$8")]));
        assert!(is_price_decrease(&[
            modified("p", "$10", "$12"),
            modified(".product-price", "1,299.00", "1,199.00"),
        ]));
        assert!(!is_price_decrease(&[modified(".price", "$10", "$12")]));
        assert!(!is_price_decrease(&[modified("li", "10 left", "8 left")]));
    }
}
