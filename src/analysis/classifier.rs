use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::diff::{DiffItem, DiffType};
use crate::profile::WatchRule;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    NoChange,
    ContentAdded,
    ContentRemoved,
    ContentModified,
    StructureChange,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoChange => "no_change",
            Self::ContentAdded => "content_added",
            Self::ContentRemoved => "content_removed",
            Self::ContentModified => "content_modified",
            Self::StructureChange => "structure_change",
        }
    }
}

impl Display for ChangeType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn classify(diffs: &[DiffItem], _rule: &WatchRule) -> ChangeType {
    if diffs.is_empty() {
        return ChangeType::NoChange;
    }

    let has = |kind: DiffType| diffs.iter().any(|d| d.change_type == kind);
    let added = has(DiffType::Added);
    let removed = has(DiffType::Removed);

    // Adds and removes together read as a net modification.
    if has(DiffType::Modified) || (added && removed) {
        ChangeType::ContentModified
    } else if added {
        ChangeType::ContentAdded
    } else if removed {
        ChangeType::ContentRemoved
    } else {
        ChangeType::StructureChange
    }
}

pub fn matches_keywords(diff: &DiffItem, keywords: &[String]) -> bool {
    let haystack = format!(
        "{} {}",
        diff.old.as_deref().unwrap_or_default(),
        diff.new.as_deref().unwrap_or_default()
    )
    .to_lowercase();
    keywords
        .iter()
        .filter(|k| !k.is_empty())
        .any(|k| haystack.contains(&k.to_lowercase()))
}
