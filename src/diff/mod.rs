pub mod differ;
pub mod lcs;

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

pub use differ::{compare, DiffReport, StructuralDiffer, DEFAULT_SELECTORS, STRUCTURAL_SELECTORS};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DiffType {
    Added,
    Removed,
    Modified,
}

impl DiffType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Removed => "removed",
            Self::Modified => "modified",
        }
    }
}

impl Display for DiffType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedNode {
    pub path: String,
    pub text: String,
    pub context: Option<String>,
    pub context_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffItem {
    pub path: String,
    pub selector: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_path: Option<String>,
    pub old: Option<String>,
    pub new: Option<String>,
    #[serde(rename = "type")]
    pub change_type: DiffType,
}

impl DiffItem {
    pub fn added(selector: &str, node: ExtractedNode) -> Self {
        Self {
            path: node.path,
            selector: selector.to_string(),
            context: node.context,
            context_path: node.context_path,
            old: None,
            new: Some(node.text),
            change_type: DiffType::Added,
        }
    }

    pub fn removed(selector: &str, node: ExtractedNode) -> Self {
        Self {
            path: node.path,
            selector: selector.to_string(),
            context: node.context,
            context_path: node.context_path,
            old: Some(node.text),
            new: None,
            change_type: DiffType::Removed,
        }
    }

    /// Merges a removal immediately followed by an addition. Context comes
    /// from the added side when it has one. Returns `None` when both sides
    /// carry the same text, which is not a modification.
    pub fn coalesce(removed: &DiffItem, added: &DiffItem) -> Option<Self> {
        if removed.change_type != DiffType::Removed || added.change_type != DiffType::Added {
            return None;
        }
        let old = removed.old.clone()?;
        let new = added.new.clone()?;
        if old == new {
            return None;
        }
        Some(Self {
            path: added.path.clone(),
            selector: added.selector.clone(),
            context: added.context.clone().or_else(|| removed.context.clone()),
            context_path: added
                .context_path
                .clone()
                .or_else(|| removed.context_path.clone()),
            old: Some(old),
            new: Some(new),
            change_type: DiffType::Modified,
        })
    }
}
