//! Source to destination column naming

use serde::{Deserialize, Serialize};

/// Prefix rename applied to source column names
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnRenameRule {
    pub prefix_from: String,
    pub prefix_to: String,
}

impl ColumnRenameRule {
    pub fn new(prefix_from: impl Into<String>, prefix_to: impl Into<String>) -> Self {
        Self {
            prefix_from: prefix_from.into(),
            prefix_to: prefix_to.into(),
        }
    }

    fn apply(&self, column: &str) -> Option<String> {
        column
            .strip_prefix(&self.prefix_from)
            .map(|rest| format!("{}{}", self.prefix_to, rest))
    }
}

/// Maps staging column names to destination column names
///
/// The first rule whose prefix matches (case-sensitive) wins; names no rule
/// matches pass through unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnTranslator {
    rules: Vec<ColumnRenameRule>,
}

impl Default for ColumnTranslator {
    /// The `label` -> `name` rule
    fn default() -> Self {
        Self {
            rules: vec![ColumnRenameRule::new("label", "name")],
        }
    }
}

impl ColumnTranslator {
    /// Translator with an explicit ordered rule list
    pub fn with_rules(rules: Vec<ColumnRenameRule>) -> Self {
        Self { rules }
    }

    pub fn translate(&self, column: &str) -> String {
        self.rules
            .iter()
            .find_map(|rule| rule.apply(column))
            .unwrap_or_else(|| column.to_string())
    }
}
