//! Derived constraints and the rules that populate them.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Declares how a stage's output populates a named constraint.
///
/// Matches lines of the form `Label: value`, tolerating list markers,
/// quote prefixes and markdown emphasis around the label.
#[derive(Debug, Clone)]
pub struct ExtractionRule {
    constraint: String,
    label: String,
    pattern: Regex,
}

impl ExtractionRule {
    /// Creates a rule reading `label` into `constraint`.
    ///
    /// # Errors
    ///
    /// Returns an error if the label produces an invalid pattern.
    pub fn labeled(
        constraint: impl Into<String>,
        label: impl Into<String>,
    ) -> Result<Self, regex::Error> {
        let label = label.into();
        let pattern = Regex::new(&format!(
            r"(?im)^[\s>*_#-]*{}[*_]*\s*:[*_\s]*(.+?)[*_\s]*$",
            regex::escape(&label)
        ))?;
        Ok(Self {
            constraint: constraint.into(),
            label,
            pattern,
        })
    }

    /// The constraint this rule populates.
    #[must_use]
    pub fn constraint(&self) -> &str {
        &self.constraint
    }

    /// The label this rule looks for.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Applies the rule, returning the first labelled value.
    #[must_use]
    pub fn apply(&self, text: &str) -> Option<String> {
        self.pattern
            .captures(text)
            .and_then(|cap| cap.get(1))
            .map(|m| m.as_str().trim().trim_matches('"').trim().to_string())
            .filter(|value| !value.is_empty())
    }
}

/// Named values locked by earlier stages.
///
/// First write wins: later stages can read a constraint but never replace it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DerivedConstraints {
    values: BTreeMap<String, String>,
}

impl DerivedConstraints {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a constraint if it is not already set. Returns true if it was written.
    pub fn set_if_absent(&mut self, name: impl Into<String>, value: impl Into<String>) -> bool {
        let name = name.into();
        if self.values.contains_key(&name) {
            return false;
        }
        self.values.insert(name, value.into());
        true
    }

    /// Returns a constraint value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Iterates over constraints in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Returns the number of constraints.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if no constraint is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns a copy of the underlying map.
    #[must_use]
    pub fn to_map(&self) -> BTreeMap<String, String> {
        self.values.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_plain_line() {
        let rule = ExtractionRule::labeled("primary_entity", "Brand Name").unwrap();
        let text = "Concept: cosy evenings\nBrand Name: Lumen\nTagline: Light that stays";
        assert_eq!(rule.apply(text).as_deref(), Some("Lumen"));
        assert_eq!(rule.constraint(), "primary_entity");
        assert_eq!(rule.label(), "Brand Name");
    }

    #[test]
    fn test_rule_markdown_and_case() {
        let rule = ExtractionRule::labeled("primary_entity", "Brand Name").unwrap();
        assert_eq!(
            rule.apply("- **brand name:** \"Lumen Home\"").as_deref(),
            Some("Lumen Home")
        );
    }

    #[test]
    fn test_rule_no_match() {
        let rule = ExtractionRule::labeled("primary_entity", "Brand Name").unwrap();
        assert_eq!(rule.apply("No names here."), None);
        assert_eq!(rule.apply("Brand Name:   "), None);
    }

    #[test]
    fn test_label_is_escaped() {
        let rule = ExtractionRule::labeled("hero", "Hero (primary)").unwrap();
        assert_eq!(rule.apply("Hero (primary): Ada").as_deref(), Some("Ada"));
    }

    #[test]
    fn test_first_write_wins() {
        let mut constraints = DerivedConstraints::new();
        assert!(constraints.set_if_absent("primary_entity", "Lumen"));
        assert!(!constraints.set_if_absent("primary_entity", "Glow"));
        assert_eq!(constraints.get("primary_entity"), Some("Lumen"));
        assert_eq!(constraints.len(), 1);
    }

    #[test]
    fn test_constraints_serialize_as_map() {
        let mut constraints = DerivedConstraints::new();
        constraints.set_if_absent("primary_entity", "Lumen");
        let json = serde_json::to_value(&constraints).unwrap();
        assert_eq!(json, serde_json::json!({"primary_entity": "Lumen"}));
    }
}
