//! Label sets and equality selectors used to scope provider listings.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Key/value labels attached to provider resources.
pub type Labels = BTreeMap<String, String>;

/// Raised when a selector or label list cannot be parsed.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("invalid label expression '{0}': expected key=value")]
pub struct LabelParseError(pub String);

/// Equality-only label selector: every pair must be present on a resource.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct LabelSelector {
    pairs: Labels,
}

impl LabelSelector {
    /// Selector matching resources carrying `key=value`.
    #[must_use]
    pub fn equals(key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut pairs = Labels::new();
        pairs.insert(key.into(), value.into());
        Self { pairs }
    }

    /// Returns the required pairs.
    #[must_use]
    pub const fn pairs(&self) -> &Labels {
        &self.pairs
    }

    /// Returns `true` when the selector has no constraints.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Returns `true` when `labels` satisfies every pair of the selector.
    #[must_use]
    pub fn matches(&self, labels: &Labels) -> bool {
        self.pairs
            .iter()
            .all(|(key, value)| labels.get(key).is_some_and(|found| found == value))
    }
}

impl fmt::Display for LabelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered = self
            .pairs
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join(",");
        f.write_str(&rendered)
    }
}

impl FromStr for LabelSelector {
    type Err = LabelParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        parse_labels(value).map(|pairs| Self { pairs })
    }
}

/// Parses a comma-separated `key=value` list. Blank input yields no labels.
///
/// # Errors
///
/// Returns [`LabelParseError`] when an entry has no `=` or an empty key.
pub fn parse_labels(value: &str) -> Result<Labels, LabelParseError> {
    let mut labels = Labels::new();
    for entry in value.split(',').map(str::trim).filter(|entry| !entry.is_empty()) {
        let Some((key, val)) = entry.split_once('=') else {
            return Err(LabelParseError(entry.to_owned()));
        };
        if key.trim().is_empty() {
            return Err(LabelParseError(entry.to_owned()));
        }
        labels.insert(key.trim().to_owned(), val.trim().to_owned());
    }
    Ok(labels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn selector_round_trips_through_display() {
        let selector: LabelSelector = "pool=runners, env=prod".parse().expect("parse");
        assert_eq!(selector.to_string(), "env=prod,pool=runners");
    }

    #[rstest]
    #[case("novalue")]
    #[case("=value")]
    fn rejects_malformed_entries(#[case] input: &str) {
        assert!(input.parse::<LabelSelector>().is_err());
    }

    #[rstest]
    fn matches_requires_every_pair() {
        let selector: LabelSelector = "a=1,b=2".parse().expect("parse");
        let mut labels = Labels::new();
        labels.insert(String::from("a"), String::from("1"));
        assert!(!selector.matches(&labels));
        labels.insert(String::from("b"), String::from("2"));
        labels.insert(String::from("c"), String::from("3"));
        assert!(selector.matches(&labels));
    }

    #[rstest]
    fn empty_selector_matches_anything() {
        let selector = LabelSelector::default();
        assert!(selector.is_empty());
        assert!(selector.matches(&Labels::new()));
    }
}
