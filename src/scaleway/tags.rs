//! Scaleway resources carry flat string tags; labels are stored as `key=value`.

use crate::provider::{LabelSelector, Labels};

/// Encodes labels as `key=value` tags.
pub(super) fn encode(labels: &Labels) -> Vec<String> {
    labels
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect()
}

/// Decodes `key=value` tags into labels. Tags without `=` are ignored.
pub(super) fn decode(tags: &[String]) -> Labels {
    tags.iter()
        .filter_map(|tag| tag.split_once('='))
        .map(|(key, value)| (key.to_owned(), value.to_owned()))
        .collect()
}

/// Tags a resource must carry to match `selector`.
pub(super) fn selector_tags(selector: &LabelSelector) -> Vec<String> {
    encode(selector.pairs())
}

/// Comma-separated tag filter accepted by the Instance API list endpoints.
pub(super) fn selector_filter(selector: &LabelSelector) -> String {
    selector_tags(selector).join(",")
}

/// Returns `true` when decoded `tags` satisfy `selector`.
pub(super) fn matches(selector: &LabelSelector, tags: &[String]) -> bool {
    selector.matches(&decode(tags))
}
