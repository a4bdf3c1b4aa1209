//! Mapping of Scaleway API failures onto [`ProviderError`].

use reqwest::StatusCode;
use scaleway_rs::{ScalewayApiError, ScalewayError};

use crate::provider::ProviderError;

/// Error types Scaleway returns when capacity is exhausted.
const UNAVAILABLE_TYPES: [&str; 2] = ["out_of_stock", "quotas_exceeded"];

/// Resource fields whose rejection means the commercial type cannot be used.
const UNAVAILABLE_RESOURCES: [&str; 2] = ["commercial_type", "server_type"];

fn is_unavailable(api_err: &ScalewayApiError) -> bool {
    let message = api_err.message.to_ascii_lowercase();
    UNAVAILABLE_TYPES.contains(&api_err.etype.as_str())
        || api_err
            .resource
            .as_deref()
            .is_some_and(|resource| UNAVAILABLE_RESOURCES.contains(&resource))
        || message.contains("out of stock")
        || (api_err.etype == "invalid_arguments" && message.contains("commercial_type"))
}

/// Classifies a failed HTTP response.
///
/// `resource` and `id` name what was addressed, for [`ProviderError::NotFound`].
pub(super) fn classify(status: StatusCode, body: &[u8], resource: &str, id: &str) -> ProviderError {
    if status == StatusCode::NOT_FOUND {
        return ProviderError::not_found(resource, id);
    }

    let text = String::from_utf8_lossy(body).into_owned();
    match serde_json::from_slice::<ScalewayApiError>(body) {
        Ok(api_err) if is_unavailable(&api_err) => ProviderError::ResourceUnavailable {
            message: api_err.message,
        },
        Ok(api_err) => ProviderError::api(format!("{status}: {} ({})", api_err.message, api_err.etype)),
        Err(_) => ProviderError::api(format!("{status}: {text}")),
    }
}

/// Maps an error raised by the `scaleway-rs` SDK.
pub(super) fn from_sdk(err: ScalewayError) -> ProviderError {
    match err {
        ScalewayError::Api(api_err) if is_unavailable(&api_err) => {
            ProviderError::ResourceUnavailable {
                message: api_err.message,
            }
        }
        other => ProviderError::api(other.to_string()),
    }
}

/// Maps a transport or decoding failure.
pub(super) fn transport(err: &impl std::fmt::Display) -> ProviderError {
    ProviderError::api(err.to_string())
}
