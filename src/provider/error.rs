//! Error type returned by provider bindings.

use thiserror::Error;

/// Errors raised by a [`Provider`](super::Provider).
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ProviderError {
    /// The addressed resource does not exist. Deletes treat this as success.
    #[error("{resource} {id} not found")]
    NotFound {
        /// Kind of resource, for example `server`.
        resource: String,
        /// Identifier that was looked up.
        id: String,
    },
    /// The provider cannot currently satisfy the request (capacity, stock).
    #[error("resource unavailable: {message}")]
    ResourceUnavailable {
        /// Message returned by the provider.
        message: String,
    },
    /// An asynchronous operation finished in a failed state.
    #[error("operation {operation} failed: {message}")]
    OperationFailed {
        /// Operation identifier.
        operation: String,
        /// Failure reason reported by the provider.
        message: String,
    },
    /// An asynchronous operation did not finish in time.
    #[error("timeout waiting for operation {operation}")]
    Timeout {
        /// Operation identifier.
        operation: String,
    },
    /// The call was abandoned because its cancellation token fired.
    #[error("provider call cancelled")]
    Cancelled,
    /// Any other provider failure (transport, decoding, API error).
    #[error("provider error: {message}")]
    Api {
        /// Message describing the failure.
        message: String,
    },
}

impl ProviderError {
    /// Builds a [`ProviderError::NotFound`].
    #[must_use]
    pub fn not_found(resource: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: id.into(),
        }
    }

    /// Builds a [`ProviderError::Api`].
    #[must_use]
    pub fn api(message: impl Into<String>) -> Self {
        Self::Api {
            message: message.into(),
        }
    }

    /// Returns `true` for [`ProviderError::NotFound`].
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns `true` for [`ProviderError::ResourceUnavailable`].
    #[must_use]
    pub const fn is_resource_unavailable(&self) -> bool {
        matches!(self, Self::ResourceUnavailable { .. })
    }
}
