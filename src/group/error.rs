//! Errors reported by the instance group.

use std::fmt;

use thiserror::Error;

use crate::ip_pool::PoolError;
use crate::provider::ProviderError;

/// Errors raised while managing an instance group.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum GroupError {
    /// A group operation was called before [`InstanceGroup::init`](super::InstanceGroup::init).
    #[error("instance group is not initialized")]
    NotInitialized,
    /// A named resource does not exist on the provider.
    #[error("{resource} not found: {name}")]
    Lookup {
        /// Kind of resource, for example `server type`.
        resource: &'static str,
        /// Name or identifier that was looked up.
        name: String,
    },
    /// The configured server types do not share one architecture.
    #[error("unexpected server type architecture found: {architecture} ({server_type}), expected {expected}")]
    ArchitectureMismatch {
        /// Offending server type.
        server_type: String,
        /// Its architecture.
        architecture: String,
        /// Architecture of the first configured server type.
        expected: String,
    },
    /// An instance identifier does not have the `name:id` form.
    #[error("invalid instance id: {value}")]
    InvalidIid {
        /// Rejected identifier.
        value: String,
    },
    /// No server exists for the identifier.
    #[error("instance not found: {iid}")]
    NotFound {
        /// Identifier that was looked up.
        iid: String,
    },
    /// A provider call failed.
    #[error("{context}: {source}")]
    Provider {
        /// What the group was doing.
        context: &'static str,
        /// Underlying provider failure.
        #[source]
        source: ProviderError,
    },
    /// The address pool could not serve a request.
    #[error("{context}: {source}")]
    Pool {
        /// What the group was doing.
        context: &'static str,
        /// Underlying pool failure.
        #[source]
        source: PoolError,
    },
    /// The cancellation token fired.
    #[error("instance group operation cancelled")]
    Cancelled,
}

impl GroupError {
    /// Wraps a provider failure. Cancellation surfaces as [`GroupError::Cancelled`].
    #[must_use]
    pub fn provider(context: &'static str, source: ProviderError) -> Self {
        match source {
            ProviderError::Cancelled => Self::Cancelled,
            other => Self::Provider {
                context,
                source: other,
            },
        }
    }

    /// Wraps a pool failure.
    #[must_use]
    pub const fn pool(context: &'static str, source: PoolError) -> Self {
        Self::Pool { context, source }
    }

    /// Returns `true` when a provider reported the resource as missing.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::Provider { source, .. } if source.is_not_found())
    }
}

/// Every failure recorded during a batch, displayed one per line.
#[derive(Clone, Debug, Default, Eq, PartialEq, Error)]
pub struct JoinedError {
    errors: Vec<GroupError>,
}

impl JoinedError {
    /// Returns the individual failures in the order they were recorded.
    #[must_use]
    pub fn errors(&self) -> &[GroupError] {
        &self.errors
    }
}

impl fmt::Display for JoinedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, err) in self.errors.iter().enumerate() {
            if index > 0 {
                f.write_str("\n")?;
            }
            write!(f, "{err}")?;
        }
        Ok(())
    }
}

/// Result of a batch [`increase`](super::InstanceGroup::increase) or
/// [`decrease`](super::InstanceGroup::decrease).
///
/// A batch never fails as a whole once instance work started: `ids` lists
/// what succeeded and `failures` everything that went wrong, including
/// rollback failures.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ScaleOutcome {
    /// Identifiers of the instances the batch completed for.
    pub ids: Vec<String>,
    /// Every failure recorded, in order.
    pub failures: Vec<GroupError>,
}

impl ScaleOutcome {
    /// Returns `true` when no failure was recorded.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Returns the recorded failures joined, or `None` when there were none.
    #[must_use]
    pub fn joined(&self) -> Option<JoinedError> {
        if self.failures.is_empty() {
            return None;
        }
        Some(JoinedError {
            errors: self.failures.clone(),
        })
    }
}
