//! Capabilities a pipeline stage can implement.
//!
//! A stage opts into a capability by returning itself from the matching
//! `as_*` view on [`Stage`]. The driver skips stages whose view is `None`.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::context::{GroupConfig, GroupContext};
use super::credentials::CredentialStore;
use super::error::GroupError;
use super::instance::{Instance, StageOutput};
use crate::ip_pool::IpPool;
use crate::provider::{Provider, ProviderError};

/// Future returned by stage steps.
pub type StageFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, GroupError>> + Send + 'a>>;

/// Everything a stage may read while running for one group request.
#[derive(Clone, Copy)]
pub struct GroupScope<'g> {
    /// Group name.
    pub name: &'g str,
    /// Group settings.
    pub config: &'g GroupConfig,
    /// Resources resolved by `init`.
    pub context: &'g GroupContext,
    /// Provider every remote call goes through.
    pub provider: &'g Arc<dyn Provider>,
    /// Address pool, when enabled.
    pub pool: Option<&'g IpPool>,
    /// Generated per-instance secrets.
    pub credentials: &'g CredentialStore,
    /// Cancels the whole request.
    pub cancel: &'g CancellationToken,
}

impl GroupScope<'_> {
    /// Awaits a provider call unless the request is cancelled first.
    pub async fn call<T, F>(&self, context: &'static str, call: F) -> Result<T, GroupError>
    where
        F: Future<Output = Result<T, ProviderError>> + Send,
    {
        guarded(self.cancel, context, call).await
    }
}

/// Races `call` against `cancel`, wrapping provider failures with `context`.
pub async fn guarded<T, F>(
    cancel: &CancellationToken,
    context: &'static str,
    call: F,
) -> Result<T, GroupError>
where
    F: Future<Output = Result<T, ProviderError>> + Send,
{
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(GroupError::Cancelled),
        result = call => result.map_err(|source| GroupError::provider(context, source)),
    }
}

/// Runs once before an increase; an error aborts the whole increase.
pub trait PreIncrease: Send + Sync {
    /// Prepares shared state for the batch.
    fn pre_increase<'a>(&'a self, scope: &'a GroupScope<'a>) -> StageFuture<'a, ()>;
}

/// Runs once before a decrease; an error aborts the whole decrease.
pub trait PreDecrease: Send + Sync {
    /// Prepares shared state for the batch.
    fn pre_decrease<'a>(&'a self, scope: &'a GroupScope<'a>) -> StageFuture<'a, ()>;
}

/// Runs once per instance during an increase. A failed instance skips the
/// remaining stages and is rolled back.
pub trait Create: Send + Sync {
    /// Performs this stage's part of creating `instance`.
    fn create<'a>(
        &'a self,
        scope: &'a GroupScope<'a>,
        instance: &'a Instance,
    ) -> StageFuture<'a, StageOutput>;
}

/// Runs once per instance during a decrease and during rollback.
pub trait Cleanup: Send + Sync {
    /// Releases what this stage created for `instance`.
    fn cleanup<'a>(
        &'a self,
        scope: &'a GroupScope<'a>,
        instance: &'a Instance,
    ) -> StageFuture<'a, StageOutput>;
}

/// Runs once per sanity sweep; errors are logged only.
pub trait Sanity: Send + Sync {
    /// Looks for drift or leftovers.
    fn sanity<'a>(&'a self, scope: &'a GroupScope<'a>) -> StageFuture<'a, ()>;
}

/// A pipeline stage and the capabilities it offers.
pub trait Stage: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// The stage's pre-increase hook.
    fn as_pre_increase(&self) -> Option<&dyn PreIncrease> {
        None
    }

    /// The stage's pre-decrease hook.
    fn as_pre_decrease(&self) -> Option<&dyn PreDecrease> {
        None
    }

    /// The stage's creation step.
    fn as_create(&self) -> Option<&dyn Create> {
        None
    }

    /// The stage's deletion and rollback step.
    fn as_cleanup(&self) -> Option<&dyn Cleanup> {
        None
    }

    /// The stage's sanity check.
    fn as_sanity(&self) -> Option<&dyn Sanity> {
        None
    }
}
