//! Provider decorator that applies the [`Limiter`] around every call.

use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::{
    Address, Image, LabelSelector, Location, Network, Operation, Provider, ProviderError,
    ProviderFuture, ServerCreateRequest, ServerCreateResult, ServerId, ServerRecord, ServerType,
    SshKey, VolumeCreateRequest, VolumeCreateResult, VolumeId, VolumeRecord,
};
use crate::limiter::Limiter;

/// Wraps a provider so each remote call sleeps for the limiter's backoff of
/// its operation id first and reports its outcome afterwards.
///
/// Operation ids are the provider method names, so a failing `create_server`
/// does not slow down unrelated listings. A `NotFound` result counts as a
/// success: it is an answer, not a failure of the remote side.
#[derive(Debug)]
pub struct RateLimitedProvider<P> {
    inner: P,
    limiter: Arc<Limiter>,
    cancel: CancellationToken,
}

impl<P: Provider> RateLimitedProvider<P> {
    /// Wraps `inner`; `cancel` aborts pending backoff sleeps.
    #[must_use]
    pub const fn new(inner: P, limiter: Arc<Limiter>, cancel: CancellationToken) -> Self {
        Self {
            inner,
            limiter,
            cancel,
        }
    }

    /// Returns the shared limiter.
    #[must_use]
    pub fn limiter(&self) -> &Arc<Limiter> {
        &self.limiter
    }

    async fn guarded<T, F>(&self, operation: &'static str, call: F) -> Result<T, ProviderError>
    where
        F: Future<Output = Result<T, ProviderError>> + Send,
    {
        if self.limiter.limit(operation, &self.cancel).await.is_err() {
            return Err(ProviderError::Cancelled);
        }
        let result = call.await;
        let success = match &result {
            Ok(_) => true,
            Err(err) => err.is_not_found(),
        };
        self.limiter.report(operation, success);
        result
    }
}

impl<P: Provider> Provider for RateLimitedProvider<P> {
    fn location<'a>(&'a self, name: &'a str) -> ProviderFuture<'a, Option<Location>> {
        Box::pin(self.guarded("location", self.inner.location(name)))
    }

    fn server_type<'a>(&'a self, name: &'a str) -> ProviderFuture<'a, Option<ServerType>> {
        Box::pin(self.guarded("server_type", self.inner.server_type(name)))
    }

    fn image<'a>(
        &'a self,
        name: &'a str,
        architecture: &'a str,
    ) -> ProviderFuture<'a, Option<Image>> {
        Box::pin(self.guarded("image", self.inner.image(name, architecture)))
    }

    fn network<'a>(&'a self, name: &'a str) -> ProviderFuture<'a, Option<Network>> {
        Box::pin(self.guarded("network", self.inner.network(name)))
    }

    fn ssh_key<'a>(&'a self, name: &'a str) -> ProviderFuture<'a, Option<SshKey>> {
        Box::pin(self.guarded("ssh_key", self.inner.ssh_key(name)))
    }

    fn create_server<'a>(
        &'a self,
        request: &'a ServerCreateRequest,
    ) -> ProviderFuture<'a, ServerCreateResult> {
        Box::pin(self.guarded("create_server", self.inner.create_server(request)))
    }

    fn get_server<'a>(&'a self, id: &'a ServerId) -> ProviderFuture<'a, Option<ServerRecord>> {
        Box::pin(self.guarded("get_server", self.inner.get_server(id)))
    }

    fn list_servers<'a>(
        &'a self,
        selector: &'a LabelSelector,
    ) -> ProviderFuture<'a, Vec<ServerRecord>> {
        Box::pin(self.guarded("list_servers", self.inner.list_servers(selector)))
    }

    fn delete_server<'a>(&'a self, id: &'a ServerId) -> ProviderFuture<'a, Vec<Operation>> {
        Box::pin(self.guarded("delete_server", self.inner.delete_server(id)))
    }

    fn create_volume<'a>(
        &'a self,
        request: &'a VolumeCreateRequest,
    ) -> ProviderFuture<'a, VolumeCreateResult> {
        Box::pin(self.guarded("create_volume", self.inner.create_volume(request)))
    }

    fn list_volumes<'a>(
        &'a self,
        selector: &'a LabelSelector,
    ) -> ProviderFuture<'a, Vec<VolumeRecord>> {
        Box::pin(self.guarded("list_volumes", self.inner.list_volumes(selector)))
    }

    fn delete_volume<'a>(&'a self, id: &'a VolumeId) -> ProviderFuture<'a, ()> {
        Box::pin(self.guarded("delete_volume", self.inner.delete_volume(id)))
    }

    fn list_addresses<'a>(
        &'a self,
        selector: &'a LabelSelector,
    ) -> ProviderFuture<'a, Vec<Address>> {
        Box::pin(self.guarded("list_addresses", self.inner.list_addresses(selector)))
    }

    fn wait_for<'a>(&'a self, operations: &'a [Operation]) -> ProviderFuture<'a, ()> {
        Box::pin(self.guarded("wait_for", self.inner.wait_for(operations)))
    }
}
