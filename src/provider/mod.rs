//! Provider abstraction consumed by the instance group orchestrator.
//!
//! A provider exposes a small set of remote primitives over named resource
//! types: lookups used once during group initialisation, create/get/list/delete
//! for servers, create/list/delete for volumes, address listing for the pool,
//! and a way to block until asynchronous operations complete. Mutating calls
//! return as soon as the provider accepted the request; completion is observed
//! separately through [`Provider::wait_for`].

mod error;
mod rate_limited;
mod selector;
mod types;

use std::future::Future;
use std::pin::Pin;

pub use error::ProviderError;
pub use rate_limited::RateLimitedProvider;
pub use selector::{LabelParseError, LabelSelector, Labels, parse_labels};
pub use types::{
    Address, AddressFamily, AddressId, Deprecation, Image, Location, Network, Operation,
    OperationId, PublicNet, ServerCreateRequest, ServerCreateResult, ServerId, ServerRecord,
    ServerType, SshKey, VolumeCreateRequest, VolumeCreateResult, VolumeId, VolumeRecord,
};

/// Future returned by provider operations.
pub type ProviderFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, ProviderError>> + Send + 'a>>;

/// Remote primitives required to manage an instance group.
///
/// Lookups return `Ok(None)` when the named resource does not exist. Deleting
/// a missing resource returns [`ProviderError::NotFound`].
pub trait Provider: Send + Sync {
    /// Resolves a location by name or identifier.
    fn location<'a>(&'a self, name: &'a str) -> ProviderFuture<'a, Option<Location>>;

    /// Resolves a machine type by name or identifier.
    fn server_type<'a>(&'a self, name: &'a str) -> ProviderFuture<'a, Option<ServerType>>;

    /// Resolves an image by name for the given architecture.
    fn image<'a>(
        &'a self,
        name: &'a str,
        architecture: &'a str,
    ) -> ProviderFuture<'a, Option<Image>>;

    /// Resolves a private network by name or identifier.
    fn network<'a>(&'a self, name: &'a str) -> ProviderFuture<'a, Option<Network>>;

    /// Resolves an SSH key by name or identifier.
    fn ssh_key<'a>(&'a self, name: &'a str) -> ProviderFuture<'a, Option<SshKey>>;

    /// Requests creation of a server.
    fn create_server<'a>(
        &'a self,
        request: &'a ServerCreateRequest,
    ) -> ProviderFuture<'a, ServerCreateResult>;

    /// Fetches a server by identifier.
    fn get_server<'a>(&'a self, id: &'a ServerId) -> ProviderFuture<'a, Option<ServerRecord>>;

    /// Lists servers matching the selector.
    fn list_servers<'a>(
        &'a self,
        selector: &'a LabelSelector,
    ) -> ProviderFuture<'a, Vec<ServerRecord>>;

    /// Requests deletion of a server.
    fn delete_server<'a>(&'a self, id: &'a ServerId) -> ProviderFuture<'a, Vec<Operation>>;

    /// Requests creation of a volume.
    fn create_volume<'a>(
        &'a self,
        request: &'a VolumeCreateRequest,
    ) -> ProviderFuture<'a, VolumeCreateResult>;

    /// Lists volumes matching the selector.
    fn list_volumes<'a>(
        &'a self,
        selector: &'a LabelSelector,
    ) -> ProviderFuture<'a, Vec<VolumeRecord>>;

    /// Deletes a volume.
    fn delete_volume<'a>(&'a self, id: &'a VolumeId) -> ProviderFuture<'a, ()>;

    /// Lists reserved addresses matching the selector.
    fn list_addresses<'a>(
        &'a self,
        selector: &'a LabelSelector,
    ) -> ProviderFuture<'a, Vec<Address>>;

    /// Blocks until every operation completes, failing on the first failed one.
    fn wait_for<'a>(&'a self, operations: &'a [Operation]) -> ProviderFuture<'a, ()>;
}

impl<P: Provider + ?Sized> Provider for std::sync::Arc<P> {
    fn location<'a>(&'a self, name: &'a str) -> ProviderFuture<'a, Option<Location>> {
        (**self).location(name)
    }

    fn server_type<'a>(&'a self, name: &'a str) -> ProviderFuture<'a, Option<ServerType>> {
        (**self).server_type(name)
    }

    fn image<'a>(
        &'a self,
        name: &'a str,
        architecture: &'a str,
    ) -> ProviderFuture<'a, Option<Image>> {
        (**self).image(name, architecture)
    }

    fn network<'a>(&'a self, name: &'a str) -> ProviderFuture<'a, Option<Network>> {
        (**self).network(name)
    }

    fn ssh_key<'a>(&'a self, name: &'a str) -> ProviderFuture<'a, Option<SshKey>> {
        (**self).ssh_key(name)
    }

    fn create_server<'a>(
        &'a self,
        request: &'a ServerCreateRequest,
    ) -> ProviderFuture<'a, ServerCreateResult> {
        (**self).create_server(request)
    }

    fn get_server<'a>(&'a self, id: &'a ServerId) -> ProviderFuture<'a, Option<ServerRecord>> {
        (**self).get_server(id)
    }

    fn list_servers<'a>(
        &'a self,
        selector: &'a LabelSelector,
    ) -> ProviderFuture<'a, Vec<ServerRecord>> {
        (**self).list_servers(selector)
    }

    fn delete_server<'a>(&'a self, id: &'a ServerId) -> ProviderFuture<'a, Vec<Operation>> {
        (**self).delete_server(id)
    }

    fn create_volume<'a>(
        &'a self,
        request: &'a VolumeCreateRequest,
    ) -> ProviderFuture<'a, VolumeCreateResult> {
        (**self).create_volume(request)
    }

    fn list_volumes<'a>(
        &'a self,
        selector: &'a LabelSelector,
    ) -> ProviderFuture<'a, Vec<VolumeRecord>> {
        (**self).list_volumes(selector)
    }

    fn delete_volume<'a>(&'a self, id: &'a VolumeId) -> ProviderFuture<'a, ()> {
        (**self).delete_volume(id)
    }

    fn list_addresses<'a>(
        &'a self,
        selector: &'a LabelSelector,
    ) -> ProviderFuture<'a, Vec<Address>> {
        (**self).list_addresses(selector)
    }

    fn wait_for<'a>(&'a self, operations: &'a [Operation]) -> ProviderFuture<'a, ()> {
        (**self).wait_for(operations)
    }
}
