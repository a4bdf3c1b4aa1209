//! Scaleway binding of the [`Provider`] trait.
//!
//! Instances live in the Instance API, attachable volumes in Block Storage,
//! private networks in VPC and SSH keys in IAM. Image listing goes through the
//! `scaleway-rs` SDK; every other call is a direct HTTP request authenticated
//! with the `X-Auth-Token` header.
//!
//! Asynchronous work surfaces as [`Operation`] handles:
//! `task:<id>` for Instance API tasks (power actions) and `volume:<id>` for
//! volumes that must reach the `available` state.

mod addresses;
mod error;
mod lookup;
mod operations;
mod servers;
mod tags;
mod types;
mod volumes;

use std::fmt;
use std::sync::LazyLock;
use std::time::Duration;

use reqwest::RequestBuilder;
use scaleway_rs::ScalewayApi;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::provider::{
    Address, Image, LabelSelector, Location, Network, Operation, Provider, ProviderError,
    ProviderFuture, ServerCreateRequest, ServerCreateResult, ServerId, ServerRecord, ServerType,
    SshKey, VolumeCreateRequest, VolumeCreateResult, VolumeId, VolumeRecord,
};

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const SCALEWAY_API_BASE: &str = "https://api.scaleway.com";
const AUTH_HEADER: &str = "X-Auth-Token";
const POLL_INTERVAL: Duration = Duration::from_secs(5);
const WAIT_TIMEOUT: Duration = Duration::from_secs(300);
const PAGE_SIZE: usize = 100;

static HTTP_CLIENT: LazyLock<reqwest::Client> = LazyLock::new(|| {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
});

/// API credentials and tenancy of the Scaleway binding.
#[derive(Clone, Default, Eq, PartialEq)]
pub struct ScalewayCredentials {
    /// API secret key sent as `X-Auth-Token`.
    pub secret_key: String,
    /// Project that owns created resources.
    pub project_id: String,
    /// Organisation used to scope image lookups.
    pub organization_id: Option<String>,
}

impl fmt::Debug for ScalewayCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScalewayCredentials")
            .field("secret_key", &"<redacted>")
            .field("project_id", &self.project_id)
            .field("organization_id", &self.organization_id)
            .finish()
    }
}

/// Provider backed by the Scaleway public APIs.
#[derive(Clone)]
pub struct ScalewayProvider {
    api: ScalewayApi,
    credentials: ScalewayCredentials,
    zone: String,
    poll_interval: Duration,
    wait_timeout: Duration,
}

impl fmt::Debug for ScalewayProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScalewayProvider")
            .field("credentials", &self.credentials)
            .field("zone", &self.zone)
            .field("poll_interval", &self.poll_interval)
            .field("wait_timeout", &self.wait_timeout)
            .finish_non_exhaustive()
    }
}

/// Resource addressed by a request, reported in [`ProviderError::NotFound`].
#[derive(Clone, Copy, Debug)]
struct Target<'a> {
    resource: &'static str,
    id: &'a str,
}

impl<'a> Target<'a> {
    const fn new(resource: &'static str, id: &'a str) -> Self {
        Self { resource, id }
    }
}

impl ScalewayProvider {
    /// Creates a provider operating in `zone`, for example `fr-par-1`.
    ///
    /// Lookups, reads and deletes address `zone`; creations use the location
    /// carried by each request.
    #[must_use]
    pub fn new(credentials: ScalewayCredentials, zone: impl Into<String>) -> Self {
        Self {
            api: ScalewayApi::new(&credentials.secret_key),
            credentials,
            zone: zone.into(),
            poll_interval: POLL_INTERVAL,
            wait_timeout: WAIT_TIMEOUT,
        }
    }

    /// Overrides how often operations are polled and how long to wait for each.
    #[must_use]
    pub const fn with_timing(mut self, poll_interval: Duration, wait_timeout: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.wait_timeout = wait_timeout;
        self
    }

    /// Zone the provider operates in.
    #[must_use]
    pub fn zone(&self) -> &str {
        &self.zone
    }

    fn instance_url(zone: &str, path: &str) -> String {
        format!("{SCALEWAY_API_BASE}/instance/v1/zones/{zone}/{path}")
    }

    fn block_url(zone: &str, path: &str) -> String {
        format!("{SCALEWAY_API_BASE}/block/v1/zones/{zone}/{path}")
    }

    fn regional_url(&self, api: &str, path: &str) -> Result<String, ProviderError> {
        let region = region(&self.zone).ok_or_else(|| {
            ProviderError::api(format!("zone {} does not name a region", self.zone))
        })?;
        Ok(format!("{SCALEWAY_API_BASE}/{api}/regions/{region}/{path}"))
    }

    fn global_url(api: &str, path: &str) -> String {
        format!("{SCALEWAY_API_BASE}/{api}/{path}")
    }

    async fn send(
        &self,
        request: RequestBuilder,
        target: Target<'_>,
    ) -> Result<Vec<u8>, ProviderError> {
        let response = request
            .header(AUTH_HEADER, &self.credentials.secret_key)
            .send()
            .await
            .map_err(|err| error::transport(&err))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|err| error::transport(&err))?;
        debug!(%status, resource = target.resource, id = target.id, "scaleway response");

        if status.is_success() {
            Ok(body.to_vec())
        } else {
            Err(error::classify(status, &body, target.resource, target.id))
        }
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        target: Target<'_>,
    ) -> Result<T, ProviderError> {
        let body = self.send(request, target).await?;
        serde_json::from_slice(&body).map_err(|err| error::transport(&err))
    }

    async fn fetch_optional<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        target: Target<'_>,
    ) -> Result<Option<T>, ProviderError> {
        match self.fetch(request, target).await {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Sends a request whose not-found answer counts as done.
    async fn send_idempotent(
        &self,
        request: RequestBuilder,
        target: Target<'_>,
    ) -> Result<(), ProviderError> {
        match self.send(request, target).await {
            Ok(_) => Ok(()),
            Err(err) if err.is_not_found() => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// Walks every page of a list endpoint.
    ///
    /// `build` returns the request for a 1-based page number.
    async fn collect_pages<P, T>(
        &self,
        target: Target<'_>,
        build: impl Fn(u32) -> RequestBuilder + Send + Sync,
        items: fn(P) -> Vec<T>,
    ) -> Result<Vec<T>, ProviderError>
    where
        P: DeserializeOwned + Send,
        T: Send,
    {
        let mut collected = Vec::new();
        let mut page = 1;
        loop {
            let request = build(page).query(&[("per_page", PAGE_SIZE.to_string())]);
            let batch = items(self.fetch::<P>(request, target).await?);
            let last = batch.len() < PAGE_SIZE;
            collected.extend(batch);
            if last {
                return Ok(collected);
            }
            page += 1;
        }
    }
}

/// Derives the region of a zone: `fr-par-1` lies in `fr-par`.
fn region(zone: &str) -> Option<&str> {
    let (region, index) = zone.rsplit_once('-')?;
    let numbered = !index.is_empty() && index.chars().all(|c| c.is_ascii_digit());
    (numbered && region.contains('-')).then_some(region)
}

impl Provider for ScalewayProvider {
    fn location<'a>(&'a self, name: &'a str) -> ProviderFuture<'a, Option<Location>> {
        Box::pin(self.find_location(name))
    }

    fn server_type<'a>(&'a self, name: &'a str) -> ProviderFuture<'a, Option<ServerType>> {
        Box::pin(self.find_server_type(name))
    }

    fn image<'a>(
        &'a self,
        name: &'a str,
        architecture: &'a str,
    ) -> ProviderFuture<'a, Option<Image>> {
        Box::pin(self.find_image(name, architecture))
    }

    fn network<'a>(&'a self, name: &'a str) -> ProviderFuture<'a, Option<Network>> {
        Box::pin(self.find_network(name))
    }

    fn ssh_key<'a>(&'a self, name: &'a str) -> ProviderFuture<'a, Option<SshKey>> {
        Box::pin(self.find_ssh_key(name))
    }

    fn create_server<'a>(
        &'a self,
        request: &'a ServerCreateRequest,
    ) -> ProviderFuture<'a, ServerCreateResult> {
        Box::pin(self.create_instance(request))
    }

    fn get_server<'a>(&'a self, id: &'a ServerId) -> ProviderFuture<'a, Option<ServerRecord>> {
        Box::pin(self.get_instance(id))
    }

    fn list_servers<'a>(
        &'a self,
        selector: &'a LabelSelector,
    ) -> ProviderFuture<'a, Vec<ServerRecord>> {
        Box::pin(self.list_instances(selector))
    }

    fn delete_server<'a>(&'a self, id: &'a ServerId) -> ProviderFuture<'a, Vec<Operation>> {
        Box::pin(self.delete_instance(id))
    }

    fn create_volume<'a>(
        &'a self,
        request: &'a VolumeCreateRequest,
    ) -> ProviderFuture<'a, VolumeCreateResult> {
        Box::pin(self.create_block_volume(request))
    }

    fn list_volumes<'a>(
        &'a self,
        selector: &'a LabelSelector,
    ) -> ProviderFuture<'a, Vec<VolumeRecord>> {
        Box::pin(self.list_block_volumes(selector))
    }

    fn delete_volume<'a>(&'a self, id: &'a VolumeId) -> ProviderFuture<'a, ()> {
        Box::pin(self.delete_block_volume(id))
    }

    fn list_addresses<'a>(
        &'a self,
        selector: &'a LabelSelector,
    ) -> ProviderFuture<'a, Vec<Address>> {
        Box::pin(self.list_flexible_ips(selector))
    }

    fn wait_for<'a>(&'a self, operations: &'a [Operation]) -> ProviderFuture<'a, ()> {
        Box::pin(self.wait_all(operations))
    }
}

#[cfg(test)]
mod tests;
