//! Instance group orchestration.
//!
//! An [`InstanceGroup`] creates and deletes batches of instances through a
//! fixed pipeline of stages (see [`handlers`]). Each batch tolerates partial
//! failure: instances that fail a creation stage are rolled back through the
//! cleanup stages in reverse order, and the batch reports what succeeded next
//! to everything that failed.

mod context;
mod credentials;
mod error;
pub mod handlers;
mod instance;
mod pipeline;
mod stage;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, error, info, info_span};
use uuid::Uuid;

pub use context::{GROUP_LABEL, GroupConfig, GroupContext, group_labels, group_selector};
pub use credentials::{CredentialStore, generate_secret};
pub use error::{GroupError, JoinedError, ScaleOutcome};
pub use handlers::PASSWORD_PLACEHOLDER;
pub use instance::{DraftDelta, Instance, PendingWait, ServerDraft, StageOutput};
pub use stage::{Cleanup, Create, GroupScope, PreDecrease, PreIncrease, Sanity, Stage, StageFuture};

use self::instance::InFlight;
use self::stage::guarded;
use crate::ip_pool::IpPool;
use crate::provider::{Provider, ServerType};

type NameFn = Box<dyn Fn() -> String + Send + Sync>;

/// Length of the random suffix appended to generated instance names.
const NAME_SUFFIX_LEN: usize = 8;

/// Returns the architecture every server type shares, in fallback order.
fn shared_architecture(server_types: &[ServerType]) -> Result<String, GroupError> {
    let Some(first) = server_types.first() else {
        return Err(GroupError::Lookup {
            resource: "server type",
            name: String::from("<none configured>"),
        });
    };
    if let Some(other) = server_types
        .iter()
        .find(|server_type| server_type.architecture != first.architecture)
    {
        return Err(GroupError::ArchitectureMismatch {
            server_type: other.name.clone(),
            architecture: other.architecture.clone(),
            expected: first.architecture.clone(),
        });
    }
    Ok(first.architecture.clone())
}

/// A named group of instances managed on one provider.
pub struct InstanceGroup {
    name: String,
    config: GroupConfig,
    provider: Arc<dyn Provider>,
    context: Option<GroupContext>,
    pool: Option<IpPool>,
    size: AtomicUsize,
    credentials: CredentialStore,
    name_fn: NameFn,
}

impl fmt::Debug for InstanceGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceGroup")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("context", &self.context)
            .field("pool", &self.pool)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

impl InstanceGroup {
    /// Creates an uninitialised group. Call [`InstanceGroup::init`] first.
    #[must_use]
    pub fn new(
        group_name: impl Into<String>,
        config: GroupConfig,
        provider: Arc<dyn Provider>,
    ) -> Self {
        let name = group_name.into();
        let prefix = name.clone();
        Self {
            name,
            config,
            provider,
            context: None,
            pool: None,
            size: AtomicUsize::new(0),
            credentials: CredentialStore::default(),
            name_fn: Box::new(move || {
                let suffix: String = Uuid::new_v4()
                    .simple()
                    .to_string()
                    .chars()
                    .take(NAME_SUFFIX_LEN)
                    .collect();
                format!("{prefix}-{suffix}")
            }),
        }
    }

    /// Replaces the generator of new instance names.
    #[must_use]
    pub fn with_name_generator(
        mut self,
        generator: impl Fn() -> String + Send + Sync + 'static,
    ) -> Self {
        self.name_fn = Box::new(generator);
        self
    }

    /// Group name, carried by every resource as the `instance-group` label.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resolved provider resources, once initialised.
    #[must_use]
    pub const fn context(&self) -> Option<&GroupContext> {
        self.context.as_ref()
    }

    /// Cached number of instances, as last counted or adjusted.
    #[must_use]
    pub fn size(&self) -> usize {
        self.size.load(Ordering::Relaxed)
    }

    /// The address pool, when pool mode is enabled.
    #[must_use]
    pub const fn pool(&self) -> Option<&IpPool> {
        self.pool.as_ref()
    }

    /// Returns the password generated for the named instance.
    #[must_use]
    pub fn credential(&self, instance: &str) -> Option<String> {
        self.credentials.get(instance)
    }

    fn span(&self) -> Span {
        info_span!("group", group = %self.name)
    }

    fn initialized(&self) -> Result<&GroupContext, GroupError> {
        self.context.as_ref().ok_or(GroupError::NotInitialized)
    }

    fn scope<'g>(&'g self, cancel: &'g CancellationToken) -> Result<GroupScope<'g>, GroupError> {
        let context = self.initialized()?;
        Ok(GroupScope {
            name: &self.name,
            config: &self.config,
            context,
            provider: &self.provider,
            pool: self.pool.as_ref(),
            credentials: &self.credentials,
            cancel,
        })
    }

    /// Resolves the configured resources, creates the address pool when
    /// enabled, counts the existing instances and runs a first sanity sweep.
    ///
    /// # Errors
    ///
    /// Returns [`GroupError::Lookup`] when a configured resource does not
    /// exist, [`GroupError::ArchitectureMismatch`] when the server types
    /// disagree on architecture, or the provider failure.
    pub async fn init(&mut self, cancel: &CancellationToken) -> Result<(), GroupError> {
        let span = self.span();
        async {
            let context = self.resolve(cancel).await?;
            info!(
                location = %context.location.name,
                architecture = %context.architecture,
                image = %context.image.name,
                server_types = context.server_types.len(),
                "resolved instance group context"
            );
            let existing = guarded(
                cancel,
                "could not list instances",
                self.provider.list_servers(&group_selector(&self.name)),
            )
            .await?;

            if self.config.public_ip_pool_enabled {
                self.pool = Some(IpPool::new(
                    context.location.name.clone(),
                    self.config.public_ip_pool_selector.clone(),
                ));
            }
            self.size.store(existing.len(), Ordering::Relaxed);
            self.context = Some(context);
            Ok(())
        }
        .instrument(span)
        .await?;

        self.sanity(cancel, true).await
    }

    async fn resolve(&self, cancel: &CancellationToken) -> Result<GroupContext, GroupError> {
        let provider = self.provider.as_ref();
        let config = &self.config;

        let location = guarded(
            cancel,
            "could not get location",
            provider.location(&config.location),
        )
        .await?
        .ok_or_else(|| GroupError::Lookup {
            resource: "location",
            name: config.location.clone(),
        })?;

        let mut server_types = Vec::with_capacity(config.server_types.len());
        for name in &config.server_types {
            let server_type = guarded(
                cancel,
                "could not get server type",
                provider.server_type(name),
            )
            .await?
            .ok_or_else(|| GroupError::Lookup {
                resource: "server type",
                name: name.clone(),
            })?;
            server_types.push(server_type);
        }
        let architecture = shared_architecture(&server_types)?;

        let image = guarded(
            cancel,
            "could not get image",
            provider.image(&config.image, &architecture),
        )
        .await?
        .ok_or_else(|| GroupError::Lookup {
            resource: "image",
            name: config.image.clone(),
        })?;

        let mut networks = Vec::with_capacity(config.private_networks.len());
        for name in &config.private_networks {
            let network = guarded(cancel, "could not get network", provider.network(name))
                .await?
                .ok_or_else(|| GroupError::Lookup {
                    resource: "network",
                    name: name.clone(),
                })?;
            networks.push(network);
        }

        let mut ssh_keys = Vec::with_capacity(config.ssh_keys.len());
        for name in &config.ssh_keys {
            let key = guarded(cancel, "could not get ssh key", provider.ssh_key(name))
                .await?
                .ok_or_else(|| GroupError::Lookup {
                    resource: "ssh key",
                    name: name.clone(),
                })?;
            ssh_keys.push(key);
        }

        Ok(GroupContext {
            location,
            server_types,
            architecture,
            image,
            networks,
            ssh_keys,
            labels: group_labels(&self.name, &config.labels),
        })
    }

    /// Creates `delta` instances.
    ///
    /// # Errors
    ///
    /// Returns [`GroupError::NotInitialized`] before `init`, or the failure of
    /// a pre-increase step, for example an address pool that cannot be
    /// refreshed. Per-instance failures are reported in the outcome.
    pub async fn increase(
        &self,
        cancel: &CancellationToken,
        delta: usize,
    ) -> Result<ScaleOutcome, GroupError> {
        let scope = self.scope(cancel)?;
        async {
            let stages = handlers::creation_stages();
            for stage in &stages {
                if let Some(hook) = stage.as_pre_increase() {
                    hook.pre_increase(&scope).await?;
                }
            }

            let instances = (0..delta)
                .map(|_| InFlight::new(Instance::new((self.name_fn)())))
                .collect();
            let outcome = pipeline::increase(&scope, &stages, instances).await;

            self.size.fetch_add(outcome.ids.len(), Ordering::Relaxed);
            info!(
                requested = delta,
                created = outcome.ids.len(),
                failures = outcome.failures.len(),
                "increase finished"
            );
            Ok(outcome)
        }
        .instrument(self.span())
        .await
    }

    /// Deletes the instances named by `iids`.
    ///
    /// Invalid identifiers are reported in the outcome and skipped. A server
    /// or volume that is already gone counts as deleted.
    ///
    /// # Errors
    ///
    /// Returns [`GroupError::NotInitialized`] before `init`, or the failure of
    /// a pre-decrease step.
    pub async fn decrease(
        &self,
        cancel: &CancellationToken,
        iids: &[String],
    ) -> Result<ScaleOutcome, GroupError> {
        let scope = self.scope(cancel)?;
        async {
            let stages = handlers::deletion_stages();
            for stage in &stages {
                if let Some(hook) = stage.as_pre_decrease() {
                    hook.pre_decrease(&scope).await?;
                }
            }

            let mut failures = Vec::new();
            let mut instances = Vec::with_capacity(iids.len());
            for iid in iids {
                match Instance::from_iid(iid) {
                    Ok(instance) => instances.push(InFlight::new(instance)),
                    Err(err) => failures.push(err),
                }
            }
            let outcome = pipeline::decrease(&scope, &stages, instances, failures).await;

            let deleted = outcome.ids.len();
            let _previous = self
                .size
                .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |size| {
                    Some(size.saturating_sub(deleted))
                });
            info!(
                requested = iids.len(),
                deleted,
                failures = outcome.failures.len(),
                "decrease finished"
            );
            Ok(outcome)
        }
        .instrument(self.span())
        .await
    }

    /// Lists the group's instances and resynchronises the cached size.
    ///
    /// # Errors
    ///
    /// Returns [`GroupError::NotInitialized`] before `init`, or the provider
    /// failure.
    pub async fn list(&self, cancel: &CancellationToken) -> Result<Vec<Instance>, GroupError> {
        self.initialized()?;
        async {
            let servers = guarded(
                cancel,
                "could not list instances",
                self.provider.list_servers(&group_selector(&self.name)),
            )
            .await?;

            let cached = self.size.swap(servers.len(), Ordering::Relaxed);
            if cached != servers.len() {
                error!(
                    cached,
                    listed = servers.len(),
                    "instance group size out of sync"
                );
            }
            Ok(servers.into_iter().map(Instance::from_server).collect())
        }
        .instrument(self.span())
        .await
    }

    /// Fetches one instance by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`GroupError::InvalidIid`] for a malformed identifier,
    /// [`GroupError::NotFound`] when the server does not exist, or the
    /// provider failure.
    pub async fn get(&self, cancel: &CancellationToken, iid: &str) -> Result<Instance, GroupError> {
        self.initialized()?;
        let Some(id) = Instance::from_iid(iid)?.id else {
            return Err(GroupError::InvalidIid {
                value: iid.to_owned(),
            });
        };
        guarded(
            cancel,
            "could not get instance",
            self.provider.get_server(&id),
        )
        .await?
        .map(Instance::from_server)
        .ok_or_else(|| GroupError::NotFound {
            iid: iid.to_owned(),
        })
    }

    /// Runs the best-effort sanity sweep. Failures are logged, not returned.
    ///
    /// # Errors
    ///
    /// Returns [`GroupError::NotInitialized`] before `init`.
    pub async fn sanity(&self, cancel: &CancellationToken, init: bool) -> Result<(), GroupError> {
        let scope = self.scope(cancel)?;
        async {
            let stages = handlers::sanity_stages(self.config.volume_size > 0 || init);
            for stage in &stages {
                let Some(check) = stage.as_sanity() else {
                    continue;
                };
                if let Err(err) = check.sanity(&scope).await {
                    error!(handler = stage.name(), error = %err, "sanity check failed");
                }
            }
        }
        .instrument(self.span())
        .await;
        Ok(())
    }
}
