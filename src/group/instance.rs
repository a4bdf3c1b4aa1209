//! Instance records and the per-stage contributions merged into them.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::error::GroupError;
use crate::provider::{Address, Operation, Provider, ServerId, ServerRecord, VolumeRecord};

/// Deferred completion of remote work started by a stage.
pub type PendingWait = Pin<Box<dyn Future<Output = Result<(), GroupError>> + Send + 'static>>;

/// Creation parameters accumulated between the first and last creation stage.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ServerDraft {
    /// Reserved IPv4 address drawn from the pool.
    pub ipv4: Option<Address>,
    /// Reserved IPv6 address drawn from the pool.
    pub ipv6: Option<Address>,
    /// Volumes to attach.
    pub volumes: Vec<VolumeRecord>,
    /// Rendered user-data.
    pub user_data: Option<String>,
}

/// A single contribution of a stage to an instance's [`ServerDraft`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DraftDelta {
    /// Start from an empty draft.
    Reset,
    /// Use a reserved IPv4 address.
    Ipv4(Address),
    /// Use a reserved IPv6 address.
    Ipv6(Address),
    /// Append a volume.
    Volume(VolumeRecord),
    /// Replace the user-data.
    UserData(String),
}

impl ServerDraft {
    fn apply(&mut self, delta: DraftDelta) {
        match delta {
            DraftDelta::Reset => *self = Self::default(),
            DraftDelta::Ipv4(address) => self.ipv4 = Some(address),
            DraftDelta::Ipv6(address) => self.ipv6 = Some(address),
            DraftDelta::Volume(volume) => self.volumes.push(volume),
            DraftDelta::UserData(user_data) => self.user_data = Some(user_data),
        }
    }
}

/// What a stage step produced for one instance.
#[derive(Default)]
pub struct StageOutput {
    /// Changes to the instance's draft, applied in order.
    pub deltas: Vec<DraftDelta>,
    /// Server the instance now stands for.
    pub server: Option<ServerRecord>,
    /// Remote work to await once every instance has been dispatched.
    pub wait: Option<PendingWait>,
    /// The step deleted the instance's server. Holds once `wait` resolves.
    pub removed: bool,
}

impl fmt::Debug for StageOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageOutput")
            .field("deltas", &self.deltas)
            .field("server", &self.server)
            .field("wait", &self.wait.is_some())
            .field("removed", &self.removed)
            .finish()
    }
}

impl StageOutput {
    /// Output carrying a single delta.
    #[must_use]
    pub fn delta(delta: DraftDelta) -> Self {
        Self {
            deltas: vec![delta],
            ..Self::default()
        }
    }

    /// Output carrying only a pending wait.
    #[must_use]
    pub fn waiting(wait: Option<PendingWait>) -> Self {
        Self {
            wait,
            ..Self::default()
        }
    }

    /// Output of a server deletion, settled by `wait`.
    #[must_use]
    pub fn removal(wait: Option<PendingWait>) -> Self {
        Self {
            wait,
            removed: true,
            ..Self::default()
        }
    }

    /// Adds a pending wait.
    #[must_use]
    pub fn with_wait(mut self, wait: Option<PendingWait>) -> Self {
        self.wait = wait;
        self
    }
}

/// Builds a wait resolving once every operation completes.
///
/// Returns `None` when there is nothing to wait for.
pub fn wait_for(
    provider: &Arc<dyn Provider>,
    operations: Vec<Operation>,
    context: &'static str,
) -> Option<PendingWait> {
    if operations.is_empty() {
        return None;
    }
    let owned = Arc::clone(provider);
    Some(Box::pin(async move {
        owned
            .wait_for(&operations)
            .await
            .map_err(|source| GroupError::provider(context, source))
    }))
}

/// A member of the group, identified by `name:id`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Instance {
    /// Display name, also used for the instance's sub-resources.
    pub name: String,
    /// Server identifier, absent until the server was requested.
    pub id: Option<ServerId>,
    /// Last known server record.
    pub server: Option<ServerRecord>,
    draft: ServerDraft,
    removed: bool,
}

impl Instance {
    /// A fresh instance with no remote counterpart yet.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: None,
            server: None,
            draft: ServerDraft::default(),
            removed: false,
        }
    }

    /// An instance backed by an existing server.
    #[must_use]
    pub fn from_server(server: ServerRecord) -> Self {
        Self {
            name: server.name.clone(),
            id: Some(server.id.clone()),
            server: Some(server),
            draft: ServerDraft::default(),
            removed: false,
        }
    }

    /// Parses an identifier of the form `name:id`.
    ///
    /// # Errors
    ///
    /// Returns [`GroupError::InvalidIid`] unless the value has exactly two
    /// `:`-separated parts with a non-empty id.
    pub fn from_iid(value: &str) -> Result<Self, GroupError> {
        let mut parts = value.split(':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(name), Some(id), None) if !id.is_empty() => Ok(Self {
                name: name.to_owned(),
                id: Some(ServerId::new(id)),
                server: None,
                draft: ServerDraft::default(),
                removed: false,
            }),
            _ => Err(GroupError::InvalidIid {
                value: value.to_owned(),
            }),
        }
    }

    /// Identifier used outside the group.
    #[must_use]
    pub fn iid(&self) -> String {
        let id = self.id.as_ref().map_or("", ServerId::as_str);
        format!("{}:{id}", self.name)
    }

    /// Creation parameters gathered so far.
    #[must_use]
    pub const fn draft(&self) -> &ServerDraft {
        &self.draft
    }

    /// Whether a server may still exist for this instance: one was
    /// requested and no deletion of it has been confirmed.
    #[must_use]
    pub const fn holds_server(&self) -> bool {
        self.id.is_some() && !self.removed
    }

    fn apply(&mut self, output: StageOutput) {
        for delta in output.deltas {
            self.draft.apply(delta);
        }
        if let Some(server) = output.server {
            self.name.clone_from(&server.name);
            self.id = Some(server.id.clone());
            self.server = Some(server);
            self.removed = false;
        }
    }
}

/// An instance travelling through the pipeline with its pending wait.
pub struct InFlight {
    /// The instance itself.
    pub instance: Instance,
    pending: Option<PendingWait>,
    removal_pending: bool,
}

impl fmt::Debug for InFlight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InFlight")
            .field("instance", &self.instance)
            .field("pending", &self.pending.is_some())
            .field("removal_pending", &self.removal_pending)
            .finish()
    }
}

impl InFlight {
    /// Wraps an instance with nothing pending.
    pub const fn new(instance: Instance) -> Self {
        Self {
            instance,
            pending: None,
            removal_pending: false,
        }
    }

    /// Merges a stage output; a new wait replaces any unresolved one.
    ///
    /// A removal reported alongside a wait is only recorded once that wait
    /// succeeds.
    pub fn apply(&mut self, mut output: StageOutput) {
        let waiting = output.wait.is_some();
        if let Some(wait) = output.wait.take() {
            self.pending = Some(wait);
        }
        let removed = output.removed;
        self.instance.apply(output);
        if removed {
            if waiting {
                self.removal_pending = true;
            } else {
                self.instance.removed = true;
            }
        }
    }

    /// Resolves the pending wait, if any. The wait is consumed even on failure.
    pub async fn wait(&mut self, cancel: &CancellationToken) -> Result<(), GroupError> {
        let Some(pending) = self.pending.take() else {
            return Ok(());
        };
        let removal = std::mem::take(&mut self.removal_pending);
        let settled = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(GroupError::Cancelled),
            result = pending => result,
        };
        if removal && settled.is_ok() {
            self.instance.removed = true;
        }
        settled
    }

    /// Drops the creation parameters once the instance is complete.
    pub fn clear_draft(&mut self) {
        self.instance.draft = ServerDraft::default();
    }
}
