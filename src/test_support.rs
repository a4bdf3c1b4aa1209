//! Test support utilities shared across unit and integration tests.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::env;
use std::ffi::OsString;
use std::future;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::{Mutex as StdMutex, MutexGuard as StdMutexGuard, PoisonError};

use tokio::sync::{Mutex, MutexGuard};

use crate::provider::{
    Address, AddressFamily, AddressId, Deprecation, Image, LabelSelector, Labels, Location,
    Network, Operation, Provider, ProviderError, ProviderFuture, ServerCreateRequest,
    ServerCreateResult, ServerId, ServerRecord, ServerType, SshKey, VolumeCreateRequest,
    VolumeCreateResult, VolumeId, VolumeRecord,
};

/// Location every seeded fake resource lives in.
pub const FAKE_LOCATION: &str = "fr-par-1";

#[derive(Debug, Default)]
struct FakeState {
    locations: Vec<Location>,
    server_types: Vec<ServerType>,
    images: Vec<Image>,
    networks: Vec<Network>,
    ssh_keys: Vec<SshKey>,
    servers: BTreeMap<ServerId, ServerRecord>,
    volumes: BTreeMap<VolumeId, VolumeRecord>,
    addresses: Vec<(Labels, Address)>,
    unavailable_types: BTreeSet<String>,
    scripted: HashMap<&'static str, VecDeque<ProviderError>>,
    failing_operations: Vec<(String, ProviderError)>,
    hang_waits: bool,
    sequence: u64,
    calls: Vec<String>,
}

impl FakeState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.sequence += 1;
        format!("{prefix}-{}", self.sequence)
    }

    fn operation(&mut self, description: String) -> Operation {
        let id = self.next_id("op");
        Operation::new(id, description)
    }

    fn scripted(&mut self, method: &'static str) -> Option<ProviderError> {
        self.scripted.get_mut(method).and_then(VecDeque::pop_front)
    }
}

/// In-memory [`Provider`] with scripted failures and a call journal.
///
/// Every call is appended to [`FakeProvider::calls`] as `method target`.
/// Failures queued with [`FakeProvider::fail_next`] fire once, in order, for
/// the named method before any state is touched.
#[derive(Debug, Default)]
pub struct FakeProvider {
    state: StdMutex<FakeState>,
}

impl FakeProvider {
    /// Creates a provider seeded with one location, two x86 types, one arm
    /// type, an image per architecture, a network and an SSH key.
    #[must_use]
    pub fn new() -> Self {
        let provider = Self::default();
        {
            let mut state = provider.lock();
            state.locations.push(Location {
                id: String::from(FAKE_LOCATION),
                name: String::from(FAKE_LOCATION),
            });
            for (name, architecture) in [
                ("DEV1-S", "x86_64"),
                ("DEV1-M", "x86_64"),
                ("COPARM1-2C-8G", "arm64"),
            ] {
                state.server_types.push(ServerType {
                    id: name.to_lowercase(),
                    name: String::from(name),
                    architecture: String::from(architecture),
                    deprecation: None,
                });
            }
            for architecture in ["x86_64", "arm64"] {
                state.images.push(Image {
                    id: format!("img-ubuntu-{architecture}"),
                    name: String::from("ubuntu_noble"),
                    architecture: String::from(architecture),
                    deprecation: None,
                });
            }
            state.networks.push(Network {
                id: String::from("pn-runners"),
                name: String::from("runners"),
            });
            state.ssh_keys.push(SshKey {
                id: String::from("key-ops"),
                name: String::from("ops"),
            });
        }
        provider
    }

    fn lock(&self) -> StdMutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queues `error` as the next result of `method`.
    pub fn fail_next(&self, method: &'static str, error: ProviderError) {
        self.lock()
            .scripted
            .entry(method)
            .or_default()
            .push_back(error);
    }

    /// Makes every wait on an operation whose description contains
    /// `pattern` fail with `error`.
    pub fn fail_operations_matching(&self, pattern: impl Into<String>, error: ProviderError) {
        self.lock().failing_operations.push((pattern.into(), error));
    }

    /// Makes `create_server` reject the named server type as out of stock.
    pub fn mark_unavailable(&self, server_type: impl Into<String>) {
        self.lock().unavailable_types.insert(server_type.into());
    }

    /// Makes every `wait_for` call pend forever.
    pub fn hang_waits(&self) {
        self.lock().hang_waits = true;
    }

    /// Marks a seeded server type deprecated.
    pub fn deprecate_server_type(&self, name: &str, unavailable: bool) {
        let mut state = self.lock();
        for server_type in state.server_types.iter_mut().filter(|t| t.name == name) {
            server_type.deprecation = Some(Deprecation { unavailable });
        }
    }

    /// Marks a seeded image deprecated.
    pub fn deprecate_image(&self, name: &str, unavailable: bool) {
        let mut state = self.lock();
        for image in state.images.iter_mut().filter(|image| image.name == name) {
            image.deprecation = Some(Deprecation { unavailable });
        }
    }

    /// Adds a reserved address carrying `labels`.
    pub fn add_address(&self, labels: Labels, address: Address) {
        self.lock().addresses.push((labels, address));
    }

    /// Inserts a server record directly.
    pub fn add_server(&self, server: ServerRecord) {
        self.lock().servers.insert(server.id.clone(), server);
    }

    /// Inserts a volume record directly.
    pub fn add_volume(&self, volume: VolumeRecord) {
        self.lock().volumes.insert(volume.id.clone(), volume);
    }

    /// Returns the servers currently stored.
    #[must_use]
    pub fn servers(&self) -> Vec<ServerRecord> {
        self.lock().servers.values().cloned().collect()
    }

    /// Returns the volumes currently stored.
    #[must_use]
    pub fn volumes(&self) -> Vec<VolumeRecord> {
        self.lock().volumes.values().cloned().collect()
    }

    /// Returns the stored addresses.
    #[must_use]
    pub fn addresses(&self) -> Vec<Address> {
        self.lock()
            .addresses
            .iter()
            .map(|(_, address)| address.clone())
            .collect()
    }

    /// Returns the call journal.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    /// Returns journal entries for `method`.
    #[must_use]
    pub fn calls_to(&self, method: &str) -> Vec<String> {
        self.lock()
            .calls
            .iter()
            .filter(|call| call.split(' ').next() == Some(method))
            .cloned()
            .collect()
    }

    fn record<T>(
        &self,
        method: &'static str,
        target: &str,
        body: impl FnOnce(&mut FakeState) -> Result<T, ProviderError>,
    ) -> Result<T, ProviderError> {
        let mut state = self.lock();
        state.calls.push(format!("{method} {target}").trim_end().to_owned());
        if let Some(err) = state.scripted(method) {
            return Err(err);
        }
        body(&mut state)
    }
}

fn ready<'a, T: Send + 'a>(result: Result<T, ProviderError>) -> ProviderFuture<'a, T> {
    Box::pin(future::ready(result))
}

fn find_named<T: Clone>(items: &[T], name: &str, key: impl Fn(&T) -> (&str, &str)) -> Option<T> {
    items
        .iter()
        .find(|item| {
            let (id, item_name) = key(item);
            id == name || item_name == name
        })
        .cloned()
}

fn fake_ipv4(seq: u64) -> IpAddr {
    let octet = u8::try_from(seq).unwrap_or(u8::MAX);
    IpAddr::V4(Ipv4Addr::new(192, 0, 2, octet))
}

fn fake_ipv6(seq: u64) -> IpAddr {
    let segment = u16::try_from(seq).unwrap_or(u16::MAX);
    IpAddr::V6(Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, segment))
}

impl Provider for FakeProvider {
    fn location<'a>(&'a self, name: &'a str) -> ProviderFuture<'a, Option<Location>> {
        ready(self.record("location", name, |state| {
            Ok(find_named(&state.locations, name, |l| (l.id.as_str(), l.name.as_str())))
        }))
    }

    fn server_type<'a>(&'a self, name: &'a str) -> ProviderFuture<'a, Option<ServerType>> {
        ready(self.record("server_type", name, |state| {
            Ok(find_named(&state.server_types, name, |t| (t.id.as_str(), t.name.as_str())))
        }))
    }

    fn image<'a>(
        &'a self,
        name: &'a str,
        architecture: &'a str,
    ) -> ProviderFuture<'a, Option<Image>> {
        ready(self.record("image", name, |state| {
            Ok(state
                .images
                .iter()
                .find(|image| {
                    (image.id == name || image.name == name) && image.architecture == architecture
                })
                .cloned())
        }))
    }

    fn network<'a>(&'a self, name: &'a str) -> ProviderFuture<'a, Option<Network>> {
        ready(self.record("network", name, |state| {
            Ok(find_named(&state.networks, name, |n| (n.id.as_str(), n.name.as_str())))
        }))
    }

    fn ssh_key<'a>(&'a self, name: &'a str) -> ProviderFuture<'a, Option<SshKey>> {
        ready(self.record("ssh_key", name, |state| {
            Ok(find_named(&state.ssh_keys, name, |k| (k.id.as_str(), k.name.as_str())))
        }))
    }

    fn create_server<'a>(
        &'a self,
        request: &'a ServerCreateRequest,
    ) -> ProviderFuture<'a, ServerCreateResult> {
        let target = format!("{} {}", request.name, request.server_type);
        ready(self.record("create_server", &target, |state| {
            if state.unavailable_types.contains(&request.server_type) {
                return Err(ProviderError::ResourceUnavailable {
                    message: format!("server type {} is out of stock", request.server_type),
                });
            }

            let id = ServerId::new(state.next_id("srv"));
            let mut public_ipv4 = None;
            let mut public_ipv6 = None;
            for (_, address) in &mut state.addresses {
                let wanted = match address.family {
                    AddressFamily::Ipv4 => request.public_net.ipv4.as_ref(),
                    AddressFamily::Ipv6 => request.public_net.ipv6.as_ref(),
                };
                if wanted == Some(&address.id) {
                    address.assignee = Some(id.clone());
                    match address.family {
                        AddressFamily::Ipv4 => public_ipv4 = address.ip,
                        AddressFamily::Ipv6 => public_ipv6 = address.ip,
                    }
                }
            }
            if request.public_net.enable_ipv4 && public_ipv4.is_none() {
                public_ipv4 = Some(fake_ipv4(state.sequence));
            }
            if request.public_net.enable_ipv6 && public_ipv6.is_none() {
                public_ipv6 = Some(fake_ipv6(state.sequence));
            }
            for volume_id in &request.volumes {
                if let Some(volume) = state.volumes.get_mut(volume_id) {
                    volume.server = Some(id.clone());
                }
            }

            let server = ServerRecord {
                id: id.clone(),
                name: request.name.clone(),
                status: String::from("starting"),
                labels: request.labels.clone(),
                public_ipv4,
                public_ipv6,
            };
            state.servers.insert(id, server.clone());
            let operation = state.operation(format!("create server {}", request.name));
            Ok(ServerCreateResult {
                server,
                operations: vec![operation],
            })
        }))
    }

    fn get_server<'a>(&'a self, id: &'a ServerId) -> ProviderFuture<'a, Option<ServerRecord>> {
        ready(self.record("get_server", id, |state| {
            Ok(state.servers.get(id).cloned())
        }))
    }

    fn list_servers<'a>(
        &'a self,
        selector: &'a LabelSelector,
    ) -> ProviderFuture<'a, Vec<ServerRecord>> {
        ready(self.record("list_servers", &selector.to_string(), |state| {
            Ok(state
                .servers
                .values()
                .filter(|server| selector.matches(&server.labels))
                .cloned()
                .collect())
        }))
    }

    fn delete_server<'a>(&'a self, id: &'a ServerId) -> ProviderFuture<'a, Vec<Operation>> {
        ready(self.record("delete_server", id, |state| {
            let server = state
                .servers
                .remove(id)
                .ok_or_else(|| ProviderError::not_found("server", id.as_str()))?;
            for volume in state.volumes.values_mut() {
                if volume.server.as_ref() == Some(id) {
                    volume.server = None;
                }
            }
            for (_, address) in &mut state.addresses {
                if address.assignee.as_ref() == Some(id) {
                    address.assignee = None;
                }
            }
            let operation = state.operation(format!("delete server {}", server.name));
            Ok(vec![operation])
        }))
    }

    fn create_volume<'a>(
        &'a self,
        request: &'a VolumeCreateRequest,
    ) -> ProviderFuture<'a, VolumeCreateResult> {
        ready(self.record("create_volume", &request.name, |state| {
            let volume = VolumeRecord {
                id: VolumeId::new(state.next_id("vol")),
                name: request.name.clone(),
                labels: request.labels.clone(),
                server: None,
            };
            state.volumes.insert(volume.id.clone(), volume.clone());
            let operation = state.operation(format!("create volume {}", request.name));
            Ok(VolumeCreateResult {
                volume,
                operations: vec![operation],
            })
        }))
    }

    fn list_volumes<'a>(
        &'a self,
        selector: &'a LabelSelector,
    ) -> ProviderFuture<'a, Vec<VolumeRecord>> {
        ready(self.record("list_volumes", &selector.to_string(), |state| {
            Ok(state
                .volumes
                .values()
                .filter(|volume| selector.matches(&volume.labels))
                .cloned()
                .collect())
        }))
    }

    fn delete_volume<'a>(&'a self, id: &'a VolumeId) -> ProviderFuture<'a, ()> {
        ready(self.record("delete_volume", id, |state| {
            state
                .volumes
                .remove(id)
                .map(drop)
                .ok_or_else(|| ProviderError::not_found("volume", id.as_str()))
        }))
    }

    fn list_addresses<'a>(
        &'a self,
        selector: &'a LabelSelector,
    ) -> ProviderFuture<'a, Vec<Address>> {
        ready(self.record("list_addresses", &selector.to_string(), |state| {
            Ok(state
                .addresses
                .iter()
                .filter(|(labels, _)| selector.matches(labels))
                .map(|(_, address)| address.clone())
                .collect())
        }))
    }

    fn wait_for<'a>(&'a self, operations: &'a [Operation]) -> ProviderFuture<'a, ()> {
        let target = operations
            .iter()
            .map(|operation| operation.description.as_str())
            .collect::<Vec<_>>()
            .join(",");
        let mut hang = false;
        let result = self.record("wait_for", &target, |state| {
            hang = state.hang_waits;
            for operation in operations {
                if let Some((_, err)) = state
                    .failing_operations
                    .iter()
                    .find(|(pattern, _)| operation.description.contains(pattern.as_str()))
                {
                    return Err(err.clone());
                }
            }
            Ok(())
        });
        Box::pin(async move {
            if hang {
                future::pending::<()>().await;
            }
            result
        })
    }
}

/// Builds an unassigned address in [`FAKE_LOCATION`].
#[must_use]
pub fn free_address(id: &str, family: AddressFamily) -> Address {
    Address {
        id: AddressId::new(id),
        family,
        ip: None,
        location: String::from(FAKE_LOCATION),
        assignee: None,
    }
}

/// Builds a label set from pairs.
#[must_use]
pub fn labels(pairs: &[(&str, &str)]) -> Labels {
    pairs
        .iter()
        .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
        .collect()
}

/// Global mutex used to serialise environment mutation in tests.
pub static ENV_LOCK: Mutex<()> = Mutex::const_new(());

/// Guard that holds the env mutex and restores variables on drop.
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
    _guard: MutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets multiple environment variables while holding a global mutex.
    pub async fn set_vars(pairs: &[(&str, &str)]) -> Self {
        debug_assert!(
            {
                let mut seen = BTreeSet::new();
                pairs.iter().all(|(key, _)| seen.insert(*key))
            },
            "duplicate environment variable keys passed to EnvGuard::set_vars"
        );

        let guard = ENV_LOCK.lock().await;
        let mut previous = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            let old = env::var_os(key);
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
            unsafe { env::set_var(key, value) };
            previous.push(((*key).to_owned(), old));
        }

        Self {
            previous,
            _guard: guard,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, old) in &self.previous {
            // SAFETY: Environment mutation is serialised by holding `_guard`.
            unsafe {
                match old {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
        }
    }
}
