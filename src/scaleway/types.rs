//! Request and response bodies of the Scaleway HTTP APIs.

use std::collections::BTreeMap;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use crate::provider::{
    Address, AddressFamily, AddressId, Image, Network, OperationId, ServerId, ServerRecord,
    SshKey, VolumeId, VolumeRecord,
};

use super::tags;

/// Volume type of Block Storage volumes attached to an instance.
pub(super) const SBS_VOLUME_TYPE: &str = "sbs_volume";

#[derive(Debug, Serialize)]
pub(super) struct CreateServerRequest {
    pub name: String,
    pub commercial_type: String,
    pub image: String,
    pub project: String,
    pub tags: Vec<String>,
    pub stopped: bool,
    pub dynamic_ip_required: bool,
    pub routed_ip_enabled: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub public_ips: Vec<String>,
}

/// Volume reference for attachment in the Scaleway API.
#[derive(Clone, Debug, Serialize)]
pub(super) struct VolumeAttachment {
    pub id: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub boot: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_type: Option<String>,
}

/// Request body for `PATCH /servers/{id}`, keyed by volume slot (`"0"` is root).
#[derive(Clone, Debug, Serialize)]
pub(super) struct UpdateServerVolumesRequest {
    pub volumes: BTreeMap<String, VolumeAttachment>,
}

#[derive(Debug, Serialize)]
pub(super) struct ActionRequest {
    pub action: &'static str,
}

#[derive(Debug, Serialize)]
pub(super) struct PrivateNicRequest<'a> {
    pub private_network_id: &'a str,
}

#[derive(Debug, Serialize)]
pub(super) struct CreateIpRequest<'a> {
    pub project: &'a str,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub server: &'a str,
    pub tags: Vec<String>,
}

#[derive(Debug, Serialize)]
pub(super) struct EmptyVolumeSource {
    pub size: u64,
}

#[derive(Debug, Serialize)]
pub(super) struct CreateVolumeRequest<'a> {
    pub name: &'a str,
    pub project_id: &'a str,
    pub from_empty: EmptyVolumeSource,
    pub tags: Vec<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub(super) struct ServerIp {
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub family: String,
}

#[derive(Clone, Debug, Deserialize)]
pub(super) struct ServerVolume {
    pub id: String,
    #[serde(default)]
    pub volume_type: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub(super) struct ServerBody {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub allowed_actions: Vec<String>,
    #[serde(default)]
    pub public_ips: Vec<ServerIp>,
    #[serde(default)]
    pub volumes: BTreeMap<String, ServerVolume>,
}

impl ServerBody {
    pub fn allows(&self, action: &str) -> bool {
        self.allowed_actions.iter().any(|allowed| allowed == action)
    }

    pub fn root_volume(&self) -> Option<&ServerVolume> {
        self.volumes.get("0")
    }

    fn public_ip(&self, family: &str) -> Option<IpAddr> {
        self.public_ips
            .iter()
            .filter(|ip| ip.family == family)
            .find_map(|ip| ip.address.parse().ok())
    }

    pub fn into_record(self) -> ServerRecord {
        let public_ipv4 = self.public_ip("inet");
        let public_ipv6 = self.public_ip("inet6");
        ServerRecord {
            labels: tags::decode(&self.tags),
            id: ServerId::new(self.id),
            name: self.name,
            status: self.state,
            public_ipv4,
            public_ipv6,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct ServerEnvelope {
    pub server: ServerBody,
}

#[derive(Debug, Deserialize)]
pub(super) struct ServersPage {
    #[serde(default)]
    pub servers: Vec<ServerBody>,
}

#[derive(Debug, Deserialize)]
pub(super) struct TaskBody {
    pub id: String,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct TaskEnvelope {
    pub task: TaskBody,
}

#[derive(Debug, Deserialize)]
pub(super) struct IpServer {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct IpBody {
    pub id: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub zone: String,
    #[serde(default)]
    pub server: Option<IpServer>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl IpBody {
    pub fn into_address(self) -> Address {
        let family = if self.kind.ends_with("ipv6") {
            AddressFamily::Ipv6
        } else {
            AddressFamily::Ipv4
        };
        let ip = self
            .address
            .as_deref()
            .or(self.prefix.as_deref())
            .and_then(|value| value.split('/').next())
            .and_then(|value| value.parse().ok());
        Address {
            id: AddressId::new(self.id),
            family,
            ip,
            location: self.zone,
            assignee: self.server.map(|server| ServerId::new(server.id)),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct IpsPage {
    #[serde(default)]
    pub ips: Vec<IpBody>,
}

#[derive(Debug, Deserialize)]
pub(super) struct VolumeReference {
    #[serde(default)]
    pub product_resource_type: String,
    #[serde(default)]
    pub product_resource_id: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct VolumeBody {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub references: Vec<VolumeReference>,
}

impl VolumeBody {
    pub fn into_record(self) -> VolumeRecord {
        let server = self
            .references
            .iter()
            .find(|reference| reference.product_resource_type == "instance_server")
            .map(|reference| ServerId::new(reference.product_resource_id.clone()));
        VolumeRecord {
            labels: tags::decode(&self.tags),
            id: VolumeId::new(self.id),
            name: self.name,
            server,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct VolumesPage {
    #[serde(default)]
    pub volumes: Vec<VolumeBody>,
}

#[derive(Debug, Deserialize)]
pub(super) struct ProductBody {
    #[serde(default)]
    pub arch: String,
    #[serde(default)]
    pub end_of_service: bool,
}

#[derive(Debug, Deserialize)]
pub(super) struct ProductsPage {
    #[serde(default)]
    pub servers: BTreeMap<String, ProductBody>,
}

#[derive(Debug, Deserialize)]
pub(super) struct ImageBody {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub arch: String,
}

impl ImageBody {
    pub fn into_image(self) -> Image {
        Image {
            id: self.id,
            name: self.name,
            architecture: self.arch,
            deprecation: None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct ImageEnvelope {
    pub image: ImageBody,
}

/// A named resource of the VPC or IAM APIs.
#[derive(Debug, Deserialize)]
pub(super) struct NamedBody {
    pub id: String,
    pub name: String,
}

impl NamedBody {
    pub fn into_network(self) -> Network {
        Network {
            id: self.id,
            name: self.name,
        }
    }

    pub fn into_ssh_key(self) -> SshKey {
        SshKey {
            id: self.id,
            name: self.name,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct PrivateNetworksPage {
    #[serde(default)]
    pub private_networks: Vec<NamedBody>,
}

#[derive(Debug, Deserialize)]
pub(super) struct SshKeysPage {
    #[serde(default)]
    pub ssh_keys: Vec<NamedBody>,
}

/// What an operation handle points at.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(super) enum OperationRef<'a> {
    /// An Instance API task, for example a power action.
    Task(&'a str),
    /// A Block Storage volume that must become available.
    Volume(&'a str),
}

impl<'a> OperationRef<'a> {
    pub fn parse(id: &'a OperationId) -> Option<Self> {
        match id.as_str().split_once(':')? {
            ("task", task) if !task.is_empty() => Some(Self::Task(task)),
            ("volume", volume) if !volume.is_empty() => Some(Self::Volume(volume)),
            _ => None,
        }
    }

    pub fn task_id(task: &str) -> OperationId {
        OperationId::new(format!("task:{task}"))
    }

    pub fn volume_id(volume: &str) -> OperationId {
        OperationId::new(format!("volume:{volume}"))
    }
}

/// Observed state of an operation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(super) enum Progress {
    Pending,
    Done,
    Failed(String),
}

impl Progress {
    pub fn of_task(status: &str) -> Self {
        match status {
            "success" => Self::Done,
            "failure" => Self::Failed(format!("task finished with status {status}")),
            _ => Self::Pending,
        }
    }

    pub fn of_volume(status: &str) -> Self {
        match status {
            "available" | "in_use" => Self::Done,
            "error" | "locked" => Self::Failed(format!("volume is {status}")),
            _ => Self::Pending,
        }
    }
}
