//! Provider-side records and request types shared by every provider binding.

use std::fmt;
use std::net::IpAddr;
use std::ops::Deref;

use super::selector::Labels;

macro_rules! newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
        pub struct $name(String);

        impl $name {
            /// Wraps a provider identifier.
            #[must_use]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Returns the identifier as a string slice.
            #[must_use]
            pub const fn as_str(&self) -> &str {
                self.0.as_str()
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                self.as_str()
            }
        }

        impl Deref for $name {
            type Target = str;
            fn deref(&self) -> &Self::Target {
                self.as_str()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

newtype!(
    /// Identifier of a primary compute resource.
    ServerId
);
newtype!(
    /// Identifier of an attachable block volume.
    VolumeId
);
newtype!(
    /// Identifier of a reserved public address.
    AddressId
);
newtype!(
    /// Identifier of an asynchronous provider operation.
    OperationId
);

/// Deprecation state reported for a server type or image.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Deprecation {
    /// `true` once the resource can no longer be used for new servers.
    pub unavailable: bool,
}

/// A resolved location (zone, datacenter) servers are created in.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Location {
    /// Provider identifier.
    pub id: String,
    /// Human-readable name, also used to filter address pools.
    pub name: String,
}

/// A resolved machine type.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ServerType {
    /// Provider identifier.
    pub id: String,
    /// Commercial name.
    pub name: String,
    /// CPU architecture, for example `x86_64` or `arm64`.
    pub architecture: String,
    /// Deprecation notice, when the provider announced one.
    pub deprecation: Option<Deprecation>,
}

/// A resolved boot image.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Image {
    /// Provider identifier.
    pub id: String,
    /// Image label.
    pub name: String,
    /// CPU architecture the image targets.
    pub architecture: String,
    /// Deprecation notice, when the provider announced one.
    pub deprecation: Option<Deprecation>,
}

/// A resolved private network.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Network {
    /// Provider identifier.
    pub id: String,
    /// Network name.
    pub name: String,
}

/// A resolved SSH key.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SshKey {
    /// Provider identifier.
    pub id: String,
    /// Key name.
    pub name: String,
}

/// Snapshot of a primary compute resource.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ServerRecord {
    /// Provider identifier.
    pub id: ServerId,
    /// Server name.
    pub name: String,
    /// Provider reported status, for example `running`.
    pub status: String,
    /// Labels attached to the server.
    pub labels: Labels,
    /// Public IPv4 address, if any.
    pub public_ipv4: Option<IpAddr>,
    /// Public IPv6 address, if any.
    pub public_ipv6: Option<IpAddr>,
}

/// Snapshot of an attachable volume.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VolumeRecord {
    /// Provider identifier.
    pub id: VolumeId,
    /// Volume name; volumes created by a group share their instance's name.
    pub name: String,
    /// Labels attached to the volume.
    pub labels: Labels,
    /// Server the volume is attached to.
    pub server: Option<ServerId>,
}

/// Address family of a reserved public address.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum AddressFamily {
    /// IPv4 address.
    Ipv4,
    /// IPv6 address or prefix.
    Ipv6,
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ipv4 => f.write_str("ipv4"),
            Self::Ipv6 => f.write_str("ipv6"),
        }
    }
}

/// A reserved public address that may be handed to a new server.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Address {
    /// Provider identifier.
    pub id: AddressId,
    /// Address family.
    pub family: AddressFamily,
    /// The address itself, when the provider exposes it.
    pub ip: Option<IpAddr>,
    /// Location name the address belongs to.
    pub location: String,
    /// Server currently holding the address.
    pub assignee: Option<ServerId>,
}

/// Handle to an asynchronous provider operation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Operation {
    /// Provider identifier.
    pub id: OperationId,
    /// Short description of what the operation does.
    pub description: String,
}

impl Operation {
    /// Creates an operation handle.
    #[must_use]
    pub fn new(id: impl Into<OperationId>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
        }
    }
}

/// Public networking options for a server.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PublicNet {
    /// Whether the server gets a public IPv4 address.
    pub enable_ipv4: bool,
    /// Whether the server gets a public IPv6 address.
    pub enable_ipv6: bool,
    /// Pre-reserved IPv4 address to assign instead of a fresh one.
    pub ipv4: Option<AddressId>,
    /// Pre-reserved IPv6 address to assign instead of a fresh one.
    pub ipv6: Option<AddressId>,
}

/// Parameters for creating a server.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ServerCreateRequest {
    /// Server name.
    pub name: String,
    /// Location identifier.
    pub location: String,
    /// Machine type identifier.
    pub server_type: String,
    /// Image identifier.
    pub image: String,
    /// Labels to attach.
    pub labels: Labels,
    /// SSH key identifiers.
    pub ssh_keys: Vec<String>,
    /// Private network identifiers.
    pub networks: Vec<String>,
    /// Volumes to attach at creation.
    pub volumes: Vec<VolumeId>,
    /// Public networking.
    pub public_net: PublicNet,
    /// Boot-time user-data payload.
    pub user_data: Option<String>,
}

/// Outcome of a server creation request.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ServerCreateResult {
    /// The created server.
    pub server: ServerRecord,
    /// Operations that must complete before the server is usable.
    pub operations: Vec<Operation>,
}

/// Parameters for creating a volume.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VolumeCreateRequest {
    /// Volume name.
    pub name: String,
    /// Size in gigabytes.
    pub size_gb: u32,
    /// Location identifier.
    pub location: String,
    /// Labels to attach.
    pub labels: Labels,
}

/// Outcome of a volume creation request.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VolumeCreateResult {
    /// The created volume.
    pub volume: VolumeRecord,
    /// Operations that must complete before the volume is usable.
    pub operations: Vec<Operation>,
}
