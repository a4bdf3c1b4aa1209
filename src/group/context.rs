//! Group settings and the provider resources they resolve to.

use crate::provider::{Image, LabelSelector, Labels, Location, Network, ServerType, SshKey};

/// Label key carrying the group name on every resource the group creates.
pub const GROUP_LABEL: &str = "instance-group";

/// Settings of one instance group. Resource references are names or ids.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct GroupConfig {
    /// Location instances are created in.
    pub location: String,
    /// Machine types, tried in order when the provider is out of stock.
    pub server_types: Vec<String>,
    /// Image to boot.
    pub image: String,
    /// User-data handed to the instance init system.
    pub user_data: Option<String>,
    /// SSH keys installed on every instance.
    pub ssh_keys: Vec<String>,
    /// Private networks attached to every instance.
    pub private_networks: Vec<String>,
    /// Extra labels applied to every created resource.
    pub labels: Labels,
    /// Create instances without a public IPv4 address.
    pub public_ipv4_disabled: bool,
    /// Create instances without a public IPv6 address.
    pub public_ipv6_disabled: bool,
    /// Draw public addresses from reserved ones instead of allocating new ones.
    pub public_ip_pool_enabled: bool,
    /// Selects the reserved addresses that belong to the pool.
    pub public_ip_pool_selector: LabelSelector,
    /// Size in GB of the volume attached to each instance; `0` disables volumes.
    pub volume_size: u32,
    /// Generate a random per-instance password and substitute it into user-data.
    pub generated_password: bool,
}

/// Provider resources resolved once by `init`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GroupContext {
    /// Location instances are created in.
    pub location: Location,
    /// Resolved machine types, in fallback order.
    pub server_types: Vec<ServerType>,
    /// Architecture shared by every server type.
    pub architecture: String,
    /// Boot image for that architecture.
    pub image: Image,
    /// Private networks, in configured order.
    pub networks: Vec<Network>,
    /// SSH keys checked to exist.
    pub ssh_keys: Vec<SshKey>,
    /// Configured labels plus [`GROUP_LABEL`].
    pub labels: Labels,
}

/// Builds the label set applied to the group's resources.
#[must_use]
pub fn group_labels(name: &str, configured: &Labels) -> Labels {
    let mut labels = configured.clone();
    labels.insert(GROUP_LABEL.to_owned(), name.to_owned());
    labels
}

/// Selector matching every resource of the group.
#[must_use]
pub fn group_selector(name: &str) -> LabelSelector {
    LabelSelector::equals(GROUP_LABEL, name)
}
