//! Configuration loading via `ortho-config`.

use std::ffi::OsString;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::cloud_init::{UserDataError, resolve_user_data};
use crate::group::GroupConfig;
use crate::provider::{LabelParseError, LabelSelector, parse_labels};
use crate::scaleway::ScalewayCredentials;

/// Label key recording which tool manages a resource.
pub const MANAGED_BY_LABEL: &str = "managed-by";

/// Value of [`MANAGED_BY_LABEL`] on every resource this crate creates.
pub const MANAGED_BY: &str = env!("CARGO_PKG_NAME");

/// Smallest volume the provider accepts, in GB.
pub const MIN_VOLUME_SIZE_GB: u32 = 10;

/// Instance group settings merged from configuration files, environment
/// variables and CLI flags.
///
/// List-valued settings are comma-separated.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "FLEET",
    discovery(
        app_name = "fleeting-scaleway",
        env_var = "FLEET_CONFIG_PATH",
        config_file_name = "fleeting-scaleway.toml",
        dotfile_name = ".fleeting-scaleway.toml",
        project_file_name = "fleeting-scaleway.toml"
    )
)]
#[expect(
    clippy::struct_excessive_bools,
    reason = "user-facing toggles are naturally expressed as booleans"
)]
pub struct FleetConfig {
    /// Group name; every resource is labelled `instance-group=<name>`.
    #[ortho_config(default = String::new())]
    pub name: String,
    /// Secret key used to authenticate against the Scaleway API.
    #[ortho_config(default = String::new())]
    pub secret_key: String,
    /// Project new resources are billed to.
    #[ortho_config(default = String::new())]
    pub project_id: String,
    /// Organisation identifier used by the IAM endpoints.
    pub organization_id: Option<String>,
    /// Availability zone instances are created in.
    #[ortho_config(default = "fr-par-1".to_owned())]
    pub zone: String,
    /// Commercial types, tried in order while one is out of stock.
    #[ortho_config(default = String::new())]
    pub server_types: String,
    /// Image label or identifier.
    #[ortho_config(default = String::new())]
    pub image: String,
    /// Inline user-data.
    pub user_data: Option<String>,
    /// Path to a user-data file.
    pub user_data_file: Option<String>,
    /// SSH key names or identifiers.
    #[ortho_config(default = String::new())]
    pub ssh_keys: String,
    /// Private network names or identifiers.
    #[ortho_config(default = String::new())]
    pub private_networks: String,
    /// Extra `key=value` labels.
    #[ortho_config(default = String::new())]
    pub labels: String,
    /// Create instances without a public IPv4 address.
    #[ortho_config(default = false)]
    pub public_ipv4_disabled: bool,
    /// Create instances without a public IPv6 address.
    #[ortho_config(default = false)]
    pub public_ipv6_disabled: bool,
    /// Hand out reserved flexible IPs instead of allocating new ones.
    #[ortho_config(default = false)]
    pub public_ip_pool_enabled: bool,
    /// `key=value` selector of the flexible IPs forming the pool.
    #[ortho_config(default = String::new())]
    pub public_ip_pool_selector: String,
    /// Size in GB of the volume attached to each instance; `0` disables it.
    #[ortho_config(default = 0)]
    pub volume_size: u32,
    /// Generate a password per instance, substituted into user-data.
    #[ortho_config(default = false)]
    pub generated_password: bool,
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(description: &'static str, env_var: &'static str, toml_key: &'static str) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }

    fn missing(&self) -> String {
        format!(
            "missing {}: set {} or add {} to fleeting-scaleway.toml",
            self.description, self.env_var, self.toml_key
        )
    }
}

const REQUIRED_FIELDS: [FieldMetadata; 5] = [
    FieldMetadata::new("group name", "FLEET_NAME", "name"),
    FieldMetadata::new("Scaleway API secret key", "FLEET_SECRET_KEY", "secret_key"),
    FieldMetadata::new("availability zone", "FLEET_ZONE", "zone"),
    FieldMetadata::new("server type", "FLEET_SERVER_TYPES", "server_types"),
    FieldMetadata::new("image", "FLEET_IMAGE", "image"),
];

/// Splits a comma-separated list, dropping blank entries.
#[must_use]
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_owned)
        .collect()
}

impl FleetConfig {
    /// Loads configuration using the `ortho-config` derive. Values merge
    /// defaults, configuration files, environment variables, and CLI flags in
    /// that order of precedence.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the loader fails to merge sources.
    pub fn load_from_sources() -> Result<Self, ConfigError> {
        Self::load().map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Loads configuration without parsing CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([OsString::from(MANAGED_BY)])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    fn required_values(&self) -> [&str; 5] {
        [
            &self.name,
            &self.secret_key,
            &self.zone,
            &self.server_types,
            &self.image,
        ]
    }

    /// Checks every setting and reports all problems at once.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] listing each missing or inconsistent
    /// setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = REQUIRED_FIELDS
            .iter()
            .zip(self.required_values())
            .filter(|(_, value)| split_list(value).is_empty())
            .map(|(field, _)| field.missing())
            .collect::<Vec<_>>();

        if self.volume_size != 0 && self.volume_size < MIN_VOLUME_SIZE_GB {
            problems.push(format!(
                "invalid volume_size {}: must be 0 or at least {MIN_VOLUME_SIZE_GB}",
                self.volume_size
            ));
        }

        let has_inline = self
            .user_data
            .as_deref()
            .is_some_and(|payload| !payload.trim().is_empty());
        if has_inline && self.user_data_file.is_some() {
            problems.push(UserDataError::BothProvided.to_string());
        }

        for (key, value) in [
            ("labels", &self.labels),
            ("public_ip_pool_selector", &self.public_ip_pool_selector),
        ] {
            if let Err(err) = parse_labels(value) {
                problems.push(format!("invalid {key}: {err}"));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid { problems })
        }
    }

    /// Builds the settings consumed by
    /// [`InstanceGroup`](crate::group::InstanceGroup), reading the user-data
    /// file when one is configured.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when validation fails or user-data cannot be
    /// resolved.
    pub fn group_config(&self) -> Result<GroupConfig, ConfigError> {
        self.validate()?;

        let user_data =
            resolve_user_data(self.user_data.as_deref(), self.user_data_file.as_deref())?;
        let mut labels = parse_labels(&self.labels)?;
        labels.insert(MANAGED_BY_LABEL.to_owned(), MANAGED_BY.to_owned());
        let public_ip_pool_selector: LabelSelector = self.public_ip_pool_selector.parse()?;

        Ok(GroupConfig {
            location: self.zone.trim().to_owned(),
            server_types: split_list(&self.server_types),
            image: self.image.trim().to_owned(),
            user_data,
            ssh_keys: split_list(&self.ssh_keys),
            private_networks: split_list(&self.private_networks),
            labels,
            public_ipv4_disabled: self.public_ipv4_disabled,
            public_ipv6_disabled: self.public_ipv6_disabled,
            public_ip_pool_enabled: self.public_ip_pool_enabled,
            public_ip_pool_selector,
            volume_size: self.volume_size,
            generated_password: self.generated_password,
        })
    }

    /// API credentials for the Scaleway binding.
    #[must_use]
    pub fn credentials(&self) -> ScalewayCredentials {
        ScalewayCredentials {
            secret_key: self.secret_key.clone(),
            project_id: self.project_id.clone(),
            organization_id: self.organization_id.clone(),
        }
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// One or more settings are missing or inconsistent, one per line.
    #[error("invalid configuration:\n{}", .problems.join("\n"))]
    Invalid {
        /// Every problem found.
        problems: Vec<String>,
    },
    /// User-data could not be resolved.
    #[error(transparent)]
    UserData(#[from] UserDataError),
    /// A label list or selector is malformed.
    #[error(transparent)]
    Labels(#[from] LabelParseError),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}
