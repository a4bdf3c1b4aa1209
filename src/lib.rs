//! Autoscaled instance groups on Scaleway.
//!
//! The crate creates and deletes batches of short-lived compute instances for
//! an autoscaling caller. An [`InstanceGroup`] drives a staged pipeline over
//! an abstract [`Provider`](provider::Provider), tolerating partial failure
//! and rolling back whatever a failed instance had acquired. Public addresses
//! can be drawn from a reserved [`IpPool`], and remote calls can be slowed
//! down by the failure-driven [`Limiter`]. [`ScalewayProvider`] binds the
//! provider trait to the Scaleway public APIs.

pub mod cloud_init;
pub mod config;
pub mod group;
pub mod ip_pool;
pub mod limiter;
pub mod provider;
pub mod scaleway;
pub mod test_support;

pub use cloud_init::{UserDataError, resolve_user_data};
pub use config::{ConfigError, FleetConfig};
pub use group::{
    GroupConfig, GroupContext, GroupError, Instance, InstanceGroup, JoinedError,
    PASSWORD_PLACEHOLDER, ScaleOutcome,
};
pub use ip_pool::{IpPool, PoolError};
pub use limiter::{Backoff, ExponentialBackoff, Limiter, LimiterError};
pub use provider::{Provider, ProviderError, RateLimitedProvider, ServerRecord};
pub use scaleway::{ScalewayCredentials, ScalewayProvider};
