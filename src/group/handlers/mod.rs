//! Pipeline stages and the order they run in.

mod base;
mod credential;
mod deprecation;
mod ip_pool;
mod server;
mod volume;

pub use base::BaseHandler;
pub use credential::{CredentialHandler, PASSWORD_PLACEHOLDER};
pub use deprecation::DeprecationHandler;
pub use ip_pool::IpPoolHandler;
pub use server::ServerHandler;
pub use volume::VolumeHandler;

use super::stage::Stage;

/// Stages of an increase, in creation order.
#[must_use]
pub fn creation_stages() -> Vec<Box<dyn Stage>> {
    vec![
        Box::new(BaseHandler),
        Box::new(CredentialHandler),
        Box::new(IpPoolHandler),
        Box::new(VolumeHandler::default()),
        Box::new(ServerHandler),
    ]
}

/// Stages of a decrease, in deletion order.
#[must_use]
pub fn deletion_stages() -> Vec<Box<dyn Stage>> {
    vec![
        Box::new(ServerHandler),
        Box::new(VolumeHandler::default()),
        Box::new(CredentialHandler),
    ]
}

/// Stages of a sanity sweep. The volume sweep only runs when volumes are
/// configured or while initialising, to clear leftovers of an older config.
#[must_use]
pub fn sanity_stages(sweep_volumes: bool) -> Vec<Box<dyn Stage>> {
    let mut stages: Vec<Box<dyn Stage>> = Vec::with_capacity(2);
    if sweep_volumes {
        stages.push(Box::new(VolumeHandler::default()));
    }
    stages.push(Box::new(DeprecationHandler));
    stages
}
