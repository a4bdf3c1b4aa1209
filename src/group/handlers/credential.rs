use tracing::debug;

use crate::group::credentials::generate_secret;
use crate::group::instance::{DraftDelta, Instance, StageOutput};
use crate::group::stage::{Cleanup, Create, GroupScope, Stage, StageFuture};

/// Placeholder in user-data replaced by the generated instance password.
pub const PASSWORD_PLACEHOLDER: &str = "${FLEET_INSTANCE_PASSWORD}";

/// Generates a per-instance password when enabled, stores it in the group's
/// credential store and renders it into the user-data.
#[derive(Clone, Copy, Debug, Default)]
pub struct CredentialHandler;

impl Stage for CredentialHandler {
    fn name(&self) -> &'static str {
        "credential"
    }

    fn as_create(&self) -> Option<&dyn Create> {
        Some(self)
    }

    fn as_cleanup(&self) -> Option<&dyn Cleanup> {
        Some(self)
    }
}

impl Create for CredentialHandler {
    fn create<'a>(
        &'a self,
        scope: &'a GroupScope<'a>,
        instance: &'a Instance,
    ) -> StageFuture<'a, StageOutput> {
        Box::pin(async move {
            if !scope.config.generated_password {
                return Ok(StageOutput::default());
            }

            let secret = generate_secret();
            let rendered = instance
                .draft()
                .user_data
                .as_ref()
                .map(|user_data| user_data.replace(PASSWORD_PLACEHOLDER, &secret));
            scope.credentials.insert(instance.name.clone(), secret);
            debug!(instance = %instance.name, "generated instance password");

            Ok(rendered.map_or_else(StageOutput::default, |user_data| {
                StageOutput::delta(DraftDelta::UserData(user_data))
            }))
        })
    }
}

impl Cleanup for CredentialHandler {
    fn cleanup<'a>(
        &'a self,
        scope: &'a GroupScope<'a>,
        instance: &'a Instance,
    ) -> StageFuture<'a, StageOutput> {
        Box::pin(async move {
            if scope.credentials.evict(&instance.name).is_some() {
                debug!(instance = %instance.name, "evicted instance password");
            }
            Ok(StageOutput::default())
        })
    }
}
