use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::warn;

use crate::group::context::group_selector;
use crate::group::instance::{DraftDelta, Instance, StageOutput, wait_for};
use crate::group::stage::{
    Cleanup, Create, GroupScope, PreDecrease, PreIncrease, Sanity, Stage, StageFuture,
};
use crate::provider::{VolumeCreateRequest, VolumeRecord};

/// Creates one volume per instance and deletes it with the instance.
///
/// Remembers which volume belongs to which instance name for the duration of
/// one request: volumes it created itself during an increase, or the group's
/// volumes listed before a decrease.
#[derive(Debug, Default)]
pub struct VolumeHandler {
    volumes: Mutex<HashMap<String, VolumeRecord>>,
}

impl VolumeHandler {
    fn volumes(&self) -> MutexGuard<'_, HashMap<String, VolumeRecord>> {
        self.volumes.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Stage for VolumeHandler {
    fn name(&self) -> &'static str {
        "volume"
    }

    fn as_pre_increase(&self) -> Option<&dyn PreIncrease> {
        Some(self)
    }

    fn as_pre_decrease(&self) -> Option<&dyn PreDecrease> {
        Some(self)
    }

    fn as_create(&self) -> Option<&dyn Create> {
        Some(self)
    }

    fn as_cleanup(&self) -> Option<&dyn Cleanup> {
        Some(self)
    }

    fn as_sanity(&self) -> Option<&dyn Sanity> {
        Some(self)
    }
}

impl PreIncrease for VolumeHandler {
    fn pre_increase<'a>(&'a self, _scope: &'a GroupScope<'a>) -> StageFuture<'a, ()> {
        self.volumes().clear();
        Box::pin(async { Ok(()) })
    }
}

impl Create for VolumeHandler {
    fn create<'a>(
        &'a self,
        scope: &'a GroupScope<'a>,
        instance: &'a Instance,
    ) -> StageFuture<'a, StageOutput> {
        Box::pin(async move {
            if scope.config.volume_size == 0 {
                return Ok(StageOutput::default());
            }

            let request = VolumeCreateRequest {
                name: instance.name.clone(),
                size_gb: scope.config.volume_size,
                location: scope.context.location.name.clone(),
                labels: scope.context.labels.clone(),
            };
            let result = scope
                .call(
                    "could not request volume creation",
                    scope.provider.create_volume(&request),
                )
                .await?;

            self.volumes()
                .insert(instance.name.clone(), result.volume.clone());
            let wait = wait_for(
                scope.provider,
                result.operations,
                "could not create volume",
            );
            Ok(StageOutput::delta(DraftDelta::Volume(result.volume)).with_wait(wait))
        })
    }
}

impl PreDecrease for VolumeHandler {
    fn pre_decrease<'a>(&'a self, scope: &'a GroupScope<'a>) -> StageFuture<'a, ()> {
        Box::pin(async move {
            let selector = group_selector(scope.name);
            let listed = scope
                .call(
                    "could not list volumes",
                    scope.provider.list_volumes(&selector),
                )
                .await?;

            let mut volumes = self.volumes();
            volumes.clear();
            volumes.extend(
                listed
                    .into_iter()
                    .map(|volume| (volume.name.clone(), volume)),
            );
            Ok(())
        })
    }
}

impl Cleanup for VolumeHandler {
    fn cleanup<'a>(
        &'a self,
        scope: &'a GroupScope<'a>,
        instance: &'a Instance,
    ) -> StageFuture<'a, StageOutput> {
        Box::pin(async move {
            let Some(volume) = self.volumes().get(&instance.name).cloned() else {
                return Ok(StageOutput::default());
            };

            match scope
                .call(
                    "could not request volume deletion",
                    scope.provider.delete_volume(&volume.id),
                )
                .await
            {
                Ok(()) => {}
                Err(err) if err.is_not_found() => {
                    warn!(name = %instance.name, "tried to delete a volume that does not exist");
                }
                Err(err) => return Err(err),
            }
            self.volumes().remove(&instance.name);
            Ok(StageOutput::default())
        })
    }
}

impl Sanity for VolumeHandler {
    fn sanity<'a>(&'a self, scope: &'a GroupScope<'a>) -> StageFuture<'a, ()> {
        Box::pin(async move {
            let selector = group_selector(scope.name);
            let volumes = scope
                .call(
                    "could not list volumes",
                    scope.provider.list_volumes(&selector),
                )
                .await?;

            for volume in volumes.iter().filter(|volume| volume.server.is_none()) {
                warn!(name = %volume.name, id = %volume.id, "deleting dangling volume");
                match scope
                    .call(
                        "could not request volume deletion",
                        scope.provider.delete_volume(&volume.id),
                    )
                    .await
                {
                    Err(err) if !err.is_not_found() => return Err(err),
                    _ => {}
                }
            }
            Ok(())
        })
    }
}
