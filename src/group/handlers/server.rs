use tracing::warn;

use crate::group::error::GroupError;
use crate::group::instance::{Instance, StageOutput, wait_for};
use crate::group::stage::{Cleanup, Create, GroupScope, Stage, StageFuture};
use crate::provider::{PublicNet, ServerCreateRequest};

/// Creates the instance's server from its draft, trying each configured
/// server type in turn while the provider reports it unavailable.
#[derive(Clone, Copy, Debug, Default)]
pub struct ServerHandler;

impl Stage for ServerHandler {
    fn name(&self) -> &'static str {
        "server"
    }

    fn as_create(&self) -> Option<&dyn Create> {
        Some(self)
    }

    fn as_cleanup(&self) -> Option<&dyn Cleanup> {
        Some(self)
    }
}

fn create_request(scope: &GroupScope<'_>, instance: &Instance) -> ServerCreateRequest {
    let draft = instance.draft();
    let context = scope.context;
    ServerCreateRequest {
        name: instance.name.clone(),
        location: context.location.name.clone(),
        server_type: String::new(),
        image: context.image.id.clone(),
        labels: context.labels.clone(),
        ssh_keys: context.ssh_keys.iter().map(|key| key.id.clone()).collect(),
        networks: context
            .networks
            .iter()
            .map(|network| network.id.clone())
            .collect(),
        volumes: draft.volumes.iter().map(|volume| volume.id.clone()).collect(),
        public_net: PublicNet {
            enable_ipv4: !scope.config.public_ipv4_disabled,
            enable_ipv6: !scope.config.public_ipv6_disabled,
            ipv4: draft.ipv4.as_ref().map(|address| address.id.clone()),
            ipv6: draft.ipv6.as_ref().map(|address| address.id.clone()),
        },
        user_data: draft.user_data.clone(),
    }
}

const fn is_unavailable(err: &GroupError) -> bool {
    matches!(err, GroupError::Provider { source, .. } if source.is_resource_unavailable())
}

impl Create for ServerHandler {
    fn create<'a>(
        &'a self,
        scope: &'a GroupScope<'a>,
        instance: &'a Instance,
    ) -> StageFuture<'a, StageOutput> {
        Box::pin(async move {
            let mut request = create_request(scope, instance);
            let mut last_error = None;
            for server_type in &scope.context.server_types {
                request.server_type.clone_from(&server_type.name);
                let attempt = scope
                    .call(
                        "could not request instance creation",
                        scope.provider.create_server(&request),
                    )
                    .await;
                match attempt {
                    Ok(result) => {
                        let wait = wait_for(
                            scope.provider,
                            result.operations,
                            "could not create instance",
                        );
                        return Ok(StageOutput {
                            server: Some(result.server),
                            ..StageOutput::waiting(wait)
                        });
                    }
                    Err(err) if is_unavailable(&err) => {
                        warn!(
                            server_type = %server_type.name,
                            error = %err,
                            "resource unavailable"
                        );
                        last_error = Some(err);
                    }
                    Err(err) => return Err(err),
                }
            }
            Err(last_error.unwrap_or_else(|| GroupError::Lookup {
                resource: "server type",
                name: String::from("<none configured>"),
            }))
        })
    }
}

impl Cleanup for ServerHandler {
    fn cleanup<'a>(
        &'a self,
        scope: &'a GroupScope<'a>,
        instance: &'a Instance,
    ) -> StageFuture<'a, StageOutput> {
        Box::pin(async move {
            let Some(id) = &instance.id else {
                return Ok(StageOutput::default());
            };

            match scope
                .call(
                    "could not request instance deletion",
                    scope.provider.delete_server(id),
                )
                .await
            {
                Ok(operations) => Ok(StageOutput::removal(wait_for(
                    scope.provider,
                    operations,
                    "could not delete instance",
                ))),
                Err(err) if err.is_not_found() => {
                    warn!(
                        name = %instance.name,
                        id = %id,
                        "tried to delete a server that does not exist"
                    );
                    Ok(StageOutput::removal(None))
                }
                Err(err) => Err(err),
            }
        })
    }
}
