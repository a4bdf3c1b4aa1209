//! Instance lifecycle on the Scaleway Instance API.
//!
//! Servers are created stopped so volumes, cloud-init user-data and private
//! NICs can be wired up before the first boot. The returned operation is the
//! `poweron` task.

use std::collections::BTreeMap;

use tracing::warn;

use crate::provider::{
    LabelSelector, Operation, ProviderError, ServerCreateRequest, ServerCreateResult, ServerId,
    ServerRecord,
};

use super::types::{
    ActionRequest, CreateServerRequest, OperationRef, PrivateNicRequest, SBS_VOLUME_TYPE,
    ServerBody, ServerEnvelope, ServersPage, TaskBody, TaskEnvelope,
    UpdateServerVolumesRequest, VolumeAttachment,
};
use super::{HTTP_CLIENT, ScalewayProvider, Target, tags};

/// Reserved user-data key that Scaleway hands to cloud-init on first boot.
pub(super) const CLOUD_INIT_USER_DATA_KEY: &str = "cloud-init";

const ROOT_VOLUME_SLOT: &str = "0";

fn server_path(server_id: &str) -> String {
    format!("servers/{server_id}")
}

fn user_data_path(server_id: &str) -> String {
    format!("servers/{server_id}/user_data/{CLOUD_INIT_USER_DATA_KEY}")
}

/// Builds the volume map of a server: the existing root volume at slot `0`
/// followed by `extra` volumes in order.
pub(super) fn volume_slots(
    server: &ServerBody,
    extra: &[crate::provider::VolumeId],
) -> Result<UpdateServerVolumesRequest, ProviderError> {
    let root = server.root_volume().ok_or_else(|| {
        ProviderError::api(format!("server {} has no root volume", server.id))
    })?;

    let mut volumes = BTreeMap::new();
    volumes.insert(
        String::from(ROOT_VOLUME_SLOT),
        VolumeAttachment {
            id: root.id.clone(),
            boot: true,
            volume_type: root.volume_type.clone(),
        },
    );
    for (slot, volume) in (1..).zip(extra) {
        volumes.insert(
            format!("{slot}"),
            VolumeAttachment {
                id: volume.to_string(),
                boot: false,
                volume_type: Some(String::from(SBS_VOLUME_TYPE)),
            },
        );
    }
    Ok(UpdateServerVolumesRequest { volumes })
}

impl ScalewayProvider {
    pub(super) async fn create_instance(
        &self,
        request: &ServerCreateRequest,
    ) -> Result<ServerCreateResult, ProviderError> {
        let zone = request.location.as_str();
        let public_net = &request.public_net;
        let public_ips = [public_net.ipv4.as_ref(), public_net.ipv6.as_ref()]
            .into_iter()
            .flatten()
            .map(ToString::to_string)
            .collect();
        let payload = CreateServerRequest {
            name: request.name.clone(),
            commercial_type: request.server_type.clone(),
            image: request.image.clone(),
            project: self.credentials.project_id.clone(),
            tags: tags::encode(&request.labels),
            stopped: true,
            dynamic_ip_required: public_net.enable_ipv4 && public_net.ipv4.is_none(),
            routed_ip_enabled: true,
            public_ips,
        };

        let url = Self::instance_url(zone, "servers");
        let created: ServerEnvelope = self
            .fetch(
                HTTP_CLIENT.post(&url).json(&payload),
                Target::new("server", &request.name),
            )
            .await?;
        let server = created.server;

        match self.prepare_and_boot(zone, &server, request).await {
            Ok(task) => Ok(ServerCreateResult {
                operations: vec![Operation::new(
                    OperationRef::task_id(&task.id),
                    format!("create server {}", request.name),
                )],
                server: server.into_record(),
            }),
            Err(err) => {
                self.discard_unbooted(zone, &server).await;
                Err(err)
            }
        }
    }

    async fn prepare_and_boot(
        &self,
        zone: &str,
        server: &ServerBody,
        request: &ServerCreateRequest,
    ) -> Result<TaskBody, ProviderError> {
        let target = Target::new("server", &server.id);

        if !request.volumes.is_empty() {
            let slots = volume_slots(server, &request.volumes)?;
            let url = Self::instance_url(zone, &server_path(&server.id));
            self.send(HTTP_CLIENT.patch(&url).json(&slots), target)
                .await?;
        }

        if let Some(user_data) = &request.user_data {
            let url = Self::instance_url(zone, &user_data_path(&server.id));
            self.send(
                HTTP_CLIENT
                    .patch(&url)
                    .header(reqwest::header::CONTENT_TYPE, "text/plain")
                    .body(user_data.clone()),
                target,
            )
            .await?;
        }

        for network in &request.networks {
            let url = Self::instance_url(zone, &format!("servers/{}/private_nics", server.id));
            self.send(
                HTTP_CLIENT.post(&url).json(&PrivateNicRequest {
                    private_network_id: network,
                }),
                Target::new("private network", network),
            )
            .await?;
        }

        if request.public_net.enable_ipv6 && request.public_net.ipv6.is_none() {
            self.allocate_ipv6(zone, &server.id, &request.labels).await?;
        }

        self.run_action(zone, &server.id, "poweron").await
    }

    async fn run_action(
        &self,
        zone: &str,
        server_id: &str,
        action: &'static str,
    ) -> Result<TaskBody, ProviderError> {
        let url = Self::instance_url(zone, &format!("servers/{server_id}/action"));
        let envelope: TaskEnvelope = self
            .fetch(
                HTTP_CLIENT.post(&url).json(&ActionRequest { action }),
                Target::new("server", server_id),
            )
            .await?;
        Ok(envelope.task)
    }

    /// Best-effort removal of a server that failed to reach the boot step.
    async fn discard_unbooted(&self, zone: &str, server: &ServerBody) {
        if let Err(err) = self.release_ephemeral_ips(zone, &server.id).await {
            warn!(server = %server.id, error = %err, "releasing ephemeral addresses failed");
        }
        let url = Self::instance_url(zone, &server_path(&server.id));
        if let Err(err) = self
            .send_idempotent(HTTP_CLIENT.delete(&url), Target::new("server", &server.id))
            .await
        {
            warn!(server = %server.id, error = %err, "discarding unbooted server failed");
        }
    }

    pub(super) async fn get_instance(
        &self,
        id: &ServerId,
    ) -> Result<Option<ServerRecord>, ProviderError> {
        let url = Self::instance_url(&self.zone, &server_path(id));
        let found = self
            .fetch_optional::<ServerEnvelope>(HTTP_CLIENT.get(&url), Target::new("server", id))
            .await?;
        Ok(found.map(|envelope| envelope.server.into_record()))
    }

    pub(super) async fn list_instances(
        &self,
        selector: &LabelSelector,
    ) -> Result<Vec<ServerRecord>, ProviderError> {
        let url = Self::instance_url(&self.zone, "servers");
        let filter = tags::selector_filter(selector);
        let servers = self
            .collect_pages(
                Target::new("server", "list"),
                |page| {
                    HTTP_CLIENT.get(&url).query(&[
                        ("tags", filter.as_str()),
                        ("project", self.credentials.project_id.as_str()),
                        ("page", page.to_string().as_str()),
                    ])
                },
                |body: ServersPage| body.servers,
            )
            .await?;
        Ok(servers
            .into_iter()
            .filter(|server| tags::matches(selector, &server.tags))
            .map(ServerBody::into_record)
            .collect())
    }

    /// Terminates a running server, or deletes a stopped one outright.
    ///
    /// Termination is asynchronous and yields a task; a direct delete
    /// completes before returning.
    pub(super) async fn delete_instance(
        &self,
        id: &ServerId,
    ) -> Result<Vec<Operation>, ProviderError> {
        let zone = self.zone.as_str();
        let target = Target::new("server", id);
        let url = Self::instance_url(zone, &server_path(id));
        let envelope: ServerEnvelope = self.fetch(HTTP_CLIENT.get(&url), target).await?;
        let server = envelope.server;

        self.release_ephemeral_ips(zone, &server.id).await?;

        if server.allows("terminate") {
            let task = self.run_action(zone, &server.id, "terminate").await?;
            return Ok(vec![Operation::new(
                OperationRef::task_id(&task.id),
                format!("delete server {}", server.name),
            )]);
        }

        self.send(HTTP_CLIENT.delete(&url), target).await?;
        Ok(Vec::new())
    }
}
