//! Block Storage volumes.

use crate::provider::{
    LabelSelector, Operation, ProviderError, VolumeCreateRequest, VolumeCreateResult, VolumeId,
    VolumeRecord,
};

use super::types::{CreateVolumeRequest, EmptyVolumeSource, OperationRef, VolumeBody, VolumesPage};
use super::{HTTP_CLIENT, ScalewayProvider, Target, tags};

const BYTES_PER_GB: u64 = 1_000_000_000;

impl ScalewayProvider {
    pub(super) async fn create_block_volume(
        &self,
        request: &VolumeCreateRequest,
    ) -> Result<VolumeCreateResult, ProviderError> {
        let url = Self::block_url(&request.location, "volumes");
        let payload = CreateVolumeRequest {
            name: &request.name,
            project_id: &self.credentials.project_id,
            from_empty: EmptyVolumeSource {
                size: u64::from(request.size_gb) * BYTES_PER_GB,
            },
            tags: tags::encode(&request.labels),
        };
        let volume: VolumeBody = self
            .fetch(
                HTTP_CLIENT.post(&url).json(&payload),
                Target::new("volume", &request.name),
            )
            .await?;

        let operation = Operation::new(
            OperationRef::volume_id(&volume.id),
            format!("create volume {}", request.name),
        );
        Ok(VolumeCreateResult {
            volume: volume.into_record(),
            operations: vec![operation],
        })
    }

    pub(super) async fn list_block_volumes(
        &self,
        selector: &LabelSelector,
    ) -> Result<Vec<VolumeRecord>, ProviderError> {
        let url = Self::block_url(&self.zone, "volumes");
        let selector_tags = tags::selector_tags(selector);
        let volumes = self
            .collect_pages(
                Target::new("volume", "list"),
                |page| {
                    let mut query: Vec<(&str, String)> = selector_tags
                        .iter()
                        .map(|tag| ("tags", tag.clone()))
                        .collect();
                    query.push(("project_id", self.credentials.project_id.clone()));
                    query.push(("page", page.to_string()));
                    HTTP_CLIENT.get(&url).query(&query)
                },
                |body: VolumesPage| body.volumes,
            )
            .await?;
        Ok(volumes
            .into_iter()
            .filter(|volume| tags::matches(selector, &volume.tags))
            .map(VolumeBody::into_record)
            .collect())
    }

    pub(super) async fn delete_block_volume(&self, id: &VolumeId) -> Result<(), ProviderError> {
        let url = Self::block_url(&self.zone, &format!("volumes/{id}"));
        self.send(HTTP_CLIENT.delete(&url), Target::new("volume", id))
            .await
            .map(|_| ())
    }
}
