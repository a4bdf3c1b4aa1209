//! Resolution of named resources during group initialisation.

use scaleway_rs::{ScalewayImage, ScalewayListInstanceImagesBuilder};
use uuid::Uuid;

use crate::provider::{Deprecation, Image, Location, Network, ProviderError, ServerType, SshKey};

use super::types::{
    ImageEnvelope, NamedBody, PrivateNetworksPage, ProductBody, ProductsPage, SshKeysPage,
};
use super::{HTTP_CLIENT, ScalewayProvider, Target, error, region};

const AVAILABLE_IMAGE_STATE: &str = "available";

impl ScalewayProvider {
    pub(super) async fn find_location(&self, name: &str) -> Result<Option<Location>, ProviderError> {
        if region(name).is_none() {
            return Ok(None);
        }
        let url = Self::instance_url(name, "products/servers");
        let found = self
            .fetch_optional::<ProductsPage>(
                HTTP_CLIENT.get(&url).query(&[("per_page", "1")]),
                Target::new("location", name),
            )
            .await?;
        Ok(found.map(|_| Location {
            id: name.to_owned(),
            name: name.to_owned(),
        }))
    }

    pub(super) async fn find_server_type(
        &self,
        name: &str,
    ) -> Result<Option<ServerType>, ProviderError> {
        let url = Self::instance_url(&self.zone, "products/servers");
        let products = self
            .collect_pages(
                Target::new("server type", name),
                |page| HTTP_CLIENT.get(&url).query(&[("page", page)]),
                |body: ProductsPage| -> Vec<(String, ProductBody)> {
                    body.servers.into_iter().collect()
                },
            )
            .await?;
        Ok(products
            .into_iter()
            .find(|(commercial_type, _)| commercial_type.eq_ignore_ascii_case(name))
            .map(|(commercial_type, product)| server_type(commercial_type, &product)))
    }

    pub(super) async fn find_image(
        &self,
        name: &str,
        architecture: &str,
    ) -> Result<Option<Image>, ProviderError> {
        if Uuid::parse_str(name).is_ok() {
            let url = Self::instance_url(&self.zone, &format!("images/{name}"));
            let found = self
                .fetch_optional::<ImageEnvelope>(HTTP_CLIENT.get(&url), Target::new("image", name))
                .await?;
            return Ok(found
                .map(|envelope| envelope.image)
                .filter(|image| image.arch == architecture)
                .map(super::types::ImageBody::into_image));
        }

        let project_images = if self.credentials.project_id.is_empty() {
            Vec::new()
        } else {
            let mut scoped = ScalewayListInstanceImagesBuilder::new(self.api.clone(), &self.zone)
                .public(true)
                .project(&self.credentials.project_id)
                .name(name)
                .arch(architecture);
            if let Some(org) = &self.credentials.organization_id {
                scoped = scoped.organization(org);
            }
            scoped.run_async().await.map_err(error::from_sdk)?
        };

        let candidates = if project_images.is_empty() {
            ScalewayListInstanceImagesBuilder::new(self.api.clone(), &self.zone)
                .public(true)
                .name(name)
                .arch(architecture)
                .run_async()
                .await
                .map_err(error::from_sdk)?
        } else {
            project_images
        };

        Ok(select_image(candidates, name, architecture))
    }

    pub(super) async fn find_network(&self, name: &str) -> Result<Option<Network>, ProviderError> {
        let target = Target::new("private network", name);
        if Uuid::parse_str(name).is_ok() {
            let url = self.regional_url("vpc/v2", &format!("private-networks/{name}"))?;
            let found = self
                .fetch_optional::<NamedBody>(HTTP_CLIENT.get(&url), target)
                .await?;
            return Ok(found.map(NamedBody::into_network));
        }

        let url = self.regional_url("vpc/v2", "private-networks")?;
        let networks = self
            .collect_pages(
                target,
                |page| {
                    HTTP_CLIENT.get(&url).query(&[
                        ("name", name),
                        ("project_id", self.credentials.project_id.as_str()),
                        ("page", page.to_string().as_str()),
                    ])
                },
                |body: PrivateNetworksPage| body.private_networks,
            )
            .await?;
        Ok(exact_name(networks, name).map(NamedBody::into_network))
    }

    /// Scaleway installs every project SSH key on new instances, so keys are
    /// only checked for existence.
    pub(super) async fn find_ssh_key(&self, name: &str) -> Result<Option<SshKey>, ProviderError> {
        let target = Target::new("ssh key", name);
        if Uuid::parse_str(name).is_ok() {
            let url = Self::global_url("iam/v1alpha1", &format!("ssh-keys/{name}"));
            let found = self
                .fetch_optional::<NamedBody>(HTTP_CLIENT.get(&url), target)
                .await?;
            return Ok(found.map(NamedBody::into_ssh_key));
        }

        let url = Self::global_url("iam/v1alpha1", "ssh-keys");
        let keys = self
            .collect_pages(
                target,
                |page| {
                    HTTP_CLIENT.get(&url).query(&[
                        ("name", name),
                        ("project_id", self.credentials.project_id.as_str()),
                        ("page", page.to_string().as_str()),
                    ])
                },
                |body: SshKeysPage| body.ssh_keys,
            )
            .await?;
        Ok(exact_name(keys, name).map(NamedBody::into_ssh_key))
    }
}

fn server_type(commercial_type: String, product: &ProductBody) -> ServerType {
    ServerType {
        id: commercial_type.clone(),
        name: commercial_type,
        architecture: product.arch.clone(),
        deprecation: product
            .end_of_service
            .then_some(Deprecation { unavailable: false }),
    }
}

/// List endpoints match names by prefix; keep the exact match.
fn exact_name(candidates: Vec<NamedBody>, name: &str) -> Option<NamedBody> {
    candidates.into_iter().find(|candidate| candidate.name == name)
}

/// Picks the newest available image for `architecture`, preferring exact name
/// matches over prefix matches.
pub(super) fn select_image(
    candidates: Vec<ScalewayImage>,
    name: &str,
    architecture: &str,
) -> Option<Image> {
    let mut usable: Vec<ScalewayImage> = candidates
        .into_iter()
        .filter(|image| image.arch == architecture)
        .filter(|image| image.state == AVAILABLE_IMAGE_STATE)
        .collect();
    if usable.iter().any(|image| image.name == name) {
        usable.retain(|image| image.name == name);
    }
    usable.sort_by(|lhs, rhs| rhs.creation_date.cmp(&lhs.creation_date));
    usable.into_iter().next().map(|image| Image {
        id: image.id,
        name: image.name,
        architecture: image.arch,
        deprecation: None,
    })
}
