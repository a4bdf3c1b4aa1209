//! Flexible IPs of the Instance API.

use tracing::debug;

use crate::provider::{Address, LabelSelector, Labels, ProviderError};

use super::types::{CreateIpRequest, IpBody, IpsPage};
use super::{HTTP_CLIENT, ScalewayProvider, Target, tags};

/// Tag carried by routed IPv6 addresses allocated for a single server.
pub(super) const EPHEMERAL_IP_TAG: &str = "fleeting-ephemeral-ip";

const ROUTED_IPV6: &str = "routed_ipv6";

impl ScalewayProvider {
    pub(super) async fn list_flexible_ips(
        &self,
        selector: &LabelSelector,
    ) -> Result<Vec<Address>, ProviderError> {
        let ips = self.ips_tagged(&self.zone, &tags::selector_filter(selector)).await?;
        Ok(ips
            .into_iter()
            .filter(|ip| tags::matches(selector, &ip.tags))
            .filter(|ip| !ip.tags.iter().any(|tag| tag == EPHEMERAL_IP_TAG))
            .map(|ip| {
                let mut address = ip.into_address();
                if address.location.is_empty() {
                    address.location.clone_from(&self.zone);
                }
                address
            })
            .collect())
    }

    async fn ips_tagged(&self, zone: &str, filter: &str) -> Result<Vec<IpBody>, ProviderError> {
        let url = Self::instance_url(zone, "ips");
        self.collect_pages(
            Target::new("ip", "list"),
            |page| {
                HTTP_CLIENT.get(&url).query(&[
                    ("tags", filter),
                    ("project", self.credentials.project_id.as_str()),
                    ("page", page.to_string().as_str()),
                ])
            },
            |body: IpsPage| body.ips,
        )
        .await
    }

    /// Allocates a routed IPv6 address bound to `server_id`.
    pub(super) async fn allocate_ipv6(
        &self,
        zone: &str,
        server_id: &str,
        labels: &Labels,
    ) -> Result<(), ProviderError> {
        let mut ip_tags = tags::encode(labels);
        ip_tags.push(String::from(EPHEMERAL_IP_TAG));
        let url = Self::instance_url(zone, "ips");
        let payload = CreateIpRequest {
            project: &self.credentials.project_id,
            kind: ROUTED_IPV6,
            server: server_id,
            tags: ip_tags,
        };
        self.send(HTTP_CLIENT.post(&url).json(&payload), Target::new("ip", server_id))
            .await?;
        debug!(server = server_id, "allocated routed ipv6 address");
        Ok(())
    }

    /// Deletes the ephemeral addresses allocated for `server_id`.
    pub(super) async fn release_ephemeral_ips(
        &self,
        zone: &str,
        server_id: &str,
    ) -> Result<(), ProviderError> {
        let owned = self
            .ips_tagged(zone, EPHEMERAL_IP_TAG)
            .await?
            .into_iter()
            .filter(|ip| ip.server.as_ref().is_some_and(|server| server.id == server_id));
        for ip in owned {
            let url = Self::instance_url(zone, &format!("ips/{}", ip.id));
            self.send_idempotent(HTTP_CLIENT.delete(&url), Target::new("ip", &ip.id))
                .await?;
        }
        Ok(())
    }
}
