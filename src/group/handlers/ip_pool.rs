use tracing::{debug, warn};

use crate::group::error::GroupError;
use crate::group::instance::{DraftDelta, Instance, StageOutput};
use crate::group::stage::{Cleanup, Create, GroupScope, PreIncrease, Stage, StageFuture};

/// Draws public addresses from the group's pool.
///
/// The pool is refreshed before every increase. Addresses drawn for an
/// instance that is rolled back are released to the pool again, unless the
/// instance's server could not be confirmed deleted and may still hold them.
#[derive(Clone, Copy, Debug, Default)]
pub struct IpPoolHandler;

impl Stage for IpPoolHandler {
    fn name(&self) -> &'static str {
        "ip_pool"
    }

    fn as_pre_increase(&self) -> Option<&dyn PreIncrease> {
        Some(self)
    }

    fn as_create(&self) -> Option<&dyn Create> {
        Some(self)
    }

    fn as_cleanup(&self) -> Option<&dyn Cleanup> {
        Some(self)
    }
}

impl PreIncrease for IpPoolHandler {
    fn pre_increase<'a>(&'a self, scope: &'a GroupScope<'a>) -> StageFuture<'a, ()> {
        Box::pin(async move {
            let Some(pool) = scope.pool else {
                return Ok(());
            };
            tokio::select! {
                biased;
                () = scope.cancel.cancelled() => Err(GroupError::Cancelled),
                result = pool.refresh(scope.provider.as_ref()) => {
                    result.map_err(|source| GroupError::pool("could not refresh ip pool", source))
                }
            }
        })
    }
}

impl Create for IpPoolHandler {
    fn create<'a>(
        &'a self,
        scope: &'a GroupScope<'a>,
        _instance: &'a Instance,
    ) -> StageFuture<'a, StageOutput> {
        Box::pin(async move {
            let Some(pool) = scope.pool else {
                return Ok(StageOutput::default());
            };

            let mut output = StageOutput::default();
            let mut ipv4 = None;
            if !scope.config.public_ipv4_disabled {
                let address = pool
                    .next_ipv4()
                    .map_err(|source| GroupError::pool("could not get ipv4 from pool", source))?;
                ipv4 = Some(address.clone());
                output.deltas.push(DraftDelta::Ipv4(address));
            }

            if !scope.config.public_ipv6_disabled {
                match pool.next_ipv6() {
                    Ok(address) => output.deltas.push(DraftDelta::Ipv6(address)),
                    Err(source) => {
                        if let Some(drawn) = ipv4 {
                            pool.release(drawn);
                        }
                        return Err(GroupError::pool("could not get ipv6 from pool", source));
                    }
                }
            }
            Ok(output)
        })
    }
}

impl Cleanup for IpPoolHandler {
    fn cleanup<'a>(
        &'a self,
        scope: &'a GroupScope<'a>,
        instance: &'a Instance,
    ) -> StageFuture<'a, StageOutput> {
        Box::pin(async move {
            if let Some(pool) = scope.pool {
                let draft = instance.draft();
                if instance.holds_server() {
                    for address in [&draft.ipv4, &draft.ipv6].into_iter().flatten() {
                        warn!(
                            instance = %instance.name,
                            address = %address.id,
                            "server was not deleted, keeping address out of the pool"
                        );
                    }
                    return Ok(StageOutput::default());
                }
                for address in [&draft.ipv4, &draft.ipv6].into_iter().flatten() {
                    debug!(instance = %instance.name, address = %address.id, "returning address to pool");
                    pool.release(address.clone());
                }
            }
            Ok(StageOutput::default())
        })
    }
}
