use tracing::{error, warn};

use crate::group::stage::{GroupScope, Sanity, Stage, StageFuture};
use crate::provider::Deprecation;

/// Reports deprecated server types and images used by the group.
#[derive(Clone, Copy, Debug, Default)]
pub struct DeprecationHandler;

impl Stage for DeprecationHandler {
    fn name(&self) -> &'static str {
        "deprecation"
    }

    fn as_sanity(&self) -> Option<&dyn Sanity> {
        Some(self)
    }
}

fn report(kind: &str, name: &str, location: &str, state: Option<Deprecation>) {
    let Some(deprecation) = state else {
        return;
    };
    if deprecation.unavailable {
        error!(
            resource = kind,
            name,
            location,
            "{kind} {name} is deprecated and no longer available"
        );
    } else {
        warn!(
            resource = kind,
            name,
            location,
            "{kind} {name} is deprecated and will be removed"
        );
    }
}

impl Sanity for DeprecationHandler {
    fn sanity<'a>(&'a self, scope: &'a GroupScope<'a>) -> StageFuture<'a, ()> {
        let context = scope.context;
        let location = context.location.name.as_str();
        for server_type in &context.server_types {
            report(
                "server type",
                &server_type.name,
                location,
                server_type.deprecation,
            );
        }
        report("image", &context.image.name, location, context.image.deprecation);
        Box::pin(async { Ok(()) })
    }
}
