use crate::group::instance::{DraftDelta, Instance, StageOutput};
use crate::group::stage::{Create, GroupScope, Stage, StageFuture};

/// Starts every instance from an empty draft carrying the group user-data.
#[derive(Clone, Copy, Debug, Default)]
pub struct BaseHandler;

impl Stage for BaseHandler {
    fn name(&self) -> &'static str {
        "base"
    }

    fn as_create(&self) -> Option<&dyn Create> {
        Some(self)
    }
}

impl Create for BaseHandler {
    fn create<'a>(
        &'a self,
        scope: &'a GroupScope<'a>,
        _instance: &'a Instance,
    ) -> StageFuture<'a, StageOutput> {
        let mut deltas = vec![DraftDelta::Reset];
        if let Some(user_data) = &scope.config.user_data {
            deltas.push(DraftDelta::UserData(user_data.clone()));
        }
        Box::pin(async move {
            Ok(StageOutput {
                deltas,
                ..StageOutput::default()
            })
        })
    }
}
