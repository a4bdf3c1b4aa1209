//! Drives instances through the stages of an increase or decrease.
//!
//! Each stage first dispatches its step for every live instance, then
//! resolves the waits those steps left behind. Remote work of a whole batch
//! is therefore in flight before the first wait starts.

use tracing::{debug, error};

use super::error::{GroupError, ScaleOutcome};
use super::instance::InFlight;
use super::stage::{GroupScope, Stage};

/// Resolves every pending wait, splitting instances into settled and failed.
async fn settle(
    scope: &GroupScope<'_>,
    dispatched: Vec<InFlight>,
    failures: &mut Vec<GroupError>,
    failed: &mut Vec<InFlight>,
) -> Vec<InFlight> {
    let mut settled = Vec::with_capacity(dispatched.len());
    for mut item in dispatched {
        match item.wait(scope.cancel).await {
            Ok(()) => settled.push(item),
            Err(err) => {
                debug!(instance = %item.instance.name, error = %err, "wait failed");
                failures.push(err);
                failed.push(item);
            }
        }
    }
    settled
}

/// Runs the creation stages, then rolls back every failed instance through
/// the cleanup stages in reverse order.
pub async fn increase(
    scope: &GroupScope<'_>,
    stages: &[Box<dyn Stage>],
    instances: Vec<InFlight>,
) -> ScaleOutcome {
    let mut failures = Vec::new();
    let mut failed = Vec::new();
    let mut live = instances;

    for stage in stages {
        let Some(create) = stage.as_create() else {
            continue;
        };
        let mut dispatched = Vec::with_capacity(live.len());
        for mut item in live {
            match create.create(scope, &item.instance).await {
                Ok(output) => {
                    item.apply(output);
                    dispatched.push(item);
                }
                Err(err) => {
                    debug!(
                        stage = stage.name(),
                        instance = %item.instance.name,
                        error = %err,
                        "create step failed"
                    );
                    failures.push(err);
                    failed.push(item);
                }
            }
        }
        live = settle(scope, dispatched, &mut failures, &mut failed).await;
    }

    if !failed.is_empty() {
        rollback(scope, stages, &mut failed, &mut failures).await;
    }

    for item in &mut live {
        item.clear_draft();
    }
    ScaleOutcome {
        ids: live.iter().map(|item| item.instance.iid()).collect(),
        failures,
    }
}

async fn rollback(
    scope: &GroupScope<'_>,
    stages: &[Box<dyn Stage>],
    failed: &mut [InFlight],
    failures: &mut Vec<GroupError>,
) {
    for stage in stages.iter().rev() {
        let Some(cleanup) = stage.as_cleanup() else {
            continue;
        };
        for item in failed.iter_mut() {
            match cleanup.cleanup(scope, &item.instance).await {
                Ok(output) => item.apply(output),
                Err(err) => {
                    error!(
                        stage = stage.name(),
                        instance = %item.instance.name,
                        error = %err,
                        "rollback step failed"
                    );
                    failures.push(err);
                }
            }
        }
        for item in failed.iter_mut() {
            if let Err(err) = item.wait(scope.cancel).await {
                failures.push(err);
            }
        }
    }
}

/// Runs the deletion stages. An instance failing a stage is dropped from
/// the remaining stages.
pub async fn decrease(
    scope: &GroupScope<'_>,
    stages: &[Box<dyn Stage>],
    instances: Vec<InFlight>,
    mut failures: Vec<GroupError>,
) -> ScaleOutcome {
    let mut live = instances;
    let mut dropped = Vec::new();

    for stage in stages {
        let Some(cleanup) = stage.as_cleanup() else {
            continue;
        };
        let mut dispatched = Vec::with_capacity(live.len());
        for mut item in live {
            match cleanup.cleanup(scope, &item.instance).await {
                Ok(output) => {
                    item.apply(output);
                    dispatched.push(item);
                }
                Err(err) => {
                    debug!(
                        stage = stage.name(),
                        instance = %item.instance.name,
                        error = %err,
                        "cleanup step failed"
                    );
                    failures.push(err);
                    dropped.push(item);
                }
            }
        }
        live = settle(scope, dispatched, &mut failures, &mut dropped).await;
    }

    ScaleOutcome {
        ids: live.iter().map(|item| item.instance.iid()).collect(),
        failures,
    }
}
