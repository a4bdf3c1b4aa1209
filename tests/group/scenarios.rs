//! BDD scenarios for instance group scaling.

use rstest_bdd_macros::scenario;

use super::test_helpers::{GroupWorld, group_world};

#[scenario(
    path = "tests/features/group.feature",
    name = "Create, list and remove instances"
)]
fn scenario_lifecycle(group_world: GroupWorld) {
    drop(group_world);
}

#[scenario(
    path = "tests/features/group.feature",
    name = "Roll back only the instance whose creation wait fails"
)]
fn scenario_failed_wait_rollback(group_world: GroupWorld) {
    drop(group_world);
}

#[scenario(
    path = "tests/features/group.feature",
    name = "Route an instance to rollback when the address pool runs out"
)]
fn scenario_pool_exhaustion(group_world: GroupWorld) {
    drop(group_world);
}

#[scenario(
    path = "tests/features/group.feature",
    name = "Keep addresses of a server that could not be deleted"
)]
fn scenario_undeleted_server_keeps_addresses(group_world: GroupWorld) {
    drop(group_world);
}

#[scenario(
    path = "tests/features/group.feature",
    name = "Fall back to the next server type when one is out of stock"
)]
fn scenario_server_type_fallback(group_world: GroupWorld) {
    drop(group_world);
}

#[scenario(
    path = "tests/features/group.feature",
    name = "Back off after consecutive failures and recover on success"
)]
fn scenario_limiter_backoff(group_world: GroupWorld) {
    drop(group_world);
}

#[scenario(
    path = "tests/features/group.feature",
    name = "Slow down provider calls that keep failing"
)]
fn scenario_rate_limited_provider(group_world: GroupWorld) {
    drop(group_world);
}
