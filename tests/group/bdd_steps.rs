//! BDD step definitions for instance group scaling.

use std::time::Duration;

use fleeting_scaleway::provider::{AddressFamily, LabelSelector, ProviderError};
use fleeting_scaleway::test_support::{free_address, labels};
use fleeting_scaleway::{GroupError, IpPool, PoolError};
use rstest_bdd_macros::{given, then, when};

use super::test_helpers::{GroupWorld, LIMITED_OPERATION, initialise, limiter};

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error(transparent)]
    Group(#[from] GroupError),
    #[error("invalid step argument: {0}")]
    Argument(String),
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_owned)
        .collect()
}

fn name_of(iid: &str) -> &str {
    iid.split_once(':').map_or(iid, |(name, _)| name)
}

#[given("a group using server types \"{types}\"")]
fn group_with_server_types(group_world: &GroupWorld, types: String) {
    group_world.config.borrow_mut().server_types = split_list(&types);
}

#[given("every instance gets a \"{size}\" GB volume")]
fn every_instance_gets_a_volume(group_world: &GroupWorld, size: u32) {
    group_world.config.borrow_mut().volume_size = size;
}

#[given("generated passwords are enabled")]
fn generated_passwords_enabled(group_world: &GroupWorld) {
    group_world.config.borrow_mut().generated_password = true;
}

#[given("public IPv6 is disabled")]
fn public_ipv6_disabled(group_world: &GroupWorld) {
    group_world.config.borrow_mut().public_ipv6_disabled = true;
}

#[given("the address pool holds \"{ipv4}\" IPv4 and \"{ipv6}\" IPv6 address")]
fn address_pool_holds(group_world: &GroupWorld, ipv4: usize, ipv6: usize) {
    {
        let mut config = group_world.config.borrow_mut();
        config.public_ip_pool_enabled = true;
        config.public_ip_pool_selector = LabelSelector::equals("pool", "ci");
    }
    let pool_labels = labels(&[("pool", "ci")]);
    for (count, family, prefix) in [
        (ipv4, AddressFamily::Ipv4, "v4"),
        (ipv6, AddressFamily::Ipv6, "v6"),
    ] {
        for index in 0..count {
            let address = free_address(&format!("{prefix}-{index}"), family);
            group_world
                .provider
                .add_address(pool_labels.clone(), address);
        }
    }
}

#[given("waiting for the creation of \"{name}\" fails")]
fn creation_wait_fails(group_world: &GroupWorld, name: String) {
    group_world.provider.fail_operations_matching(
        format!("create server {name}"),
        ProviderError::OperationFailed {
            operation: String::from("create"),
            message: String::from("boot failed"),
        },
    );
}

#[given("server deletion fails once")]
fn server_deletion_fails_once(group_world: &GroupWorld) {
    group_world
        .provider
        .fail_next("delete_server", ProviderError::api("server is locked"));
}

#[given("server type \"{server_type}\" is out of stock")]
fn server_type_out_of_stock(group_world: &GroupWorld, server_type: String) {
    group_world.provider.mark_unavailable(server_type);
}

#[given("a limiter that backs off after \"{threshold}\" failures")]
fn limiter_backs_off_after(group_world: &GroupWorld, threshold: u32) {
    *group_world.limiter.borrow_mut() = Some(limiter(threshold));
}

#[given("provider calls back off after \"{threshold}\" failures")]
fn provider_calls_back_off_after(group_world: &GroupWorld, threshold: u32) {
    *group_world.limiter.borrow_mut() = Some(limiter(threshold));
}

#[given("the group is initialised")]
fn group_is_initialised(group_world: &GroupWorld) -> Result<(), StepError> {
    initialise(group_world)?;
    Ok(())
}

#[when("I increase the group by \"{count}\"")]
fn increase_group(group_world: &GroupWorld, count: usize) -> Result<(), StepError> {
    let outcome = {
        let group = group_world.group();
        group_world.block_on(group.increase(&group_world.cancel, count))?
    };
    group_world.created.borrow_mut().clone_from(&outcome.ids);
    *group_world.outcome.borrow_mut() = Some(outcome);
    Ok(())
}

#[when("I remove every created instance")]
fn remove_created_instances(group_world: &GroupWorld) -> Result<(), StepError> {
    let ids = group_world.created.borrow().clone();
    let outcome = {
        let group = group_world.group();
        group_world.block_on(group.decrease(&group_world.cancel, &ids))?
    };
    *group_world.outcome.borrow_mut() = Some(outcome);
    Ok(())
}

#[when("listing the group fails \"{count}\" times")]
fn listing_fails(group_world: &GroupWorld, count: usize) {
    let group = group_world.group();
    for _ in 0..count {
        group_world
            .provider
            .fail_next("list_servers", ProviderError::api("service unavailable"));
        if let Err(err) = group_world.block_on(group.list(&group_world.cancel)) {
            group_world.errors.borrow_mut().push(err);
        }
    }
    assert_eq!(group_world.errors.borrow().len(), count);
}

#[when("I list the group")]
fn list_group(group_world: &GroupWorld) -> Result<(), StepError> {
    let group = group_world.group();
    group_world.block_on(group.list(&group_world.cancel))?;
    Ok(())
}

#[when("the operation fails \"{count}\" times")]
fn operation_fails(group_world: &GroupWorld, count: usize) {
    let configured = group_world.limiter.borrow();
    let limiter = configured
        .as_ref()
        .unwrap_or_else(|| panic!("a limiter should be configured"));
    let mut observed = group_world.observed.borrow_mut();
    for _ in 0..count {
        observed.push(limiter.backoff(LIMITED_OPERATION));
        limiter.report(LIMITED_OPERATION, false);
    }
}

#[when("the operation succeeds")]
fn operation_succeeds(group_world: &GroupWorld) {
    if let Some(limiter) = group_world.limiter.borrow().as_ref() {
        limiter.report(LIMITED_OPERATION, true);
    }
}

#[then("\"{count}\" instances are created")]
fn instances_created(group_world: &GroupWorld, count: usize) {
    let outcome = group_world.outcome();
    assert_eq!(outcome.ids.len(), count, "failures: {:?}", outcome.failures);
}

#[then("\"{count}\" instances are removed")]
fn instances_removed(group_world: &GroupWorld, count: usize) {
    let outcome = group_world.outcome();
    assert!(outcome.is_complete(), "failures: {:?}", outcome.failures);
    assert_eq!(outcome.ids.len(), count);
    assert_eq!(group_world.group().size(), 0);
}

#[then("only \"{name}\" is created")]
fn only_named_instance_created(group_world: &GroupWorld, name: String) {
    let outcome = group_world.outcome();
    let names: Vec<&str> = outcome.ids.iter().map(|iid| name_of(iid)).collect();
    assert_eq!(names, [name.as_str()]);
    assert_eq!(group_world.group().size(), 1);
}

#[then("\"{count}\" failures are reported")]
fn failures_reported(group_world: &GroupWorld, count: usize) {
    assert_eq!(group_world.outcome().failures.len(), count);
}

#[then("the failure reports an exhausted address pool")]
fn failure_reports_exhausted_pool(group_world: &GroupWorld) {
    let outcome = group_world.outcome();
    assert!(
        matches!(
            outcome.failures.as_slice(),
            [GroupError::Pool {
                source: PoolError::Exhausted { .. },
                ..
            }]
        ),
        "unexpected failures: {:?}",
        outcome.failures
    );
}

#[then("server deletion was requested \"{count}\" times")]
fn server_deletion_requested(group_world: &GroupWorld, count: usize) {
    assert_eq!(group_world.provider.calls_to("delete_server").len(), count);
}

#[then("\"{count}\" servers remain")]
fn servers_remain(group_world: &GroupWorld, count: usize) {
    assert_eq!(group_world.provider.servers().len(), count);
}

#[then("\"{name}\" holds every pool address")]
fn instance_holds_pool_addresses(group_world: &GroupWorld, name: String) {
    let server = group_world
        .provider
        .servers()
        .into_iter()
        .find(|server| server.name == name)
        .unwrap_or_else(|| panic!("server {name} should exist"));
    let addresses = group_world.provider.addresses();
    assert!(!addresses.is_empty());
    assert!(
        addresses
            .iter()
            .all(|address| address.assignee.as_ref() == Some(&server.id)),
        "addresses: {addresses:?}"
    );
}

#[then("the address pool offers \"{count}\" IPv4 addresses")]
fn pool_offers_ipv4(group_world: &GroupWorld, count: usize) {
    assert_eq!(group_world.group().pool().map(IpPool::size_ipv4), Some(count));
}

#[then("every created instance has a generated password")]
fn created_instances_have_passwords(group_world: &GroupWorld) {
    let group = group_world.group();
    for iid in group_world.created.borrow().iter() {
        let password = group
            .credential(name_of(iid))
            .unwrap_or_else(|| panic!("{iid} should have a password"));
        assert_eq!(password.len(), 24);
    }
    let volumes = group_world.provider.volumes();
    assert_eq!(volumes.len(), group_world.created.borrow().len());
    assert!(volumes.iter().all(|volume| volume.server.is_some()));
}

#[then("listing the group returns the created instances")]
fn listing_returns_created(group_world: &GroupWorld) -> Result<(), StepError> {
    let group = group_world.group();
    let listed = group_world.block_on(group.list(&group_world.cancel))?;
    let mut listed_ids: Vec<String> = listed.iter().map(|instance| instance.iid()).collect();
    listed_ids.sort();
    let mut expected = group_world.created.borrow().clone();
    expected.sort();
    assert_eq!(listed_ids, expected);
    Ok(())
}

#[then("no servers or volumes remain")]
fn nothing_remains(group_world: &GroupWorld) {
    assert!(group_world.provider.servers().is_empty());
    assert!(group_world.provider.volumes().is_empty());
}

#[then("no generated passwords remain")]
fn no_passwords_remain(group_world: &GroupWorld) {
    let group = group_world.group();
    for iid in group_world.created.borrow().iter() {
        assert_eq!(group.credential(name_of(iid)), None);
    }
}

#[then("server creation was attempted \"{count}\" times")]
fn server_creation_attempted(group_world: &GroupWorld, count: usize) {
    let attempts = group_world.provider.calls_to("create_server");
    assert_eq!(attempts.len(), count, "calls: {attempts:?}");
}

#[then("the last server creation used \"{server_type}\"")]
fn last_creation_used(group_world: &GroupWorld, server_type: String) {
    let attempts = group_world.provider.calls_to("create_server");
    assert!(
        attempts.last().is_some_and(|call| call.contains(&server_type)),
        "calls: {attempts:?}"
    );
}

#[then("the backoff before each failure was \"{seconds}\" seconds")]
fn backoff_before_each_failure(group_world: &GroupWorld, seconds: String) -> Result<(), StepError> {
    let expected = split_list(&seconds)
        .iter()
        .map(|value| {
            value
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|err| StepError::Argument(format!("{value}: {err}")))
        })
        .collect::<Result<Vec<_>, _>>()?;
    assert_eq!(*group_world.observed.borrow(), expected);
    Ok(())
}

#[then("the backoff is \"{seconds}\" seconds")]
fn backoff_is(group_world: &GroupWorld, seconds: u64) {
    let backoff = group_world
        .limiter
        .borrow()
        .as_ref()
        .map(|limiter| limiter.backoff(LIMITED_OPERATION));
    assert_eq!(backoff, Some(Duration::from_secs(seconds)));
}

#[then("\"{operation}\" has \"{count}\" recorded failures")]
fn recorded_failures(group_world: &GroupWorld, operation: String, count: u32) {
    let failures = group_world
        .limiter
        .borrow()
        .as_ref()
        .map(|limiter| limiter.failures(&operation));
    assert_eq!(failures, Some(count));
    if count > 0 {
        let errors = group_world.errors.borrow();
        assert!(
            errors
                .iter()
                .all(|err| matches!(err, GroupError::Provider { .. })),
            "errors: {errors:?}"
        );
    }
}
