//! Shared fixtures for instance group BDD scenarios.

use std::cell::RefCell;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use fleeting_scaleway::provider::Provider;
use fleeting_scaleway::test_support::{FAKE_LOCATION, FakeProvider};
use fleeting_scaleway::{
    ExponentialBackoff, GroupConfig, GroupError, InstanceGroup, Limiter, RateLimitedProvider,
    ScaleOutcome,
};
use rstest::fixture;
use tokio::runtime::{Builder, Runtime};
use tokio_util::sync::CancellationToken;

pub const GROUP_NAME: &str = "ci";
pub const LIMITED_OPERATION: &str = "scale";

/// State threaded through the steps of one scenario.
pub struct GroupWorld {
    pub runtime: Runtime,
    pub provider: Arc<FakeProvider>,
    pub cancel: CancellationToken,
    pub config: RefCell<GroupConfig>,
    pub limiter: RefCell<Option<Arc<Limiter>>>,
    pub group: RefCell<Option<InstanceGroup>>,
    pub outcome: RefCell<Option<ScaleOutcome>>,
    pub created: RefCell<Vec<String>>,
    pub errors: RefCell<Vec<GroupError>>,
    pub observed: RefCell<Vec<Duration>>,
}

impl GroupWorld {
    /// Runs `future` on the scenario runtime. Time is paused, so limiter
    /// sleeps complete without waiting.
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    pub fn group(&self) -> std::cell::Ref<'_, InstanceGroup> {
        std::cell::Ref::map(self.group.borrow(), |group| {
            group
                .as_ref()
                .unwrap_or_else(|| panic!("the group should be initialised first"))
        })
    }

    pub fn outcome(&self) -> ScaleOutcome {
        self.outcome
            .borrow()
            .clone()
            .unwrap_or_else(|| panic!("no increase or decrease has run"))
    }
}

/// Limiter with a 1s base that doubles up to 25s and has no jitter.
pub fn limiter(backoff_after: u32) -> Arc<Limiter> {
    Arc::new(Limiter::new(
        backoff_after,
        ExponentialBackoff {
            cap: Duration::from_secs(25),
            ..ExponentialBackoff::default()
        },
    ))
}

fn sequential_names() -> impl Fn() -> String + Send + Sync + 'static {
    let counter = AtomicUsize::new(0);
    move || format!("{GROUP_NAME}-{}", counter.fetch_add(1, Ordering::Relaxed))
}

/// Builds and initialises the group from the scenario's configuration.
pub fn initialise(world: &GroupWorld) -> Result<(), GroupError> {
    let provider: Arc<dyn Provider> = match world.limiter.borrow().as_ref() {
        Some(limiter) => Arc::new(RateLimitedProvider::new(
            Arc::clone(&world.provider),
            Arc::clone(limiter),
            world.cancel.clone(),
        )),
        None => world.provider.clone(),
    };
    let config = world.config.borrow().clone();
    let mut group =
        InstanceGroup::new(GROUP_NAME, config, provider).with_name_generator(sequential_names());
    world.block_on(group.init(&world.cancel))?;
    *world.group.borrow_mut() = Some(group);
    Ok(())
}

fn build_world() -> GroupWorld {
    let runtime = Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .unwrap_or_else(|err| panic!("scenario runtime should build: {err}"));
    GroupWorld {
        runtime,
        provider: Arc::new(FakeProvider::new()),
        cancel: CancellationToken::new(),
        config: RefCell::new(GroupConfig {
            location: String::from(FAKE_LOCATION),
            image: String::from("ubuntu_noble"),
            ..GroupConfig::default()
        }),
        limiter: RefCell::new(None),
        group: RefCell::new(None),
        outcome: RefCell::new(None),
        created: RefCell::new(Vec::new()),
        errors: RefCell::new(Vec::new()),
        observed: RefCell::new(Vec::new()),
    }
}

#[fixture]
pub fn group_world() -> GroupWorld {
    build_world()
}
