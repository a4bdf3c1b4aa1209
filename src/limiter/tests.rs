//! Unit tests for the rate limiter.

use std::time::Duration;

use rstest::{fixture, rstest};
use tokio_util::sync::CancellationToken;

use super::*;

fn curve(cap_secs: u64) -> ExponentialBackoff {
    ExponentialBackoff {
        base: Duration::from_secs(1),
        multiplier: 2.0,
        cap: Duration::from_secs(cap_secs),
        jitter: 0.0,
    }
}

#[fixture]
fn limiter() -> Limiter {
    Limiter::new(1, curve(25))
}

#[rstest]
fn exponential_curve_is_capped() {
    let backoff = curve(5);
    let delays = (0..5).map(|n| backoff.delay(n)).collect::<Vec<_>>();
    assert_eq!(
        delays,
        [1, 2, 4, 5, 5].map(Duration::from_secs).to_vec(),
        "expected doubling until the cap"
    );

    let total: Duration = (0..25).map(|n| backoff.delay(n)).sum();
    assert_eq!(total, Duration::from_secs(117));
}

#[rstest]
fn jitter_only_adds_to_the_capped_delay() {
    let backoff = ExponentialBackoff {
        jitter: 0.5,
        ..curve(5)
    };
    for n in 0..10 {
        let plain = curve(5).delay(n);
        let jittered = backoff.delay(n);
        assert!(jittered >= plain, "retry {n}: {jittered:?} < {plain:?}");
        assert!(
            jittered <= plain.mul_f64(1.5),
            "retry {n}: {jittered:?} exceeds jitter bound"
        );
    }
}

#[rstest]
fn closures_act_as_backoff_curves() {
    let limiter = Limiter::new(2, |n: u32| Duration::from_millis(u64::from(n) * 10 + 10));
    limiter.report("op", false);
    assert_eq!(limiter.backoff("op"), Duration::ZERO);
    limiter.report("op", false);
    assert_eq!(limiter.backoff("op"), Duration::from_millis(10));
    limiter.report("op", false);
    assert_eq!(limiter.backoff("op"), Duration::from_millis(20));
}

#[rstest]
fn failures_then_success_follow_the_curve(limiter: Limiter) {
    assert_eq!(limiter.backoff("test"), Duration::ZERO);
    limiter.report("test", false);
    assert_eq!(limiter.backoff("test"), Duration::from_secs(1));
    limiter.report("test", false);
    assert_eq!(limiter.backoff("test"), Duration::from_secs(2));

    limiter.report("test", true);
    assert_eq!(limiter.backoff("test"), Duration::ZERO);
    limiter.report("test", false);
    assert_eq!(limiter.backoff("test"), Duration::from_secs(1));

    assert_eq!(limiter.backoff("unknown"), Duration::ZERO);
}

#[rstest]
fn backoff_never_decreases_while_failing() {
    let limiter = Limiter::new(3, curve(8));
    let mut previous = Duration::ZERO;
    for attempt in 0..12 {
        limiter.report("create", false);
        let current = limiter.backoff("create");
        assert!(
            current >= previous,
            "attempt {attempt}: {current:?} < {previous:?}"
        );
        assert!(current <= Duration::from_secs(8));
        previous = current;
    }

    limiter.report("create", true);
    assert_eq!(limiter.backoff("create"), Duration::ZERO);
    assert_eq!(limiter.failures("create"), 2);
}

#[rstest]
fn success_floors_the_counter_at_zero(limiter: Limiter) {
    limiter.report("test", true);
    assert_eq!(limiter.failures("test"), 0);
    limiter.report("test", false);
    assert_eq!(limiter.failures("test"), 1);
    limiter.report("test", true);
    limiter.report("test", true);
    assert_eq!(limiter.failures("test"), 0);
}

#[rstest]
fn operations_are_counted_independently(limiter: Limiter) {
    limiter.report("servers", false);
    limiter.report("servers", false);
    assert_eq!(limiter.backoff("servers"), Duration::from_secs(2));
    assert_eq!(limiter.backoff("volumes"), Duration::ZERO);
}

#[rstest]
#[tokio::test]
async fn operation_handle_limits_and_reports(limiter: Limiter) {
    let cancel = CancellationToken::new();
    let op = limiter.operation("test");

    assert_eq!(op.backoff(), Duration::ZERO);
    op.limit(&cancel).await.expect("no backoff below threshold");
    op.report(false);
    assert_eq!(limiter.failures("test"), 1);

    assert_eq!(op.backoff(), Duration::from_secs(1));
    op.report(false);
    assert_eq!(limiter.failures("test"), 2);

    cancel.cancel();
    let err = op.limit(&cancel).await.expect_err("cancelled wait");
    assert_eq!(
        err,
        LimiterError::Cancelled {
            operation: String::from("test")
        }
    );

    op.report(true);
    assert_eq!(limiter.failures("test"), 0);
    op.report(true);
    assert_eq!(limiter.failures("test"), 0);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn limit_sleeps_for_the_backoff(limiter: Limiter) {
    limiter.report("test", false);
    limiter.report("test", false);

    let started = tokio::time::Instant::now();
    limiter
        .limit("test", &CancellationToken::new())
        .await
        .expect("limit should complete");
    assert_eq!(started.elapsed(), Duration::from_secs(2));
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn cancellation_interrupts_the_sleep(limiter: Limiter) {
    for _ in 0..5 {
        limiter.report("test", false);
    }
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let started = tokio::time::Instant::now();
    let result = limiter.limit("test", &cancel).await;
    assert!(matches!(result, Err(LimiterError::Cancelled { .. })));
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn stale_counters_decay_before_being_read() {
    let limiter = Limiter::new(2, curve(25));
    for _ in 0..6 {
        limiter.report("test", false);
    }
    assert_eq!(limiter.backoff("test"), Duration::from_secs(16));

    tokio::time::advance(Duration::from_secs(30 * 60)).await;
    assert_eq!(limiter.backoff("test"), Duration::from_secs(16));
    assert_eq!(limiter.failures("test"), 6);

    tokio::time::advance(Duration::from_secs(61 * 60)).await;
    assert_eq!(limiter.backoff("test"), Duration::from_secs(1));
    assert_eq!(limiter.failures("test"), 1);
    assert_eq!(limiter.backoff("test"), Duration::ZERO);
}
