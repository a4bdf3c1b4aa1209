//! Adaptive per-operation rate limiter.
//!
//! The limiter tracks a failure counter for every caller-chosen operation id.
//! Once the counter reaches the configured threshold, [`Limiter::backoff`]
//! returns a delay taken from the backoff curve, counted from zero at the
//! threshold. A single success past the threshold clamps the counter to just
//! below it, which ends the backoff immediately. Counters that have not been
//! touched for an hour decay one step before they are read; the read that
//! triggers the decay still starts at the bottom of the curve.

mod backoff;

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::warn;

pub use backoff::{Backoff, ExponentialBackoff};

const STALE_AFTER: Duration = Duration::from_secs(60 * 60);

/// Errors raised by the limiter.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum LimiterError {
    /// The cancellation token fired while sleeping.
    #[error("rate limiter wait for {operation} cancelled")]
    Cancelled {
        /// Operation id that was being limited.
        operation: String,
    },
}

#[derive(Clone, Copy, Debug)]
struct Counter {
    failures: u32,
    updated_at: Instant,
}

/// Failure-driven backoff shared by concurrent callers.
pub struct Limiter {
    backoff_after: u32,
    backoff: Box<dyn Backoff>,
    counters: Mutex<HashMap<String, Counter>>,
}

impl std::fmt::Debug for Limiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Limiter")
            .field("backoff_after", &self.backoff_after)
            .finish_non_exhaustive()
    }
}

impl Limiter {
    /// Creates a limiter that starts backing off after `backoff_after` failures.
    #[must_use]
    pub fn new(backoff_after: u32, backoff: impl Backoff + 'static) -> Self {
        Self {
            backoff_after,
            backoff: Box::new(backoff),
            counters: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Counter>> {
        self.counters.lock().unwrap_or_else(PoisonError::into_inner)
    }

    const fn recover(&self, failures: u32) -> u32 {
        if failures >= self.backoff_after {
            self.backoff_after.saturating_sub(1)
        } else {
            failures.saturating_sub(1)
        }
    }

    /// Returns the delay to apply before the next attempt of `id`.
    #[must_use]
    pub fn backoff(&self, id: &str) -> Duration {
        let mut counters = self.lock();
        let now = Instant::now();
        let failures = counters.get(id).map_or(0, |counter| counter.failures);
        if failures < self.backoff_after {
            return Duration::ZERO;
        }

        let mut current = failures;
        if let Some(counter) = counters.get_mut(id)
            && now.duration_since(counter.updated_at) > STALE_AFTER
        {
            counter.failures = self.recover(counter.failures);
            counter.updated_at = now;
            current = counter.failures;
        }
        drop(counters);

        self.backoff
            .delay(current.saturating_sub(self.backoff_after))
    }

    /// Records the outcome of an attempt of `id`.
    pub fn report(&self, id: &str, success: bool) {
        let mut counters = self.lock();
        let now = Instant::now();
        let counter = counters.entry(id.to_owned()).or_insert(Counter {
            failures: 0,
            updated_at: now,
        });
        counter.failures = if success {
            self.recover(counter.failures)
        } else {
            counter.failures.saturating_add(1)
        };
        counter.updated_at = now;
    }

    /// Returns the raw failure counter of `id`.
    #[must_use]
    pub fn failures(&self, id: &str) -> u32 {
        self.lock().get(id).map_or(0, |counter| counter.failures)
    }

    /// Sleeps for [`Limiter::backoff`] of `id`, returning early on cancellation.
    ///
    /// # Errors
    ///
    /// Returns [`LimiterError::Cancelled`] when `cancel` fires before the
    /// delay elapses.
    pub async fn limit(&self, id: &str, cancel: &CancellationToken) -> Result<(), LimiterError> {
        let delay = self.backoff(id);
        if delay.is_zero() {
            return Ok(());
        }

        warn!(
            operation = id,
            delay = ?delay,
            "too many failures, limiting request rate"
        );
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(LimiterError::Cancelled {
                operation: id.to_owned(),
            }),
            () = sleep(delay) => Ok(()),
        }
    }

    /// Returns a handle bound to a single operation id.
    #[must_use]
    pub fn operation<'a>(&'a self, id: &'a str) -> Operation<'a> {
        Operation { limiter: self, id }
    }
}

/// A [`Limiter`] scoped to one operation id.
#[derive(Clone, Copy, Debug)]
pub struct Operation<'a> {
    limiter: &'a Limiter,
    id: &'a str,
}

impl Operation<'_> {
    /// See [`Limiter::backoff`].
    #[must_use]
    pub fn backoff(&self) -> Duration {
        self.limiter.backoff(self.id)
    }

    /// See [`Limiter::limit`].
    ///
    /// # Errors
    ///
    /// Returns [`LimiterError::Cancelled`] when `cancel` fires first.
    pub async fn limit(&self, cancel: &CancellationToken) -> Result<(), LimiterError> {
        self.limiter.limit(self.id, cancel).await
    }

    /// See [`Limiter::report`].
    pub fn report(&self, success: bool) {
        self.limiter.report(self.id, success);
    }
}

#[cfg(test)]
mod tests;
