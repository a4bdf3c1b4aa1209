//! Exponential backoff curve used by the [`Limiter`](super::Limiter).

use std::time::Duration;

/// Maps a retry count (starting at zero) to a sleep duration.
pub trait Backoff: Send + Sync {
    /// Returns the delay to apply after `retries` failures past the threshold.
    fn delay(&self, retries: u32) -> Duration;
}

impl<F> Backoff for F
where
    F: Fn(u32) -> Duration + Send + Sync,
{
    fn delay(&self, retries: u32) -> Duration {
        self(retries)
    }
}

/// Capped exponential backoff with optional proportional jitter.
///
/// The delay for `n` retries is `min(cap, base × multiplier^n)`, then
/// `delay × jitter × rand(0, 1)` is added on top.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ExponentialBackoff {
    /// Delay for the first retry.
    pub base: Duration,
    /// Growth factor between consecutive retries.
    pub multiplier: f64,
    /// Upper bound applied before jitter.
    pub cap: Duration,
    /// Jitter ratio; `0.0` disables jitter.
    pub jitter: f64,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            multiplier: 2.0,
            cap: Duration::from_secs(30),
            jitter: 0.0,
        }
    }
}

impl Backoff for ExponentialBackoff {
    #[expect(
        clippy::float_arithmetic,
        reason = "the backoff curve is defined over fractional seconds"
    )]
    fn delay(&self, retries: u32) -> Duration {
        let cap_secs = self.cap.as_secs_f64();
        let exponent = i32::try_from(retries).unwrap_or(i32::MAX);
        let raw = self.base.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = if raw.is_finite() && raw >= 0.0 {
            raw.min(cap_secs)
        } else {
            cap_secs
        };

        let jittered = if self.jitter > 0.0 {
            capped + rand::random::<f64>() * capped * self.jitter
        } else {
            capped
        };

        Duration::try_from_secs_f64(jittered).unwrap_or(self.cap)
    }
}
