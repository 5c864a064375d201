//! Lookup retry schedule

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Bounded retry schedule for the token lookup race
///
/// A completion event can outrun the write of its token record. The
/// resolver retries the lookup on this schedule before it gives up with a
/// terminal lookup failure. Delays grow geometrically by `multiplier`, are
/// capped at `max_interval`, and get `jitter` applied as a ± fraction.
///
/// # Example
///
/// ```
/// use taskbridge_durable::RetryPolicy;
/// use std::time::Duration;
///
/// // Lookups at roughly 0ms, +50ms, +100ms, +200ms, +400ms
/// let policy = RetryPolicy::exponential()
///     .with_max_attempts(5)
///     .with_initial_interval(Duration::from_millis(50));
///
/// assert!(policy.grace_window() > Duration::from_millis(700));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(try_from = "RawRetryPolicy")]
pub struct RetryPolicy {
    /// Lookups in total, counting the first one
    pub max_attempts: u32,

    /// Wait before the second lookup
    #[serde(with = "millis")]
    pub initial_interval: Duration,

    /// Upper bound for any single wait
    #[serde(with = "millis")]
    pub max_interval: Duration,

    /// Growth factor between consecutive waits
    pub multiplier: f64,

    /// Fraction of each wait randomized in either direction
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::exponential()
    }
}

impl RetryPolicy {
    /// Doubling backoff: 6 lookups, 100ms first wait, 2s cap, 10% jitter
    ///
    /// About three seconds of grace in total.
    pub fn exponential() -> Self {
        Self {
            max_attempts: 6,
            initial_interval: Duration::from_millis(100),
            max_interval: Duration::from_secs(2),
            multiplier: 2.0,
            jitter: 0.1,
        }
    }

    /// A single lookup with no grace window
    pub fn no_retry() -> Self {
        Self::fixed(Duration::ZERO, 1)
    }

    /// `max_attempts` lookups spaced `interval` apart
    pub fn fixed(interval: Duration, max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_interval: interval,
            max_interval: interval,
            multiplier: 1.0,
            jitter: 0.0,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_initial_interval(mut self, interval: Duration) -> Self {
        self.initial_interval = interval;
        self
    }

    pub fn with_max_interval(mut self, interval: Duration) -> Self {
        self.max_interval = interval;
        self
    }

    /// Set the jitter fraction, clamped to 0.0..=1.0
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Wait before lookup number `attempt` (1-based); zero for the first
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let nominal = self.nominal_delay(attempt);
        // NaN collapses to zero here
        let jitter = self.jitter.max(0.0).min(1.0);
        if jitter <= 0.0 || nominal <= 0.0 {
            return seconds(nominal);
        }

        let spread = nominal * jitter;
        let offset = rand::thread_rng().gen_range(-spread..spread);
        seconds(nominal + offset)
    }

    /// Whether another lookup may follow lookup number `attempt`
    pub fn has_attempts_remaining(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Total nominal wait across all lookups, without jitter
    pub fn grace_window(&self) -> Duration {
        let total: f64 = (2..=self.max_attempts)
            .map(|attempt| self.nominal_delay(attempt))
            .sum();
        seconds(total)
    }

    /// Never negative or NaN; at most `max_interval`
    fn nominal_delay(&self, attempt: u32) -> f64 {
        if attempt < 2 {
            return 0.0;
        }
        let exponent = i32::try_from(attempt - 2).unwrap_or(i32::MAX);
        let growth = self.multiplier.powi(exponent);
        (self.initial_interval.as_secs_f64() * growth)
            .min(self.max_interval.as_secs_f64())
            .max(0.0)
    }

    fn check(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("max_attempts must be at least 1".to_string());
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(format!(
                "multiplier must be a finite number >= 1.0, got {}",
                self.multiplier
            ));
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(format!("jitter must be within 0.0..=1.0, got {}", self.jitter));
        }
        Ok(())
    }
}

fn seconds(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs.max(0.0)).unwrap_or(Duration::ZERO)
}

/// Unchecked wire form of [`RetryPolicy`]
#[derive(Deserialize)]
struct RawRetryPolicy {
    max_attempts: u32,
    #[serde(with = "millis")]
    initial_interval: Duration,
    #[serde(with = "millis")]
    max_interval: Duration,
    multiplier: f64,
    jitter: f64,
}

impl TryFrom<RawRetryPolicy> for RetryPolicy {
    type Error = String;

    fn try_from(raw: RawRetryPolicy) -> Result<Self, Self::Error> {
        let policy = Self {
            max_attempts: raw.max_attempts,
            initial_interval: raw.initial_interval,
            max_interval: raw.max_interval,
            multiplier: raw.multiplier,
            jitter: raw.jitter,
        };
        policy.check()?;
        Ok(policy)
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
