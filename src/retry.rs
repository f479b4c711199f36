//! Retry and requeue policies.
//!
//! Two kinds of retry exist in the controllers:
//!
//! - **Requeue jitter** ([`RequeueBackoff`]): when a reconciliation pass fails,
//!   the resource is handed back to the scheduler with a delay drawn uniformly
//!   from a fixed window, so that many resources failing together do not retry
//!   in lockstep. The delay is attached to the returned `Action`; nothing sleeps.
//! - **Bounded in-pass retry** ([`retry_with_backoff`]): optimistic-concurrency
//!   conflicts on a write are retried a few times with a short exponential delay
//!   before the pass gives up.

use std::ops::Range;
use std::sync::Mutex;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use tracing::{error, warn};

/// Default lower bound of the requeue jitter window
pub const DEFAULT_REQUEUE_MIN: Duration = Duration::from_secs(2);

/// Default upper bound (exclusive) of the requeue jitter window
pub const DEFAULT_REQUEUE_MAX: Duration = Duration::from_secs(6);

/// Jittered requeue delay source
///
/// The random source is injected so tests can make delays deterministic.
pub struct RequeueBackoff {
    window: Range<Duration>,
    rng: Mutex<Box<dyn RngCore + Send>>,
}

impl RequeueBackoff {
    /// Backoff over `window` using an entropy-seeded generator
    pub fn new(window: Range<Duration>) -> Self {
        Self::with_rng(window, StdRng::from_entropy())
    }

    /// Backoff over `window` with a deterministic seed
    pub fn seeded(window: Range<Duration>, seed: u64) -> Self {
        Self::with_rng(window, StdRng::seed_from_u64(seed))
    }

    /// Backoff over `window` drawing from the given generator
    ///
    /// An empty or inverted window collapses to its lower bound.
    pub fn with_rng(window: Range<Duration>, rng: impl RngCore + Send + 'static) -> Self {
        Self {
            window,
            rng: Mutex::new(Box::new(rng)),
        }
    }

    /// Draw a delay uniformly from the jitter window
    pub fn random_requeue_delay(&self) -> Duration {
        let min = self.window.start.as_millis() as u64;
        let max = self.window.end.as_millis() as u64;
        if max <= min {
            return self.window.start;
        }
        // A poisoned lock only means another thread panicked mid-draw; the
        // generator state is still usable.
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        Duration::from_millis(rng.gen_range(min..max))
    }
}

impl Default for RequeueBackoff {
    fn default() -> Self {
        Self::new(DEFAULT_REQUEUE_MIN..DEFAULT_REQUEUE_MAX)
    }
}

impl std::fmt::Debug for RequeueBackoff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequeueBackoff")
            .field("window", &self.window)
            .finish_non_exhaustive()
    }
}

/// Configuration for operations that may fail transiently.
#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// Maximum number of attempts (0 = infinite)
    pub max_attempts: u32,
    /// Initial delay between retries
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 0,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Create a config with a maximum number of attempts
    pub fn with_max_attempts(attempts: u32) -> Self {
        Self {
            max_attempts: attempts,
            ..Default::default()
        }
    }

    /// Short, bounded retry for optimistic-concurrency conflicts
    pub fn conflict() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(200),
            backoff_multiplier: 2.0,
        }
    }
}

/// Execute an async operation, retrying errors accepted by `should_retry`.
///
/// Errors rejected by `should_retry` are returned immediately. Retries stop
/// after `max_attempts` (if non-zero) and return the last error.
pub async fn retry_with_backoff<F, Fut, T, E, P>(
    config: &RetryConfig,
    operation_name: &str,
    should_retry: P,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let mut attempt = 0u32;
    let mut delay = config.initial_delay;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if !should_retry(&e) => return Err(e),
            Err(e) => {
                if config.max_attempts > 0 && attempt >= config.max_attempts {
                    error!(
                        operation = %operation_name,
                        attempt = attempt,
                        error = %e,
                        "Operation failed after max retries"
                    );
                    return Err(e);
                }

                warn!(
                    operation = %operation_name,
                    attempt = attempt,
                    error = %e,
                    delay_ms = delay.as_millis(),
                    "Operation failed, retrying"
                );

                tokio::time::sleep(delay).await;

                delay = Duration::from_secs_f64(
                    (delay.as_secs_f64() * config.backoff_multiplier)
                        .min(config.max_delay.as_secs_f64()),
                );
            }
        }
    }
}
