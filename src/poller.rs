//! Bounded Poller
//!
//! The single source of retries in the provisioner. A probe is evaluated at a
//! fixed interval until it reports success, a fatal error, or the attempt
//! budget (`ceil(timeout / step)`) runs out. There is no backoff.

use std::future::Future;
use std::time::Duration;

use crate::error::{Error, Result};

/// Timing of a bounded poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Total time budget
    pub timeout: Duration,
    /// Fixed sleep between attempts
    pub step: Duration,
}

impl PollPolicy {
    pub const fn new(timeout: Duration, step: Duration) -> Self {
        Self { timeout, step }
    }

    /// 90s in 5s steps, used by every membership wait
    pub const fn convergence() -> Self {
        Self::new(Duration::from_secs(90), Duration::from_secs(5))
    }

    /// Caller supplied timeout in 1s steps, used by the log based sync wait
    pub const fn per_second(timeout: Duration) -> Self {
        Self::new(timeout, Duration::from_secs(1))
    }

    /// Number of probe evaluations before giving up
    pub fn max_attempts(&self) -> u64 {
        let step = self.step.as_millis().max(1);
        let timeout = self.timeout.as_millis();
        (timeout.div_ceil(step) as u64).max(1)
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::convergence()
    }
}

/// Result of a single probe evaluation
#[derive(Debug)]
pub enum Outcome {
    /// Condition not met yet, try again after the step
    Pending,
    /// Condition met, stop polling
    Satisfied,
    /// Abort the poll and surface the error
    Fatal(Error),
}

impl Outcome {
    /// Map a probe result: `Ok(true)` is success, `Ok(false)` and transient
    /// execution errors are pending, anything else is fatal.
    pub fn from_probe(result: Result<bool>) -> Self {
        match result {
            Ok(true) => Outcome::Satisfied,
            Ok(false) => Outcome::Pending,
            Err(e) if e.is_retryable() => {
                tracing::debug!("Probe failed, still pending: {}", e);
                Outcome::Pending
            }
            Err(e) => Outcome::Fatal(e),
        }
    }
}

/// Evaluate `probe` while it reports `Pending`.
///
/// Returns `Ok(true)` on the first `Satisfied`, `Ok(false)` when the attempt
/// budget is exhausted and `Err` on the first `Fatal`.
pub async fn retry_while<F, Fut>(policy: &PollPolicy, mut probe: F) -> Result<bool>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Outcome>,
{
    let attempts = policy.max_attempts();

    for attempt in 1..=attempts {
        match probe().await {
            Outcome::Satisfied => {
                tracing::trace!(attempt, "Poll condition satisfied");
                return Ok(true);
            }
            Outcome::Fatal(e) => return Err(e),
            Outcome::Pending => {
                tracing::trace!(attempt, attempts, "Poll condition pending");
                tokio::time::sleep(policy.step).await;
            }
        }
    }

    Ok(false)
}
