//! Exponential back-off with jitter for calls to remote services.

use std::future::Future;
use std::time::Duration;

use bill_core::error::Result;
use rand::Rng;

// ── Defaults ──────────────────────────────────────────────────────────────────

/// Attempts made before the last error is surfaced.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Delay before the second attempt; doubled for every later attempt.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);

/// Upper bound (exclusive) of the random delay added to every wait.
pub const DEFAULT_MAX_JITTER: Duration = Duration::from_millis(1000);

// ── RetryPolicy ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
            max_jitter: DEFAULT_MAX_JITTER,
        }
    }
}

impl RetryPolicy {
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    /// A policy that retries immediately; used by tests.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries: max_retries.max(1),
            base_delay: Duration::ZERO,
            max_jitter: Duration::ZERO,
        }
    }

    /// `base_delay × 2^attempt`, without jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
    }

    /// Wait before retrying after the failed `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let jitter_ms = self.max_jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::rng().random_range(0..jitter_ms))
        };
        self.backoff(attempt) + jitter
    }
}

/// Run `operation` until it succeeds, fails permanently, or the policy's
/// attempts are used up.
///
/// The closure receives the 0-based attempt number. Only errors for which
/// [`BillError::is_transient`](bill_core::error::BillError::is_transient)
/// holds are retried.
pub async fn retry_with_backoff<T, F, Fut>(policy: &RetryPolicy, mut operation: F) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt + 1 < policy.max_retries => {
                let delay = policy.delay_for(attempt);
                tracing::warn!(
                    attempt = attempt + 1,
                    max = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "transient failure; retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
