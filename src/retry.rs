use std::time::Duration;

use rand::Rng;

use crate::error::TransportErrorKind;

pub(crate) const DEFAULT_MAX_RETRIES: usize = 5;
const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(100);
const DEFAULT_BACKOFF_JITTER: Duration = Duration::from_millis(100);

/// Pluggable "is this worth retrying" predicate consulted for transport
/// failures. DNS lookup failures never reach it: the engine retries those
/// unconditionally.
pub trait RetryClassifier: Send + Sync {
    fn should_retry(&self, kind: TransportErrorKind) -> bool;
}

/// Default classification: connection setup failures, interrupted reads and
/// timeouts are transient; TLS failures and unclassified errors are not.
#[derive(Clone, Copy, Debug, Default)]
pub struct TransientRetryClassifier;

impl RetryClassifier for TransientRetryClassifier {
    fn should_retry(&self, kind: TransportErrorKind) -> bool {
        matches!(
            kind,
            TransportErrorKind::Connect | TransportErrorKind::Read | TransportErrorKind::Timeout
        )
    }
}

/// Retry budget and backoff schedule for one logical call. The delay before
/// retry `n` is `(2^n) * base + uniform_random(0..=jitter)`, 100ms base and
/// jitter by default.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    max_retries: usize,
    backoff_base: Duration,
    backoff_jitter: Duration,
}

impl RetryPolicy {
    pub fn standard() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_base: DEFAULT_BACKOFF_BASE,
            backoff_jitter: DEFAULT_BACKOFF_JITTER,
        }
    }

    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            backoff_base: DEFAULT_BACKOFF_BASE,
            backoff_jitter: DEFAULT_BACKOFF_JITTER,
        }
    }

    pub fn max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn backoff_base(mut self, backoff_base: Duration) -> Self {
        self.backoff_base = backoff_base.max(Duration::from_millis(1));
        self
    }

    /// Upper bound of the uniform noise added to each delay. Zero makes the
    /// schedule deterministic.
    pub fn backoff_jitter(mut self, backoff_jitter: Duration) -> Self {
        self.backoff_jitter = backoff_jitter;
        self
    }

    pub(crate) fn configured_max_retries(&self) -> usize {
        self.max_retries
    }

    pub(crate) fn backoff_for_retry(&self, retry_count: usize) -> Duration {
        let capped_exponent = retry_count.min(31) as u32;
        let multiplier = 1_u128 << capped_exponent;
        let base_ms = self.backoff_base.as_millis().max(1);
        let delay_ms = base_ms.saturating_mul(multiplier).min(u64::MAX as u128) as u64;

        let jitter_ms = self.backoff_jitter.as_millis().min(u64::MAX as u128) as u64;
        let noise_ms = if jitter_ms == 0 {
            0
        } else {
            rand::rng().random_range(0..=jitter_ms)
        };
        Duration::from_millis(delay_ms.saturating_add(noise_ms))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::standard()
    }
}
