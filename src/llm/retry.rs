//! Retry/backoff policy for the LLM client.
//!
//! Expressed as a pure function over the attempt index and the observed
//! error kind so it can be unit-tested without a live transport, the same
//! separation this codebase uses for step-execution retries.

use std::time::Duration;

use rand::Rng;

/// Whether a transport failure is worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryableKind {
    /// Network-level failure (connect/timeout), or a 429/5xx HTTP status.
    Transient,
    /// Authentication, bad request, or context-length -- retrying cannot help.
    Permanent,
}

/// Exponential backoff with a cap and uniform jitter.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(20),
            factor: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Returns the delay to wait before `attempt` (1-indexed), or `None` if
    /// no further attempt should be made.
    pub fn delay_for(&self, attempt: u32, kind: RetryableKind) -> Option<Duration> {
        if kind == RetryableKind::Permanent || attempt >= self.max_attempts {
            return None;
        }
        let exponent = attempt.saturating_sub(1);
        let raw = self.base_delay.as_secs_f64() * self.factor.powi(exponent as i32);
        let capped = raw.min(self.max_delay.as_secs_f64());
        let jittered = capped * rand::thread_rng().gen_range(0.5..1.0);
        Some(Duration::from_secs_f64(jittered))
    }

    /// Same as [`Self::delay_for`] but deterministic, for tests -- no jitter.
    #[cfg(test)]
    fn delay_for_unjittered(&self, attempt: u32, kind: RetryableKind) -> Option<Duration> {
        if kind == RetryableKind::Permanent || attempt >= self.max_attempts {
            return None;
        }
        let exponent = attempt.saturating_sub(1);
        let raw = self.base_delay.as_secs_f64() * self.factor.powi(exponent as i32);
        Some(Duration::from_secs_f64(raw.min(self.max_delay.as_secs_f64())))
    }
}

pub fn classify_status(status: u16) -> RetryableKind {
    match status {
        429 | 500 | 502 | 503 | 504 => RetryableKind::Transient,
        _ => RetryableKind::Permanent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permanent_errors_never_retry() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1, RetryableKind::Permanent), None);
    }

    #[test]
    fn exhausted_attempts_stop_retrying() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.delay_for(policy.max_attempts, RetryableKind::Transient),
            None
        );
    }

    #[test]
    fn delay_grows_exponentially_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
            factor: 2.0,
        };
        let d1 = policy
            .delay_for_unjittered(1, RetryableKind::Transient)
            .unwrap();
        let d2 = policy
            .delay_for_unjittered(2, RetryableKind::Transient)
            .unwrap();
        let d3 = policy
            .delay_for_unjittered(3, RetryableKind::Transient)
            .unwrap();
        assert_eq!(d1, Duration::from_millis(100));
        assert_eq!(d2, Duration::from_millis(200));
        assert_eq!(d3, Duration::from_millis(400));

        let d_big = policy
            .delay_for_unjittered(9, RetryableKind::Transient)
            .unwrap();
        assert_eq!(d_big, Duration::from_secs(1));
    }

    #[test]
    fn status_classification_matches_known_retryable_codes() {
        assert_eq!(classify_status(429), RetryableKind::Transient);
        assert_eq!(classify_status(500), RetryableKind::Transient);
        assert_eq!(classify_status(503), RetryableKind::Transient);
        assert_eq!(classify_status(400), RetryableKind::Permanent);
        assert_eq!(classify_status(401), RetryableKind::Permanent);
    }
}
