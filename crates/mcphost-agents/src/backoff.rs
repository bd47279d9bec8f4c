use std::time::Duration;

/// Exponential backoff for provider overload.
///
/// Attempt `0` is the first call and waits nothing. Retry `n` (1-based) waits
/// `initial * 2^(n-1)`, capped at `max`. After `max_retries` retries the caller
/// gives up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub max: Duration,
    pub max_retries: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(30),
            max_retries: 5,
        }
    }
}

impl BackoffPolicy {
    pub fn new(initial: Duration, max: Duration, max_retries: u32) -> Self {
        Self {
            initial,
            max,
            max_retries,
        }
    }

    /// Wait before `attempt`, or `None` once retries are used up.
    pub fn delay(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 {
            return Some(Duration::ZERO);
        }
        if attempt > self.max_retries {
            return None;
        }
        let factor = 2u32.checked_pow(attempt - 1).unwrap_or(u32::MAX);
        let delay = self
            .initial
            .checked_mul(factor)
            .map_or(self.max, |d| d.min(self.max));
        Some(delay)
    }

    /// Total number of calls made before giving up.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_schedule_doubles_from_one_second() {
        let policy = BackoffPolicy::default();
        let delays: Vec<u64> = (0..=5)
            .map(|n| policy.delay(n).unwrap().as_secs())
            .collect();
        assert_eq!(delays, vec![0, 1, 2, 4, 8, 16]);
        assert_eq!(policy.delay(6), None);
        assert_eq!(policy.max_attempts(), 6);
    }

    #[test]
    fn delay_is_capped_and_monotonic() {
        let policy = BackoffPolicy::new(Duration::from_secs(1), Duration::from_secs(30), 64);
        let mut previous = Duration::ZERO;
        for attempt in 0..=64 {
            let delay = policy.delay(attempt).unwrap();
            assert!(delay >= previous, "attempt {attempt} went backwards");
            assert!(delay <= policy.max);
            previous = delay;
        }
        assert_eq!(policy.delay(10), Some(Duration::from_secs(30)));
    }

    #[test]
    fn zero_retries_means_single_attempt() {
        let policy = BackoffPolicy::new(Duration::from_millis(1), Duration::from_millis(5), 0);
        assert_eq!(policy.delay(0), Some(Duration::ZERO));
        assert_eq!(policy.delay(1), None);
    }

    #[test]
    fn initial_above_max_is_clamped() {
        let policy = BackoffPolicy::new(Duration::from_secs(60), Duration::from_secs(30), 3);
        assert_eq!(policy.delay(1), Some(Duration::from_secs(30)));
    }
}
