use std::time::Duration;

/// Reconnect delay schedule.
///
/// Attempts count closures since the connection was last open. The first
/// attempt may be immediate; after that delays double from `base` up to
/// `max`. There is no attempt cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub base: Duration,
    pub max: Duration,
    pub immediate_first: bool,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            max: Duration::from_secs(60),
            immediate_first: true,
        }
    }
}

impl Backoff {
    /// No delays at all.
    #[must_use]
    pub fn none() -> Self {
        Self {
            base: Duration::ZERO,
            max: Duration::ZERO,
            immediate_first: true,
        }
    }

    /// Delay before reconnect `attempt` (1-based).
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = match (attempt, self.immediate_first) {
            (0, _) | (1, true) => return Duration::ZERO,
            (n, true) => n - 2,
            (n, false) => n - 1,
        };
        self.base
            .checked_mul(2u32.saturating_pow(exponent.min(31)))
            .unwrap_or(self.max)
            .min(self.max)
    }
}

#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    #[rstest]
    #[case(0, 0)]
    #[case(1, 0)]
    #[case(2, 1000)]
    #[case(3, 2000)]
    #[case(4, 4000)]
    #[case(8, 60_000)]
    #[case(200, 60_000)]
    fn default_schedule(#[case] attempt: u32, #[case] millis: u64) {
        assert_eq!(
            Backoff::default().delay(attempt),
            Duration::from_millis(millis)
        );
    }

    #[test]
    fn delayed_first_attempt() {
        let backoff = Backoff {
            immediate_first: false,
            ..Backoff::default()
        };
        assert_eq!(backoff.delay(1), Duration::from_secs(1));
        assert_eq!(backoff.delay(2), Duration::from_secs(2));
    }

    #[test]
    fn none_never_waits() {
        assert!((0..50).all(|n| Backoff::none().delay(n).is_zero()));
    }
}
