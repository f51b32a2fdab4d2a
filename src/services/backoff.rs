use std::time::Duration;

/// Capped exponential delay schedule for polling the provider queue.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            multiplier: 1.5,
            max_delay: Duration::from_secs(3),
            max_attempts: 60,
        }
    }
}

impl BackoffPolicy {
    /// Delay before poll number `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.max(1.0).powi(attempt.min(64) as i32);
        let millis = self.initial.as_millis() as f64 * factor;
        let capped = millis.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }

    /// Iterator over every delay the policy allows.
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        (0..self.max_attempts).map(|attempt| self.delay_for(attempt))
    }

    /// Upper bound on time spent waiting if every attempt is used.
    pub fn total_budget(&self) -> Duration {
        self.delays().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grows_then_caps() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(1), Duration::from_millis(1500));
        assert_eq!(policy.delay_for(2), Duration::from_millis(2250));
        assert_eq!(policy.delay_for(3), Duration::from_millis(3000));
        assert_eq!(policy.delay_for(59), Duration::from_millis(3000));
    }

    #[test]
    fn multiplier_below_one_is_constant() {
        let policy = BackoffPolicy {
            initial: Duration::from_millis(200),
            multiplier: 0.5,
            max_delay: Duration::from_secs(1),
            max_attempts: 3,
        };
        assert!(policy.delays().all(|d| d == Duration::from_millis(200)));
        assert_eq!(policy.total_budget(), Duration::from_millis(600));
    }

    #[test]
    fn huge_attempt_numbers_do_not_overflow() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_secs(3));
    }
}
