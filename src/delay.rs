use rand_distr::{Distribution, Normal};

use std::{thread, time::Duration};

/// Produces randomized pauses between outbound requests.
///
/// The marketplace tolerates slow, irregular clients and throttles fast
/// regular ones, so delays are sampled from a normal distribution centred on
/// the midpoint of the configured interval and rejection-clamped to it:
/// every delay lands inside `[min_seconds, max_seconds]`, clustered around
/// the middle rather than the edges.
#[derive(Debug, Clone, Copy)]
pub struct DelayPolicy {
    min_seconds: f64,
    max_seconds: f64,
}

impl Default for DelayPolicy {
    fn default() -> Self {
        Self::new(8.0, 12.0)
    }
}

impl DelayPolicy {
    #[must_use]
    pub const fn new(min_seconds: f64, max_seconds: f64) -> Self {
        Self {
            min_seconds,
            max_seconds,
        }
    }

    /// Draws one delay from the policy's interval.
    #[must_use]
    pub fn sample(&self) -> Duration {
        if self.max_seconds <= self.min_seconds {
            return Duration::from_secs_f64(self.min_seconds);
        }
        let mean = (self.min_seconds + self.max_seconds) / 2.0;
        // 99.7% of draws fall inside the interval, so the rejection loop
        // almost never runs twice.
        let std_dev = (self.max_seconds - self.min_seconds) / 6.0;
        let normal = Normal::new(mean, std_dev).expect("finite delay bounds");
        let mut rng = rand::thread_rng();
        loop {
            let seconds = normal.sample(&mut rng);
            if (self.min_seconds..=self.max_seconds).contains(&seconds) {
                return Duration::from_secs_f64(seconds);
            }
        }
    }

    /// Blocks the calling thread for one sampled delay.
    pub fn pause(&self) {
        thread::sleep(self.sample());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_fn_stays_inside_bounds() {
        let policy = DelayPolicy::new(8.0, 12.0);
        for _ in 0..1_000 {
            let delay = policy.sample().as_secs_f64();
            assert!((8.0..=12.0).contains(&delay), "out of bounds: {delay}");
        }
    }

    #[test]
    fn sample_fn_concentrates_near_the_midpoint() {
        let policy = DelayPolicy::new(8.0, 12.0);
        let n = 500;
        let mean: f64 = (0..n).map(|_| policy.sample().as_secs_f64()).sum::<f64>() / f64::from(n);
        assert!((9.5..=10.5).contains(&mean), "mean drifted: {mean}");
    }

    #[test]
    fn sample_fn_handles_degenerate_interval() {
        let policy = DelayPolicy::new(3.0, 3.0);
        assert_eq!(policy.sample(), Duration::from_secs(3));
    }
}
