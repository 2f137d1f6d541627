//! Response latency equalization between genuine and decoy requests.
//!
//! For every externally observable endpoint class the service keeps a moving
//! average of the real processing time. Decoy responses are delayed by a
//! Poisson draw around that average; genuine responses additionally wait
//! until they line up with the slowest class, so an observer cannot tell
//! from latency which code path ran.

use rand::Rng;
use rand_distr::{Distribution, Poisson};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Externally observable endpoint classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelayClass {
    Token,
    Tan,
    TestResult,
}

const ALL_CLASSES: [DelayClass; 3] = [DelayClass::Token, DelayClass::Tan, DelayClass::TestResult];

pub struct FakeDelayService {
    moving_average_samples: u64,
    token_delay_ms: AtomicU64,
    tan_delay_ms: AtomicU64,
    test_delay_ms: AtomicU64,
}

impl FakeDelayService {
    pub fn new(initial_delay_ms: u64, moving_average_samples: u64) -> Self {
        Self {
            moving_average_samples: moving_average_samples.max(1),
            token_delay_ms: AtomicU64::new(initial_delay_ms),
            tan_delay_ms: AtomicU64::new(initial_delay_ms),
            test_delay_ms: AtomicU64::new(initial_delay_ms),
        }
    }

    fn cell(&self, class: DelayClass) -> &AtomicU64 {
        match class {
            DelayClass::Token => &self.token_delay_ms,
            DelayClass::Tan => &self.tan_delay_ms,
            DelayClass::TestResult => &self.test_delay_ms,
        }
    }

    /// Current moving average for a class, in milliseconds.
    pub fn current_delay_ms(&self, class: DelayClass) -> u64 {
        self.cell(class).load(Ordering::Relaxed)
    }

    /// A randomized delay representative of the class, drawn from a Poisson
    /// distribution around the current moving average. Used as the full
    /// response time of decoy requests.
    pub fn jittered_delay(&self, class: DelayClass) -> Duration {
        Duration::from_millis(self.sample(self.current_delay_ms(class)))
    }

    fn sample(&self, mean_ms: u64) -> u64 {
        let mean = (mean_ms as f64).max(1.0);
        let poisson = match Poisson::new(mean) {
            Ok(p) => p,
            // mean is clamped above zero, so this arm never fires
            Err(_) => return mean_ms,
        };
        poisson.sample(&mut rand::thread_rng()) as u64
    }

    /// Fold the observed processing time of a genuine request into the
    /// class's moving average: `avg ← avg + (observed − avg) / samples`.
    pub fn record_real_duration(&self, class: DelayClass, observed: Duration) {
        let observed_ms = observed.as_millis() as i64;
        let samples = self.moving_average_samples as i64;
        let _ = self
            .cell(class)
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                let current = current as i64;
                let next = current + (observed_ms - current) / samples;
                Some(next.max(0) as u64)
            });
    }

    /// The extra time a genuine response of `class` must wait so its total
    /// latency matches a decoy of the slowest class.
    pub fn equalizing_delay(&self, class: DelayClass) -> Duration {
        let own = self.sample(self.current_delay_ms(class));
        let longest = ALL_CLASSES
            .iter()
            .map(|&c| {
                if c == class {
                    own
                } else {
                    self.sample(self.current_delay_ms(c))
                }
            })
            .max()
            .unwrap_or(own);
        Duration::from_millis(longest.saturating_sub(own))
    }

    /// Current delay for a class in seconds. Used for monitoring.
    pub fn current_delay_seconds(&self, class: DelayClass) -> f64 {
        self.current_delay_ms(class) as f64 / 1000.0
    }
}

/// Random alphanumeric padding so response bodies of decoys and genuine
/// requests cannot be told apart by size.
pub fn response_padding(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| rng.sample(rand::distributions::Alphanumeric) as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn moving_average_converges_towards_observations() {
        let service = FakeDelayService::new(100, 10);
        for _ in 0..200 {
            service.record_real_duration(DelayClass::Token, Duration::from_millis(500));
        }
        let avg = service.current_delay_ms(DelayClass::Token);
        assert!((450..=510).contains(&avg), "average was {avg}");
    }

    #[test]
    fn smoothing_moves_one_sample_fraction_at_a_time() {
        let service = FakeDelayService::new(100, 10);
        service.record_real_duration(DelayClass::Tan, Duration::from_millis(200));
        // 100 + (200 - 100) / 10
        assert_eq!(service.current_delay_ms(DelayClass::Tan), 110);
    }

    #[test]
    fn classes_are_tracked_independently() {
        let service = FakeDelayService::new(100, 1);
        service.record_real_duration(DelayClass::Token, Duration::from_millis(300));
        assert_eq!(service.current_delay_ms(DelayClass::Token), 300);
        assert_eq!(service.current_delay_ms(DelayClass::Tan), 100);
        assert_eq!(service.current_delay_ms(DelayClass::TestResult), 100);
    }

    #[test]
    fn jittered_delay_stays_near_the_mean() {
        let service = FakeDelayService::new(200, 10);
        for _ in 0..100 {
            let d = service.jittered_delay(DelayClass::TestResult).as_millis();
            // Poisson(200) mass is well inside mean ± 50%
            assert!((100..=300).contains(&d), "delay was {d}");
        }
    }

    #[test]
    fn equalizing_delay_tops_up_towards_the_slowest_class() {
        let service = FakeDelayService::new(10, 1);
        service.record_real_duration(DelayClass::Tan, Duration::from_millis(400));

        // The token class is much faster than the tan class, so a genuine
        // token response must usually wait a substantial top-up.
        let mut nonzero = 0;
        for _ in 0..50 {
            if !service.equalizing_delay(DelayClass::Token).is_zero() {
                nonzero += 1;
            }
        }
        assert!(nonzero >= 45, "only {nonzero} of 50 draws were topped up");

        // The slowest class itself mostly needs no top-up beyond jitter.
        let own = service.equalizing_delay(DelayClass::Tan).as_millis();
        assert!(own <= 400, "top-up for the slowest class was {own}");
    }

    #[test]
    fn padding_has_requested_length_and_alphabet() {
        let padding = response_padding(45);
        assert_eq!(padding.len(), 45);
        assert!(padding.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
