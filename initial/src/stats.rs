use std::time::{Duration, Instant};

use parking_lot::Mutex;

struct Inner {
    baseline: Option<Instant>,
    completions: u64,
}

/// Global round-trip accumulator of the completion intake.
///
/// The first completed round trip only sets the timing baseline. Every later
/// one reports elapsed-since-baseline divided by the completion count: a
/// running average of the total, which tracks sustained throughput more
/// robustly than noisy per-sample latency under overlapping requests.
pub struct RoundTripStats {
    inner: Mutex<Inner>,
}

impl Default for RoundTripStats {
    fn default() -> Self {
        Self::new()
    }
}

impl RoundTripStats {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                baseline: None,
                completions: 0,
            }),
        }
    }

    /// Records one completed round trip.
    ///
    /// # Returns
    /// `None` for the baseline-setting first arrival, otherwise the running
    /// mean and the completion count it averages over.
    pub fn complete(&self) -> Option<(Duration, u64)> {
        let mut inner = self.inner.lock();

        match inner.baseline {
            None => {
                inner.baseline = Some(Instant::now());
                None
            }
            Some(baseline) => {
                inner.completions += 1;
                let mean = baseline.elapsed() / inner.completions as u32;
                Some((mean, inner.completions))
            }
        }
    }

    /// Whether the baseline frame already arrived.
    pub fn baseline_started(&self) -> bool {
        self.inner.lock().baseline.is_some()
    }

    /// Round trips completed since the baseline.
    pub fn completions(&self) -> u64 {
        self.inner.lock().completions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_arrival_only_sets_the_baseline() {
        let stats = RoundTripStats::new();

        assert!(!stats.baseline_started());
        assert!(stats.complete().is_none());
        assert!(stats.baseline_started());
        assert_eq!(stats.completions(), 0);
    }

    #[test]
    fn later_arrivals_average_over_the_count() {
        let stats = RoundTripStats::new();
        stats.complete();

        std::thread::sleep(Duration::from_millis(30));
        let (first_mean, n) = stats.complete().unwrap();
        assert_eq!(n, 1);
        assert!(first_mean >= Duration::from_millis(30));

        let (second_mean, n) = stats.complete().unwrap();
        assert_eq!(n, 2);
        // Averaged over two completions now, so the mean cannot grow
        // past the elapsed total.
        assert!(second_mean <= first_mean + Duration::from_millis(30));
    }
}
