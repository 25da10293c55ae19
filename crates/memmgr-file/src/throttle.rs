use memmgr_platform::TaskYield;
use tracing::trace;

/// Bounds how long one transfer runs without yielding.
///
/// The counter is per pass: callers [`reset`](Self::reset) it before every CRC, dump or load
/// pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferThrottle {
    counter: u32,
    limit: u32,
    delay_ms: u32,
    perf_id: u32,
}

impl TransferThrottle {
    /// A `limit` of zero disables pausing.
    pub fn new(limit: u32, delay_ms: u32, perf_id: u32) -> Self {
        Self {
            counter: 0,
            limit,
            delay_ms,
            perf_id,
        }
    }

    pub fn reset(&mut self) {
        self.counter = 0;
    }

    pub fn counter(&self) -> u32 {
        self.counter
    }

    /// Counts one block. Every `limit`-th call sleeps for the configured delay between a perf
    /// exit/entry pair and returns `true`.
    pub fn pause(&mut self, yielder: &dyn TaskYield) -> bool {
        if self.limit == 0 {
            return false;
        }
        self.counter += 1;
        if self.counter < self.limit {
            return false;
        }

        self.counter = 0;
        trace!(delay_ms = self.delay_ms, perf_id = self.perf_id, "transfer throttle pause");
        yielder.perf_exit(self.perf_id);
        yielder.delay(self.delay_ms);
        yielder.perf_entry(self.perf_id);
        true
    }
}

#[cfg(test)]
mod tests {
    use memmgr_platform::RecordingYield;
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn fourth_call_pauses_and_resets() {
        let yielder = RecordingYield::new();
        let mut throttle = TransferThrottle::new(4, 20, 39);

        for expected_counter in 1..=3 {
            assert!(!throttle.pause(&yielder));
            assert_eq!(throttle.counter(), expected_counter);
        }
        assert_eq!(yielder.delays(), 0);

        assert!(throttle.pause(&yielder));
        assert_eq!(throttle.counter(), 0);
        assert_eq!(yielder.delays(), 1);
        assert_eq!(yielder.delayed_ms(), 20);
        assert_eq!(yielder.marker_pairs(), 1);
    }

    #[test]
    fn zero_limit_never_pauses() {
        let yielder = RecordingYield::new();
        let mut throttle = TransferThrottle::new(0, 20, 39);
        for _ in 0..100 {
            assert!(!throttle.pause(&yielder));
        }
        assert_eq!(yielder.delays(), 0);
    }

    #[test]
    fn reset_starts_a_new_pass() {
        let yielder = RecordingYield::new();
        let mut throttle = TransferThrottle::new(3, 1, 0);
        throttle.pause(&yielder);
        throttle.pause(&yielder);
        throttle.reset();
        throttle.pause(&yielder);
        throttle.pause(&yielder);
        assert_eq!(yielder.delays(), 0);
        throttle.pause(&yielder);
        assert_eq!(yielder.delays(), 1);
    }

    proptest! {
        #[test]
        fn pauses_once_per_limit_calls(limit in 1u32..32, calls in 0u32..500) {
            let yielder = RecordingYield::new();
            let mut throttle = TransferThrottle::new(limit, 5, 1);
            let paused = (0..calls).filter(|_| throttle.pause(&yielder)).count() as u32;
            prop_assert_eq!(paused, calls / limit);
            prop_assert_eq!(throttle.counter(), calls % limit);
            prop_assert_eq!(yielder.delays(), u64::from(calls / limit));
        }
    }
}
