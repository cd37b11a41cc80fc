//! Shared byte counter for aggregate throughput
//!
//! Every transfer adds the bytes it reads; the reporter samples and clears
//! the counter once per interval. The counter is only reachable through the
//! methods below.

use parking_lot::Mutex;
use std::sync::Arc;

/// Thread-safe accumulator of transferred bytes
#[derive(Clone, Debug, Default)]
pub struct RateMeter {
    bytes: Arc<Mutex<i64>>,
}

impl RateMeter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `n` bytes to the accumulator
    pub fn add(&self, n: i64) {
        *self.bytes.lock() += n;
    }

    /// Current accumulated value
    pub fn value(&self) -> i64 {
        *self.bytes.lock()
    }

    /// Set the accumulator back to zero
    pub fn reset(&self) {
        *self.bytes.lock() = 0;
    }

    /// Return the accumulated value and zero it under a single lock.
    ///
    /// Unlike `value()` followed by `reset()`, no concurrent `add` can land
    /// between the read and the clear.
    pub fn take(&self) -> i64 {
        std::mem::take(&mut *self.bytes.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_reset() {
        let meter = RateMeter::new();
        meter.add(5);
        meter.add(7);
        assert_eq!(meter.value(), 12);

        meter.reset();
        assert_eq!(meter.value(), 0);
    }

    #[test]
    fn test_take_clears() {
        let meter = RateMeter::new();
        meter.add(42);
        assert_eq!(meter.take(), 42);
        assert_eq!(meter.value(), 0);
        assert_eq!(meter.take(), 0);
    }

    #[test]
    fn test_clones_share_the_counter() {
        let meter = RateMeter::new();
        let other = meter.clone();
        other.add(3);
        assert_eq!(meter.value(), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_adds_are_not_lost() {
        let meter = RateMeter::new();

        let mut handles = Vec::new();
        for worker in 0..8i64 {
            let meter = meter.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..1000 {
                    meter.add(worker + 1);
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        // 1000 * (1 + 2 + ... + 8)
        assert_eq!(meter.value(), 36_000);
    }
}
