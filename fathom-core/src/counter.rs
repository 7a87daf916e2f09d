//! Drain barrier: an atomic signed counter paired with an [`Event`].
//!
//! Used to track in-flight work (outstanding reader/writer tasks, open
//! connections) and let a shutdown path wait until that count reaches zero.

use std::sync::atomic::{AtomicI64, Ordering};

use crate::event::Event;

/// A signed counter that notifies a single waiter whenever it lands on zero.
///
/// The value is allowed to go negative transiently (a decrement observed
/// before its matching increment), which is why the counter is signed rather
/// than unsigned; callers that only ever pair increments with decrements
/// never see a negative value settle.
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicI64,
    event: Event,
}

impl Counter {
    /// Start at zero.
    #[must_use]
    pub fn new() -> Self {
        Self {
            value: AtomicI64::new(0),
            event: Event::new(),
        }
    }

    /// Add `delta` (negative to decrement) and notify the waiter if the
    /// result lands exactly on zero.
    pub fn add(&self, delta: i64) -> i64 {
        // `fetch_add` is already a single atomic RMW, so it gives us the
        // same "read, compute, commit" guarantee a hand-rolled CAS loop
        // would, without the retry loop.
        let prev = self.value.fetch_add(delta, Ordering::AcqRel);
        let new = prev + delta;
        if new == 0 {
            self.event.notify();
        }
        new
    }

    /// Increment by one.
    pub fn increment(&self) -> i64 {
        self.add(1)
    }

    /// Decrement by one.
    pub fn decrement(&self) -> i64 {
        self.add(-1)
    }

    /// Current value.
    #[must_use]
    pub fn get(&self) -> i64 {
        self.value.load(Ordering::Acquire)
    }

    /// Wait until the counter is observed at or below zero.
    ///
    /// Returns immediately if that's already true. Otherwise parks on the
    /// internal event and re-checks on wake, since the value may have moved
    /// away from zero again between the notification firing and this task
    /// being polled.
    pub async fn wait(&self) {
        loop {
            if self.value.load(Ordering::Acquire) <= 0 {
                return;
            }
            self.event.wait().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn add_tracks_value() {
        let counter = Counter::new();
        assert_eq!(counter.add(3), 3);
        assert_eq!(counter.add(-1), 2);
        assert_eq!(counter.get(), 2);
    }

    #[compio::test]
    async fn wait_returns_immediately_at_zero() {
        let counter = Counter::new();
        counter.wait().await;
    }

    #[compio::test]
    async fn wait_blocks_until_drained() {
        let counter = Arc::new(Counter::new());
        counter.add(2);
        let waiter = {
            let counter = counter.clone();
            compio::runtime::spawn(async move {
                counter.wait().await;
            })
        };
        compio::time::sleep(std::time::Duration::from_millis(5)).await;
        counter.add(-1);
        counter.add(-1);
        waiter.await.unwrap();
        assert_eq!(counter.get(), 0);
    }
}
