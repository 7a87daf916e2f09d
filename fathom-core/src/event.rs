//! Single-waiter suspension primitive.
//!
//! `Event` parks exactly one task at a time. A second, concurrent `wait()`
//! call is a caller bug, not a race to be resolved gracefully -- every other
//! primitive in this crate (`Counter`, `Queue`, `Mutex`) either owns its
//! `Event` privately or arranges at most one parked reader/writer, so the
//! single-waiter contract is never actually exercised by more than one task.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU8, Ordering};
use std::task::{Context, Poll, Waker};

use parking_lot::Mutex;

const EMPTY: u8 = 0;
const WAITING: u8 = 1;
const NOTIFIED: u8 = 2;

/// A latch that wakes at most one parked task.
///
/// `notify()` is sticky when called before anyone is waiting: the next
/// `wait()` observes it and returns immediately without parking. A second
/// `notify()` with nobody parked and the latch already set is a no-op.
#[derive(Debug, Default)]
pub struct Event {
    state: AtomicU8,
    waker: Mutex<Option<Waker>>,
}

impl Event {
    /// Create an unset event.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(EMPTY),
            waker: Mutex::new(None),
        }
    }

    /// Park until the next `notify()`, or return immediately if one already
    /// landed.
    pub fn wait(&self) -> Wait<'_> {
        Wait { event: self }
    }

    /// Wake the parked task, or latch the notification if nobody is parked
    /// yet.
    pub fn notify(&self) {
        loop {
            match self.state.load(Ordering::Acquire) {
                EMPTY => {
                    if self
                        .state
                        .compare_exchange(EMPTY, NOTIFIED, Ordering::Release, Ordering::Acquire)
                        .is_ok()
                    {
                        return;
                    }
                }
                WAITING => {
                    if self
                        .state
                        .compare_exchange(WAITING, NOTIFIED, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        if let Some(waker) = self.waker.lock().take() {
                            waker.wake();
                        }
                        return;
                    }
                }
                NOTIFIED => return,
                other => unreachable!("Event: invalid state {other}"),
            }
        }
    }
}

/// Future returned by [`Event::wait`].
#[must_use = "futures do nothing unless awaited"]
pub struct Wait<'e> {
    event: &'e Event,
}

impl Future for Wait<'_> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let event = self.event;

        if event.state.load(Ordering::Acquire) == NOTIFIED
            && event
                .state
                .compare_exchange(NOTIFIED, EMPTY, Ordering::Acquire, Ordering::Acquire)
                .is_ok()
        {
            return Poll::Ready(());
        }

        *event.waker.lock() = Some(cx.waker().clone());

        match event
            .state
            .compare_exchange(EMPTY, WAITING, Ordering::Release, Ordering::Acquire)
        {
            Ok(_) => Poll::Pending,
            Err(NOTIFIED) => {
                if event
                    .state
                    .compare_exchange(NOTIFIED, EMPTY, Ordering::Acquire, Ordering::Acquire)
                    .is_ok()
                {
                    Poll::Ready(())
                } else {
                    Poll::Pending
                }
            }
            // Already parked from an earlier poll of this same future (a
            // combinator like `select!` can re-poll a pending branch on
            // every wake). The waker slot above was just refreshed, so
            // there's nothing else to do.
            Err(WAITING) => Poll::Pending,
            Err(other) => unreachable!("Event: invalid state {other}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn notify_before_wait_is_latched() {
        let event = Event::new();
        event.notify();
        // A single poll must observe the latch without a waker ever firing.
        let fut = event.wait();
        futures::pin_mut!(fut);
        let waker = futures::task::noop_waker();
        let mut cx = Context::from_waker(&waker);
        assert_eq!(fut.poll(&mut cx), Poll::Ready(()));
    }

    #[test]
    fn double_notify_is_idempotent() {
        let event = Event::new();
        event.notify();
        event.notify();
        let fut = event.wait();
        futures::pin_mut!(fut);
        let waker = futures::task::noop_waker();
        let mut cx = Context::from_waker(&waker);
        assert_eq!(fut.poll(&mut cx), Poll::Ready(()));
    }

    #[compio::test]
    async fn wait_wakes_on_notify_from_another_task() {
        let event = Arc::new(Event::new());
        let waiter = {
            let event = event.clone();
            compio::runtime::spawn(async move {
                event.wait().await;
            })
        };
        compio::time::sleep(std::time::Duration::from_millis(5)).await;
        event.notify();
        waiter.await.unwrap();
    }
}
