//! FIFO-fair async mutex.
//!
//! Built by hand rather than wrapping an off-the-shelf async lock because
//! strict acquisition order is a tested invariant here, not an incidental
//! property: the socket runtime relies on it so a burst of concurrent
//! `write()` callers is served in arrival order rather than whichever task
//! the executor happens to poll first.
//!
//! The lock never reports itself unlocked while a waiter is queued --
//! `release()` hands ownership directly to the front of the line instead of
//! clearing the flag and letting everyone race for it. That invariant is
//! what makes the plain `!locked` check in `poll` sufficient for fairness.

#![allow(unsafe_code)]

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use std::collections::VecDeque;
use std::cell::UnsafeCell;
use std::ops::{Deref, DerefMut};

use parking_lot::Mutex as SyncMutex;

struct Waiter {
    waker: SyncMutex<Option<Waker>>,
    granted: AtomicBool,
}

struct State {
    locked: bool,
    waiters: VecDeque<Arc<Waiter>>,
}

/// A mutual-exclusion lock that grants access in strict FIFO order.
pub struct Mutex<T> {
    state: SyncMutex<State>,
    value: UnsafeCell<T>,
}

// SAFETY: `value` is only ever accessed through a `MutexGuard`, which exists
// only while `state.locked` is held on this instance's behalf.
unsafe impl<T: Send> Send for Mutex<T> {}
unsafe impl<T: Send> Sync for Mutex<T> {}

impl<T> Mutex<T> {
    /// Wrap `value` in an unlocked mutex.
    pub fn new(value: T) -> Self {
        Self {
            state: SyncMutex::new(State {
                locked: false,
                waiters: VecDeque::new(),
            }),
            value: UnsafeCell::new(value),
        }
    }

    /// Acquire the lock, queueing behind any already-waiting task.
    pub fn lock(&self) -> Acquire<'_, T> {
        Acquire {
            mutex: self,
            waiter: None,
        }
    }

    fn release(&self) {
        let to_wake;
        {
            let mut state = self.state.lock();
            if let Some(next) = state.waiters.pop_front() {
                next.granted.store(true, Ordering::Release);
                to_wake = next.waker.lock().take();
                // `locked` stays true: ownership transferred directly to `next`.
            } else {
                state.locked = false;
                to_wake = None;
            }
        }
        if let Some(waker) = to_wake {
            waker.wake();
        }
    }
}

/// Future returned by [`Mutex::lock`].
#[must_use = "futures do nothing unless awaited"]
pub struct Acquire<'m, T> {
    mutex: &'m Mutex<T>,
    waiter: Option<Arc<Waiter>>,
}

impl<'m, T> Future for Acquire<'m, T> {
    type Output = MutexGuard<'m, T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        if let Some(waiter) = &this.waiter {
            if waiter.granted.load(Ordering::Acquire) {
                return Poll::Ready(MutexGuard { mutex: this.mutex });
            }
            *waiter.waker.lock() = Some(cx.waker().clone());
            return Poll::Pending;
        }

        let mut state = this.mutex.state.lock();
        if !state.locked {
            state.locked = true;
            return Poll::Ready(MutexGuard { mutex: this.mutex });
        }
        let waiter = Arc::new(Waiter {
            waker: SyncMutex::new(Some(cx.waker().clone())),
            granted: AtomicBool::new(false),
        });
        state.waiters.push_back(waiter.clone());
        this.waiter = Some(waiter);
        Poll::Pending
    }
}

impl<T> Drop for Acquire<'_, T> {
    fn drop(&mut self) {
        let Some(waiter) = self.waiter.take() else {
            return;
        };
        if waiter.granted.load(Ordering::Acquire) {
            // We were handed the lock but never materialized a guard
            // (cancelled between grant and poll); release on our behalf so
            // the next waiter isn't stuck forever.
            self.mutex.release();
        } else {
            self.mutex
                .state
                .lock()
                .waiters
                .retain(|w| !Arc::ptr_eq(w, &waiter));
        }
    }
}

/// RAII guard releasing the lock (and handing it to the next waiter) on drop.
pub struct MutexGuard<'m, T> {
    mutex: &'m Mutex<T>,
}

impl<T> Deref for MutexGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        // SAFETY: holding a `MutexGuard` proves exclusive access.
        unsafe { &*self.mutex.value.get() }
    }
}

impl<T> DerefMut for MutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: holding a `MutexGuard` proves exclusive access.
        unsafe { &mut *self.mutex.value.get() }
    }
}

impl<T> Drop for MutexGuard<'_, T> {
    fn drop(&mut self) {
        self.mutex.release();
    }
}
