//! Fixed-capacity, mutex-guarded MPMC queue with graceful shutdown.
//!
//! This is the write queue a [`crate::socket::Socket`] hands to its writer
//! task: a small ring buffer guarded by a `parking_lot::Mutex`, with waiting
//! readers/writers parked as plain `Waker`s rather than lock-free atomics.
//! Strict FIFO ordering among blocked pushers isn't a requirement here (that
//! guarantee belongs to [`crate::mutex::Mutex`]); what matters is that
//! nothing is ever lost: every item enqueued is eventually either drained by
//! an ordinary `pop()` or handed back by `close()`, which wakes every parked
//! task exactly once and returns whatever was still buffered.
//!
//! Capacity is chosen at construction (from `FathomConfig::write_queue_size`)
//! rather than baked into the type, so one `Client`/`Server` can run pools
//! whose per-connection queue size is a runtime knob.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll, Waker};

use parking_lot::Mutex;

use crate::error::{FathomError, Result};

struct Inner<T> {
    ring: Vec<Option<T>>,
    capacity: usize,
    head: usize,
    tail: usize,
    dead: bool,
    readers: VecDeque<Waker>,
    writers: VecDeque<Waker>,
}

impl<T> Inner<T> {
    fn len(&self) -> usize {
        self.tail.wrapping_sub(self.head)
    }
}

/// A bounded, closeable FIFO ring buffer.
pub struct Queue<T> {
    inner: Mutex<Inner<T>>,
}

impl<T> Queue<T> {
    /// Create an empty queue with room for `capacity` items. The backing
    /// ring is allocated once, here.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "Queue capacity must be non-zero");
        let mut ring = Vec::with_capacity(capacity);
        ring.resize_with(capacity, || None);
        Self {
            inner: Mutex::new(Inner {
                ring,
                capacity,
                head: 0,
                tail: 0,
                dead: false,
                readers: VecDeque::new(),
                writers: VecDeque::new(),
            }),
        }
    }

    /// Configured capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.inner.lock().capacity
    }

    /// Number of items currently buffered.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inner.lock().len()
    }

    /// Whether `close()` has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.lock().dead
    }

    /// Push one item, blocking while the ring is full.
    pub fn push(&self, item: T) -> Push<'_, T> {
        Push {
            queue: self,
            item: Some(item),
            parked: false,
        }
    }

    /// Drain every currently buffered item into `dst` (which is cleared
    /// first), blocking while the ring is empty.
    ///
    /// `dst` should be a buffer the caller reuses across calls (e.g. a
    /// writer task's batch scratch space) so draining never allocates past
    /// the first reservation.
    pub fn pop<'q, 'd>(&'q self, dst: &'d mut Vec<T>) -> Pop<'q, 'd, T> {
        Pop {
            queue: self,
            dst,
            parked: false,
        }
    }

    /// Shut the queue down: wake every parked reader/writer exactly once
    /// with a terminal error, make all future push/pop calls fail
    /// immediately, and hand back whatever was still sitting in the ring
    /// unpopped, in FIFO order. A no-op returning an empty `Vec` if already
    /// closed.
    pub fn close(&self) -> Vec<T> {
        let (readers, writers, drained) = {
            let mut inner = self.inner.lock();
            if inner.dead {
                return Vec::new();
            }
            inner.dead = true;
            let mut drained = Vec::new();
            let capacity = inner.capacity;
            while inner.head != inner.tail {
                let idx = inner.head % capacity;
                if let Some(item) = inner.ring[idx].take() {
                    drained.push(item);
                }
                inner.head = inner.head.wrapping_add(1);
            }
            (
                std::mem::take(&mut inner.readers),
                std::mem::take(&mut inner.writers),
                drained,
            )
        };
        for waker in readers {
            waker.wake();
        }
        for waker in writers {
            waker.wake();
        }
        drained
    }
}

/// Future returned by [`Queue::push`].
#[must_use = "futures do nothing unless awaited"]
pub struct Push<'q, T> {
    queue: &'q Queue<T>,
    item: Option<T>,
    parked: bool,
}

// `Push` never pins its fields to an address -- `item` is only ever moved
// out whole, never projected through a `Pin`, so it's sound to let the
// future be `Unpin` regardless of whether `T` is.
impl<T> Unpin for Push<'_, T> {}

impl<T> Future for Push<'_, T> {
    type Output = Result<()>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let to_wake;
        {
            let mut inner = this.queue.inner.lock();
            if inner.dead {
                return Poll::Ready(Err(if this.parked {
                    FathomError::OperationCancelled
                } else {
                    FathomError::AlreadyShutdown
                }));
            }
            if inner.len() < inner.capacity {
                let item = this.item.take().expect("Push polled after completion");
                let idx = inner.tail % inner.capacity;
                inner.ring[idx] = Some(item);
                inner.tail = inner.tail.wrapping_add(1);
                to_wake = inner.readers.pop_front();
            } else {
                inner.writers.push_back(cx.waker().clone());
                this.parked = true;
                return Poll::Pending;
            }
        }
        if let Some(waker) = to_wake {
            waker.wake();
        }
        Poll::Ready(Ok(()))
    }
}

/// Future returned by [`Queue::pop`].
#[must_use = "futures do nothing unless awaited"]
pub struct Pop<'q, 'd, T> {
    queue: &'q Queue<T>,
    dst: &'d mut Vec<T>,
    parked: bool,
}

impl<T> Future for Pop<'_, '_, T> {
    type Output = Result<usize>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let mut to_wake: Vec<Waker> = Vec::new();
        let drained;
        {
            let mut inner = this.queue.inner.lock();
            if inner.dead {
                // Don't leave a stale, already-drained batch sitting in
                // `dst` from a prior successful pop -- the caller would
                // otherwise see it reported twice (once as delivered, once
                // as leftover).
                this.dst.clear();
                return Poll::Ready(Err(if this.parked {
                    FathomError::OperationCancelled
                } else {
                    FathomError::AlreadyShutdown
                }));
            }
            if inner.len() == 0 {
                inner.readers.push_back(cx.waker().clone());
                this.parked = true;
                return Poll::Pending;
            }
            this.dst.clear();
            let mut n = 0;
            let capacity = inner.capacity;
            while inner.head != inner.tail {
                let idx = inner.head % capacity;
                if let Some(item) = inner.ring[idx].take() {
                    this.dst.push(item);
                    n += 1;
                }
                inner.head = inner.head.wrapping_add(1);
            }
            drained = n;
            to_wake.extend(inner.writers.drain(..));
        }
        for waker in to_wake {
            waker.wake();
        }
        Poll::Ready(Ok(drained))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[compio::test]
    async fn push_then_pop_preserves_order() {
        let queue: Queue<u32> = Queue::new(4);
        queue.push(1).await.unwrap();
        queue.push(2).await.unwrap();
        queue.push(3).await.unwrap();

        let mut dst = Vec::with_capacity(4);
        let n = queue.pop(&mut dst).await.unwrap();
        assert_eq!(n, 3);
        assert_eq!(dst, vec![1, 2, 3]);
    }

    #[compio::test]
    async fn push_blocks_when_full_until_pop_drains() {
        use std::sync::Arc;

        let queue: Arc<Queue<u32>> = Arc::new(Queue::new(2));
        queue.push(1).await.unwrap();
        queue.push(2).await.unwrap();

        let pusher = {
            let queue = queue.clone();
            compio::runtime::spawn(async move { queue.push(3).await })
        };

        compio::time::sleep(std::time::Duration::from_millis(5)).await;
        let mut dst = Vec::with_capacity(2);
        queue.pop(&mut dst).await.unwrap();
        assert_eq!(dst, vec![1, 2]);

        pusher.await.unwrap().unwrap();
        let mut dst2 = Vec::with_capacity(2);
        queue.pop(&mut dst2).await.unwrap();
        assert_eq!(dst2, vec![3]);
    }

    #[compio::test]
    async fn close_wakes_parked_pop_with_operation_cancelled() {
        use std::sync::Arc;

        let queue: Arc<Queue<u32>> = Arc::new(Queue::new(1));
        let waiter = {
            let queue = queue.clone();
            compio::runtime::spawn(async move {
                let mut dst = Vec::new();
                queue.pop(&mut dst).await
            })
        };
        compio::time::sleep(std::time::Duration::from_millis(5)).await;
        queue.close();
        let result = waiter.await.unwrap();
        assert!(matches!(result, Err(FathomError::OperationCancelled)));
    }

    #[compio::test]
    async fn push_after_close_is_already_shutdown() {
        let queue: Queue<u32> = Queue::new(1);
        queue.close();
        let result = queue.push(1).await;
        assert!(matches!(result, Err(FathomError::AlreadyShutdown)));
    }

    #[compio::test]
    async fn close_returns_whatever_was_still_buffered() {
        let queue: Queue<u32> = Queue::new(4);
        queue.push(1).await.unwrap();
        queue.push(2).await.unwrap();
        queue.push(3).await.unwrap();

        let abandoned = queue.close();
        assert_eq!(abandoned, vec![1, 2, 3]);

        // Second call is a no-op, not a re-drain.
        assert_eq!(queue.close(), Vec::<u32>::new());
    }

    #[compio::test]
    async fn pop_after_close_never_resurfaces_a_prior_batch() {
        let queue: Queue<u32> = Queue::new(4);
        queue.push(1).await.unwrap();
        queue.push(2).await.unwrap();

        let mut dst = Vec::new();
        queue.pop(&mut dst).await.unwrap();
        assert_eq!(dst, vec![1, 2]);

        queue.close();
        let err = queue.pop(&mut dst).await.unwrap_err();
        assert!(matches!(err, FathomError::AlreadyShutdown));
        assert!(dst.is_empty());
    }

    #[test]
    fn close_is_idempotent() {
        let queue: Queue<u32> = Queue::new(1);
        queue.close();
        queue.close();
    }
}
