//! Connection pool shared by [`crate::server::Server`] and
//! [`crate::client::Client`].
//!
//! An array of live connections guarded by one lock, plus a queue of exited
//! connections waiting to be purged. The lock is this crate's own FIFO
//! [`crate::mutex::Mutex`]; the cleanup queue is a plain `VecDeque` rather
//! than an intrusive list -- nothing in a safe Rust pool benefits from
//! threading the list through each entry's own storage.

use std::collections::VecDeque;

use crate::counter::Counter;
use crate::error::{FathomError, Result};
use crate::mutex::Mutex;
use crate::protocol::{Protocol, Side};
use crate::socket::SocketHandle;
use crate::tcp::RawSocketId;

/// One live connection's pool bookkeeping.
struct Entry<M, C> {
    id: u64,
    handle: SocketHandle<M, C>,
    raw_id: RawSocketId,
}

/// A connection that finished running and is waiting to be purged.
struct CleanupInfo<M, C> {
    handle: SocketHandle<M, C>,
    leftover: Vec<M>,
}

struct PoolState<M, C> {
    connections: Vec<Entry<M, C>>,
    next_id: u64,
    cleanup_queue: VecDeque<CleanupInfo<M, C>>,
    done: bool,
}

/// Bounded pool of connections, each tracked from insertion through cleanup.
pub struct Pool<M, C> {
    state: Mutex<PoolState<M, C>>,
    max: usize,
    cleanup_counter: Counter,
}

impl<M: Send + 'static, C: Send + Sync + 'static> Pool<M, C> {
    /// Create an empty pool with room for `max` connections.
    #[must_use]
    pub fn new(max: usize) -> Self {
        Self {
            state: Mutex::new(PoolState {
                connections: Vec::new(),
                next_id: 0,
                cleanup_queue: VecDeque::new(),
                done: false,
            }),
            max,
            cleanup_counter: Counter::new(),
        }
    }

    /// Configured upper bound.
    #[must_use]
    pub fn max(&self) -> usize {
        self.max
    }

    /// Barrier tracking in-flight per-connection tasks; `deinit` waits on
    /// this to drain before returning.
    #[must_use]
    pub fn cleanup_counter(&self) -> &Counter {
        &self.cleanup_counter
    }

    /// Number of live connections.
    pub async fn len(&self) -> usize {
        self.state.lock().await.connections.len()
    }

    /// Insert a new connection, rejecting with `MaxConnectionLimitExceeded`
    /// once the pool is exactly at capacity: `pool_len == max` is the reject
    /// condition, a strict upper bound rather than `>=` with slack.
    pub async fn insert(&self, handle: SocketHandle<M, C>, raw_id: RawSocketId) -> Result<u64> {
        let mut state = self.state.lock().await;
        if state.connections.len() == self.max {
            return Err(FathomError::MaxConnectionLimitExceeded(self.max));
        }
        let id = state.next_id;
        state.next_id = state.next_id.wrapping_add(1);
        state.connections.push(Entry { id, handle, raw_id });
        Ok(id)
    }

    /// Remove a connection by id, if it's still present.
    pub async fn remove(&self, id: u64) -> Option<SocketHandle<M, C>> {
        let mut state = self.state.lock().await;
        let pos = state.connections.iter().position(|e| e.id == id)?;
        Some(state.connections.remove(pos).handle)
    }

    /// Record a connection's leftover write-queue items for the next
    /// `purge()` to hand to the protocol.
    pub async fn push_cleanup(&self, handle: SocketHandle<M, C>, leftover: Vec<M>) {
        self.state
            .lock()
            .await
            .cleanup_queue
            .push_back(CleanupInfo { handle, leftover });
    }

    /// Drain the cleanup queue, calling `protocol.purge` with each exited
    /// connection's leftover messages.
    pub async fn purge<P>(&self, side: Side, protocol: &P)
    where
        P: Protocol<M, C>,
    {
        let drained: Vec<_> = self.state.lock().await.cleanup_queue.drain(..).collect();
        for info in drained {
            protocol.purge(side, &info.handle, &info.leftover).await;
        }
    }

    /// Shut down every live connection's underlying socket so its
    /// reader/writer tasks observe end-of-stream and run their own
    /// remove/close/cleanup tail.
    ///
    /// Deliberately does not remove entries from the table or call
    /// `protocol.close` itself: each connection's own task
    /// (`crate::socket::finish_pooled_connection`) is the sole owner of
    /// that sequence, whether it gets there by the peer disconnecting or by
    /// this forced shutdown. Doing it here too would call `protocol.close`
    /// twice per connection and race the table entry out from under the
    /// task that still needs it to find its own leftover messages.
    pub async fn close(&self) {
        let raw_ids: Vec<RawSocketId> = self
            .state
            .lock()
            .await
            .connections
            .iter()
            .map(|entry| entry.raw_id)
            .collect();
        for raw_id in raw_ids {
            let _ = crate::tcp::shutdown_both(raw_id);
        }
    }

    /// Set the pool's `done` flag; checked by `Server`/`Client` before
    /// accepting new work.
    pub async fn mark_done(&self) {
        self.state.lock().await.done = true;
    }

    /// Whether `mark_done` has been called.
    pub async fn is_done(&self) -> bool {
        self.state.lock().await.done
    }

    /// Least-loaded dispatch candidate: the connection with the smallest
    /// `pending()`, or `None` if the pool is empty.
    pub async fn least_loaded(&self) -> Option<(u64, SocketHandle<M, C>)>
    where
        M: Send,
        C: Send + Sync,
    {
        let state = self.state.lock().await;
        state
            .connections
            .iter()
            .min_by_key(|e| e.handle.pending())
            .map(|e| (e.id, e.handle.clone()))
    }
}
