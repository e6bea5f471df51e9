use crate::error::PushError;
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Buffer contents and the shutdown flag, guarded by one lock
struct State<T> {
    items: VecDeque<T>,
    shut_down: bool,
}

struct Shared<T> {
    state: Mutex<State<T>>,
    /// Signalled when an item is pushed or on shutdown
    not_empty: Condvar,
    /// Signalled when an item is removed, on clear, or on shutdown
    not_full: Condvar,
    capacity: usize,
}

/// A fixed-capacity FIFO queue with blocking, timeout-bounded push and pop.
///
/// Cloning yields another handle to the same queue. Once [`shutdown`] has been
/// called no push can succeed again, but items already buffered can still be
/// drained with [`dequeue`].
///
/// A timeout of [`Duration::ZERO`] means "wait indefinitely".
///
/// [`shutdown`]: BoundedQueue::shutdown
/// [`dequeue`]: BoundedQueue::dequeue
pub struct BoundedQueue<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for BoundedQueue<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> fmt::Debug for BoundedQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedQueue")
            .field("stats", &self.stats())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

/// Point-in-time view of a queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStats {
    pub current_size: usize,
    pub capacity: usize,
    pub is_full: bool,
    pub is_empty: bool,
}

impl QueueStats {
    /// Fill level as a percentage (0-100)
    pub fn utilization(&self) -> u32 {
        ((self.current_size * 100) / self.capacity).min(100) as u32
    }
}

/// `None` means no deadline
fn deadline_after(timeout: Duration) -> Option<Instant> {
    if timeout.is_zero() {
        None
    } else {
        Instant::now().checked_add(timeout)
    }
}

/// Park on `cvar` until notified or `deadline` passes. Returns false on timeout.
fn park<T>(cvar: &Condvar, guard: &mut MutexGuard<'_, State<T>>, deadline: Option<Instant>) -> bool {
    match deadline {
        Some(deadline) => !cvar.wait_until(guard, deadline).timed_out(),
        None => {
            cvar.wait(guard);
            true
        }
    }
}

impl<T> BoundedQueue<T> {
    /// Create a new queue holding at most `capacity` items
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "queue capacity must be non-zero");
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    items: VecDeque::with_capacity(capacity.min(1024)),
                    shut_down: false,
                }),
                not_empty: Condvar::new(),
                not_full: Condvar::new(),
                capacity,
            }),
        }
    }

    /// Append `item`, waiting up to `timeout` for room.
    ///
    /// Fails with [`PushError::ShutDown`] as soon as the queue is shut down,
    /// even if there is room, and with [`PushError::Timeout`] if no room
    /// appeared in time. The item is returned inside the error.
    pub fn enqueue(&self, item: T, timeout: Duration) -> Result<(), PushError<T>> {
        let deadline = deadline_after(timeout);
        let mut state = self.shared.state.lock();
        let mut timed_out = false;
        loop {
            if state.shut_down {
                return Err(PushError::ShutDown(item));
            }
            if state.items.len() < self.shared.capacity {
                state.items.push_back(item);
                drop(state);
                self.shared.not_empty.notify_one();
                return Ok(());
            }
            if timed_out {
                return Err(PushError::Timeout(item));
            }
            timed_out = !park(&self.shared.not_full, &mut state, deadline);
        }
    }

    /// Append `item` only if there is room right now
    pub fn try_enqueue(&self, item: T) -> Result<(), PushError<T>> {
        let mut state = self.shared.state.lock();
        if state.shut_down {
            return Err(PushError::ShutDown(item));
        }
        if state.items.len() >= self.shared.capacity {
            return Err(PushError::Timeout(item));
        }
        state.items.push_back(item);
        drop(state);
        self.shared.not_empty.notify_one();
        Ok(())
    }

    /// Remove the front item, waiting up to `timeout` for one to arrive.
    ///
    /// Buffered items are returned even after shutdown. Returns `None` on
    /// timeout, or immediately once the queue is shut down and empty.
    pub fn dequeue(&self, timeout: Duration) -> Option<T> {
        let deadline = deadline_after(timeout);
        let mut state = self.shared.state.lock();
        let mut timed_out = false;
        loop {
            if let Some(item) = state.items.pop_front() {
                drop(state);
                self.shared.not_full.notify_one();
                return Some(item);
            }
            if state.shut_down || timed_out {
                return None;
            }
            timed_out = !park(&self.shared.not_empty, &mut state, deadline);
        }
    }

    /// Remove the front item if there is one, without waiting
    pub fn try_dequeue(&self) -> Option<T> {
        let item = self.shared.state.lock().items.pop_front();
        if item.is_some() {
            self.shared.not_full.notify_one();
        }
        item
    }

    /// Number of buffered items
    pub fn len(&self) -> usize {
        self.shared.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.state.lock().items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.shared.state.lock().items.len() >= self.shared.capacity
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Discard every buffered item and wake producers waiting for room
    pub fn clear(&self) {
        self.shared.state.lock().items.clear();
        self.shared.not_full.notify_all();
    }

    /// Shut the queue down. Idempotent and irreversible.
    ///
    /// Every blocked producer and consumer is woken; producers fail, consumers
    /// drain whatever is left and then get `None`.
    pub fn shutdown(&self) {
        self.shared.state.lock().shut_down = true;
        self.shared.not_empty.notify_all();
        self.shared.not_full.notify_all();
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.state.lock().shut_down
    }

    /// Snapshot of size and capacity taken under a single lock
    pub fn stats(&self) -> QueueStats {
        let state = self.shared.state.lock();
        let current_size = state.items.len();
        QueueStats {
            current_size,
            capacity: self.shared.capacity,
            is_full: current_size >= self.shared.capacity,
            is_empty: current_size == 0,
        }
    }
}

impl<T: Clone> BoundedQueue<T> {
    /// Copy of the front item without removing it
    pub fn peek(&self) -> Option<T> {
        self.shared.state.lock().items.front().cloned()
    }
}
