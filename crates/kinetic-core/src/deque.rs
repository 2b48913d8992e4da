//! A bounded, blocking double-ended queue.
//!
//! Used as an assist worker's local task queue: the owner pushes and pops
//! from the front, peers steal from the back. Backed by a
//! `parking_lot::Mutex<VecDeque<T>>` rather than `crossbeam-deque`, since
//! the latter's `Worker`/`Stealer` pair is unbounded and this queue needs
//! backpressure at a fixed capacity.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

struct State<T> {
    items: VecDeque<T>,
    capacity: usize,
}

/// A fixed-capacity deque shared between one owner thread (front access)
/// and any number of peer threads (back access only).
pub struct BoundedDeque<T> {
    state: Mutex<State<T>>,
    not_full: Condvar,
}

impl<T> BoundedDeque<T> {
    /// Create an empty deque with room for `capacity` items.
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(State {
                items: VecDeque::with_capacity(capacity.min(1024)),
                capacity,
            }),
            not_full: Condvar::new(),
        }
    }

    /// Push to the front without blocking. On success returns `None`; if
    /// the deque is already at capacity, hands the item back so the
    /// caller can retry (e.g. via a blocking push) instead of losing it.
    pub fn push_front_try(&self, item: T) -> Option<T> {
        let mut state = self.state.lock();
        if state.items.len() >= state.capacity {
            return Some(item);
        }
        state.items.push_front(item);
        None
    }

    /// Push to the front, blocking until room is available or `timeout`
    /// elapses. Returns the item back on timeout, `None` on success.
    pub fn push_front_blocking(&self, item: T, timeout: Duration) -> Option<T> {
        let mut state = self.state.lock();
        let mut remaining = timeout;
        loop {
            if state.items.len() < state.capacity {
                state.items.push_front(item);
                return None;
            }
            if remaining.is_zero() {
                return Some(item);
            }
            let started = Instant::now();
            let result = self.not_full.wait_for(&mut state, remaining);
            if result.timed_out() {
                return Some(item);
            }
            remaining = remaining.saturating_sub(started.elapsed());
        }
    }

    /// Push to the front, blocking indefinitely until room is available.
    ///
    /// This is the second half of the assist worker's non-blocking-then-
    /// blocking assignment protocol (see `assist_worker.rs`): once the
    /// listener has been notified that capacity was reached, the
    /// submitter simply waits out the backpressure.
    pub fn push_front_blocking_forever(&self, item: T) {
        let mut state = self.state.lock();
        let mut item = item;
        loop {
            if state.items.len() < state.capacity {
                state.items.push_front(item);
                return;
            }
            self.not_full.wait(&mut state);
            // `item` survives the wait untouched; loop re-checks capacity.
            let _ = &item;
        }
    }

    /// Pop from the front without blocking. This is the owner's primary
    /// drain operation.
    pub fn pop_front(&self) -> Option<T> {
        let mut state = self.state.lock();
        let item = state.items.pop_front();
        if item.is_some() {
            drop(state);
            self.not_full.notify_one();
        }
        item
    }

    /// Pop from the back without blocking. This is how a peer steals work.
    pub fn pop_back_try(&self) -> Option<T> {
        let mut state = self.state.lock();
        let item = state.items.pop_back();
        if item.is_some() {
            drop(state);
            self.not_full.notify_one();
        }
        item
    }

    /// Number of items currently queued.
    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    /// `true` if no items are queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The fixed capacity this deque was created with.
    pub fn capacity(&self) -> usize {
        self.state.lock().capacity
    }
}
