//! Bounded multi-level priority queue with backpressure and cancellation.
//!
//! Five FIFO levels (priority 1 = highest .. 5 = lowest). Dequeue scans
//! levels in priority order; within a level, strict FIFO. The queue has a
//! single overall capacity; on overflow, the lowest-priority non-empty
//! level sheds its oldest entry to make room for the new one.

use std::collections::VecDeque;
use std::sync::Mutex;

use tokio::sync::Notify;

const LEVELS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DequeueError {
    Cancelled,
    Timeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Overflow;

/// What the queue needs to know about an item: its priority level and
/// whether it is still worth delivering. Implemented by [`crate::request::Request`]
/// directly, and by any wrapper (e.g. a request bundled with its reply channel).
pub trait Queueable: Send {
    fn priority(&self) -> u8;
    fn is_expired(&self) -> bool;
    fn is_cancelled(&self) -> bool;
}

impl Queueable for crate::request::Request {
    fn priority(&self) -> u8 {
        self.priority
    }
    fn is_expired(&self) -> bool {
        crate::request::Request::is_expired(self)
    }
    fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

struct Inner<T: Queueable> {
    levels: [VecDeque<T>; LEVELS],
    len: usize,
}

fn level_index(priority: u8) -> usize {
    (priority.clamp(1, 5) - 1) as usize
}

/// Shared, `Send + Sync` priority queue. Wrap in `Arc` at the call site to
/// share across workers.
pub struct PriorityQueue<T: Queueable> {
    capacity: usize,
    inner: Mutex<Inner<T>>,
    notify: Notify,
}

impl<T: Queueable> PriorityQueue<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(Inner {
                levels: Default::default(),
                len: 0,
            }),
            notify: Notify::new(),
        }
    }

    /// Enqueues `request`. If the queue is at capacity, the oldest entry in
    /// the lowest-priority non-empty level is dropped to make room; if the
    /// queue is empty of lower-priority work (i.e. `request` itself is the
    /// lowest priority and the queue is still full), the new request is
    /// rejected with [`Overflow`].
    pub fn enqueue(&self, item: T) -> Result<(), Overflow> {
        let mut inner = self.inner.lock().unwrap();
        if inner.len >= self.capacity {
            let incoming_level = level_index(item.priority());
            let shed_level = (0..LEVELS)
                .rev()
                .find(|&lvl| lvl > incoming_level && !inner.levels[lvl].is_empty());
            match shed_level {
                Some(lvl) => {
                    inner.levels[lvl].pop_front();
                    inner.len -= 1;
                }
                None => return Err(Overflow),
            }
        }
        let level = level_index(item.priority());
        inner.levels[level].push_back(item);
        inner.len += 1;
        drop(inner);
        self.notify.notify_one();
        Ok(())
    }

    /// Pops the next eligible item: scans levels 1..=5 in order, skips any
    /// entry that is expired or cancelled, and returns the first live one.
    /// Blocks until an entry is available or `wait_timeout` elapses.
    pub async fn dequeue(&self, wait_timeout: std::time::Duration) -> Result<T, DequeueError> {
        let deadline = tokio::time::Instant::now() + wait_timeout;
        loop {
            if let Some(item) = self.try_pop() {
                return Ok(item);
            }
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return Err(DequeueError::Timeout);
            }
            tokio::select! {
                _ = self.notify.notified() => {}
                _ = tokio::time::sleep(remaining) => {
                    return Err(DequeueError::Timeout);
                }
            }
        }
    }

    fn try_pop(&self) -> Option<T> {
        let mut inner = self.inner.lock().unwrap();
        for level in 0..LEVELS {
            while let Some(front) = inner.levels[level].front() {
                if front.is_expired() || front.is_cancelled() {
                    inner.levels[level].pop_front();
                    inner.len -= 1;
                    continue;
                }
                let item = inner.levels[level].pop_front().unwrap();
                inner.len -= 1;
                return Some(item);
            }
        }
        None
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
