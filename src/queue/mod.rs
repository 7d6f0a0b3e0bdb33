//! Lock-free FIFO queues.
//!
//! Two contracts with different concurrency envelopes:
//!
//! - [`spsc::queue`]: a wait-free single-producer/single-consumer channel.
//!   The producer and consumer ends are separate owned types, so the
//!   one-thread-per-end contract is enforced by the type system instead of
//!   by documentation.
//! - [`LockFreeQueue`]: a multi-producer/multi-consumer unbounded FIFO.
//!
//! Neither queue blocks. `push` always succeeds (the queues grow); `pop`
//! reports momentary emptiness with `None`. Elements are never lost and
//! never delivered twice.

pub mod spsc;

use crossbeam_queue::SegQueue;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Unbounded multi-producer/multi-consumer FIFO.
///
/// Pushes that the queue perceives as ordered come out in that order;
/// concurrent pushes are ordered by whichever thread wins the internal
/// race. Clone-free: share it behind an `Arc` (or a
/// [`Sp`](crate::object::Sp)-managed owner).
pub struct LockFreeQueue<T> {
    inner: SegQueue<T>,
    /// Advisory element count. Updated after the fact, so it may lag the
    /// queue's true state under contention; use only for monitoring.
    len: AtomicUsize,
}

impl<T> LockFreeQueue<T> {
    /// Create an empty queue.
    pub fn new() -> Self {
        LockFreeQueue {
            inner: SegQueue::new(),
            len: AtomicUsize::new(0),
        }
    }

    /// Append an element. Always succeeds; the queue grows as needed.
    pub fn push(&self, value: T) {
        self.inner.push(value);
        self.len.fetch_add(1, Ordering::SeqCst);
    }

    /// Remove the oldest element, or `None` if the queue is momentarily
    /// empty. Emptiness here is not an error.
    pub fn pop(&self) -> Option<T> {
        let value = self.inner.pop()?;
        self.len.fetch_sub(1, Ordering::SeqCst);
        Some(value)
    }

    /// Advisory element count; may be stale the moment it returns.
    pub fn len(&self) -> usize {
        self.len.load(Ordering::SeqCst)
    }

    /// Advisory emptiness check; see [`len`](Self::len).
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drain every element currently reachable, dropping each one.
    ///
    /// Elements pushed concurrently with `clear` may survive it.
    pub fn clear(&self) {
        while self.pop().is_some() {}
    }
}

impl<T> Default for LockFreeQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for LockFreeQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockFreeQueue")
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_fifo_single_thread() {
        let q = LockFreeQueue::new();
        assert!(q.is_empty());
        for i in 0..100 {
            q.push(i);
        }
        assert_eq!(q.len(), 100);
        for i in 0..100 {
            assert_eq!(q.pop(), Some(i));
        }
        assert_eq!(q.pop(), None);
        assert!(q.is_empty());
    }

    #[test]
    fn test_clear_drops_elements() {
        let q = LockFreeQueue::new();
        let payload = Arc::new(());
        for _ in 0..10 {
            q.push(Arc::clone(&payload));
        }
        assert_eq!(Arc::strong_count(&payload), 11);
        q.clear();
        assert_eq!(Arc::strong_count(&payload), 1);
        assert!(q.is_empty());
    }

    #[test]
    fn test_multi_producer_no_loss() {
        const PRODUCERS: usize = 4;
        const PER_PRODUCER: usize = 5000;

        let q = Arc::new(LockFreeQueue::new());
        let handles: Vec<_> = (0..PRODUCERS)
            .map(|p| {
                let q = Arc::clone(&q);
                thread::spawn(move || {
                    for i in 0..PER_PRODUCER {
                        q.push(p * PER_PRODUCER + i);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let mut seen = vec![false; PRODUCERS * PER_PRODUCER];
        while let Some(v) = q.pop() {
            assert!(!seen[v], "element delivered twice");
            seen[v] = true;
        }
        assert!(seen.iter().all(|&s| s), "element lost");
    }

    #[test]
    fn test_per_producer_order_preserved() {
        const PER_PRODUCER: usize = 2000;

        let q = Arc::new(LockFreeQueue::new());
        let handles: Vec<_> = (0..2u64)
            .map(|p| {
                let q = Arc::clone(&q);
                thread::spawn(move || {
                    for i in 0..PER_PRODUCER as u64 {
                        q.push((p, i));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let mut last = [None::<u64>; 2];
        while let Some((p, i)) = q.pop() {
            let prev = last[p as usize];
            assert!(prev.is_none_or(|v| v < i), "producer order violated");
            last[p as usize] = Some(i);
        }
        assert_eq!(last, [Some(PER_PRODUCER as u64 - 1); 2]);
    }
}
