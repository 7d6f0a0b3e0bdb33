//! Sequentially consistent atomic word.
//!
//! Every reference count in the crate goes through [`Atomic`] rather than a
//! bare `AtomicU32` with per-call orderings. All operations are `SeqCst`: a
//! thread that observes a strong count of zero is guaranteed no other thread
//! can subsequently resurrect the object. This trades some throughput for a
//! memory model that is simple to reason about.

use std::sync::atomic::{AtomicU32, Ordering};

/// A 32-bit machine word with sequentially consistent operations.
#[derive(Debug, Default)]
pub struct Atomic(AtomicU32);

impl Atomic {
    /// Create a new word with the given initial value.
    #[inline]
    pub const fn new(value: u32) -> Self {
        Atomic(AtomicU32::new(value))
    }

    /// Load the current value.
    #[inline]
    pub fn load(&self) -> u32 {
        self.0.load(Ordering::SeqCst)
    }

    /// Store a new value.
    #[inline]
    pub fn store(&self, value: u32) {
        self.0.store(value, Ordering::SeqCst)
    }

    /// Replace the value, returning the previous one.
    #[inline]
    pub fn exchange(&self, value: u32) -> u32 {
        self.0.swap(value, Ordering::SeqCst)
    }

    /// Compare-and-swap: if the current value equals `expected`, store
    /// `desired` and return `Ok(expected)`; otherwise return `Err(current)`.
    #[inline]
    pub fn compare_and_swap(&self, expected: u32, desired: u32) -> std::result::Result<u32, u32> {
        self.0
            .compare_exchange(expected, desired, Ordering::SeqCst, Ordering::SeqCst)
    }

    /// Add, returning the previous value.
    #[inline]
    pub fn fetch_add(&self, value: u32) -> u32 {
        self.0.fetch_add(value, Ordering::SeqCst)
    }

    /// Subtract, returning the previous value.
    #[inline]
    pub fn fetch_sub(&self, value: u32) -> u32 {
        self.0.fetch_sub(value, Ordering::SeqCst)
    }

    /// Bitwise and, returning the previous value.
    #[inline]
    pub fn fetch_and(&self, value: u32) -> u32 {
        self.0.fetch_and(value, Ordering::SeqCst)
    }

    /// Bitwise or, returning the previous value.
    #[inline]
    pub fn fetch_or(&self, value: u32) -> u32 {
        self.0.fetch_or(value, Ordering::SeqCst)
    }

    /// Bitwise xor, returning the previous value.
    #[inline]
    pub fn fetch_xor(&self, value: u32) -> u32 {
        self.0.fetch_xor(value, Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_store_exchange() {
        let a = Atomic::new(7);
        assert_eq!(a.load(), 7);
        a.store(11);
        assert_eq!(a.exchange(13), 11);
        assert_eq!(a.load(), 13);
    }

    #[test]
    fn test_compare_and_swap() {
        let a = Atomic::new(1);
        assert_eq!(a.compare_and_swap(1, 2), Ok(1));
        assert_eq!(a.compare_and_swap(1, 3), Err(2));
        assert_eq!(a.load(), 2);
    }

    #[test]
    fn test_fetch_arithmetic() {
        let a = Atomic::new(0b1100);
        assert_eq!(a.fetch_add(1), 0b1100);
        assert_eq!(a.fetch_sub(1), 0b1101);
        assert_eq!(a.fetch_and(0b1000), 0b1100);
        assert_eq!(a.fetch_or(0b0011), 0b1000);
        assert_eq!(a.fetch_xor(0b1111), 0b1011);
        assert_eq!(a.load(), 0b0100);
    }

    #[test]
    fn test_concurrent_increment() {
        use std::sync::Arc;
        use std::thread;

        let a = Arc::new(Atomic::new(0));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let a = Arc::clone(&a);
                thread::spawn(move || {
                    for _ in 0..1000 {
                        a.fetch_add(1);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(a.load(), 8000);
    }
}
