//! Wait-free single-producer/single-consumer queue.
//!
//! An unbounded linked queue in the style of the classic two-pointer SPSC
//! channel: the producer owns the tail, the consumer owns the head, and the
//! only shared mutable state is the `next` link that publishes a node from
//! one side to the other. Consumed nodes are recycled through an internal
//! free list, so steady-state traffic does not touch the global allocator.
//!
//! The two ends are separate owned types returned by [`queue`]; each is
//! `Send` but the operations take `&mut self`, so the
//! one-thread-at-a-time-per-end contract is enforced at compile time.

use std::marker::PhantomData;
use std::ptr;
use std::sync::Arc;
use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};

struct Node<T> {
    /// Queue link while the node is live, free-list link once recycled.
    next: AtomicPtr<Node<T>>,
    /// `Some` between the producer's write and the consumer's take.
    value: Option<T>,
}

impl<T> Node<T> {
    fn boxed() -> *mut Node<T> {
        Box::into_raw(Box::new(Node {
            next: AtomicPtr::new(ptr::null_mut()),
            value: None,
        }))
    }
}

/// State shared by the two ends. The head always points at a stub node
/// whose value has already been taken; elements live in the nodes behind
/// it. The free list is a Treiber stack with exactly one pusher (the
/// consumer) and one popper (the producer), which rules out ABA.
struct Shared<T> {
    /// Current stub. Written only by the consumer; read at drop time.
    head: AtomicPtr<Node<T>>,
    /// Recycled nodes.
    free: AtomicPtr<Node<T>>,
    /// Advisory element count.
    len: AtomicUsize,
    _marker: PhantomData<T>,
}

// SAFETY: nodes are reached through raw pointers, so the auto traits do not
// see the T inside them. Access is partitioned by protocol: the producer
// writes a node's value strictly before release-publishing its link, the
// consumer takes it strictly after the acquire-load of that link.
unsafe impl<T: Send> Send for Shared<T> {}
unsafe impl<T: Send> Sync for Shared<T> {}

impl<T> Drop for Shared<T> {
    fn drop(&mut self) {
        // Both ends are gone; &mut self gives exclusive access. Unconsumed
        // payloads drop with their nodes.
        let mut cur = *self.head.get_mut();
        while !cur.is_null() {
            // SAFETY: every node in the chain came from Node::boxed and is
            // reachable exactly once.
            let mut node = unsafe { Box::from_raw(cur) };
            cur = *node.next.get_mut();
        }
        let mut cur = *self.free.get_mut();
        while !cur.is_null() {
            // SAFETY: as above; free-list nodes are disjoint from the chain.
            let mut node = unsafe { Box::from_raw(cur) };
            cur = *node.next.get_mut();
        }
    }
}

/// The sending end. `Send`, not `Sync`: exactly one thread at a time.
pub struct Producer<T> {
    shared: Arc<Shared<T>>,
    /// Last node in the chain. Only this end ever reads or moves it.
    tail: *mut Node<T>,
}

// SAFETY: the raw tail pointer is owned exclusively by this end; see the
// protocol note on Shared.
unsafe impl<T: Send> Send for Producer<T> {}

/// The receiving end. `Send`, not `Sync`: exactly one thread at a time.
pub struct Consumer<T> {
    shared: Arc<Shared<T>>,
}

// SAFETY: head is written only through this end.
unsafe impl<T: Send> Send for Consumer<T> {}

/// Create an empty queue and hand back its two ends.
pub fn queue<T: Send>() -> (Producer<T>, Consumer<T>) {
    let stub = Node::boxed();
    let shared = Arc::new(Shared {
        head: AtomicPtr::new(stub),
        free: AtomicPtr::new(ptr::null_mut()),
        len: AtomicUsize::new(0),
        _marker: PhantomData,
    });
    (
        Producer {
            shared: Arc::clone(&shared),
            tail: stub,
        },
        Consumer { shared },
    )
}

impl<T> Producer<T> {
    /// Append an element. Always succeeds; allocates only when the free
    /// list is empty.
    pub fn push(&mut self, value: T) {
        let node = self.acquire_node();
        // The count goes up before the link is published: the consumer can
        // only decrement after seeing the link, so `len` stays an upper
        // bound and never transiently underflows.
        self.shared.len.fetch_add(1, Ordering::SeqCst);
        // SAFETY: a node off the free list (or fresh from the allocator) is
        // reachable by no one else until the release store below.
        unsafe {
            (*node).value = Some(value);
            (*node).next.store(ptr::null_mut(), Ordering::Relaxed);
            (*self.tail).next.store(node, Ordering::Release);
        }
        self.tail = node;
    }

    /// Append every element of an iterator, in order.
    pub fn push_all<I: IntoIterator<Item = T>>(&mut self, values: I) {
        for value in values {
            self.push(value);
        }
    }

    /// Advisory element count; see [`Consumer::len`].
    pub fn len(&self) -> usize {
        self.shared.len.load(Ordering::SeqCst)
    }

    /// Advisory emptiness check.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pop a recycled node off the free list, or allocate a fresh one.
    fn acquire_node(&self) -> *mut Node<T> {
        let mut top = self.shared.free.load(Ordering::Acquire);
        loop {
            if top.is_null() {
                return Node::boxed();
            }
            // SAFETY: a node's link is stable while it sits in the stack;
            // only this end removes nodes, so `top` cannot be freed under us.
            let next = unsafe { (*top).next.load(Ordering::Relaxed) };
            match self.shared.free.compare_exchange_weak(
                top,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return top,
                Err(actual) => {
                    top = actual;
                    std::hint::spin_loop();
                }
            }
        }
    }
}

impl<T> Consumer<T> {
    /// Remove the oldest element, or `None` if the queue is momentarily
    /// empty. Emptiness is not an error.
    pub fn pop(&mut self) -> Option<T> {
        let head = self.shared.head.load(Ordering::Relaxed);
        // SAFETY: the stub is ours until we retire it below.
        let next = unsafe { (*head).next.load(Ordering::Acquire) };
        if next.is_null() {
            return None;
        }
        // SAFETY: the producer wrote the value before release-publishing
        // the link we just acquire-loaded, and never touches the node again
        // until it comes back through the free list.
        let value = unsafe { (*next).value.take() };
        debug_assert!(value.is_some());
        // `next` becomes the new stub; the old stub goes back to the pool.
        self.shared.head.store(next, Ordering::Relaxed);
        self.recycle(head);
        self.shared.len.fetch_sub(1, Ordering::SeqCst);
        value
    }

    /// Drain every element currently visible, in FIFO order.
    pub fn pop_all(&mut self) -> Vec<T> {
        let mut out = Vec::new();
        while let Some(value) = self.pop() {
            out.push(value);
        }
        out
    }

    /// Advisory element count; may be stale the moment it returns.
    pub fn len(&self) -> usize {
        self.shared.len.load(Ordering::SeqCst)
    }

    /// Advisory emptiness check.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn recycle(&self, node: *mut Node<T>) {
        let mut top = self.shared.free.load(Ordering::Relaxed);
        loop {
            // SAFETY: the retired stub is exclusively ours; its value is
            // None and its link is free for stack use.
            unsafe { (*node).next.store(top, Ordering::Relaxed) };
            match self.shared.free.compare_exchange_weak(
                top,
                node,
                Ordering::Release,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(actual) => {
                    top = actual;
                    std::hint::spin_loop();
                }
            }
        }
    }
}
