//! Doubly-linked list with ordered insertion.

use std::cmp::Ordering;
use std::marker::PhantomData;
use std::ptr;

struct Node<T> {
    prev: *mut Node<T>,
    next: *mut Node<T>,
    value: T,
}

/// Doubly-linked list. Not internally synchronized.
///
/// Exists for the operations `Vec` and `VecDeque` do poorly: O(1) removal
/// mid-list and stable ordered insertion, which the deadline queues in
/// [`looper`](crate::looper) lean on.
pub struct List<T> {
    head: *mut Node<T>,
    tail: *mut Node<T>,
    len: usize,
    _marker: PhantomData<Box<Node<T>>>,
}

// SAFETY: the list owns its nodes; no shared mutation.
unsafe impl<T: Send> Send for List<T> {}
unsafe impl<T: Sync> Sync for List<T> {}

impl<T> List<T> {
    /// Create an empty list.
    pub fn new() -> Self {
        List {
            head: ptr::null_mut(),
            tail: ptr::null_mut(),
            len: 0,
            _marker: PhantomData,
        }
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Is the list empty?
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Prepend an element.
    pub fn push_front(&mut self, value: T) {
        let node = Box::into_raw(Box::new(Node {
            prev: ptr::null_mut(),
            next: self.head,
            value,
        }));
        if self.head.is_null() {
            self.tail = node;
        } else {
            // SAFETY: non-null head is a live node we own.
            unsafe { (*self.head).prev = node };
        }
        self.head = node;
        self.len += 1;
    }

    /// Append an element.
    pub fn push_back(&mut self, value: T) {
        let node = Box::into_raw(Box::new(Node {
            prev: self.tail,
            next: ptr::null_mut(),
            value,
        }));
        if self.tail.is_null() {
            self.head = node;
        } else {
            // SAFETY: non-null tail is a live node we own.
            unsafe { (*self.tail).next = node };
        }
        self.tail = node;
        self.len += 1;
    }

    /// Remove and return the first element.
    pub fn pop_front(&mut self) -> Option<T> {
        if self.head.is_null() {
            return None;
        }
        // SAFETY: head came from Box::into_raw and is unlinked below.
        let node = unsafe { Box::from_raw(self.head) };
        self.head = node.next;
        if self.head.is_null() {
            self.tail = ptr::null_mut();
        } else {
            // SAFETY: new head is live.
            unsafe { (*self.head).prev = ptr::null_mut() };
        }
        self.len -= 1;
        Some(node.value)
    }

    /// Remove and return the last element.
    pub fn pop_back(&mut self) -> Option<T> {
        if self.tail.is_null() {
            return None;
        }
        // SAFETY: tail came from Box::into_raw and is unlinked below.
        let node = unsafe { Box::from_raw(self.tail) };
        self.tail = node.prev;
        if self.tail.is_null() {
            self.head = ptr::null_mut();
        } else {
            // SAFETY: new tail is live.
            unsafe { (*self.tail).next = ptr::null_mut() };
        }
        self.len -= 1;
        Some(node.value)
    }

    /// The first element.
    pub fn front(&self) -> Option<&T> {
        // SAFETY: non-null head is live.
        unsafe { self.head.as_ref().map(|n| &n.value) }
    }

    /// The last element.
    pub fn back(&self) -> Option<&T> {
        // SAFETY: non-null tail is live.
        unsafe { self.tail.as_ref().map(|n| &n.value) }
    }

    /// Insert keeping the list sorted by `cmp`, stably: an element equal to
    /// existing ones lands after them.
    pub fn insert_sorted_by<F>(&mut self, value: T, mut cmp: F)
    where
        F: FnMut(&T, &T) -> Ordering,
    {
        let mut cur = self.head;
        // SAFETY: cur is either null or a live node throughout the walk.
        unsafe {
            while !cur.is_null() && cmp(&(*cur).value, &value) != Ordering::Greater {
                cur = (*cur).next;
            }
        }
        if cur.is_null() {
            self.push_back(value);
            return;
        }
        // SAFETY: cur is a live node; links fixed up consistently.
        unsafe {
            let prev = (*cur).prev;
            let node = Box::into_raw(Box::new(Node {
                prev,
                next: cur,
                value,
            }));
            (*cur).prev = node;
            if prev.is_null() {
                self.head = node;
            } else {
                (*prev).next = node;
            }
        }
        self.len += 1;
    }

    /// Keep only the elements the predicate approves, dropping the rest.
    /// Returns how many were removed.
    pub fn retain<F>(&mut self, mut keep: F) -> usize
    where
        F: FnMut(&T) -> bool,
    {
        let mut removed = 0;
        let mut cur = self.head;
        while !cur.is_null() {
            // SAFETY: cur is live; next is captured before any unlink.
            let next = unsafe { (*cur).next };
            if !unsafe { keep(&(*cur).value) } {
                // SAFETY: cur is live and about to be exclusively owned.
                unsafe { self.unlink(cur) };
                removed += 1;
            }
            cur = next;
        }
        removed
    }

    /// Unlink and free one node.
    ///
    /// # Safety
    ///
    /// `node` must be a live node of this list.
    unsafe fn unlink(&mut self, node: *mut Node<T>) {
        // SAFETY: caller guarantees membership; links fixed up consistently.
        unsafe {
            let prev = (*node).prev;
            let next = (*node).next;
            if prev.is_null() {
                self.head = next;
            } else {
                (*prev).next = next;
            }
            if next.is_null() {
                self.tail = prev;
            } else {
                (*next).prev = prev;
            }
            drop(Box::from_raw(node));
        }
        self.len -= 1;
    }

    /// Drop every element.
    pub fn clear(&mut self) {
        while self.pop_front().is_some() {}
    }

    /// Front-to-back iterator.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            cur: self.head,
            _marker: PhantomData,
        }
    }
}

impl<T> Default for List<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for List<T> {
    fn drop(&mut self) {
        self.clear();
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for List<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

/// Borrowing iterator over a [`List`].
pub struct Iter<'a, T> {
    cur: *const Node<T>,
    _marker: PhantomData<&'a T>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<&'a T> {
        if self.cur.is_null() {
            return None;
        }
        // SAFETY: the borrow on the list keeps every node alive.
        let node = unsafe { &*self.cur };
        self.cur = node.next;
        Some(&node.value)
    }
}

impl<'a, T> IntoIterator for &'a List<T> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Iter<'a, T> {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_pop_both_ends() {
        let mut l = List::new();
        l.push_back(2);
        l.push_front(1);
        l.push_back(3);
        assert_eq!(l.len(), 3);
        assert_eq!(l.front(), Some(&1));
        assert_eq!(l.back(), Some(&3));

        assert_eq!(l.pop_front(), Some(1));
        assert_eq!(l.pop_back(), Some(3));
        assert_eq!(l.pop_back(), Some(2));
        assert_eq!(l.pop_front(), None);
        assert!(l.is_empty());
        assert_eq!(l.front(), None);
    }

    #[test]
    fn test_sorted_insert_is_stable() {
        let mut l = List::new();
        for (deadline, tag) in [(30, 'a'), (10, 'b'), (20, 'c'), (10, 'd'), (30, 'e')] {
            l.insert_sorted_by((deadline, tag), |x, y| x.0.cmp(&y.0));
        }
        let order: Vec<_> = l.iter().copied().collect();
        // Equal deadlines keep arrival order.
        assert_eq!(
            order,
            [(10, 'b'), (10, 'd'), (20, 'c'), (30, 'a'), (30, 'e')]
        );
    }

    #[test]
    fn test_retain_removes_mid_list() {
        let mut l = List::new();
        for i in 0..10 {
            l.push_back(i);
        }
        let removed = l.retain(|&v| v % 3 != 0);
        assert_eq!(removed, 4); // 0, 3, 6, 9
        assert_eq!(l.len(), 6);
        let left: Vec<_> = l.iter().copied().collect();
        assert_eq!(left, [1, 2, 4, 5, 7, 8]);

        // Head and tail links survive edge removals.
        l.retain(|&v| v != 1 && v != 8);
        assert_eq!(l.front(), Some(&2));
        assert_eq!(l.back(), Some(&7));
    }

    #[test]
    fn test_clear_drops_values() {
        use std::sync::Arc;

        let payload = Arc::new(());
        let mut l = List::new();
        for _ in 0..5 {
            l.push_back(Arc::clone(&payload));
        }
        assert_eq!(Arc::strong_count(&payload), 6);
        l.clear();
        assert_eq!(Arc::strong_count(&payload), 1);
    }
}
