//! Allocator abstraction.
//!
//! [`SharedBuffer`](super::SharedBuffer) and the containers never call the
//! platform allocator directly; everything routes through [`Allocator`] so
//! aligned or pooled allocators can be substituted.

use std::alloc::Layout;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

/// Trait for memory allocator backends.
///
/// Allocation failure is fatal by convention: implementations abort the
/// process (via `std::alloc::handle_alloc_error`) rather than return null.
/// The surrounding framework treats out-of-memory as unrecoverable.
///
/// # Safety
///
/// Implementations must return memory valid for `layout.size()` bytes at
/// `layout.align()` alignment, and must accept back exactly the pointers
/// they handed out, with the layout they were allocated with.
pub unsafe trait Allocator: Send + Sync {
    /// Allocate a block for `layout`. Never returns null.
    fn allocate(&self, layout: Layout) -> NonNull<u8>;

    /// Grow or shrink a block previously returned by this allocator.
    ///
    /// The contents up to `min(old, new)` bytes are preserved.
    ///
    /// # Safety
    ///
    /// `ptr` must have been allocated by this allocator with `old_layout`.
    unsafe fn reallocate(&self, ptr: NonNull<u8>, old_layout: Layout, new_size: usize)
    -> NonNull<u8>;

    /// Return a block to the allocator.
    ///
    /// # Safety
    ///
    /// `ptr` must have been allocated by this allocator with `layout`.
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout);

    /// Minimum alignment guaranteed for any allocation.
    fn alignment(&self) -> usize {
        std::mem::align_of::<usize>()
    }
}

/// The global-heap allocator used when no custom allocator is supplied.
#[derive(Debug, Default)]
pub struct DefaultAllocator;

unsafe impl Allocator for DefaultAllocator {
    fn allocate(&self, layout: Layout) -> NonNull<u8> {
        // SAFETY: layout has non-zero size; callers construct layouts from
        // positive byte counts.
        let ptr = unsafe { std::alloc::alloc(layout) };
        match NonNull::new(ptr) {
            Some(p) => p,
            None => std::alloc::handle_alloc_error(layout),
        }
    }

    unsafe fn reallocate(
        &self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_size: usize,
    ) -> NonNull<u8> {
        // SAFETY: caller guarantees ptr/old_layout pairing.
        let ptr = unsafe { std::alloc::realloc(ptr.as_ptr(), old_layout, new_size) };
        match NonNull::new(ptr) {
            Some(p) => p,
            None => std::alloc::handle_alloc_error(
                Layout::from_size_align(new_size, old_layout.align())
                    .unwrap_or(old_layout),
            ),
        }
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        // SAFETY: caller guarantees ptr/layout pairing.
        unsafe { std::alloc::dealloc(ptr.as_ptr(), layout) }
    }
}

/// Get the shared default allocator.
pub fn default_allocator() -> Arc<dyn Allocator> {
    static DEFAULT: OnceLock<Arc<dyn Allocator>> = OnceLock::new();
    Arc::clone(DEFAULT.get_or_init(|| Arc::new(DefaultAllocator)))
}

/// An allocator wrapper that counts allocations and frees.
///
/// Used by tests to verify that a buffer's backing memory is freed exactly
/// once, and only on the release that takes the reference count to zero.
pub struct CountingAllocator {
    inner: Arc<dyn Allocator>,
    allocations: AtomicU64,
    frees: AtomicU64,
}

impl CountingAllocator {
    /// Wrap the default allocator.
    pub fn new() -> Self {
        Self::wrapping(default_allocator())
    }

    /// Wrap a specific allocator.
    pub fn wrapping(inner: Arc<dyn Allocator>) -> Self {
        Self {
            inner,
            allocations: AtomicU64::new(0),
            frees: AtomicU64::new(0),
        }
    }

    /// Number of `allocate` calls observed.
    pub fn allocations(&self) -> u64 {
        self.allocations.load(Ordering::SeqCst)
    }

    /// Number of `deallocate` calls observed.
    pub fn frees(&self) -> u64 {
        self.frees.load(Ordering::SeqCst)
    }

    /// Number of blocks currently outstanding.
    pub fn live(&self) -> u64 {
        self.allocations() - self.frees()
    }
}

impl std::fmt::Debug for CountingAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CountingAllocator")
            .field("allocations", &self.allocations)
            .field("frees", &self.frees)
            .finish_non_exhaustive()
    }
}

impl Default for CountingAllocator {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl Allocator for CountingAllocator {
    fn allocate(&self, layout: Layout) -> NonNull<u8> {
        self.allocations.fetch_add(1, Ordering::SeqCst);
        self.inner.allocate(layout)
    }

    unsafe fn reallocate(
        &self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_size: usize,
    ) -> NonNull<u8> {
        // A realloc neither creates nor destroys a block.
        // SAFETY: forwarded contract.
        unsafe { self.inner.reallocate(ptr, old_layout, new_size) }
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        self.frees.fetch_add(1, Ordering::SeqCst);
        // SAFETY: forwarded contract.
        unsafe { self.inner.deallocate(ptr, layout) }
    }

    fn alignment(&self) -> usize {
        self.inner.alignment()
    }
}
