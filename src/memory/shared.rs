//! Copy-on-write shared byte block.
//!
//! A [`SharedBuffer`] is a single allocation holding a small header (owning
//! allocator, length, atomic reference count) followed by the data bytes.
//! Handles are cheap to clone; writers must call [`SharedBuffer::edit`]
//! first, which is the one place where "write triggers copy" happens. The
//! reference count is plain-old-data machinery, deliberately separate from
//! the polymorphic [`SharedObject`](crate::object::SharedObject) system.

use crate::atomic::Atomic;
use crate::error::{Error, Result};
use crate::memory::{Allocator, default_allocator};
use std::alloc::Layout;
use std::ptr::NonNull;
use std::sync::Arc;

/// Block header, stored in-line ahead of the data bytes.
#[repr(C)]
struct Header {
    /// The allocator that created this block; also frees it.
    allocator: Arc<dyn Allocator>,
    /// Data length in bytes.
    size: usize,
    /// Reference count. 1 at creation.
    refs: Atomic,
}

/// Byte offset from the block base to the data region.
///
/// Data is `u8` (align 1), so it starts right after the header.
const DATA_OFFSET: usize = std::mem::size_of::<Header>();

fn block_layout(size: usize) -> Layout {
    // Header + size data bytes, at header alignment.
    Layout::from_size_align(DATA_OFFSET + size, std::mem::align_of::<Header>())
        .expect("shared buffer size overflows layout")
}

/// Handle to a copy-on-write shared byte block.
///
/// Cloning a handle retains the block (atomic increment, no lock); dropping
/// releases it, and the release that takes the count to zero frees the
/// backing memory through the allocator that created it.
///
/// # Example
///
/// ```rust
/// use strata::memory::SharedBuffer;
///
/// let mut a = SharedBuffer::with_default_allocator(16).unwrap();
/// a.edit(0)[..5].copy_from_slice(b"hello");
///
/// let mut b = a.clone();               // refcount 2, same storage
/// b.edit(0)[0] = b'H';                 // copy-on-write: b diverges
/// assert_eq!(&a.as_slice()[..5], b"hello");
/// assert_eq!(&b.as_slice()[..5], b"Hello");
/// ```
pub struct SharedBuffer {
    header: NonNull<Header>,
}

// SAFETY: the reference count is atomic and shared bytes are only mutated
// through `edit`, which guarantees unique ownership first.
unsafe impl Send for SharedBuffer {}
unsafe impl Sync for SharedBuffer {}

impl SharedBuffer {
    /// Allocate a block with reference count 1.
    ///
    /// # Errors
    ///
    /// Returns `BadParameters` if `size` is zero. Allocation failure itself
    /// is fatal by convention (the allocator aborts).
    pub fn create(allocator: &Arc<dyn Allocator>, size: usize) -> Result<Self> {
        if size == 0 {
            return Err(Error::BadParameters("shared buffer size must be > 0".into()));
        }
        let base = allocator.allocate(block_layout(size));
        let header = base.cast::<Header>();
        // SAFETY: freshly allocated, correctly aligned for Header. Data
        // bytes are zeroed so readers never observe uninitialized memory.
        unsafe {
            header.as_ptr().write(Header {
                allocator: Arc::clone(allocator),
                size,
                refs: Atomic::new(1),
            });
            std::ptr::write_bytes(base.as_ptr().add(DATA_OFFSET), 0, size);
        }
        Ok(Self { header })
    }

    /// Allocate a block using the default allocator.
    pub fn with_default_allocator(size: usize) -> Result<Self> {
        Self::create(&default_allocator(), size)
    }

    /// Allocate an independent block through the same allocator as an
    /// existing one.
    pub fn create_like(other: &SharedBuffer, size: usize) -> Result<Self> {
        Self::create(&other.header().allocator, size)
    }

    fn header(&self) -> &Header {
        // SAFETY: the header outlives every handle; a live handle owns one
        // reference unit.
        unsafe { self.header.as_ref() }
    }

    fn data_ptr(&self) -> *mut u8 {
        // SAFETY: data begins DATA_OFFSET bytes past the block base.
        unsafe { self.header.as_ptr().cast::<u8>().add(DATA_OFFSET) }
    }

    /// Data length in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.header().size
    }

    /// Always false: zero-size blocks cannot be created.
    #[inline]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// The block's bytes.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: shared bytes are immutable; mutation requires `edit`,
        // which operates on uniquely owned storage.
        unsafe { std::slice::from_raw_parts(self.data_ptr(), self.len()) }
    }

    /// Raw pointer to the data bytes. Useful for identity checks.
    #[inline]
    pub fn as_ptr(&self) -> *const u8 {
        self.data_ptr()
    }

    /// Current reference count.
    #[inline]
    pub fn retain_count(&self) -> u32 {
        self.header().refs.load()
    }

    /// Is this block shared with other handles?
    ///
    /// A `false` answer is stable (only this handle can add references);
    /// a `true` answer may already be stale.
    #[inline]
    pub fn is_shared(&self) -> bool {
        self.retain_count() > 1
    }

    /// Take another reference to the same block.
    pub fn retain(&self) -> SharedBuffer {
        let old = self.header().refs.fetch_add(1);
        assert!(old <= i32::MAX as u32, "shared buffer refcount overflow");
        SharedBuffer { header: self.header }
    }

    /// Drop this reference, returning the remaining count.
    ///
    /// When the count reaches zero: with `keep == false` the block is freed;
    /// with `keep == true` the still-allocated block is handed back as a
    /// [`RetiredBuffer`] so the caller can run extra teardown over the bytes
    /// before they are reclaimed (two-phase release).
    pub fn release(self, keep: bool) -> (u32, Option<RetiredBuffer>) {
        let header = self.header;
        std::mem::forget(self);
        // SAFETY: we owned one reference unit, surrendered just below.
        let old = unsafe { header.as_ref() }.refs.fetch_sub(1);
        debug_assert!(old > 0, "shared buffer refcount underflow");
        let remaining = old - 1;
        if remaining > 0 {
            return (remaining, None);
        }
        if keep {
            (0, Some(RetiredBuffer { header }))
        } else {
            // SAFETY: count hit zero, no other handle exists.
            unsafe { destroy(header) };
            (0, None)
        }
    }

    /// Make this handle's storage safe to mutate, copying if shared.
    ///
    /// With `new_size == 0` the length is unchanged. A uniquely owned block
    /// with no resize request is returned as-is (pointer identity
    /// preserved, no copy). A shared block, or any resize, produces a block
    /// with independent storage holding the first `min(old, new)` bytes;
    /// this handle's old reference is released.
    ///
    /// Every mutating buffer operation must route through here first.
    pub fn edit(&mut self, new_size: usize) -> &mut [u8] {
        let size = self.len();
        let target = if new_size == 0 { size } else { new_size };

        if !self.is_shared() {
            if target != size {
                // Unique resize: realloc in place via the owning allocator.
                let allocator = Arc::clone(&self.header().allocator);
                let old_layout = block_layout(size);
                // SAFETY: this block was allocated by `allocator` with
                // `old_layout`; uniqueness means no other handle observes
                // the move.
                let base = unsafe {
                    allocator.reallocate(self.header.cast::<u8>(), old_layout, DATA_OFFSET + target)
                };
                self.header = base.cast::<Header>();
                // SAFETY: header bytes were preserved by reallocate; a grown
                // tail starts out zeroed like a fresh block.
                unsafe {
                    (*self.header.as_ptr()).size = target;
                    if target > size {
                        std::ptr::write_bytes(
                            base.as_ptr().add(DATA_OFFSET + size),
                            0,
                            target - size,
                        );
                    }
                }
            }
        } else {
            // Shared: deep copy into a fresh block, then drop our old ref.
            let allocator = Arc::clone(&self.header().allocator);
            let copy =
                SharedBuffer::create(&allocator, target).expect("copy-on-write allocation");
            let n = size.min(target);
            // SAFETY: fresh block is uniquely owned; regions are disjoint.
            unsafe {
                std::ptr::copy_nonoverlapping(self.data_ptr(), copy.data_ptr(), n);
            }
            let old = std::mem::replace(self, copy);
            let _ = old.release(false);
        }

        debug_assert_eq!(self.retain_count(), 1);
        // SAFETY: uniquely owned at this point.
        unsafe { std::slice::from_raw_parts_mut(self.data_ptr(), self.len()) }
    }
}

impl Clone for SharedBuffer {
    fn clone(&self) -> Self {
        self.retain()
    }
}

impl Drop for SharedBuffer {
    fn drop(&mut self) {
        let old = self.header().refs.fetch_sub(1);
        debug_assert!(old > 0, "shared buffer refcount underflow");
        if old == 1 {
            // SAFETY: last reference gone; nobody else can reach the block.
            unsafe { destroy(self.header) };
        }
    }
}

impl std::fmt::Debug for SharedBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedBuffer")
            .field("len", &self.len())
            .field("refs", &self.retain_count())
            .finish()
    }
}

/// Drop the header in place and return the block to its allocator.
///
/// # Safety
///
/// The reference count must be zero and no handle may alias `header`.
unsafe fn destroy(header: NonNull<Header>) {
    // Move the allocator out first: it must outlive the deallocation of the
    // block that contains it.
    let (allocator, size) = unsafe {
        let h = header.as_ptr();
        (std::ptr::read(&raw const (*h).allocator), (*h).size)
    };
    unsafe { allocator.deallocate(header.cast::<u8>(), block_layout(size)) };
    drop(allocator);
}

/// A block whose last reference was released with `keep == true`.
///
/// The bytes remain valid for final teardown work; the memory is reclaimed
/// when this value is dropped (or explicitly via [`RetiredBuffer::delete`]).
pub struct RetiredBuffer {
    header: NonNull<Header>,
}

// SAFETY: sole owner of a dead block.
unsafe impl Send for RetiredBuffer {}

impl RetiredBuffer {
    /// The retired block's bytes.
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: exclusively owned.
        unsafe {
            let h = self.header.as_ref();
            std::slice::from_raw_parts(self.header.as_ptr().cast::<u8>().add(DATA_OFFSET), h.size)
        }
    }

    /// Mutable access for destructor-style cleanup of the contents.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: exclusively owned.
        unsafe {
            let h = self.header.as_ref();
            std::slice::from_raw_parts_mut(
                self.header.as_ptr().cast::<u8>().add(DATA_OFFSET),
                h.size,
            )
        }
    }

    /// Reclaim the memory now.
    pub fn delete(self) {
        drop(self)
    }
}

impl Drop for RetiredBuffer {
    fn drop(&mut self) {
        // SAFETY: refcount is zero and we are the only owner.
        unsafe { destroy(self.header) };
    }
}
