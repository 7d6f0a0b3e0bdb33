//! Memory management for strata.
//!
//! This module provides the allocation layer beneath the buffer types:
//!
//! - [`Allocator`]: trait for pluggable memory backends; nothing in the
//!   crate calls the platform allocator directly.
//! - [`SharedBuffer`]: copy-on-write byte block with an atomic reference
//!   count, the storage beneath [`Buffer`](crate::buffer::Buffer) and
//!   [`Content`](crate::content::Content).
//!
//! # Example
//!
//! ```rust
//! use strata::memory::SharedBuffer;
//!
//! let mut block = SharedBuffer::with_default_allocator(4096).unwrap();
//! let shared = block.clone();          // cheap, refcount 2
//! block.edit(0)[0] = 1;               // copy-on-write: `shared` unchanged
//! assert_eq!(shared.as_slice()[0], 0);
//! ```

mod allocator;
mod shared;

pub use allocator::{Allocator, CountingAllocator, DefaultAllocator, default_allocator};
pub use shared::{RetiredBuffer, SharedBuffer};
