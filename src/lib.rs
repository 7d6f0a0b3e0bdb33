//! # Strata
//!
//! Foundation layer for media processing: reference-counted objects,
//! copy-on-write buffers, lock-free queues, and serialized job execution.
//!
//! Strata is the substrate a media SDK stands on. It provides:
//!
//! - **Intrusive reference counting**: [`object::Sp`]/[`object::Wp`] strong
//!   and weak handles over any [`object::SharedObject`], with lifecycle
//!   hooks and runtime type tags.
//! - **Copy-on-write byte blocks**: [`memory::SharedBuffer`] beneath the
//!   FIFO [`buffer::Buffer`] and the block-buffered [`content::Content`].
//! - **Lock-free queues**: a wait-free SPSC channel and an MPMC FIFO in
//!   [`queue`].
//! - **Job scheduling**: [`looper::Looper`] worker threads with
//!   deadline-ordered dispatch and serial [`looper::DispatchQueue`]s.
//! - **Property bags**: [`message::Message`], FourCc-keyed settings and
//!   events.
//! - **C bindings**: an opaque-handle `extern "C"` surface in [`capi`].
//!
//! ## Quick Start
//!
//! ```rust
//! use strata::buffer::Buffer;
//! use strata::object::{SharedObject, Sp};
//!
//! struct Frame {
//!     data: Buffer,
//! }
//! impl SharedObject for Frame {}
//!
//! let mut data = Buffer::new(4096)?;
//! data.write_bytes(b"payload");
//!
//! let frame = Sp::new(Frame { data });
//! let weak = frame.downgrade();
//! assert!(weak.upgrade().is_some());
//! # Ok::<(), strata::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod atomic;
pub mod buffer;
pub mod capi;
pub mod containers;
pub mod content;
pub mod error;
pub mod fourcc;
pub mod looper;
pub mod memory;
pub mod message;
pub mod object;
pub mod queue;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::buffer::{Buffer, ByteOrder};
    pub use crate::content::{Content, Protocol, ProtocolMode};
    pub use crate::error::{Error, Result};
    pub use crate::fourcc::FourCc;
    pub use crate::looper::{DispatchQueue, Job, Looper};
    pub use crate::memory::SharedBuffer;
    pub use crate::message::Message;
    pub use crate::object::{SharedObject, Sp, Wp};
}

pub use error::{Error, Result};
