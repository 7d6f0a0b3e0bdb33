//! FIFO byte buffer with byte-order-aware accessors.
//!
//! [`Buffer`] is a read/write window over a [`SharedBuffer`]: a read cursor
//! chases a write cursor through a fixed-capacity window, with
//! `0 <= read <= write <= capacity` at all times.
//!
//! ```text
//!                       write pos
//!                       v
//!  |-------------------------------------------------|
//!      ^
//!      read pos
//! ```
//!
//! Cloning is cheap and copy-on-write: clones share storage until one of
//! them writes, at which point the writer gets a private copy and the other
//! clones keep the original bytes. `Buffer` is **not** thread-safe; wrap it
//! in a lock or hand it off whole.
//!
//! Integer readers and writers (`r16`, `wb32`, ...) follow the buffer's
//! default [`ByteOrder`] or an explicit little/big variant. They panic on
//! underflow or overflow; callers check [`size`](Buffer::size) and
//! [`vacancy`](Buffer::vacancy) first, the same contract as the raw
//! cursor operations.

use crate::error::Result;
use crate::fourcc::FourCc;
use crate::memory::{Allocator, SharedBuffer};
use crate::object::SharedObject;
use std::fmt;
use std::sync::Arc;

/// Byte order for the multi-byte integer accessors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ByteOrder {
    /// Least significant byte first.
    Little,
    /// Most significant byte first.
    Big,
}

/// FIFO byte buffer over copy-on-write storage. Not thread-safe.
pub struct Buffer {
    data: SharedBuffer,
    /// Window start within the storage; non-zero for sub-buffers split off
    /// by [`read_buffer`](Buffer::read_buffer).
    window: usize,
    capacity: usize,
    read: usize,
    write: usize,
    order: ByteOrder,
}

impl Buffer {
    /// Allocate an empty buffer with the given capacity.
    pub fn new(capacity: usize) -> Result<Buffer> {
        Ok(Buffer::over(SharedBuffer::with_default_allocator(capacity)?))
    }

    /// Allocate an empty buffer through a specific allocator.
    pub fn with_allocator(capacity: usize, allocator: &Arc<dyn Allocator>) -> Result<Buffer> {
        Ok(Buffer::over(SharedBuffer::create(allocator, capacity)?))
    }

    /// Allocate a buffer holding a copy of `bytes`, ready to read.
    pub fn from_bytes(bytes: &[u8]) -> Result<Buffer> {
        let mut buffer = Buffer::new(bytes.len())?;
        buffer.write_bytes(bytes);
        Ok(buffer)
    }

    fn over(data: SharedBuffer) -> Buffer {
        let capacity = data.len();
        Buffer {
            data,
            window: 0,
            capacity,
            read: 0,
            write: 0,
            order: ByteOrder::Little,
        }
    }

    /// Total window capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Unread bytes.
    pub fn size(&self) -> usize {
        self.write - self.read
    }

    /// Is there nothing left to read?
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Bytes still writable.
    pub fn vacancy(&self) -> usize {
        self.capacity - self.write
    }

    /// Current read position within the window.
    pub fn offset(&self) -> usize {
        self.read
    }

    /// The unread bytes.
    pub fn data(&self) -> &[u8] {
        &self.data.as_slice()[self.window + self.read..self.window + self.write]
    }

    /// Default byte order for `r16`/`w16`-style accessors.
    pub fn byte_order(&self) -> ByteOrder {
        self.order
    }

    /// Set the default byte order. Values within one structure always share
    /// one order.
    pub fn set_byte_order(&mut self, order: ByteOrder) {
        self.order = order;
    }

    /// Append bytes, up to the remaining vacancy. Returns how many were
    /// written. Triggers copy-on-write if the storage is shared.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> usize {
        let n = bytes.len().min(self.vacancy());
        if n == 0 {
            return 0;
        }
        let at = self.window + self.write;
        self.data.edit(0)[at..at + n].copy_from_slice(&bytes[..n]);
        self.write += n;
        n
    }

    /// Append `n` copies of one byte, clamped to the vacancy. Returns how
    /// many were written.
    pub fn write_repeated(&mut self, byte: u8, n: usize) -> usize {
        let n = n.min(self.vacancy());
        if n == 0 {
            return 0;
        }
        let at = self.window + self.write;
        self.data.edit(0)[at..at + n].fill(byte);
        self.write += n;
        n
    }

    /// Append another buffer's unread bytes without consuming them there.
    pub fn write_buffer(&mut self, other: &Buffer) -> usize {
        // Clones share storage; route through a copy so edit() on our own
        // storage cannot alias other's view.
        let bytes = other.data().to_vec();
        self.write_bytes(&bytes)
    }

    /// Read up to `out.len()` bytes, advancing the read cursor. Returns how
    /// many were read.
    pub fn read_bytes(&mut self, out: &mut [u8]) -> usize {
        let n = out.len().min(self.size());
        if n == 0 {
            return 0;
        }
        let at = self.window + self.read;
        out[..n].copy_from_slice(&self.data.as_slice()[at..at + n]);
        self.read += n;
        n
    }

    /// Split off up to `n` unread bytes as a new buffer sharing storage
    /// copy-on-write. Returns `None` when nothing is unread.
    pub fn read_buffer(&mut self, n: usize) -> Option<Buffer> {
        let n = n.min(self.size());
        if n == 0 {
            return None;
        }
        let sub = Buffer {
            data: self.data.clone(),
            window: self.window + self.read,
            capacity: n,
            read: 0,
            write: n,
            order: self.order,
        };
        self.read += n;
        Some(sub)
    }

    /// Move the read cursor by `delta` bytes, clamped to
    /// `[-offset, size]`. Returns the distance actually moved.
    pub fn skip_bytes(&mut self, delta: i64) -> i64 {
        let clamped = delta.clamp(-(self.read as i64), self.size() as i64);
        self.read = (self.read as i64 + clamped) as usize;
        clamped
    }

    /// Rewind the read cursor to the start of the window, replaying
    /// everything written so far.
    pub fn reset_bytes(&mut self) {
        self.read = 0;
    }

    /// Cheap copy-on-write clone of the unread bytes.
    pub fn clone_bytes(&self) -> Buffer {
        let n = self.size();
        Buffer {
            data: self.data.clone(),
            window: self.window + self.read,
            capacity: n,
            read: 0,
            write: n,
            order: self.order,
        }
    }

    /// Drop all content; both cursors return to zero.
    pub fn clear_bytes(&mut self) {
        self.read = 0;
        self.write = 0;
    }

    /// Resize the window's backing storage. Content up to
    /// `min(write, capacity)` survives; cursors are clamped.
    pub fn resize(&mut self, capacity: usize) -> Result<()> {
        if capacity == 0 {
            return Err(crate::error::Error::BadParameters(
                "buffer capacity must be > 0".into(),
            ));
        }
        if self.window == 0 {
            self.data.edit(capacity);
        } else {
            // A sub-buffer window cannot resize shared storage in place;
            // materialize a private block first.
            let mut fresh = SharedBuffer::create_like(&self.data, capacity)?;
            let keep = self.write.min(capacity);
            let at = self.window;
            fresh.edit(0)[..keep].copy_from_slice(&self.data.as_slice()[at..at + keep]);
            self.data = fresh;
            self.window = 0;
        }
        self.capacity = capacity;
        self.write = self.write.min(capacity);
        self.read = self.read.min(self.write);
        Ok(())
    }

    fn take(&mut self, n: usize) -> &[u8] {
        assert!(self.size() >= n, "buffer underflow: {} < {n}", self.size());
        let at = self.window + self.read;
        self.read += n;
        &self.data.as_slice()[at..at + n]
    }

    fn put(&mut self, bytes: &[u8]) {
        assert!(
            self.vacancy() >= bytes.len(),
            "buffer overflow: {} < {}",
            self.vacancy(),
            bytes.len()
        );
        self.write_bytes(bytes);
    }

    /// Read one byte.
    pub fn r8(&mut self) -> u8 {
        self.take(1)[0]
    }

    /// Read 16 bits little-endian.
    pub fn rl16(&mut self) -> u16 {
        let b = self.take(2);
        u16::from_le_bytes([b[0], b[1]])
    }

    /// Read 16 bits big-endian.
    pub fn rb16(&mut self) -> u16 {
        let b = self.take(2);
        u16::from_be_bytes([b[0], b[1]])
    }

    /// Read 24 bits little-endian.
    pub fn rl24(&mut self) -> u32 {
        let b = self.take(3);
        u32::from_le_bytes([b[0], b[1], b[2], 0])
    }

    /// Read 24 bits big-endian.
    pub fn rb24(&mut self) -> u32 {
        let b = self.take(3);
        u32::from_be_bytes([0, b[0], b[1], b[2]])
    }

    /// Read 32 bits little-endian.
    pub fn rl32(&mut self) -> u32 {
        let b = self.take(4);
        u32::from_le_bytes([b[0], b[1], b[2], b[3]])
    }

    /// Read 32 bits big-endian.
    pub fn rb32(&mut self) -> u32 {
        let b = self.take(4);
        u32::from_be_bytes([b[0], b[1], b[2], b[3]])
    }

    /// Read 64 bits little-endian.
    pub fn rl64(&mut self) -> u64 {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(self.take(8));
        u64::from_le_bytes(raw)
    }

    /// Read 64 bits big-endian.
    pub fn rb64(&mut self) -> u64 {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(self.take(8));
        u64::from_be_bytes(raw)
    }

    /// Read 16 bits in the default byte order.
    pub fn r16(&mut self) -> u16 {
        match self.order {
            ByteOrder::Little => self.rl16(),
            ByteOrder::Big => self.rb16(),
        }
    }

    /// Read 24 bits in the default byte order.
    pub fn r24(&mut self) -> u32 {
        match self.order {
            ByteOrder::Little => self.rl24(),
            ByteOrder::Big => self.rb24(),
        }
    }

    /// Read 32 bits in the default byte order.
    pub fn r32(&mut self) -> u32 {
        match self.order {
            ByteOrder::Little => self.rl32(),
            ByteOrder::Big => self.rb32(),
        }
    }

    /// Read 64 bits in the default byte order.
    pub fn r64(&mut self) -> u64 {
        match self.order {
            ByteOrder::Little => self.rl64(),
            ByteOrder::Big => self.rb64(),
        }
    }

    /// Read `n` bytes as a string, replacing invalid UTF-8.
    pub fn rs(&mut self, n: usize) -> String {
        String::from_utf8_lossy(self.take(n)).into_owned()
    }

    /// Write one byte.
    pub fn w8(&mut self, x: u8) {
        self.put(&[x]);
    }

    /// Write 16 bits little-endian.
    pub fn wl16(&mut self, x: u16) {
        self.put(&x.to_le_bytes());
    }

    /// Write 16 bits big-endian.
    pub fn wb16(&mut self, x: u16) {
        self.put(&x.to_be_bytes());
    }

    /// Write the low 24 bits little-endian.
    pub fn wl24(&mut self, x: u32) {
        self.put(&x.to_le_bytes()[..3]);
    }

    /// Write the low 24 bits big-endian.
    pub fn wb24(&mut self, x: u32) {
        self.put(&x.to_be_bytes()[1..]);
    }

    /// Write 32 bits little-endian.
    pub fn wl32(&mut self, x: u32) {
        self.put(&x.to_le_bytes());
    }

    /// Write 32 bits big-endian.
    pub fn wb32(&mut self, x: u32) {
        self.put(&x.to_be_bytes());
    }

    /// Write 64 bits little-endian.
    pub fn wl64(&mut self, x: u64) {
        self.put(&x.to_le_bytes());
    }

    /// Write 64 bits big-endian.
    pub fn wb64(&mut self, x: u64) {
        self.put(&x.to_be_bytes());
    }

    /// Write 16 bits in the default byte order.
    pub fn w16(&mut self, x: u16) {
        match self.order {
            ByteOrder::Little => self.wl16(x),
            ByteOrder::Big => self.wb16(x),
        }
    }

    /// Write 24 bits in the default byte order.
    pub fn w24(&mut self, x: u32) {
        match self.order {
            ByteOrder::Little => self.wl24(x),
            ByteOrder::Big => self.wb24(x),
        }
    }

    /// Write 32 bits in the default byte order.
    pub fn w32(&mut self, x: u32) {
        match self.order {
            ByteOrder::Little => self.wl32(x),
            ByteOrder::Big => self.wb32(x),
        }
    }

    /// Write 64 bits in the default byte order.
    pub fn w64(&mut self, x: u64) {
        match self.order {
            ByteOrder::Little => self.wl64(x),
            ByteOrder::Big => self.wb64(x),
        }
    }

    /// Write a string's bytes.
    pub fn ws(&mut self, s: &str) {
        self.put(s.as_bytes());
    }
}

impl Clone for Buffer {
    /// Share storage copy-on-write; cursors are copied, bytes are not.
    fn clone(&self) -> Buffer {
        Buffer {
            data: self.data.clone(),
            window: self.window,
            capacity: self.capacity,
            read: self.read,
            write: self.write,
            order: self.order,
        }
    }
}

impl SharedObject for Buffer {
    fn object_id(&self) -> FourCc {
        FourCc::BUFFER
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("capacity", &self.capacity)
            .field("read", &self.read)
            .field("write", &self.write)
            .field("shared", &self.data.is_shared())
            .finish()
    }
}
