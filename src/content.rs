//! Seekable content access over pluggable byte protocols.
//!
//! A [`Protocol`] is a raw byte source/sink with seek: a file, a socket
//! wrapper, an in-memory blob. [`Content`] layers block-buffered,
//! `Buffer`-style reading and writing on top of one: reads pull whole
//! blocks through the protocol and serve small requests from the cached
//! block, writes collect into a pending block that is written back when it
//! fills (or on [`flush_bytes`](Content::flush_bytes) / drop).
//!
//! `Content` is not thread-safe, same contract as
//! [`Buffer`](crate::buffer::Buffer).

use crate::buffer::Buffer;
use crate::error::Result;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Access mode of a protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProtocolMode {
    /// Read only.
    Read,
    /// Write only.
    Write,
    /// Read and write.
    ReadWrite,
}

impl ProtocolMode {
    /// Does this mode allow reading?
    pub fn readable(self) -> bool {
        matches!(self, ProtocolMode::Read | ProtocolMode::ReadWrite)
    }

    /// Does this mode allow writing?
    pub fn writable(self) -> bool {
        matches!(self, ProtocolMode::Write | ProtocolMode::ReadWrite)
    }
}

/// Raw byte transport beneath a [`Content`].
///
/// Counts are reported in-band: a read or write of 0 bytes means
/// end-of-stream or a transport error, both of which end the transfer the
/// same way. Positions are `i64`; `-1` stands for "unknown" or "failed".
pub trait Protocol: Send {
    /// The directions this protocol supports.
    fn mode(&self) -> ProtocolMode;

    /// Fill the buffer's vacancy from the current position. Returns bytes
    /// read; 0 on end-of-stream or error.
    fn read_bytes(&mut self, buffer: &mut Buffer) -> usize;

    /// Consume the buffer's unread bytes into the current position.
    /// Returns bytes written; 0 on error.
    fn write_bytes(&mut self, buffer: &mut Buffer) -> usize;

    /// Total length in bytes, or -1 if unknown.
    fn total_bytes(&self) -> i64;

    /// Seek to an absolute position. Returns the position actually
    /// reached, or -1 on error.
    fn seek_bytes(&mut self, pos: i64) -> i64;

    /// Preferred transfer granularity in bytes.
    fn block_length(&self) -> usize;
}

/// Block-buffered reader/writer over a [`Protocol`]. Not thread-safe.
pub struct Content {
    proto: Box<dyn Protocol>,
    /// Protocol offset of the next unread byte to fetch. The logical read
    /// offset is `next_read - read_block.size()`.
    next_read: i64,
    read_block: Buffer,
    /// Protocol offset where the pending write block lands.
    write_position: i64,
    write_block: Buffer,
}

impl Content {
    /// Wrap a protocol, sizing the block cache from its
    /// [`block_length`](Protocol::block_length).
    pub fn new(proto: Box<dyn Protocol>) -> Result<Content> {
        let block = proto.block_length();
        Ok(Content {
            read_block: Buffer::new(block)?,
            write_block: Buffer::new(block)?,
            next_read: 0,
            write_position: 0,
            proto,
        })
    }

    /// Open a file for block-buffered reading.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Content> {
        Content::new(Box::new(FileProtocol::open(path)?))
    }

    /// The underlying protocol's access mode.
    pub fn mode(&self) -> ProtocolMode {
        self.proto.mode()
    }

    /// Total length in bytes, or -1 if the protocol cannot tell.
    pub fn total_bytes(&self) -> i64 {
        self.proto.total_bytes()
    }

    /// Current logical read offset.
    pub fn offset(&self) -> i64 {
        self.next_read - self.read_block.size() as i64
    }

    /// Bytes remaining to read, or -1 if the total is unknown.
    pub fn size(&self) -> i64 {
        let total = self.total_bytes();
        if total < 0 { -1 } else { total - self.offset() }
    }

    /// Read up to `out.len()` bytes. Returns bytes read; short counts mean
    /// end-of-stream.
    pub fn read_bytes(&mut self, out: &mut [u8]) -> usize {
        if !self.mode().readable() {
            return 0;
        }
        let mut copied = 0;
        while copied < out.len() {
            copied += self.read_block.read_bytes(&mut out[copied..]);
            if copied == out.len() || !self.fetch_block() {
                break;
            }
        }
        copied
    }

    /// Read up to `n` bytes into a fresh buffer. `None` at end-of-stream.
    pub fn read_buffer(&mut self, n: usize) -> Option<Buffer> {
        if n == 0 {
            return None;
        }
        let mut staged = vec![0u8; n];
        let got = self.read_bytes(&mut staged);
        if got == 0 {
            return None;
        }
        Buffer::from_bytes(&staged[..got]).ok()
    }

    /// Move the logical read offset by `delta`, clamped to the content's
    /// bounds. Returns the distance actually moved.
    pub fn skip_bytes(&mut self, delta: i64) -> i64 {
        // Fast path: forward within the cached block.
        if delta >= 0 && delta <= self.read_block.size() as i64 {
            return self.read_block.skip_bytes(delta);
        }
        let logical = self.offset();
        let total = self.total_bytes();
        let mut target = (logical + delta).max(0);
        if total >= 0 {
            target = target.min(total);
        }
        self.seek_read(target) - logical
    }

    /// Rewind the read side to the start of the content.
    pub fn reset_bytes(&mut self) {
        self.seek_read(0);
    }

    fn seek_read(&mut self, target: i64) -> i64 {
        let reached = self.proto.seek_bytes(target);
        if reached < 0 {
            // Seek failed; keep the current view.
            return self.offset();
        }
        self.read_block.clear_bytes();
        self.next_read = reached;
        reached
    }

    /// Pull the next block through the protocol. Returns false at
    /// end-of-stream.
    fn fetch_block(&mut self) -> bool {
        self.read_block.clear_bytes();
        if self.proto.seek_bytes(self.next_read) < 0 {
            return false;
        }
        let n = self.proto.read_bytes(&mut self.read_block);
        self.next_read += n as i64;
        n > 0
    }

    /// Append bytes through the pending write block. Returns bytes
    /// accepted; a short count means the protocol rejected a write-back.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> usize {
        if !self.mode().writable() {
            return 0;
        }
        let mut wrote = 0;
        while wrote < bytes.len() {
            wrote += self.write_block.write_bytes(&bytes[wrote..]);
            if self.write_block.vacancy() == 0 && !self.write_block_back() {
                break;
            }
        }
        wrote
    }

    /// Append another buffer's unread bytes without consuming them.
    pub fn write_buffer(&mut self, buffer: &Buffer) -> usize {
        self.write_bytes(buffer.data())
    }

    /// Push the pending write block through the protocol.
    pub fn flush_bytes(&mut self) {
        if self.write_block.size() > 0 {
            self.write_block_back();
        }
    }

    fn write_block_back(&mut self) -> bool {
        let pending = self.write_block.size();
        if pending == 0 {
            return true;
        }
        if self.proto.seek_bytes(self.write_position) < 0 {
            tracing::warn!(position = self.write_position, "content write-back seek failed");
            self.write_block.clear_bytes();
            return false;
        }
        let written = self.proto.write_bytes(&mut self.write_block);
        self.write_position += written as i64;
        self.write_block.clear_bytes();
        if written < pending {
            tracing::warn!(
                written,
                pending,
                "content write-back dropped {} bytes",
                pending - written
            );
            return false;
        }
        true
    }
}

impl Drop for Content {
    fn drop(&mut self) {
        self.flush_bytes();
    }
}

impl std::fmt::Debug for Content {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Content")
            .field("mode", &self.mode())
            .field("offset", &self.offset())
            .field("total", &self.total_bytes())
            .finish()
    }
}

/// File-backed [`Protocol`].
pub struct FileProtocol {
    file: File,
    mode: ProtocolMode,
    block: usize,
}

/// Default transfer granularity for files.
pub const FILE_BLOCK_LENGTH: usize = 4096;

impl FileProtocol {
    /// Open an existing file read-only.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<FileProtocol> {
        Ok(FileProtocol {
            file: File::open(path)?,
            mode: ProtocolMode::Read,
            block: FILE_BLOCK_LENGTH,
        })
    }

    /// Open or create a file for reading and writing.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<FileProtocol> {
        Ok(FileProtocol {
            file: OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(path)?,
            mode: ProtocolMode::ReadWrite,
            block: FILE_BLOCK_LENGTH,
        })
    }

    /// Override the transfer granularity.
    pub fn with_block_length(mut self, block: usize) -> FileProtocol {
        assert!(block > 0, "block length must be > 0");
        self.block = block;
        self
    }
}

impl Protocol for FileProtocol {
    fn mode(&self) -> ProtocolMode {
        self.mode
    }

    fn read_bytes(&mut self, buffer: &mut Buffer) -> usize {
        let mut staged = vec![0u8; buffer.vacancy()];
        let mut got = 0;
        while got < staged.len() {
            match self.file.read(&mut staged[got..]) {
                Ok(0) => break,
                Ok(n) => got += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
        buffer.write_bytes(&staged[..got])
    }

    fn write_bytes(&mut self, buffer: &mut Buffer) -> usize {
        match self.file.write_all(buffer.data()) {
            Ok(()) => {
                let n = buffer.size();
                buffer.skip_bytes(n as i64);
                n
            }
            Err(_) => 0,
        }
    }

    fn total_bytes(&self) -> i64 {
        match self.file.metadata() {
            Ok(meta) => meta.len() as i64,
            Err(_) => -1,
        }
    }

    fn seek_bytes(&mut self, pos: i64) -> i64 {
        if pos < 0 {
            return -1;
        }
        match self.file.seek(SeekFrom::Start(pos as u64)) {
            Ok(reached) => reached as i64,
            Err(_) => -1,
        }
    }

    fn block_length(&self) -> usize {
        self.block
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_file_with(content: &[u8]) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("content.bin");
        std::fs::write(&path, content).unwrap();
        (dir, path)
    }

    #[test]
    fn test_read_through_blocks() {
        // Content spanning several blocks with a tiny block length.
        let payload: Vec<u8> = (0..1000u32).flat_map(|i| (i as u16).to_le_bytes()).collect();
        let (_dir, path) = temp_file_with(&payload);

        let proto = FileProtocol::open(&path).unwrap().with_block_length(64);
        let mut c = Content::new(Box::new(proto)).unwrap();
        assert!(c.mode().readable());
        assert_eq!(c.total_bytes(), payload.len() as i64);

        let mut out = vec![0u8; payload.len()];
        assert_eq!(c.read_bytes(&mut out), payload.len());
        assert_eq!(out, payload);

        // End of stream.
        let mut more = [0u8; 8];
        assert_eq!(c.read_bytes(&mut more), 0);
    }

    #[test]
    fn test_skip_and_offset() {
        let payload: Vec<u8> = (0..=255u8).collect();
        let (_dir, path) = temp_file_with(&payload);

        let proto = FileProtocol::open(&path).unwrap().with_block_length(16);
        let mut c = Content::new(Box::new(proto)).unwrap();

        assert_eq!(c.skip_bytes(100), 100);
        assert_eq!(c.offset(), 100);
        let mut one = [0u8; 1];
        assert_eq!(c.read_bytes(&mut one), 1);
        assert_eq!(one[0], 100);

        // Backwards past the cached block.
        assert_eq!(c.skip_bytes(-101), -101);
        assert_eq!(c.offset(), 0);
        assert_eq!(c.read_bytes(&mut one), 1);
        assert_eq!(one[0], 0);

        // Clamped at the end.
        assert_eq!(c.skip_bytes(10_000), 255);
        assert_eq!(c.size(), 0);
    }

    #[test]
    fn test_reset_replays() {
        let (_dir, path) = temp_file_with(b"replay me");
        let mut c = Content::open(&path).unwrap();

        let first = c.read_buffer(6).unwrap();
        assert_eq!(first.data(), b"replay");
        c.reset_bytes();
        let again = c.read_buffer(6).unwrap();
        assert_eq!(again.data(), b"replay");
    }

    #[test]
    fn test_write_flush_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bin");

        {
            let proto = FileProtocol::create(&path).unwrap().with_block_length(8);
            let mut c = Content::new(Box::new(proto)).unwrap();
            assert!(c.mode().writable());
            // Crosses several block write-backs, ends with a partial block
            // that only the drop-flush pushes out.
            assert_eq!(c.write_bytes(b"0123456789abcdefghij"), 20);
        }

        assert_eq!(std::fs::read(&path).unwrap(), b"0123456789abcdefghij");
    }

    #[test]
    fn test_write_on_read_only_rejected() {
        let (_dir, path) = temp_file_with(b"immutable");
        let mut c = Content::open(&path).unwrap();
        assert_eq!(c.write_bytes(b"nope"), 0);
        drop(c);
        assert_eq!(std::fs::read(&path).unwrap(), b"immutable");
    }

    #[test]
    fn test_read_buffer_short_at_eof() {
        let (_dir, path) = temp_file_with(b"tiny");
        let mut c = Content::open(&path).unwrap();
        let b = c.read_buffer(100).unwrap();
        assert_eq!(b.data(), b"tiny");
        assert!(c.read_buffer(1).is_none());
    }
}
