//! Integration tests for object lifetime and copy-on-write behavior.
//!
//! These tests exercise the reference-counting layer end to end: strong and
//! weak handles racing across threads, buffers diverging on write, and
//! object graphs carried through messages.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::thread;
use strata::buffer::Buffer;
use strata::fourcc::FourCc;
use strata::memory::{Allocator, CountingAllocator, SharedBuffer};
use strata::message::Message;
use strata::object::{SharedObject, Sp};

// ============================================================================
// Strong/Weak Lifetime Scenarios
// ============================================================================

struct Tracked {
    drops: Arc<AtomicU32>,
}

impl SharedObject for Tracked {
    fn object_id(&self) -> FourCc {
        FourCc::new(b"trck")
    }
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::SeqCst);
    }
}

/// Two strong handles and one weak: the object dies with the second strong
/// release and the weak handle observes the death.
#[test]
fn test_strong2_weak1_lifecycle() {
    let drops = Arc::new(AtomicU32::new(0));
    let a = Sp::new(Tracked {
        drops: Arc::clone(&drops),
    });
    let b = a.clone();
    let w = a.downgrade();

    assert_eq!(a.retain_count(), 2);
    drop(a);
    assert_eq!(drops.load(Ordering::SeqCst), 0);
    assert!(w.upgrade().is_some());

    drop(b);
    assert_eq!(drops.load(Ordering::SeqCst), 1);
    assert!(w.upgrade().is_none());
}

/// Handles cloned and dropped from many threads destroy the object exactly
/// once, never early.
#[test]
fn test_cross_thread_destruction_exactly_once() {
    for _ in 0..32 {
        let drops = Arc::new(AtomicU32::new(0));
        let root = Sp::new(Tracked {
            drops: Arc::clone(&drops),
        });
        let weak = root.downgrade();

        let workers: Vec<_> = (0..4)
            .map(|_| {
                let strong = root.clone();
                let weak = weak.clone();
                thread::spawn(move || {
                    for _ in 0..500 {
                        let _extra = strong.clone();
                        if let Some(promoted) = weak.upgrade() {
                            assert_eq!(promoted.object_id(), FourCc::new(b"trck"));
                        }
                    }
                })
            })
            .collect();
        drop(root);
        for worker in workers {
            worker.join().unwrap();
        }

        assert_eq!(drops.load(Ordering::SeqCst), 1);
        assert!(weak.upgrade().is_none());
    }
}

// ============================================================================
// Copy-On-Write Divergence
// ============================================================================

/// Two handles share 16 bytes; a write through one leaves
/// the other reading the original bytes, and the backing memory is freed
/// exactly twice (original + private copy).
#[test]
fn test_shared_buffer_divergence() {
    let counting = Arc::new(CountingAllocator::new());
    let allocator: Arc<dyn Allocator> = counting.clone();

    {
        let a = SharedBuffer::create(&allocator, 16).unwrap();
        let mut b = a.clone();
        assert_eq!(a.retain_count(), 2);

        b.edit(0)[0] = 0xEE;
        assert_eq!(a.retain_count(), 1);
        assert_eq!(b.retain_count(), 1);
        assert_eq!(a.as_slice()[0], 0x00);
        assert_eq!(b.as_slice()[0], 0xEE);
        assert_eq!(counting.allocations(), 2);
    }
    assert_eq!(counting.live(), 0);
}

/// The same divergence observed through the FIFO buffer layer.
#[test]
fn test_buffer_clone_divergence() {
    let mut a = Buffer::new(16).unwrap();
    a.write_bytes(&[0xAA; 16]);
    let mut b = a.clone();

    let mut out = [0u8; 4];
    b.read_bytes(&mut out);
    b.reset_bytes();
    assert_eq!(a.offset(), 0); // cursors are per-handle

    // Writing forces divergence; reads on the other handle are unaffected.
    let mut c = a.clone();
    c.clear_bytes();
    c.write_bytes(&[0xBB; 16]);
    assert_eq!(a.data(), &[0xAA; 16]);
    assert_eq!(c.data(), &[0xBB; 16]);
}

// ============================================================================
// Object Graphs Through Messages
// ============================================================================

/// A message carrying buffers and nested messages keeps everything alive
/// and recoverable with its concrete type.
#[test]
fn test_message_object_graph() {
    let mut payload = Buffer::new(8).unwrap();
    payload.write_bytes(b"pixels");
    let payload = Sp::new(payload);

    let mut format = Message::new();
    format.set_i32(FourCc::new(b"wdth"), 1920);
    format.set_i32(FourCc::new(b"hght"), 1080);

    let mut frame = Message::new();
    frame.set_object(FourCc::new(b"data"), payload.clone().into_object());
    frame.set_object(FourCc::new(b"frmt"), Sp::new(format).into_object());
    frame.set_i64(FourCc::new(b"pts "), 40_000);

    assert_eq!(payload.retain_count(), 2);

    let data = frame.find_object(FourCc::new(b"data")).unwrap();
    assert_eq!(data.object_id(), FourCc::BUFFER);
    let data = data.downcast::<Buffer>().ok().unwrap();
    assert_eq!(data.data(), b"pixels");

    let format = frame
        .find_object(FourCc::new(b"frmt"))
        .unwrap()
        .downcast::<Message>()
        .ok()
        .unwrap();
    assert_eq!(format.find_i32(FourCc::new(b"wdth"), 0), 1920);

    frame.clear();
    drop(data);
    assert_eq!(payload.retain_count(), 1);
}
