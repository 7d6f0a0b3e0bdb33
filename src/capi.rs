//! C binding surface.
//!
//! Opaque-handle `extern "C"` wrappers over the crate's core types. Every
//! constructor hands out a heap handle the caller owns; each handle must be
//! released exactly once through the matching `*_release` function.
//! Releasing a handle drops one reference; the underlying object lives on
//! while other handles (or Rust-side references) still hold it.
//!
//! Null handles are tolerated everywhere and act as no-ops, so a C caller
//! can propagate an allocation failure without crashing in the bindings.
//!
//! Handle families:
//! - `strata_object_t`: any reference-counted object (jobs, loopers,
//!   dispatch queues). Boxed `Sp<dyn SharedObject>` underneath.
//! - `strata_allocator_t`: a memory backend; blocks and buffers can be
//!   created through a specific allocator instead of the default.
//! - `strata_shared_buffer_t` / `strata_buffer_t` / `strata_message_t`:
//!   owned single-type handles; "retain" for these is a cheap
//!   copy-on-write clone.

#![allow(non_camel_case_types)]

use crate::buffer::Buffer;
use crate::looper::{DispatchQueue, Job, Looper};
use crate::memory::{Allocator, SharedBuffer, default_allocator};
use crate::message::Message;
use crate::object::{SharedObject, Sp};
use std::any::Any;
use std::ffi::{CStr, c_char, c_void};
use std::sync::Arc;
use std::time::Duration;

/// Opaque reference-counted object handle.
pub struct strata_object_t {
    inner: Sp<dyn SharedObject>,
}

/// Opaque allocator handle.
pub struct strata_allocator_t {
    inner: Arc<dyn Allocator>,
}

/// Opaque shared byte block handle.
pub struct strata_shared_buffer_t {
    inner: SharedBuffer,
}

/// Opaque FIFO buffer handle.
pub struct strata_buffer_t {
    inner: Buffer,
}

/// Opaque message handle.
pub struct strata_message_t {
    inner: Message,
}

fn object_handle(inner: Sp<dyn SharedObject>) -> *mut strata_object_t {
    Box::into_raw(Box::new(strata_object_t { inner }))
}

/// Borrow a typed view of an object handle.
///
/// # Safety
///
/// `handle` must be null or a live pointer from this module.
unsafe fn downcast_ref<'a, T: SharedObject>(handle: *mut strata_object_t) -> Option<&'a T> {
    if handle.is_null() {
        return None;
    }
    // SAFETY: caller guarantees the handle is live.
    let object: &dyn SharedObject = unsafe { (*handle).inner.get() };
    (object as &dyn Any).downcast_ref::<T>()
}

/// Clone a typed strong reference out of an object handle.
///
/// # Safety
///
/// `handle` must be null or a live pointer from this module.
unsafe fn downcast_sp<T: SharedObject>(handle: *mut strata_object_t) -> Option<Sp<T>> {
    if handle.is_null() {
        return None;
    }
    // SAFETY: caller guarantees the handle is live.
    unsafe { (*handle).inner.clone() }.downcast::<T>().ok()
}

// ---------------------------------------------------------------- object --

/// Take an additional strong reference; returns a new handle that must be
/// released independently.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn strata_object_retain(
    handle: *mut strata_object_t,
) -> *mut strata_object_t {
    if handle.is_null() {
        return std::ptr::null_mut();
    }
    // SAFETY: live handle per contract.
    object_handle(unsafe { (*handle).inner.clone() })
}

/// Drop one strong reference and free the handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn strata_object_release(handle: *mut strata_object_t) {
    if handle.is_null() {
        return;
    }
    // SAFETY: live handle per contract; ownership transfers back here.
    drop(unsafe { Box::from_raw(handle) });
}

/// The object's four-character type tag, packed big-endian.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn strata_object_id(handle: *mut strata_object_t) -> u32 {
    if handle.is_null() {
        return 0;
    }
    // SAFETY: live handle per contract.
    unsafe { (*handle).inner.object_id() }.as_u32()
}

/// Current strong reference count (debugging).
#[unsafe(no_mangle)]
pub unsafe extern "C" fn strata_object_retain_count(handle: *mut strata_object_t) -> u32 {
    if handle.is_null() {
        return 0;
    }
    // SAFETY: live handle per contract.
    unsafe { (*handle).inner.retain_count() }
}

// -------------------------------------------------------------- allocator --

/// A handle to the process-wide default allocator.
#[unsafe(no_mangle)]
pub extern "C" fn strata_allocator_default() -> *mut strata_allocator_t {
    Box::into_raw(Box::new(strata_allocator_t {
        inner: default_allocator(),
    }))
}

/// Take another reference to the same allocator.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn strata_allocator_retain(
    handle: *mut strata_allocator_t,
) -> *mut strata_allocator_t {
    if handle.is_null() {
        return std::ptr::null_mut();
    }
    // SAFETY: live handle per contract.
    let inner = unsafe { Arc::clone(&(*handle).inner) };
    Box::into_raw(Box::new(strata_allocator_t { inner }))
}

/// Drop one reference and free the handle. Blocks created through the
/// allocator keep their own reference and stay valid.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn strata_allocator_release(handle: *mut strata_allocator_t) {
    if handle.is_null() {
        return;
    }
    // SAFETY: live handle per contract.
    drop(unsafe { Box::from_raw(handle) });
}

/// Minimum alignment this allocator guarantees.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn strata_allocator_alignment(handle: *mut strata_allocator_t) -> usize {
    if handle.is_null() {
        return 0;
    }
    // SAFETY: live handle per contract.
    unsafe { (*handle).inner.alignment() }
}

// --------------------------------------------------------- shared buffer --

/// Allocate a shared byte block. Null if `size` is zero.
#[unsafe(no_mangle)]
pub extern "C" fn strata_shared_buffer_create(size: usize) -> *mut strata_shared_buffer_t {
    match SharedBuffer::with_default_allocator(size) {
        Ok(inner) => Box::into_raw(Box::new(strata_shared_buffer_t { inner })),
        Err(_) => std::ptr::null_mut(),
    }
}

/// Allocate a shared byte block through a specific allocator. Null if
/// `allocator` is null or `size` is zero.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn strata_shared_buffer_create_with(
    allocator: *mut strata_allocator_t,
    size: usize,
) -> *mut strata_shared_buffer_t {
    if allocator.is_null() {
        return std::ptr::null_mut();
    }
    // SAFETY: live handle per contract.
    match SharedBuffer::create(unsafe { &(*allocator).inner }, size) {
        Ok(inner) => Box::into_raw(Box::new(strata_shared_buffer_t { inner })),
        Err(_) => std::ptr::null_mut(),
    }
}

/// Take another reference to the same block.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn strata_shared_buffer_retain(
    handle: *mut strata_shared_buffer_t,
) -> *mut strata_shared_buffer_t {
    if handle.is_null() {
        return std::ptr::null_mut();
    }
    // SAFETY: live handle per contract.
    let inner = unsafe { (*handle).inner.clone() };
    Box::into_raw(Box::new(strata_shared_buffer_t { inner }))
}

/// Drop one reference and free the handle; the block is freed with the
/// last reference.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn strata_shared_buffer_release(handle: *mut strata_shared_buffer_t) {
    if handle.is_null() {
        return;
    }
    // SAFETY: live handle per contract.
    drop(unsafe { Box::from_raw(handle) });
}

/// Block length in bytes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn strata_shared_buffer_size(handle: *mut strata_shared_buffer_t) -> usize {
    if handle.is_null() {
        return 0;
    }
    // SAFETY: live handle per contract.
    unsafe { (*handle).inner.len() }
}

/// Read-only view of the block's bytes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn strata_shared_buffer_data(
    handle: *mut strata_shared_buffer_t,
) -> *const u8 {
    if handle.is_null() {
        return std::ptr::null();
    }
    // SAFETY: live handle per contract.
    unsafe { (*handle).inner.as_ptr() }
}

/// Current reference count (debugging).
#[unsafe(no_mangle)]
pub unsafe extern "C" fn strata_shared_buffer_retain_count(
    handle: *mut strata_shared_buffer_t,
) -> u32 {
    if handle.is_null() {
        return 0;
    }
    // SAFETY: live handle per contract.
    unsafe { (*handle).inner.retain_count() }
}

/// Make the block writable through this handle, copying it first if other
/// references exist. `new_size == 0` keeps the current length. Returns a
/// pointer to the (possibly moved) bytes, valid until the next operation
/// on this handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn strata_shared_buffer_edit(
    handle: *mut strata_shared_buffer_t,
    new_size: usize,
) -> *mut u8 {
    if handle.is_null() {
        return std::ptr::null_mut();
    }
    // SAFETY: live handle per contract; exclusive access is the caller's
    // responsibility, as with any C byte pointer.
    unsafe { (*handle).inner.edit(new_size) }.as_mut_ptr()
}

// ----------------------------------------------------------------- buffer --

/// Allocate an empty FIFO buffer. Null if `capacity` is zero.
#[unsafe(no_mangle)]
pub extern "C" fn strata_buffer_create(capacity: usize) -> *mut strata_buffer_t {
    match Buffer::new(capacity) {
        Ok(inner) => Box::into_raw(Box::new(strata_buffer_t { inner })),
        Err(_) => std::ptr::null_mut(),
    }
}

/// Allocate an empty FIFO buffer through a specific allocator. Null if
/// `allocator` is null or `capacity` is zero.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn strata_buffer_create_with(
    allocator: *mut strata_allocator_t,
    capacity: usize,
) -> *mut strata_buffer_t {
    if allocator.is_null() {
        return std::ptr::null_mut();
    }
    // SAFETY: live handle per contract.
    match Buffer::with_allocator(capacity, unsafe { &(*allocator).inner }) {
        Ok(inner) => Box::into_raw(Box::new(strata_buffer_t { inner })),
        Err(_) => std::ptr::null_mut(),
    }
}

/// Copy-on-write clone: shares bytes until either side writes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn strata_buffer_clone(handle: *mut strata_buffer_t) -> *mut strata_buffer_t {
    if handle.is_null() {
        return std::ptr::null_mut();
    }
    // SAFETY: live handle per contract.
    let inner = unsafe { (*handle).inner.clone() };
    Box::into_raw(Box::new(strata_buffer_t { inner }))
}

/// Free the handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn strata_buffer_release(handle: *mut strata_buffer_t) {
    if handle.is_null() {
        return;
    }
    // SAFETY: live handle per contract.
    drop(unsafe { Box::from_raw(handle) });
}

/// Append up to `len` bytes; returns how many fit.
///
/// # Safety
///
/// `bytes` must point to `len` readable bytes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn strata_buffer_write(
    handle: *mut strata_buffer_t,
    bytes: *const u8,
    len: usize,
) -> usize {
    if handle.is_null() || bytes.is_null() {
        return 0;
    }
    // SAFETY: caller guarantees bytes/len.
    let src = unsafe { std::slice::from_raw_parts(bytes, len) };
    // SAFETY: live handle per contract.
    unsafe { (*handle).inner.write_bytes(src) }
}

/// Read up to `len` bytes into `out`; returns how many were available.
///
/// # Safety
///
/// `out` must point to `len` writable bytes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn strata_buffer_read(
    handle: *mut strata_buffer_t,
    out: *mut u8,
    len: usize,
) -> usize {
    if handle.is_null() || out.is_null() {
        return 0;
    }
    // SAFETY: caller guarantees out/len.
    let dst = unsafe { std::slice::from_raw_parts_mut(out, len) };
    // SAFETY: live handle per contract.
    unsafe { (*handle).inner.read_bytes(dst) }
}

/// Unread bytes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn strata_buffer_size(handle: *mut strata_buffer_t) -> usize {
    if handle.is_null() {
        return 0;
    }
    // SAFETY: live handle per contract.
    unsafe { (*handle).inner.size() }
}

/// Total capacity.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn strata_buffer_capacity(handle: *mut strata_buffer_t) -> usize {
    if handle.is_null() {
        return 0;
    }
    // SAFETY: live handle per contract.
    unsafe { (*handle).inner.capacity() }
}

// ---------------------------------------------------------------- message --

/// Create an empty message.
#[unsafe(no_mangle)]
pub extern "C" fn strata_message_create() -> *mut strata_message_t {
    Box::into_raw(Box::new(strata_message_t {
        inner: Message::new(),
    }))
}

/// Free the handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn strata_message_release(handle: *mut strata_message_t) {
    if handle.is_null() {
        return;
    }
    // SAFETY: live handle per contract.
    drop(unsafe { Box::from_raw(handle) });
}

/// Store a 32-bit integer under a packed four-character key.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn strata_message_set_i32(
    handle: *mut strata_message_t,
    name: u32,
    value: i32,
) {
    if handle.is_null() {
        return;
    }
    // SAFETY: live handle per contract.
    unsafe { (*handle).inner.set_i32(crate::fourcc::FourCc::from_u32(name), value) };
}

/// Fetch a 32-bit integer, or `def` on miss or type mismatch.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn strata_message_find_i32(
    handle: *mut strata_message_t,
    name: u32,
    def: i32,
) -> i32 {
    if handle.is_null() {
        return def;
    }
    // SAFETY: live handle per contract.
    unsafe { (*handle).inner.find_i32(crate::fourcc::FourCc::from_u32(name), def) }
}

/// Is the key present?
#[unsafe(no_mangle)]
pub unsafe extern "C" fn strata_message_contains(
    handle: *mut strata_message_t,
    name: u32,
) -> bool {
    if handle.is_null() {
        return false;
    }
    // SAFETY: live handle per contract.
    unsafe { (*handle).inner.contains(crate::fourcc::FourCc::from_u32(name)) }
}

/// Remove an entry; true if it existed.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn strata_message_remove(handle: *mut strata_message_t, name: u32) -> bool {
    if handle.is_null() {
        return false;
    }
    // SAFETY: live handle per contract.
    unsafe { (*handle).inner.remove(crate::fourcc::FourCc::from_u32(name)) }.is_some()
}

/// Number of entries.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn strata_message_size(handle: *mut strata_message_t) -> usize {
    if handle.is_null() {
        return 0;
    }
    // SAFETY: live handle per contract.
    unsafe { (*handle).inner.len() }
}

// -------------------------------------------------------------------- job --

struct CallbackJob {
    callback: extern "C" fn(*mut c_void),
    user: *mut c_void,
}

// SAFETY: the C caller owns the threading contract for `user`, exactly as
// with any callback-plus-context C API.
unsafe impl Send for CallbackJob {}
unsafe impl Sync for CallbackJob {}

/// Create a job around a C callback. The callback may run on a looper
/// thread; `user` must stay valid until the last handle is released.
#[unsafe(no_mangle)]
pub extern "C" fn strata_job_create(
    callback: extern "C" fn(*mut c_void),
    user: *mut c_void,
) -> *mut strata_object_t {
    let ctx = CallbackJob { callback, user };
    object_handle(
        Job::new(move || {
            let ctx = &ctx;
            (ctx.callback)(ctx.user)
        })
        .into_object(),
    )
}

/// Cancel a pending dispatch; true if the job had not started.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn strata_job_cancel(job: *mut strata_object_t) -> bool {
    // SAFETY: forwarded handle contract.
    match unsafe { downcast_ref::<Job>(job) } {
        Some(job) => job.cancel(),
        None => false,
    }
}

// ----------------------------------------------------------------- looper --

/// Spawn a looper with a named worker thread. Null on invalid name or
/// thread spawn failure.
///
/// # Safety
///
/// `name` must be null or a NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn strata_looper_create(name: *const c_char) -> *mut strata_object_t {
    let name = if name.is_null() {
        "looper"
    } else {
        // SAFETY: caller guarantees NUL termination.
        match unsafe { CStr::from_ptr(name) }.to_str() {
            Ok(name) => name,
            Err(_) => return std::ptr::null_mut(),
        }
    };
    match Looper::new(name) {
        Ok(looper) => object_handle(looper.into_object()),
        Err(_) => std::ptr::null_mut(),
    }
}

/// Enqueue a job to run after `after_us` microseconds.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn strata_looper_dispatch(
    looper: *mut strata_object_t,
    job: *mut strata_object_t,
    after_us: u64,
) {
    // SAFETY: forwarded handle contract.
    let (looper, job) =
        match unsafe { (downcast_ref::<Looper>(looper), downcast_sp::<Job>(job)) } {
            (Some(looper), Some(job)) => (looper, job),
            _ => return,
        };
    looper.dispatch(&job, Duration::from_micros(after_us));
}

/// Run a job and wait up to `deadline_us` microseconds; 0 waits forever.
/// True when the job completed.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn strata_looper_sync(
    looper: *mut strata_object_t,
    job: *mut strata_object_t,
    deadline_us: u64,
) -> bool {
    // SAFETY: forwarded handle contract.
    let (looper, job) =
        match unsafe { (downcast_ref::<Looper>(looper), downcast_sp::<Job>(job)) } {
            (Some(looper), Some(job)) => (looper, job),
            _ => return false,
        };
    let deadline = (deadline_us > 0).then(|| Duration::from_micros(deadline_us));
    looper.sync(&job, deadline)
}

/// Remove a pending job; true if anything was removed.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn strata_looper_remove(
    looper: *mut strata_object_t,
    job: *mut strata_object_t,
) -> bool {
    // SAFETY: forwarded handle contract.
    match unsafe { (downcast_ref::<Looper>(looper), downcast_sp::<Job>(job)) } {
        (Some(looper), Some(job)) => looper.remove(&job),
        _ => false,
    }
}

/// Is the job still pending on this looper?
#[unsafe(no_mangle)]
pub unsafe extern "C" fn strata_looper_exists(
    looper: *mut strata_object_t,
    job: *mut strata_object_t,
) -> bool {
    // SAFETY: forwarded handle contract.
    match unsafe { (downcast_ref::<Looper>(looper), downcast_sp::<Job>(job)) } {
        (Some(looper), Some(job)) => looper.exists(&job),
        _ => false,
    }
}

/// Drop every pending job.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn strata_looper_flush(looper: *mut strata_object_t) {
    // SAFETY: forwarded handle contract.
    if let Some(looper) = unsafe { downcast_ref::<Looper>(looper) } {
        looper.flush();
    }
}

/// Stop the worker thread, dropping pending jobs. Idempotent.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn strata_looper_terminate(looper: *mut strata_object_t) {
    // SAFETY: forwarded handle contract.
    if let Some(looper) = unsafe { downcast_ref::<Looper>(looper) } {
        looper.terminate();
    }
}

// --------------------------------------------------------- dispatch queue --

/// Attach a serial queue to a looper.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn strata_dispatch_queue_create(
    looper: *mut strata_object_t,
) -> *mut strata_object_t {
    // SAFETY: forwarded handle contract.
    match unsafe { downcast_sp::<Looper>(looper) } {
        Some(looper) => object_handle(DispatchQueue::new(&looper).into_object()),
        None => std::ptr::null_mut(),
    }
}

/// Enqueue a job on this queue after `after_us` microseconds.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn strata_dispatch_queue_dispatch(
    queue: *mut strata_object_t,
    job: *mut strata_object_t,
    after_us: u64,
) {
    // SAFETY: forwarded handle contract.
    let (queue, job) =
        match unsafe { (downcast_ref::<DispatchQueue>(queue), downcast_sp::<Job>(job)) } {
            (Some(queue), Some(job)) => (queue, job),
            _ => return,
        };
    queue.dispatch(&job, Duration::from_micros(after_us));
}

/// Run a job on this queue and wait; 0 waits forever.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn strata_dispatch_queue_sync(
    queue: *mut strata_object_t,
    job: *mut strata_object_t,
    deadline_us: u64,
) -> bool {
    // SAFETY: forwarded handle contract.
    let (queue, job) =
        match unsafe { (downcast_ref::<DispatchQueue>(queue), downcast_sp::<Job>(job)) } {
            (Some(queue), Some(job)) => (queue, job),
            _ => return false,
        };
    let deadline = (deadline_us > 0).then(|| Duration::from_micros(deadline_us));
    queue.sync(&job, deadline)
}

/// Drop this queue's pending jobs only.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn strata_dispatch_queue_flush(queue: *mut strata_object_t) {
    // SAFETY: forwarded handle contract.
    if let Some(queue) = unsafe { downcast_ref::<DispatchQueue>(queue) } {
        queue.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_shared_buffer_handles() {
        let a = strata_shared_buffer_create(64);
        assert!(!a.is_null());
        unsafe {
            assert_eq!(strata_shared_buffer_size(a), 64);
            let b = strata_shared_buffer_retain(a);
            assert_eq!(strata_shared_buffer_retain_count(a), 2);

            // Editing through one handle detaches it from the other.
            let bytes = strata_shared_buffer_edit(a, 0);
            *bytes = 7;
            assert_eq!(strata_shared_buffer_retain_count(b), 1);
            assert_eq!(*strata_shared_buffer_data(b), 0);
            assert_eq!(*strata_shared_buffer_data(a), 7);

            strata_shared_buffer_release(a);
            strata_shared_buffer_release(b);
        }
        assert!(strata_shared_buffer_create(0).is_null());
    }

    #[test]
    fn test_allocator_handles() {
        unsafe {
            let alloc = strata_allocator_default();
            assert!(!alloc.is_null());
            assert!(strata_allocator_alignment(alloc) >= std::mem::align_of::<usize>());

            let block = strata_shared_buffer_create_with(alloc, 32);
            assert!(!block.is_null());
            assert_eq!(strata_shared_buffer_size(block), 32);
            strata_shared_buffer_release(block);

            let buf = strata_buffer_create_with(alloc, 16);
            assert_eq!(strata_buffer_capacity(buf), 16);
            strata_buffer_release(buf);

            // Blocks outlive the handle they were created through.
            let second = strata_allocator_retain(alloc);
            strata_allocator_release(alloc);
            assert!(strata_shared_buffer_create_with(second, 0).is_null());
            let block = strata_shared_buffer_create_with(second, 8);
            strata_allocator_release(second);
            assert_eq!(strata_shared_buffer_size(block), 8);
            strata_shared_buffer_release(block);

            assert!(strata_shared_buffer_create_with(std::ptr::null_mut(), 8).is_null());
            assert_eq!(strata_allocator_alignment(std::ptr::null_mut()), 0);
        }
    }

    #[test]
    fn test_buffer_write_read() {
        let b = strata_buffer_create(16);
        unsafe {
            assert_eq!(strata_buffer_capacity(b), 16);
            assert_eq!(strata_buffer_write(b, b"abcdef".as_ptr(), 6), 6);
            assert_eq!(strata_buffer_size(b), 6);

            let c = strata_buffer_clone(b);
            let mut out = [0u8; 6];
            assert_eq!(strata_buffer_read(b, out.as_mut_ptr(), 6), 6);
            assert_eq!(&out, b"abcdef");
            assert_eq!(strata_buffer_size(b), 0);
            assert_eq!(strata_buffer_size(c), 6); // clone keeps its cursors

            strata_buffer_release(b);
            strata_buffer_release(c);
        }
    }

    #[test]
    fn test_message_handles() {
        let key = crate::fourcc::FourCc::new(b"rate").as_u32();
        let m = strata_message_create();
        unsafe {
            strata_message_set_i32(m, key, 48_000);
            assert!(strata_message_contains(m, key));
            assert_eq!(strata_message_find_i32(m, key, 0), 48_000);
            assert_eq!(strata_message_find_i32(m, 1, -1), -1);
            assert_eq!(strata_message_size(m), 1);
            assert!(strata_message_remove(m, key));
            assert!(!strata_message_contains(m, key));
            strata_message_release(m);
        }
    }

    #[test]
    fn test_object_retain_release() {
        extern "C" fn noop(_: *mut c_void) {}

        let job = strata_job_create(noop, std::ptr::null_mut());
        unsafe {
            assert_eq!(
                strata_object_id(job),
                crate::fourcc::FourCc::JOB.as_u32()
            );
            assert_eq!(strata_object_retain_count(job), 1);
            let second = strata_object_retain(job);
            assert_eq!(strata_object_retain_count(job), 2);
            strata_object_release(second);
            assert_eq!(strata_object_retain_count(job), 1);
            strata_object_release(job);
        }
    }

    #[test]
    fn test_looper_round_trip() {
        static HITS: AtomicU32 = AtomicU32::new(0);
        extern "C" fn bump(_: *mut c_void) {
            HITS.fetch_add(1, Ordering::SeqCst);
        }

        unsafe {
            let looper = strata_looper_create(c"capi-looper".as_ptr());
            assert!(!looper.is_null());
            let job = strata_job_create(bump, std::ptr::null_mut());

            assert!(strata_looper_sync(looper, job, 5_000_000));
            assert_eq!(HITS.load(Ordering::SeqCst), 1);

            // Pending far-future dispatch is visible and removable.
            strata_looper_dispatch(looper, job, 60_000_000);
            assert!(strata_looper_exists(looper, job));
            assert!(strata_looper_remove(looper, job));
            assert!(!strata_looper_exists(looper, job));

            let queue = strata_dispatch_queue_create(looper);
            assert!(strata_dispatch_queue_sync(queue, job, 5_000_000));
            assert_eq!(HITS.load(Ordering::SeqCst), 2);
            strata_dispatch_queue_dispatch(queue, job, 60_000_000);
            strata_dispatch_queue_flush(queue);

            strata_looper_terminate(looper);
            strata_object_release(queue);
            strata_object_release(job);
            strata_object_release(looper);
        }
    }
}
