//! Intrusive strong/weak reference counting for polymorphic objects.
//!
//! Heap entities that flow through the framework (buffers, messages, jobs)
//! implement [`SharedObject`] and are held through [`Sp`] (strong) and
//! [`Wp`] (weak) handles. The counters live in a [`Refs`] record allocated
//! in front of the value, so a weak handle can outlive the value itself:
//! the value is dropped when the strong count hits zero, the allocation is
//! freed when the weak count hits zero (strong holders collectively own one
//! weak unit).
//!
//! All counter operations are sequentially consistent (see [`Atomic`]), so
//! once any thread observes a strong count of zero no other thread can
//! resurrect the object: weak promotion is a compare-and-swap loop that
//! only increments a still-positive count.
//!
//! # Example
//!
//! ```rust
//! use strata::object::{SharedObject, Sp};
//!
//! struct Frame {
//!     pts: i64,
//! }
//! impl SharedObject for Frame {}
//!
//! let a = Sp::new(Frame { pts: 40 });
//! let b = a.clone();                    // strong = 2
//! let w = a.downgrade();                // weak observer
//! drop(a);
//! assert_eq!(w.upgrade().unwrap().pts, 40);
//! drop(b);                              // strong = 0, Frame dropped
//! assert!(w.upgrade().is_none());       // no resurrection
//! ```

use crate::atomic::Atomic;
use crate::fourcc::FourCc;
use std::alloc::Layout;
use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::ptr::NonNull;

/// An entity managed by intrusive reference counting.
///
/// Implementors get a default identity tag (`?obj`) and empty lifecycle
/// hooks; override what matters. Objects are only ever constructed behind
/// [`Sp::new`] and destroyed by the generic release path, never deleted
/// explicitly.
pub trait SharedObject: Any + Send + Sync {
    /// Lightweight runtime type tag; collaborators may branch on this
    /// instead of full RTTI.
    fn object_id(&self) -> FourCc {
        FourCc::OBJECT
    }

    /// Called once, on the thread that moves the strong count from 0 to 1
    /// at adoption time. Defer expensive initialization here.
    fn on_first_retain(&self) {}

    /// Called once, on the thread performing the final strong release,
    /// before the value is dropped.
    fn on_last_retain(&self) {}
}

/// Strong and weak counters for one object.
///
/// Owned exclusively by the object's allocation; handles reach it through
/// their pointer. `strong >= 0`, `weak >= 0` always; the allocation is
/// freed only after both reach zero and no promotion can race-succeed.
pub struct Refs {
    strong: Atomic,
    weak: Atomic,
}

impl Refs {
    fn new() -> Self {
        // The initial Sp owns one strong unit; all strong holders together
        // own one weak unit.
        Refs {
            strong: Atomic::new(1),
            weak: Atomic::new(1),
        }
    }

    fn inc_strong(&self) {
        let old = self.strong.fetch_add(1);
        assert!(old > 0, "retain on a dead object");
        assert!(old <= i32::MAX as u32, "strong refcount overflow");
    }

    fn dec_strong(&self) -> u32 {
        let old = self.strong.fetch_sub(1);
        debug_assert!(old > 0, "strong refcount underflow");
        old - 1
    }

    fn inc_weak(&self) {
        let old = self.weak.fetch_add(1);
        assert!(old <= i32::MAX as u32, "weak refcount overflow");
    }

    fn dec_weak(&self) -> u32 {
        let old = self.weak.fetch_sub(1);
        debug_assert!(old > 0, "weak refcount underflow");
        old - 1
    }

    /// Try to acquire a strong reference for a weak holder.
    ///
    /// Compare-and-swap loop that only increments a still-positive count;
    /// returns false once the object is logically dead.
    fn try_retain(&self) -> bool {
        let mut current = self.strong.load();
        loop {
            if current == 0 {
                return false;
            }
            match self.strong.compare_and_swap(current, current + 1) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// Current strong count (debugging).
    pub fn strong_count(&self) -> u32 {
        self.strong.load()
    }

    /// Current weak count, excluding the unit held by strong holders
    /// (debugging).
    pub fn weak_count(&self) -> u32 {
        self.weak.load().saturating_sub(1)
    }
}

/// Heap layout: counters first, value behind them.
///
/// `repr(C)` keeps the refs at a known offset so a fat pointer to
/// `Inner<dyn SharedObject>` can be thinned back to a concrete
/// `Inner<T>` after a type check.
#[repr(C)]
struct Inner<T: ?Sized> {
    refs: Refs,
    value: T,
}

/// Strong handle: owns one strong reference unit.
///
/// Cloning increments, dropping decrements; the drop that takes the strong
/// count to zero runs [`SharedObject::on_last_retain`], drops the value,
/// and releases the strong holders' collective weak unit.
pub struct Sp<T: ?Sized + SharedObject> {
    ptr: NonNull<Inner<T>>,
}

// SAFETY: SharedObject requires Send + Sync; the counters are atomic.
unsafe impl<T: ?Sized + SharedObject> Send for Sp<T> {}
unsafe impl<T: ?Sized + SharedObject> Sync for Sp<T> {}

impl<T: SharedObject> Sp<T> {
    /// Adopt a value, establishing the first strong reference.
    pub fn new(value: T) -> Self {
        let inner = Box::new(Inner {
            refs: Refs::new(),
            value,
        });
        // SAFETY: Box never returns null.
        let ptr = unsafe { NonNull::new_unchecked(Box::into_raw(inner)) };
        let sp = Sp { ptr };
        sp.value().on_first_retain();
        sp
    }

    /// Erase the concrete type.
    pub fn into_object(self) -> Sp<dyn SharedObject> {
        let ptr = self.ptr;
        std::mem::forget(self);
        // Unsizing coercion; the refs stay at the front of the allocation.
        let fat: NonNull<Inner<dyn SharedObject>> = ptr;
        Sp { ptr: fat }
    }
}

impl<T: ?Sized + SharedObject> Sp<T> {
    fn inner(&self) -> &Inner<T> {
        // SAFETY: we own a strong unit, so the value is alive.
        unsafe { self.ptr.as_ref() }
    }

    fn value(&self) -> &T {
        &self.inner().value
    }

    /// Borrow the object.
    #[inline]
    pub fn get(&self) -> &T {
        self.value()
    }

    /// The object's identity tag.
    pub fn object_id(&self) -> FourCc {
        self.value().object_id()
    }

    /// Current strong count (debugging; racy by nature).
    pub fn retain_count(&self) -> u32 {
        self.inner().refs.strong_count()
    }

    /// Is this object shared with other strong handles?
    ///
    /// If not shared it is safe to treat as exclusively owned; a `true`
    /// answer may already be stale.
    pub fn is_shared(&self) -> bool {
        self.retain_count() > 1
    }

    /// Take a weak observer.
    pub fn downgrade(&self) -> Wp<T> {
        self.inner().refs.inc_weak();
        Wp { ptr: self.ptr }
    }

    /// Do two handles point at the same object?
    pub fn ptr_eq(&self, other: &Sp<T>) -> bool {
        std::ptr::addr_eq(self.ptr.as_ptr(), other.ptr.as_ptr())
    }
}

impl Sp<dyn SharedObject> {
    /// Is the erased object a `T`?
    pub fn is<T: SharedObject>(&self) -> bool {
        let any: &dyn Any = self.value();
        any.is::<T>()
    }

    /// Recover the concrete type, or hand the handle back unchanged.
    pub fn downcast<T: SharedObject>(self) -> Result<Sp<T>, Sp<dyn SharedObject>> {
        if self.is::<T>() {
            let thin = self.ptr.cast::<Inner<T>>();
            std::mem::forget(self);
            Ok(Sp { ptr: thin })
        } else {
            Err(self)
        }
    }
}

impl<T: ?Sized + SharedObject> Clone for Sp<T> {
    fn clone(&self) -> Self {
        self.inner().refs.inc_strong();
        Sp { ptr: self.ptr }
    }
}

impl<T: ?Sized + SharedObject> Drop for Sp<T> {
    fn drop(&mut self) {
        let refs = &self.inner().refs;
        if refs.dec_strong() != 0 {
            return;
        }
        // Final strong release: hook fires exactly once, on this thread,
        // before destruction. No promotion can succeed past this point.
        self.value().on_last_retain();

        // Capture the layout while the value is still intact.
        let layout = Layout::for_value(self.inner());
        // SAFETY: strong count is zero, we have exclusive access to the
        // value. Weak holders never touch it.
        unsafe { std::ptr::drop_in_place(&raw mut (*self.ptr.as_ptr()).value) };

        // Release the strong holders' collective weak unit; free the
        // allocation if no weak observer remains.
        // SAFETY: refs is plain-old-data, still valid after the value drop.
        let remaining = unsafe { (*self.ptr.as_ptr()).refs.dec_weak() };
        if remaining == 0 {
            // SAFETY: allocated by Box with this layout; nothing aliases.
            unsafe { std::alloc::dealloc(self.ptr.as_ptr().cast::<u8>(), layout) };
        }
    }
}

impl<T: ?Sized + SharedObject> Deref for Sp<T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.value()
    }
}

impl<T: ?Sized + SharedObject> PartialEq for Sp<T> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl<T: ?Sized + SharedObject> Eq for Sp<T> {}

impl<T: ?Sized + SharedObject> Hash for Sp<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (self.ptr.as_ptr().cast::<u8>() as usize).hash(state);
    }
}

impl<T: ?Sized + SharedObject> fmt::Debug for Sp<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sp")
            .field("id", &self.object_id())
            .field("strong", &self.retain_count())
            .finish()
    }
}

/// Weak handle: owns one weak reference unit, never the object.
///
/// There is deliberately no way to reach the object through a `Wp` other
/// than [`Wp::upgrade`], which can fail: the object may already be gone.
pub struct Wp<T: ?Sized + SharedObject> {
    ptr: NonNull<Inner<T>>,
}

// SAFETY: only the atomic counters are touched through a weak handle
// until a successful upgrade.
unsafe impl<T: ?Sized + SharedObject> Send for Wp<T> {}
unsafe impl<T: ?Sized + SharedObject> Sync for Wp<T> {}

impl<T: ?Sized + SharedObject> Wp<T> {
    fn refs(&self) -> &Refs {
        // SAFETY: the refs record outlives every weak handle; only the
        // value's lifetime ends early.
        unsafe { &(*self.ptr.as_ptr()).refs }
    }

    /// Try to promote to a strong handle.
    ///
    /// Returns `None` if the object's strong count already reached zero;
    /// a dead object is never resurrected.
    pub fn upgrade(&self) -> Option<Sp<T>> {
        if self.refs().try_retain() {
            Some(Sp { ptr: self.ptr })
        } else {
            None
        }
    }

    /// Current strong count of the observed object (debugging).
    pub fn strong_count(&self) -> u32 {
        self.refs().strong_count()
    }

    /// Current weak count (debugging).
    pub fn weak_count(&self) -> u32 {
        self.refs().weak_count()
    }
}

impl<T: ?Sized + SharedObject> Clone for Wp<T> {
    fn clone(&self) -> Self {
        self.refs().inc_weak();
        Wp { ptr: self.ptr }
    }
}

impl<T: ?Sized + SharedObject> Drop for Wp<T> {
    fn drop(&mut self) {
        // SAFETY: reading layout through the fat pointer; the allocation is
        // live until the last weak unit is gone (this one).
        let layout = Layout::for_value(unsafe { self.ptr.as_ref() });
        if self.refs().dec_weak() == 0 {
            // Value was already dropped when strong hit zero.
            // SAFETY: last reference of any kind; nothing aliases.
            unsafe { std::alloc::dealloc(self.ptr.as_ptr().cast::<u8>(), layout) };
        }
    }
}

impl<T: ?Sized + SharedObject> fmt::Debug for Wp<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wp")
            .field("strong", &self.strong_count())
            .field("weak", &self.weak_count())
            .finish()
    }
}
