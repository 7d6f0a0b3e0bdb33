//! FourCc-keyed property bag.
//!
//! [`Message`] carries loosely-typed settings and events between
//! collaborators: codec parameters, format descriptions, job payloads. Keys
//! are [`FourCc`] tags; values are a small closed set of scalar types plus
//! reference-counted objects. Getters take a default and never fail: a
//! missing key or a type mismatch both answer with the default, which is
//! the momentary-outcome contract lookups follow everywhere in the crate.

use crate::containers::HashTable;
use crate::fourcc::FourCc;
use crate::object::{SharedObject, Sp};
use std::fmt;

/// One property value.
#[derive(Clone)]
pub enum Value {
    /// 32-bit signed integer.
    I32(i32),
    /// 64-bit signed integer.
    I64(i64),
    /// 32-bit float.
    F32(f32),
    /// 64-bit float.
    F64(f64),
    /// UTF-8 string.
    String(String),
    /// Reference-counted object; the message holds a strong reference.
    Object(Sp<dyn SharedObject>),
}

impl Value {
    /// A short tag naming the payload type.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::I32(_) => "i32",
            Value::I64(_) => "i64",
            Value::F32(_) => "f32",
            Value::F64(_) => "f64",
            Value::String(_) => "string",
            Value::Object(_) => "object",
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::I32(v) => write!(f, "{v}"),
            Value::I64(v) => write!(f, "{v}"),
            Value::F32(v) => write!(f, "{v}"),
            Value::F64(v) => write!(f, "{v}"),
            Value::String(v) => write!(f, "{v:?}"),
            Value::Object(o) => write!(f, "<{}>", o.object_id()),
        }
    }
}

/// Property bag keyed by [`FourCc`]. Not thread-safe; share it through
/// [`Sp`] and confine mutation to one thread.
#[derive(Default)]
pub struct Message {
    entries: HashTable<FourCc, Value>,
}

impl Message {
    /// Create an empty message.
    pub fn new() -> Message {
        Message {
            entries: HashTable::new(),
        }
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Is the message empty?
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Store a value, replacing any previous entry for the key.
    pub fn set(&mut self, name: FourCc, value: Value) {
        self.entries.insert(name, value);
    }

    /// Store a 32-bit integer.
    pub fn set_i32(&mut self, name: FourCc, value: i32) {
        self.set(name, Value::I32(value));
    }

    /// Store a 64-bit integer.
    pub fn set_i64(&mut self, name: FourCc, value: i64) {
        self.set(name, Value::I64(value));
    }

    /// Store a 32-bit float.
    pub fn set_f32(&mut self, name: FourCc, value: f32) {
        self.set(name, Value::F32(value));
    }

    /// Store a 64-bit float.
    pub fn set_f64(&mut self, name: FourCc, value: f64) {
        self.set(name, Value::F64(value));
    }

    /// Store a string.
    pub fn set_string(&mut self, name: FourCc, value: impl Into<String>) {
        self.set(name, Value::String(value.into()));
    }

    /// Store a strong object reference.
    pub fn set_object(&mut self, name: FourCc, object: Sp<dyn SharedObject>) {
        self.set(name, Value::Object(object));
    }

    /// Raw lookup.
    pub fn find(&self, name: FourCc) -> Option<&Value> {
        self.entries.find(&name)
    }

    /// Fetch a 32-bit integer, or `def` on miss or type mismatch.
    pub fn find_i32(&self, name: FourCc, def: i32) -> i32 {
        match self.find(name) {
            Some(Value::I32(v)) => *v,
            _ => def,
        }
    }

    /// Fetch a 64-bit integer, or `def` on miss or type mismatch.
    pub fn find_i64(&self, name: FourCc, def: i64) -> i64 {
        match self.find(name) {
            Some(Value::I64(v)) => *v,
            _ => def,
        }
    }

    /// Fetch a 32-bit float, or `def` on miss or type mismatch.
    pub fn find_f32(&self, name: FourCc, def: f32) -> f32 {
        match self.find(name) {
            Some(Value::F32(v)) => *v,
            _ => def,
        }
    }

    /// Fetch a 64-bit float, or `def` on miss or type mismatch.
    pub fn find_f64(&self, name: FourCc, def: f64) -> f64 {
        match self.find(name) {
            Some(Value::F64(v)) => *v,
            _ => def,
        }
    }

    /// Fetch a string, or `None` on miss or type mismatch.
    pub fn find_string(&self, name: FourCc) -> Option<&str> {
        match self.find(name) {
            Some(Value::String(v)) => Some(v),
            _ => None,
        }
    }

    /// Fetch an object reference, or `None` on miss or type mismatch.
    pub fn find_object(&self, name: FourCc) -> Option<Sp<dyn SharedObject>> {
        match self.find(name) {
            Some(Value::Object(o)) => Some(o.clone()),
            _ => None,
        }
    }

    /// Is the key present?
    pub fn contains(&self, name: FourCc) -> bool {
        self.entries.contains(&name)
    }

    /// Remove an entry, returning its value if it was present.
    pub fn remove(&mut self, name: FourCc) -> Option<Value> {
        self.entries.remove(&name)
    }

    /// The key at `index` in iteration order, if in range. Pair with
    /// [`len`](Message::len) to enumerate entries.
    pub fn name(&self, index: usize) -> Option<FourCc> {
        self.entries.keys().nth(index).copied()
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Deep-ish copy: scalars and strings are duplicated, objects are
    /// shared by reference.
    pub fn duplicate(&self) -> Message {
        let mut copy = Message::new();
        for (name, value) in self.entries.iter() {
            copy.set(*name, value.clone());
        }
        copy
    }
}

impl SharedObject for Message {
    fn object_id(&self) -> FourCc {
        FourCc::MESSAGE
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Message {{")?;
        for (i, (name, value)) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, " {name}: {value:?} ({})", value.type_name())?;
        }
        write!(f, " }}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_find_defaults() {
        let mut m = Message::new();
        let rate = FourCc::new(b"rate");
        let chan = FourCc::new(b"chan");

        m.set_i32(rate, 48_000);
        m.set_i64(FourCc::new(b"dur "), 90_000_000);
        m.set_f32(FourCc::new(b"gain"), 0.5);
        m.set_f64(FourCc::new(b"sped"), 1.25);
        m.set_string(FourCc::new(b"name"), "track-1");

        assert_eq!(m.len(), 5);
        assert_eq!(m.find_i32(rate, 0), 48_000);
        assert_eq!(m.find_i32(chan, 2), 2); // missing -> default
        assert_eq!(m.find_i64(FourCc::new(b"dur "), -1), 90_000_000);
        assert_eq!(m.find_f32(FourCc::new(b"gain"), 0.0), 0.5);
        assert_eq!(m.find_f64(FourCc::new(b"sped"), 1.0), 1.25);
        assert_eq!(m.find_string(FourCc::new(b"name")), Some("track-1"));
    }

    #[test]
    fn test_type_mismatch_yields_default() {
        let mut m = Message::new();
        let key = FourCc::new(b"key ");
        m.set_string(key, "not a number");
        assert_eq!(m.find_i32(key, 7), 7);
        assert!(m.find_object(key).is_none());
    }

    #[test]
    fn test_replace_remove_contains() {
        let mut m = Message::new();
        let key = FourCc::new(b"key ");
        m.set_i32(key, 1);
        m.set_i32(key, 2); // replace
        assert_eq!(m.len(), 1);
        assert_eq!(m.find_i32(key, 0), 2);

        assert!(m.contains(key));
        assert!(m.remove(key).is_some());
        assert!(!m.contains(key));
        assert!(m.remove(key).is_none());
    }

    #[test]
    fn test_object_entries_hold_strong_refs() {
        struct Payload;
        impl SharedObject for Payload {}

        let obj = Sp::new(Payload).into_object();
        let mut m = Message::new();
        m.set_object(FourCc::new(b"payl"), obj.clone());
        assert_eq!(obj.retain_count(), 2);

        let fetched = m.find_object(FourCc::new(b"payl")).unwrap();
        assert!(fetched.ptr_eq(&obj));

        m.clear();
        drop(fetched);
        assert_eq!(obj.retain_count(), 1);
    }

    #[test]
    fn test_message_as_shared_object() {
        let mut inner = Message::new();
        inner.set_i32(FourCc::new(b"innr"), 42);

        let mut outer = Message::new();
        outer.set_object(FourCc::new(b"msg "), Sp::new(inner).into_object());

        let erased = outer.find_object(FourCc::new(b"msg ")).unwrap();
        assert_eq!(erased.object_id(), FourCc::MESSAGE);
        let inner = erased.downcast::<Message>().ok().unwrap();
        assert_eq!(inner.find_i32(FourCc::new(b"innr"), 0), 42);
    }

    #[test]
    fn test_duplicate_shares_objects() {
        struct Payload;
        impl SharedObject for Payload {}

        let obj = Sp::new(Payload).into_object();
        let mut m = Message::new();
        m.set_i32(FourCc::new(b"num "), 9);
        m.set_object(FourCc::new(b"payl"), obj.clone());

        let copy = m.duplicate();
        m.clear();
        assert_eq!(copy.find_i32(FourCc::new(b"num "), 0), 9);
        assert!(copy.find_object(FourCc::new(b"payl")).unwrap().ptr_eq(&obj));
    }
}
