//! Generic containers.
//!
//! Conventional data structures with no internal synchronization; callers
//! that share one across threads guard it themselves. Growable arrays are
//! `std::vec::Vec` throughout the crate; these are the two shapes the
//! standard library does not cover the way the framework needs them:
//!
//! - [`HashTable`]: separate-chaining hash table with explicit doubling.
//! - [`List`]: doubly-linked list with ordered insertion, used for
//!   deadline queues.

mod hash_table;
mod list;

pub use hash_table::HashTable;
pub use list::List;
