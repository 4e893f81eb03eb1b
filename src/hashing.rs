//! Deterministic hashing and the `HashMap` used throughout the crate.
//!
//! The hashers in the standard library are randomly seeded per process, which would make the
//! per-stream seeds in `crate::random` differ between runs. `FxHasher` has no random state.
//!
//! `HashMap<K, V, S>` has no `new` method for a non-default hasher. Bring [`HashMapExt`] into
//! scope to keep writing `HashMap::new()`, or call `HashMap::default()`.

use rustc_hash::FxHasher;
use std::hash::{BuildHasher, Hasher};

pub use rustc_hash::{FxHashMap as HashMap, FxHashSet as HashSet};

/// `new` and `with_capacity` for maps with a default-constructible hasher.
pub trait HashMapExt {
    fn new() -> Self;
    fn with_capacity(capacity: usize) -> Self;
}

impl<K, V, S: BuildHasher + Default> HashMapExt for std::collections::HashMap<K, V, S> {
    fn new() -> Self {
        Self::with_hasher(S::default())
    }

    fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_hasher(capacity, S::default())
    }
}

/// A convenience method to compute the hash of a `&str`.
#[must_use]
pub fn hash_str(data: &str) -> u64 {
    let mut hasher = FxHasher::default();
    hasher.write(data.as_bytes());
    hasher.finish()
}
