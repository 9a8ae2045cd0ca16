//! Fast hash set type aliases.
//!
//! The debounce loop keys its pending set and its watch-root lookup by path.
//! These aliases use the Fx hash algorithm from `rustc-hash`, which is faster
//! than the standard library's SipHash for string-like keys. Denial-of-service
//! resistance is not required: every key comes from the local filesystem.
//!
//! # Examples
//!
//! ```
//! use bw_core::{FxHashSet, fx_hash_set};
//!
//! let mut set: FxHashSet<&str> = fx_hash_set();
//! set.insert("/music/album");
//! assert!(set.contains("/music/album"));
//! ```

/// A [`HashSet`](std::collections::HashSet) using the Fx hash algorithm.
pub type FxHashSet<V> = rustc_hash::FxHashSet<V>;

/// Creates a new empty [`FxHashSet`].
#[inline]
#[must_use]
pub fn fx_hash_set<V>() -> FxHashSet<V> {
    FxHashSet::default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fx_hash_set_operations() {
        let mut set: FxHashSet<&str> = fx_hash_set();
        assert!(set.insert("one"));
        assert!(!set.insert("one"));
        assert!(set.contains("one"));
        assert!(!set.contains("two"));
    }
}
