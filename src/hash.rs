//! String table: interns identifiers, literals and names and returns a
//! stable 32-bit hash (`H32`) used as the identity of namespaces, functions,
//! variables and object names.

use hashbrown::HashMap;
use std::fmt;

use xxhash_rust::xxh32::xxh32;

/// A 32-bit interned identity for any named entity.
///
/// `H32::NONE` (the all-zero hash) is reserved to mean "no name" and is
/// never produced by [`H32::new`] for a non-empty string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct H32(u32);

impl H32 {
    /// The reserved "none" hash.
    pub const NONE: H32 = H32(0);

    /// Hashes `s` with case-sensitive xxh32 (seed 0).
    ///
    /// `H32::new("")` is defined to equal [`H32::NONE`].
    pub fn new(s: &str) -> Self {
        if s.is_empty() {
            return Self::NONE;
        }
        H32(xxh32(s.as_bytes(), 0))
    }

    /// Hashes `s` after lowercasing its ASCII bytes.
    ///
    /// The source's case-insensitive hash mode; off by default, provided so
    /// a host can opt a whole context into it via
    /// [`StringTable::intern_case_insensitive`].
    pub fn new_case_insensitive(s: &str) -> Self {
        if s.is_empty() {
            return Self::NONE;
        }
        let lower: Vec<u8> = s.bytes().map(|b| b.to_ascii_lowercase()).collect();
        H32(xxh32(&lower, 0))
    }

    /// Returns the raw 32-bit value.
    pub fn raw(self) -> u32 {
        self.0
    }

    /// `true` for [`H32::NONE`].
    pub fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for H32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

impl From<u32> for H32 {
    fn from(v: u32) -> Self {
        H32(v)
    }
}

struct InternedString {
    text: String,
    refcount: u32,
}

/// Interns strings and resolves `H32` identities back to their text.
///
/// Small-pool placement is deliberately not modeled: the source's fixed-size
/// string pools are an allocator optimization and are not observable through
/// this API.
#[derive(Default)]
pub struct StringTable {
    by_hash: HashMap<H32, InternedString>,
}

impl StringTable {
    /// Creates an empty string table.
    pub fn new() -> Self {
        Self {
            by_hash: HashMap::new(),
        }
    }

    /// Interns `s`, returning its `H32`.
    ///
    /// If a different string already owns the computed hash, the collision
    /// is a caller error: the table is left unmodified and the hash of the
    /// first-registered string is returned (the source's "fails silently"
    /// convention — callers may call [`StringTable::lookup`] to check).
    pub fn intern(&mut self, s: &str) -> H32 {
        let hash = H32::new(s);
        if hash.is_none() {
            return hash;
        }

        match self.by_hash.get_mut(&hash) {
            Some(entry) if entry.text == s => {
                entry.refcount = entry.refcount.saturating_add(1);
                hash
            }
            Some(entry) => {
                log::warn!(
                    "H32 collision: {hash} already interned as {:?}, ignoring {:?}",
                    entry.text,
                    s
                );
                hash
            }
            None => {
                self.by_hash.insert(
                    hash,
                    InternedString {
                        text: s.to_string(),
                        refcount: 1,
                    },
                );
                hash
            }
        }
    }

    /// Interns `s` using the case-insensitive hash mode.
    pub fn intern_case_insensitive(&mut self, s: &str) -> H32 {
        let hash = H32::new_case_insensitive(s);
        if hash.is_none() {
            return hash;
        }
        self.by_hash.entry(hash).or_insert_with(|| InternedString {
            text: s.to_string(),
            refcount: 0,
        });
        if let Some(entry) = self.by_hash.get_mut(&hash) {
            entry.refcount = entry.refcount.saturating_add(1);
        }
        hash
    }

    /// Resolves `hash` back to its interned text, or `None` if it was never
    /// interned (or is [`H32::NONE`]).
    pub fn lookup(&self, hash: H32) -> Option<&str> {
        self.by_hash.get(&hash).map(|e| e.text.as_str())
    }

    /// Increments the refcount for `hash`. No-op for an unknown hash.
    pub fn refinc(&mut self, hash: H32) {
        if let Some(entry) = self.by_hash.get_mut(&hash) {
            entry.refcount = entry.refcount.saturating_add(1);
        }
    }

    /// Decrements the refcount for `hash`, releasing the interned string
    /// once it reaches zero. Decrementing past zero is a caller error and is
    /// logged and ignored.
    pub fn refdec(&mut self, hash: H32) {
        let Some(entry) = self.by_hash.get_mut(&hash) else {
            return;
        };
        if entry.refcount == 0 {
            log::warn!("refdec underflow for {hash}");
            return;
        }
        entry.refcount -= 1;
        if entry.refcount == 0 {
            self.by_hash.remove(&hash);
        }
    }

    /// Number of currently-interned strings.
    pub fn len(&self) -> usize {
        self.by_hash.len()
    }

    /// `true` if no strings are interned.
    pub fn is_empty(&self) -> bool {
        self.by_hash.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_string_is_none() {
        assert_eq!(H32::new(""), H32::NONE);
    }

    #[test]
    fn round_trip() {
        let mut table = StringTable::new();
        for s in ["gResult", "CBase", "intvalue", "StringCat"] {
            let h = table.intern(s);
            assert_eq!(table.lookup(h), Some(s));
        }
    }

    #[test]
    fn refcount_releases_on_zero() {
        let mut table = StringTable::new();
        let h = table.intern("mul2");
        table.refinc(h);
        assert_eq!(table.lookup(h), Some("mul2"));
        table.refdec(h);
        assert_eq!(table.lookup(h), Some("mul2"));
        table.refdec(h);
        assert_eq!(table.lookup(h), None);
    }

    #[test]
    fn collision_keeps_first_registered() {
        let mut table = StringTable::new();
        let h1 = table.intern("abc");
        // Same string re-interned is not a collision.
        let h2 = table.intern("abc");
        assert_eq!(h1, h2);
    }

    #[test]
    fn case_insensitive_mode_is_opt_in() {
        let mut table = StringTable::new();
        let h1 = table.intern_case_insensitive("Foo");
        let h2 = H32::new_case_insensitive("foo");
        assert_eq!(h1, h2);
        assert_ne!(H32::new("Foo"), H32::new("foo"));
    }
}
