//! String, byte-string, and function interning.
//!
//! Every name that might be compared or hashed repeatedly during code
//! generation (identifiers, package aliases, syscall names) is interned
//! once up front; everything downstream compares small `Copy` ids instead
//! of strings.

use ahash::AHashMap;

/// An interned string id. Index into `Interner::strings`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct StringId(u32);

impl StringId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// An interned byte-string id (used for byte-slice literals and hashes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct BytesId(u32);

impl BytesId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// An id into the function registry, assigned in discovery order.
///
/// Stable for the duration of one compilation; not meaningful across runs
/// since discovery order depends on package iteration order, which is
/// itself deterministic (sorted by package path) but arbitrary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct FunctionId(u32);

impl FunctionId {
    pub fn new(index: usize) -> Self {
        Self(index.try_into().expect("function id overflow"))
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Builds the string/bytes tables used by one compilation.
///
/// Deduplicates by content: interning the same string twice returns the
/// same id.
#[derive(Debug, Default)]
pub struct Interner {
    string_map: AHashMap<String, StringId>,
    strings: Vec<String>,
    bytes_map: AHashMap<Vec<u8>, BytesId>,
    bytes: Vec<Vec<u8>>,
}

impl Interner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, s: &str) -> StringId {
        if let Some(&id) = self.string_map.get(s) {
            return id;
        }
        let id = StringId(self.strings.len() as u32);
        self.strings.push(s.to_owned());
        self.string_map.insert(s.to_owned(), id);
        id
    }

    pub fn intern_bytes(&mut self, b: &[u8]) -> BytesId {
        if let Some(&id) = self.bytes_map.get(b) {
            return id;
        }
        let id = BytesId(self.bytes.len() as u32);
        self.bytes.push(b.to_owned());
        self.bytes_map.insert(b.to_owned(), id);
        id
    }

    pub fn get_str(&self, id: StringId) -> &str {
        &self.strings[id.index()]
    }

    pub fn get_bytes(&self, id: BytesId) -> &[u8] {
        &self.bytes[id.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_deduplicates() {
        let mut interner = Interner::new();
        let a = interner.intern("Main");
        let b = interner.intern("Main");
        let c = interner.intern("getSome");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(interner.get_str(a), "Main");
    }

    #[test]
    fn bytes_interning_deduplicates() {
        let mut interner = Interner::new();
        let a = interner.intern_bytes(b"foo");
        let b = interner.intern_bytes(b"foo");
        assert_eq!(a, b);
        assert_eq!(interner.get_bytes(a), b"foo");
    }
}
