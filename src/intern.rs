use std::sync::{Arc, RwLock};

use hashbrown::HashMap;
use once_cell::sync::Lazy;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Debug, Default)]
pub struct InterningTable {
    strings: RwLock<Vec<&'static str>>,
    positions: RwLock<HashMap<&'static str, u32>>,
}

pub static INTERNING_TABLE: Lazy<Arc<InterningTable>> = Lazy::new(Default::default);

impl InterningTable {
    pub fn get(&self, index: u32) -> Option<&'static str> {
        let strings = self.strings.read().expect("interning table poisoned");

        strings.get(index as usize).copied()
    }

    pub fn insert_if_absent(&self, string: &str) -> u32 {
        if let Some(index) = self.index_of(string) {
            return index;
        }

        let mut strings = self.strings.write().expect("interning table poisoned");
        let mut positions = self.positions.write().expect("interning table poisoned");

        // Another thread may have won the race between the read and the write
        if let Some(index) = positions.get(string) {
            return *index;
        }

        let leaked: &'static str = Box::leak(string.to_owned().into_boxed_str());
        let index = strings.len() as u32;

        strings.push(leaked);
        positions.insert(leaked, index);

        index
    }

    pub fn index_of(&self, string: &str) -> Option<u32> {
        let positions = self.positions.read().expect("interning table poisoned");

        positions.get(string).copied()
    }
}

/// An index into the string interning table
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InternedSymbol(u32);

impl InternedSymbol {
    pub fn new(value: &str) -> Self {
        let index = INTERNING_TABLE.insert_if_absent(value);

        Self(index)
    }

    pub fn value(&self) -> &'static str {
        INTERNING_TABLE.get(self.0).expect("Once an interned symbol is created, the string it references should never be removed from the table")
    }
}

impl From<&str> for InternedSymbol {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl core::fmt::Debug for InternedSymbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("InternedSymbol")
            .field(&self.0)
            .field(&self.value())
            .finish()
    }
}

impl core::fmt::Display for InternedSymbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.value())
    }
}

/// Interned symbols are process local, so they travel as their string value
impl Serialize for InternedSymbol {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.value())
    }
}

impl<'de> Deserialize<'de> for InternedSymbol {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;

        Ok(Self::new(&value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_idempotent() {
        let a = InternedSymbol::new("_complex64");
        let b = InternedSymbol::new("_complex64");

        assert_eq!(a, b);
        assert_eq!(a.value(), "_complex64");
    }

    #[test]
    fn distinct_strings_get_distinct_symbols() {
        assert_ne!(InternedSymbol::new("re"), InternedSymbol::new("im"));
    }

    #[test]
    fn round_trips_through_json_as_a_string() {
        let symbol = InternedSymbol::new("gc_root");
        let json = serde_json::to_string(&symbol).unwrap();

        assert_eq!(json, "\"gc_root\"");
        assert_eq!(serde_json::from_str::<InternedSymbol>(&json).unwrap(), symbol);
    }
}
