//! Property-index caches
//!
//! A cache maps property, signal and method names of a type (including any
//! dynamic extension) to their indices. Entries are appended base type first,
//! so a lookup by name returns the most derived declaration.

use serde::{Deserialize, Serialize};

/// Flags on a cache entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CacheFlags {
    /// Entry is a method or signal rather than a property
    pub is_function: bool,
    /// Entry is a signal
    pub is_signal: bool,
    /// Entry is a script method of a dynamic type
    pub is_vme_function: bool,
    /// Entry is a signal declared by a dynamic type
    pub is_vme_signal: bool,
    /// Entry is an alias slot of a dynamic type
    pub is_alias: bool,
    /// Property may be written
    pub is_writable: bool,
}

/// One named entry in a property cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Property or method name
    pub name: String,
    /// Property index, or method index for functions
    pub core_index: u32,
    /// Method index of the notify signal
    pub notify_index: Option<u32>,
    /// Type code of the property (0 for functions)
    pub type_code: u32,
    /// Entry flags
    pub flags: CacheFlags,
    /// Minor version that introduced the entry
    pub revision: u32,
}

/// Name to index table for one type
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PropertyCache {
    entries: Vec<CacheEntry>,
    /// Highest revision visible through this cache (`None` = all)
    pub allowed_revision: Option<u32>,
}

impl PropertyCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry
    pub fn push(&mut self, entry: CacheEntry) {
        self.entries.push(entry);
    }

    /// All entries, base first
    pub fn entries(&self) -> &[CacheEntry] {
        &self.entries
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Most derived entry with the given name
    pub fn property(&self, name: &str) -> Option<&CacheEntry> {
        self.entries.iter().rev().find(|e| e.name == name)
    }

    /// Most derived property (not method) with the given name
    pub fn find_property(&self, name: &str) -> Option<&CacheEntry> {
        self.entries
            .iter()
            .rev()
            .find(|e| !e.flags.is_function && e.name == name)
    }

    /// Most derived method or signal with the given name
    pub fn find_method(&self, name: &str) -> Option<&CacheEntry> {
        self.entries
            .iter()
            .rev()
            .find(|e| e.flags.is_function && e.name == name)
    }

    /// Entry for a property index
    pub fn property_at(&self, core_index: u32) -> Option<&CacheEntry> {
        self.entries
            .iter()
            .rev()
            .find(|e| !e.flags.is_function && e.core_index == core_index)
    }

    /// Entry for a method index
    pub fn method_at(&self, core_index: u32) -> Option<&CacheEntry> {
        self.entries
            .iter()
            .rev()
            .find(|e| e.flags.is_function && e.core_index == core_index)
    }

    /// Whether an entry is visible at this cache's revision
    pub fn is_allowed_in_revision(&self, entry: &CacheEntry) -> bool {
        match self.allowed_revision {
            Some(allowed) => entry.revision <= allowed,
            None => true,
        }
    }

    /// Whether the property at `core_index` is an alias slot
    pub fn is_alias(&self, core_index: u32) -> bool {
        self.property_at(core_index).is_some_and(|e| e.flags.is_alias)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, core_index: u32, flags: CacheFlags) -> CacheEntry {
        CacheEntry {
            name: name.to_string(),
            core_index,
            notify_index: None,
            type_code: 0,
            flags,
            revision: 0,
        }
    }

    #[test]
    fn test_most_derived_wins() {
        let mut cache = PropertyCache::new();
        cache.push(entry("width", 1, CacheFlags::default()));
        cache.push(entry("width", 7, CacheFlags::default()));
        assert_eq!(cache.property("width").map(|e| e.core_index), Some(7));
        assert_eq!(cache.property_at(1).map(|e| e.name.as_str()), Some("width"));
        assert!(cache.property("height").is_none());
    }

    #[test]
    fn test_functions_and_properties_are_separate() {
        let mut cache = PropertyCache::new();
        cache.push(entry("x", 2, CacheFlags::default()));
        let signal = CacheFlags {
            is_function: true,
            is_signal: true,
            ..CacheFlags::default()
        };
        cache.push(entry("xChanged", 2, signal));
        assert_eq!(cache.property_at(2).map(|e| e.name.as_str()), Some("x"));
        assert_eq!(cache.method_at(2).map(|e| e.name.as_str()), Some("xChanged"));
        assert!(cache.find_method("x").is_none());
        assert_eq!(cache.find_property("x").map(|e| e.core_index), Some(2));
    }

    #[test]
    fn test_revisions_and_aliases() {
        let mut cache = PropertyCache::new();
        let mut newer = entry("smooth", 3, CacheFlags::default());
        newer.revision = 1;
        cache.push(newer.clone());
        cache.push(entry(
            "label",
            4,
            CacheFlags {
                is_alias: true,
                ..CacheFlags::default()
            },
        ));

        assert!(cache.is_allowed_in_revision(&newer));
        cache.allowed_revision = Some(0);
        assert!(!cache.is_allowed_in_revision(&newer));
        assert!(cache.is_alias(4));
        assert!(!cache.is_alias(3));
    }
}
