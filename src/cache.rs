// Budfs generative filesystem overlay.
// Copyright 2025 Martin Pool.

//! Materialised entries, keyed by overlay path.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::entry::VirtualEntry;

/// Cache of materialised virtual entries.
///
/// The cache has no size limit; entries leave only when a change sweep or
/// a rebind evicts them. It also does not deduplicate concurrent
/// producers; the overlay's single-flight gate does that.
#[derive(Debug, Default)]
pub struct Cache {
    entries: RwLock<HashMap<String, VirtualEntry>>,
}

impl Cache {
    pub fn get(&self, opath: &str) -> Option<VirtualEntry> {
        self.entries.read().unwrap().get(opath).cloned()
    }

    pub fn has(&self, opath: &str) -> bool {
        self.entries.read().unwrap().contains_key(opath)
    }

    pub fn set(&self, opath: &str, entry: VirtualEntry) {
        self.entries.write().unwrap().insert(opath.to_owned(), entry);
    }

    /// Remove one entry; true if it was present.
    pub fn delete(&self, opath: &str) -> bool {
        self.entries.write().unwrap().remove(opath).is_some()
    }
}

#[cfg(test)]
mod test {
    use bytes::Bytes;

    use super::*;

    fn file_entry(path: &str, content: &'static [u8]) -> VirtualEntry {
        VirtualEntry::File {
            path: path.to_owned(),
            mode: 0o644,
            data: Bytes::from_static(content),
        }
    }

    #[test]
    fn set_get_delete() {
        let cache = Cache::default();
        assert!(cache.get("a").is_none());
        assert!(!cache.has("a"));
        cache.set("a", file_entry("a", b"one"));
        assert!(cache.has("a"));
        assert_eq!(cache.get("a").unwrap().file_data().unwrap(), "one");
        assert!(cache.delete("a"));
        assert!(!cache.delete("a"));
        assert!(!cache.has("a"));
    }

    #[test]
    fn set_replaces() {
        let cache = Cache::default();
        cache.set("a", file_entry("a", b"one"));
        cache.set("a", file_entry("a", b"two"));
        assert_eq!(cache.get("a").unwrap().file_data().unwrap(), "two");
    }
}
