use std::collections::HashMap;
use std::sync::Arc;

use super::item::Item;
use super::technology::Technology;

/// Multi-valued map from a technology-normalized key to the items sharing it.
///
/// Several items may observe the same address, so every key holds a list.
#[derive(Debug)]
pub struct ItemStore {
    technology: Technology,
    entries: HashMap<String, Vec<Arc<Item>>>,
    len: usize,
}

impl ItemStore {
    pub fn new(technology: Technology) -> Self {
        Self {
            technology,
            entries: HashMap::new(),
            len: 0,
        }
    }

    /// Adds an item under the key derived from its href.
    pub fn add(&mut self, item: Arc<Item>) {
        let key = self.technology.normalize_key(&item.form().href);
        self.entries.entry(key).or_default().push(item);
        self.len += 1;
    }

    /// Items registered for `key`, after normalizing it the same way as on insert.
    pub fn get_items_for(&self, key: &str) -> &[Arc<Item>] {
        self.entries
            .get(&self.technology.normalize_key(key))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Every item, in no particular order.
    pub fn all(&self) -> Vec<Arc<Item>> {
        self.entries.values().flatten().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}
