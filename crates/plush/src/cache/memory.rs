//! Reference in-process template cache.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::cache::TemplateCache;
use crate::types::Template;

/// A guarded in-memory map of template records.
#[derive(Debug, Default)]
pub struct MemoryCache {
    store: RwLock<HashMap<String, Arc<Template>>>,
}

impl MemoryCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every stored record.
    pub fn clear(&self) {
        self.store.write().clear();
    }
}

impl TemplateCache for MemoryCache {
    fn get(&self, key: &str) -> Option<Arc<Template>> {
        let key = key.trim();
        if key.is_empty() {
            return None;
        }
        self.store.read().get(key).cloned()
    }

    fn set(&self, key: &str, template: Arc<Template>) {
        let key = key.trim();
        if key.is_empty() {
            return;
        }
        self.store.write().insert(key.to_string(), template);
    }

    fn delete(&self, keys: &[&str]) {
        let mut store = self.store.write();
        for key in keys {
            if key.is_empty() {
                continue;
            }
            store.remove(*key);
        }
    }
}
