use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// Name-keyed registry that refuses to overwrite an existing entry.
///
/// Built once at process start and read many times afterwards.
pub struct Registry<H> {
    entries: RwLock<HashMap<String, H>>,
}

impl<H: Clone> Registry<H> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Insert `entry` under `name`. Returns `false` if the name is taken;
    /// the existing entry is left in place.
    pub fn insert(&self, name: &str, entry: H) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if entries.contains_key(name) {
            return false;
        }
        entries.insert(name.to_string(), entry);
        true
    }

    pub fn get(&self, name: &str) -> Option<H> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<H: Clone> Default for Registry<H> {
    fn default() -> Self {
        Self::new()
    }
}
