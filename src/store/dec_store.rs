//! Package declaration store
//!
//! INF files name their packages as `MdePkg/MdePkg.dec`, relative to some
//! package search root, so declarations are keyed by the last two
//! components of their path rather than by the full path.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::trace;

use crate::parser::ModuleRecord;
use crate::path::EdkPath;

/// Lookup key for a package reference or declaration path
pub fn package_key(path: &str) -> String {
    EdkPath::from(path.trim()).tail(2)
}

#[derive(Debug, Clone, Default)]
pub struct DecStore {
    by_key: HashMap<String, Vec<Arc<ModuleRecord>>>,
}

impl DecStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a declaration; the newest insertion is returned first by
    /// [`resolve`](Self::resolve). A prior record for the same file is replaced.
    pub fn insert(&mut self, record: Arc<ModuleRecord>) {
        let key = record.path.tail(2);
        let group = self.by_key.entry(key.clone()).or_default();
        group.retain(|existing| existing.path != record.path);
        trace!("DEC {} registered under {}", record.path, key);
        group.insert(0, record);
    }

    pub fn remove(&mut self, path: &Path) -> Option<Arc<ModuleRecord>> {
        let key = EdkPath::from(path).tail(2);
        let group = self.by_key.get_mut(&key)?;
        let index = group.iter().position(|record| record.path.as_path() == path)?;
        let removed = group.remove(index);
        if group.is_empty() {
            self.by_key.remove(&key);
        }
        Some(removed)
    }

    /// Declarations matching a package reference such as `MdePkg/MdePkg.dec`
    pub fn resolve(&self, token: &str) -> Vec<Arc<ModuleRecord>> {
        self.by_key
            .get(&package_key(token))
            .cloned()
            .unwrap_or_default()
    }

    pub fn declarations(&self) -> impl Iterator<Item = &Arc<ModuleRecord>> {
        self.by_key.values().flatten()
    }

    pub fn len(&self) -> usize {
        self.by_key.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}
