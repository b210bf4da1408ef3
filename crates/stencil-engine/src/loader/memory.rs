//! In-memory resource loader

use std::collections::HashMap;
use std::path::Path;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{check_encoding, ResourceLoader};
use crate::error::Result;
use crate::name::normalize_name;
use crate::resource::{Fingerprint, Resource, ResourceOrigin};

#[derive(Debug)]
struct MemoryEntry {
    content: Arc<str>,
    fingerprint: Fingerprint,
}

#[derive(Debug, Default)]
struct MemoryStore {
    entries: RwLock<HashMap<String, MemoryEntry>>,
    revision: AtomicU64,
}

/// Loader serving templates registered at runtime
///
/// Clones share the same store, so a handle kept outside the engine can
/// replace sources while the engine serves them. Each `insert` stamps a
/// fresh, strictly increasing fingerprint.
#[derive(Debug, Clone, Default)]
pub struct MemoryResourceLoader {
    store: Arc<MemoryStore>,
}

impl MemoryResourceLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace `name`, returning the new fingerprint
    pub fn insert(&self, name: &str, content: impl Into<Arc<str>>) -> Result<Fingerprint> {
        let fingerprint = Fingerprint::new(self.store.revision.fetch_add(1, Ordering::SeqCst) + 1);
        self.insert_with_fingerprint(name, content, fingerprint)?;
        Ok(fingerprint)
    }

    /// Register or replace `name` with an explicit fingerprint
    pub fn insert_with_fingerprint(
        &self,
        name: &str,
        content: impl Into<Arc<str>>,
        fingerprint: Fingerprint,
    ) -> Result<()> {
        let name = normalize_name(name)?;
        self.store.revision.fetch_max(fingerprint.value(), Ordering::SeqCst);
        self.store.entries.write().insert(
            name,
            MemoryEntry {
                content: content.into(),
                fingerprint,
            },
        );
        Ok(())
    }

    /// Remove `name`; returns whether it was present
    pub fn remove(&self, name: &str) -> bool {
        match normalize_name(name) {
            Ok(name) => self.store.entries.write().remove(&name).is_some(),
            Err(_) => false,
        }
    }

    pub fn len(&self) -> usize {
        self.store.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.entries.read().is_empty()
    }
}

#[async_trait]
impl ResourceLoader for MemoryResourceLoader {
    fn kind(&self) -> &'static str {
        "memory"
    }

    fn initialize(&mut self, _base_path: &Path, encoding: &str) -> Result<()> {
        check_encoding(encoding)
    }

    async fn load(&self, name: &str) -> Result<Option<Resource>> {
        let entries = self.store.entries.read();
        Ok(entries.get(name).map(|entry| {
            Resource::new(
                name,
                Arc::clone(&entry.content),
                entry.fingerprint,
                ResourceOrigin::Memory,
            )
        }))
    }

    async fn fingerprint(&self, name: &str) -> Result<Option<Fingerprint>> {
        Ok(self.store.entries.read().get(name).map(|entry| entry.fingerprint))
    }
}
