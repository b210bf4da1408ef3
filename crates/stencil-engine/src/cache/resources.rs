//! Cache of loaded resources

use std::sync::Arc;

use stencil_cache::{CacheStats, Producer, Production, SingleFlightCache};
use tracing::debug;

use crate::error::{Result, TemplateError};
use crate::loader::ResourceLoader;
use crate::resource::{Fingerprint, Resource};

struct LoadResource {
    loader: Arc<dyn ResourceLoader>,
}

impl Producer<String, Arc<Resource>, TemplateError> for LoadResource {
    fn produce(&self, name: String) -> Production<Arc<Resource>, TemplateError> {
        let loader = Arc::clone(&self.loader);
        Box::pin(async move {
            match loader.load(&name).await? {
                Some(resource) => Ok(Arc::new(resource)),
                None => Err(TemplateError::not_found(name)),
            }
        })
    }
}

/// Single-flight cache of resources keyed by normalized name
///
/// Entries are snapshots; they are only replaced when the template cache
/// finds them stale.
pub struct ResourceCache {
    cache: SingleFlightCache<String, Arc<Resource>, TemplateError>,
}

impl ResourceCache {
    pub fn new(loader: Arc<dyn ResourceLoader>) -> Self {
        Self {
            cache: SingleFlightCache::new("resources", LoadResource { loader }),
        }
    }

    /// Resource for an already normalized `name`
    pub async fn get(&self, name: &str) -> Result<Arc<Resource>> {
        self.cache.get(&name.to_string()).await
    }

    /// Evict `name` if the cached copy still has the `stale` fingerprint
    pub fn invalidate_stale(&self, name: &str, stale: Fingerprint) -> bool {
        let removed = self
            .cache
            .invalidate_if(&name.to_string(), |resource| resource.fingerprint() == stale);
        if removed {
            debug!(name, %stale, "stale resource evicted");
        }
        removed
    }

    pub fn contains(&self, name: &str) -> bool {
        self.cache.contains(&name.to_string())
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn clear(&self) {
        self.cache.clear();
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::MemoryResourceLoader;

    #[tokio::test]
    async fn test_missing_resource_is_not_found_every_time() {
        let loader = MemoryResourceLoader::new();
        let cache = ResourceCache::new(Arc::new(loader.clone()));

        for _ in 0..2 {
            let err = cache.get("/missing.tpl").await.unwrap_err();
            assert!(err.is_not_found());
        }
        assert!(cache.is_empty());

        loader.insert("missing.tpl", "now here").unwrap();
        assert_eq!(cache.get("/missing.tpl").await.unwrap().content(), "now here");
    }

    #[tokio::test]
    async fn test_cached_snapshot_survives_source_change() {
        let loader = MemoryResourceLoader::new();
        loader.insert("a.tpl", "one").unwrap();
        let cache = ResourceCache::new(Arc::new(loader.clone()));

        let first = cache.get("/a.tpl").await.unwrap();
        loader.insert("a.tpl", "two").unwrap();
        let second = cache.get("/a.tpl").await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.content(), "one");
    }

    #[tokio::test]
    async fn test_invalidate_stale_only_matches_fingerprint() {
        let loader = MemoryResourceLoader::new();
        let original = loader.insert("a.tpl", "one").unwrap();
        let cache = ResourceCache::new(Arc::new(loader.clone()));
        cache.get("/a.tpl").await.unwrap();

        let newer = loader.insert("a.tpl", "two").unwrap();
        assert!(!cache.invalidate_stale("/a.tpl", newer));
        assert!(cache.invalidate_stale("/a.tpl", original));
        assert_eq!(cache.get("/a.tpl").await.unwrap().content(), "two");
    }
}
