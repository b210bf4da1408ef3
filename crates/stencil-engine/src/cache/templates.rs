//! Cache of compiled templates with freshness checks

use std::sync::{Arc, Weak};

use stencil_cache::{CacheStats, Producer, Production, SingleFlightCache};
use tracing::{debug, info};

use super::resources::ResourceCache;
use crate::compiler::{Compiler, UnitLoader};
use crate::engine::TemplateEngine;
use crate::error::{Result, TemplateError};
use crate::loader::ResourceLoader;
use crate::template::CompiledTemplate;

struct CompileTemplate {
    resources: Arc<ResourceCache>,
    compiler: Arc<dyn Compiler>,
    units: Arc<UnitLoader>,
    engine: Weak<TemplateEngine>,
    /// Set when reloading; cached snapshots are checked against it first
    freshness: Option<Arc<dyn ResourceLoader>>,
}

impl Producer<String, Arc<CompiledTemplate>, TemplateError> for CompileTemplate {
    fn produce(&self, name: String) -> Production<Arc<CompiledTemplate>, TemplateError> {
        let resources = Arc::clone(&self.resources);
        let compiler = Arc::clone(&self.compiler);
        let units = Arc::clone(&self.units);
        let engine = self.engine.clone();
        let freshness = self.freshness.clone();
        Box::pin(async move {
            let mut resource = resources.get(&name).await?;
            if let Some(loader) = freshness {
                if loader.fingerprint(&name).await? != Some(resource.fingerprint()) {
                    resources.invalidate_stale(&name, resource.fingerprint());
                    resource = resources.get(&name).await?;
                }
            }
            let unit = match compiler.compile(resource.content(), &name) {
                Ok(unit) => unit,
                Err(err) => {
                    // The next attempt must see a corrected source.
                    resources.invalidate_stale(&name, resource.fingerprint());
                    return Err(err);
                }
            };
            units.persist(&unit, resource.content()).await;
            debug!(
                name = %name,
                fingerprint = %resource.fingerprint(),
                generation = %unit.generation(),
                "template produced"
            );
            Ok(Arc::new(CompiledTemplate::new(
                Some(name),
                unit,
                Some(resource.fingerprint()),
                engine,
            )))
        })
    }
}

/// Single-flight cache of compiled templates keyed by normalized name
///
/// With reload enabled every lookup compares the template's fingerprint to
/// the loader's current one and recompiles on mismatch.
pub struct TemplateCache {
    cache: SingleFlightCache<String, Arc<CompiledTemplate>, TemplateError>,
    loader: Arc<dyn ResourceLoader>,
    resources: Arc<ResourceCache>,
    units: Arc<UnitLoader>,
    reloadable: bool,
}

impl TemplateCache {
    pub fn new(
        loader: Arc<dyn ResourceLoader>,
        resources: Arc<ResourceCache>,
        compiler: Arc<dyn Compiler>,
        units: Arc<UnitLoader>,
        reloadable: bool,
        engine: Weak<TemplateEngine>,
    ) -> Self {
        let producer = CompileTemplate {
            resources: Arc::clone(&resources),
            compiler,
            units: Arc::clone(&units),
            engine,
            freshness: reloadable.then(|| Arc::clone(&loader)),
        };
        Self {
            cache: SingleFlightCache::new("templates", producer),
            loader,
            resources,
            units,
            reloadable,
        }
    }

    /// Template for an already normalized `name`
    pub async fn get(&self, name: &str) -> Result<Arc<CompiledTemplate>> {
        let key = name.to_string();
        let template = self.cache.get(&key).await?;
        if !self.reloadable {
            return Ok(template);
        }

        let current = self.loader.fingerprint(name).await?;
        if current.is_some() && current == template.fingerprint() {
            return Ok(template);
        }

        info!(
            name,
            cached = ?template.fingerprint(),
            current = ?current,
            "template source changed, recompiling"
        );
        if let Some(stale) = template.fingerprint() {
            self.resources.invalidate_stale(name, stale);
        }
        // Only the evicting caller advances, and before the entry leaves the
        // map, so any replacement compiles under the new generation.
        self.cache.invalidate_if(&key, |cached| {
            let stale = Arc::ptr_eq(cached, &template);
            if stale {
                self.units.advance();
            }
            stale
        });
        self.cache.get(&key).await
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
    use crate::compiler::HandlebarsCompiler;
    use crate::loader::MemoryResourceLoader;
    use crate::symbols::SymbolTable;
    use serde_json::json;

    fn template_cache(loader: &MemoryResourceLoader, reloadable: bool) -> TemplateCache {
        let loader: Arc<dyn ResourceLoader> = Arc::new(loader.clone());
        let units = Arc::new(UnitLoader::new(reloadable, None));
        let compiler = Arc::new(HandlebarsCompiler::new(
            Arc::new(SymbolTable::new()),
            Arc::clone(&units),
        ));
        let resources = Arc::new(ResourceCache::new(Arc::clone(&loader)));
        TemplateCache::new(loader, resources, compiler, units, reloadable, Weak::new())
    }

    #[tokio::test]
    async fn test_reload_picks_up_new_source() {
        let loader = MemoryResourceLoader::new();
        loader.insert("greet.tpl", "Hello").unwrap();
        let cache = template_cache(&loader, true);

        let first = cache.get("/greet.tpl").await.unwrap();
        loader.insert("greet.tpl", "Hello, World").unwrap();
        let second = cache.get("/greet.tpl").await.unwrap();

        assert!(second.fingerprint() > first.fingerprint());
        assert!(second.generation() > first.generation());
        assert_eq!(second.render(&json!({})).unwrap(), "Hello, World");
        assert_eq!(first.render(&json!({})).unwrap(), "Hello");
    }

    #[tokio::test]
    async fn test_stale_hit_advances_generation_once() {
        let loader = MemoryResourceLoader::new();
        loader.insert("page.tpl", "v1").unwrap();
        let cache = template_cache(&loader, true);

        let first = cache.get("/page.tpl").await.unwrap();
        loader.insert("page.tpl", "v2").unwrap();
        let second = cache.get("/page.tpl").await.unwrap();
        let third = cache.get("/page.tpl").await.unwrap();

        assert!(Arc::ptr_eq(&second, &third));
        assert_eq!(second.generation().value(), first.generation().value() + 1);
        assert_eq!(cache.units.current_generation(), second.generation());
        assert_eq!(second.render(&json!({})).unwrap(), "v2");
    }

    #[tokio::test]
    async fn test_without_reload_the_first_compilation_sticks() {
        let loader = MemoryResourceLoader::new();
        loader.insert("greet.tpl", "Hello").unwrap();
        let cache = template_cache(&loader, false);

        let first = cache.get("/greet.tpl").await.unwrap();
        loader.insert("greet.tpl", "Hello, World").unwrap();
        let second = cache.get("/greet.tpl").await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.render(&json!({})).unwrap(), "Hello");
    }

    #[tokio::test]
    async fn test_unchanged_source_is_not_recompiled() {
        let loader = MemoryResourceLoader::new();
        loader.insert("a.tpl", "a").unwrap();
        let cache = template_cache(&loader, true);

        let first = cache.get("/a.tpl").await.unwrap();
        let second = cache.get("/a.tpl").await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_deleted_source_reports_not_found() {
        let loader = MemoryResourceLoader::new();
        loader.insert("gone.tpl", "bye").unwrap();
        let cache = template_cache(&loader, true);

        cache.get("/gone.tpl").await.unwrap();
        loader.remove("gone.tpl");

        let err = cache.get("/gone.tpl").await.unwrap_err();
        assert!(err.is_not_found());
        assert!(!cache.contains("/gone.tpl"));
    }

    #[tokio::test]
    async fn test_compilation_failure_is_not_cached() {
        let loader = MemoryResourceLoader::new();
        loader.insert("page.tpl", "{{#if x}}oops{{/each}}").unwrap();
        let cache = template_cache(&loader, true);

        let err = cache.get("/page.tpl").await.unwrap_err();
        assert!(err.is_compilation());
        assert!(!cache.contains("/page.tpl"));

        loader.insert("page.tpl", "fixed").unwrap();
        let template = cache.get("/page.tpl").await.unwrap();
        assert_eq!(template.render(&json!({})).unwrap(), "fixed");
    }
}
