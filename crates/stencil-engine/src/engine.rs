//! Template engine façade

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

use serde_json::Value;
use stencil_cache::CacheStats;
use tracing::{debug, info, warn};

use crate::cache::{ResourceCache, TemplateCache};
use crate::compiler::{Compiler, HandlebarsCompiler, UnitLoader};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::loader::{create_loader, ResourceLoader};
use crate::name::normalize_name;
use crate::resource::Resource;
use crate::symbols::SymbolTable;
use crate::template::CompiledTemplate;

/// Engine version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

type CompilerFactory = Box<dyn FnOnce(Arc<SymbolTable>, Arc<UnitLoader>) -> Arc<dyn Compiler> + Send>;

/// Resolves, compiles and caches templates
///
/// Always held in an `Arc`; templates keep a weak reference back to the
/// engine that produced them.
pub struct TemplateEngine {
    config: Arc<EngineConfig>,
    symbols: Arc<SymbolTable>,
    loader: Arc<dyn ResourceLoader>,
    units: Arc<UnitLoader>,
    compiler: Arc<dyn Compiler>,
    resources: Arc<ResourceCache>,
    templates: TemplateCache,
    next_inline: AtomicU64,
    this: Weak<TemplateEngine>,
}

impl TemplateEngine {
    /// Build an engine with the configured loader and the Handlebars compiler
    pub fn new(config: EngineConfig) -> Result<Arc<Self>> {
        EngineBuilder::new(config).build()
    }

    /// Build an engine from a configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Arc<Self>> {
        Self::new(EngineConfig::from_file(path)?)
    }

    pub fn builder(config: EngineConfig) -> EngineBuilder {
        EngineBuilder::new(config)
    }

    /// Whether `name` resolves to a resource; never fails
    pub async fn exists(&self, name: &str) -> bool {
        let Ok(name) = normalize_name(name) else {
            return false;
        };
        match self.resources.get(&name).await {
            Ok(_) => true,
            Err(err) if err.is_not_found() => false,
            Err(err) => {
                warn!(name = %name, error = %err, "resource probe failed");
                false
            }
        }
    }

    pub async fn get_resource(&self, name: &str) -> Result<Arc<Resource>> {
        let name = normalize_name(name)?;
        self.resources.get(&name).await
    }

    /// Compiled template for `name`, recompiled first if its source changed
    /// and reload is enabled
    pub async fn get_template(&self, name: &str) -> Result<Arc<CompiledTemplate>> {
        let name = normalize_name(name)?;
        self.templates.get(&name).await
    }

    /// Compile `source` directly, bypassing both caches
    pub fn create_template(&self, source: &str) -> Result<Arc<CompiledTemplate>> {
        let id = self.next_inline.fetch_add(1, Ordering::Relaxed);
        let unit = self.compiler.compile(source, &format!("inline-{id}"))?;
        self.units.persist_blocking(&unit, source);
        Ok(Arc::new(CompiledTemplate::new(
            None,
            unit,
            None,
            self.this.clone(),
        )))
    }

    /// Look up `name` and render it against `data`
    pub async fn render(&self, name: &str, data: &Value) -> Result<String> {
        self.get_template(name).await?.render(data)
    }

    pub fn version(&self) -> &'static str {
        VERSION
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    pub fn loader(&self) -> &dyn ResourceLoader {
        self.loader.as_ref()
    }

    pub fn unit_loader(&self) -> &UnitLoader {
        &self.units
    }

    pub fn resource_stats(&self) -> CacheStats {
        self.resources.stats()
    }

    pub fn template_stats(&self) -> CacheStats {
        self.templates.stats()
    }

    /// Drop every cached resource and template
    pub fn clear_caches(&self) {
        self.templates.clear();
        self.resources.clear();
        debug!("engine caches cleared");
    }
}

impl std::fmt::Debug for TemplateEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateEngine")
            .field("version", &VERSION)
            .field("loader", &self.loader.kind())
            .field("reloadable", &self.config.template_reloadable())
            .field("resources", &self.resources.len())
            .field("templates", &self.templates.len())
            .finish_non_exhaustive()
    }
}

/// Assembles a [`TemplateEngine`], optionally with a custom loader or compiler
pub struct EngineBuilder {
    config: EngineConfig,
    loader: Option<Box<dyn ResourceLoader>>,
    compiler: Option<CompilerFactory>,
}

impl EngineBuilder {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            loader: None,
            compiler: None,
        }
    }

    /// Use `loader` instead of the one the configuration selects
    pub fn loader(mut self, loader: impl ResourceLoader + 'static) -> Self {
        self.loader = Some(Box::new(loader));
        self
    }

    /// Construct the compiler from the engine's symbol table and unit loader
    pub fn compiler<F>(mut self, factory: F) -> Self
    where
        F: FnOnce(Arc<SymbolTable>, Arc<UnitLoader>) -> Arc<dyn Compiler> + Send + 'static,
    {
        self.compiler = Some(Box::new(factory));
        self
    }

    pub fn build(self) -> Result<Arc<TemplateEngine>> {
        let started = Instant::now();
        let config = Arc::new(self.config);

        let symbols = Arc::new(SymbolTable::from_config(&config)?);

        let mut loader = self
            .loader
            .unwrap_or_else(|| create_loader(config.template_loader()));
        loader.initialize(config.template_path(), config.input_encoding())?;
        let loader: Arc<dyn ResourceLoader> = Arc::from(loader);

        let resources = Arc::new(ResourceCache::new(Arc::clone(&loader)));

        let units = Arc::new(UnitLoader::new(
            config.template_reloadable(),
            config.compile_path().map(Path::to_path_buf),
        ));
        let compiler: Arc<dyn Compiler> = match self.compiler {
            Some(factory) => factory(Arc::clone(&symbols), Arc::clone(&units)),
            None => Arc::new(HandlebarsCompiler::new(
                Arc::clone(&symbols),
                Arc::clone(&units),
            )),
        };

        let engine = Arc::new_cyclic(|this: &Weak<TemplateEngine>| TemplateEngine {
            templates: TemplateCache::new(
                Arc::clone(&loader),
                Arc::clone(&resources),
                Arc::clone(&compiler),
                Arc::clone(&units),
                config.template_reloadable(),
                this.clone(),
            ),
            config: Arc::clone(&config),
            symbols,
            loader,
            units,
            compiler,
            resources,
            next_inline: AtomicU64::new(1),
            this: this.clone(),
        });

        info!(
            version = VERSION,
            loader = engine.loader.kind(),
            root = %config.template_path().display(),
            reloadable = config.template_reloadable(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "template engine ready"
        );
        Ok(engine)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TemplateError;
    use crate::loader::MemoryResourceLoader;
    use serde_json::json;

    fn engine_with(loader: &MemoryResourceLoader, reloadable: bool) -> Arc<TemplateEngine> {
        let config = EngineConfig::builder()
            .template_reloadable(reloadable)
            .build()
            .unwrap();
        TemplateEngine::builder(config)
            .loader(loader.clone())
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_exists_never_fails() {
        let loader = MemoryResourceLoader::new();
        loader.insert("present.tpl", "x").unwrap();
        let engine = engine_with(&loader, false);

        assert!(engine.exists("present.tpl").await);
        assert!(!engine.exists("missing.tpl").await);
        assert!(!engine.exists("../escape.tpl").await);
    }

    #[tokio::test]
    async fn test_equivalent_names_share_one_entry() {
        let loader = MemoryResourceLoader::new();
        loader.insert("a/b.tpl", "x").unwrap();
        let engine = engine_with(&loader, false);

        let first = engine.get_template("a/b.tpl").await.unwrap();
        let second = engine.get_template("/a/./c/../b.tpl").await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.name(), Some("/a/b.tpl"));
    }

    #[tokio::test]
    async fn test_invalid_name_is_rejected() {
        let engine = engine_with(&MemoryResourceLoader::new(), false);
        let err = engine.get_template("../../etc/passwd").await.unwrap_err();
        assert!(matches!(err, TemplateError::InvalidName { .. }));
    }

    #[tokio::test]
    async fn test_create_template_bypasses_caches() {
        let engine = engine_with(&MemoryResourceLoader::new(), false);

        let first = engine.create_template("Hi {{who}}").unwrap();
        let second = engine.create_template("Hi {{who}}").unwrap();

        assert!(!Arc::ptr_eq(&first, &second));
        assert!(!Arc::ptr_eq(first.unit(), second.unit()));
        assert!(first.name().is_none());
        assert!(first.fingerprint().is_none());
        assert_eq!(first.render(&json!({ "who": "there" })).unwrap(), "Hi there");
        assert_eq!(engine.resource_stats().entry_count, 0);
        assert_eq!(engine.template_stats().entry_count, 0);
    }

    #[tokio::test]
    async fn test_refresh_follows_source_changes() {
        let loader = MemoryResourceLoader::new();
        loader.insert("page.tpl", "v1").unwrap();
        let engine = engine_with(&loader, true);

        let template = engine.get_template("page.tpl").await.unwrap();
        loader.insert("page.tpl", "v2").unwrap();
        let refreshed = template.refresh().await.unwrap();

        assert_eq!(refreshed.render(&json!({})).unwrap(), "v2");
    }

    #[tokio::test]
    async fn test_refresh_after_engine_dropped() {
        let loader = MemoryResourceLoader::new();
        loader.insert("page.tpl", "v1").unwrap();
        let engine = engine_with(&loader, true);
        let template = engine.get_template("page.tpl").await.unwrap();
        drop(engine);

        let err = template.refresh().await.unwrap_err();
        assert!(matches!(err, TemplateError::EngineNotInitialized));
        assert_eq!(template.render(&json!({})).unwrap(), "v1");
    }

    #[tokio::test]
    async fn test_render_by_name() {
        let loader = MemoryResourceLoader::new();
        loader.insert("greet.tpl", "Hello, {{name}}").unwrap();
        let engine = engine_with(&loader, false);

        let output = engine.render("greet.tpl", &json!({ "name": "Ada" })).await.unwrap();
        assert_eq!(output, "Hello, Ada");
    }

    #[test]
    fn test_unknown_declared_provider_fails_construction() {
        let config = EngineConfig::builder()
            .import_functions(["acme.missing"])
            .build()
            .unwrap();
        let err = TemplateEngine::builder(config)
            .loader(MemoryResourceLoader::new())
            .build()
            .unwrap_err();
        assert!(matches!(err, TemplateError::Symbol(_)));
    }

    #[test]
    fn test_accessors() {
        let engine = engine_with(&MemoryResourceLoader::new(), true);
        assert_eq!(engine.version(), VERSION);
        assert!(engine.config().template_reloadable());
        assert_eq!(engine.loader().kind(), "memory");
        assert!(engine.unit_loader().is_reloadable());
    }
}
