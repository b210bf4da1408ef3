//! # Stencil Engine
//!
//! Template runtime: resolves named template resources, compiles them into
//! executable units and keeps the compiled cache coherent with source changes.
//!
//! ## Features
//!
//! - **Single-flight caches**: concurrent first lookups of a name load and
//!   compile it once
//! - **Hot reload**: with `template_reloadable` set, every lookup checks the
//!   source fingerprint and recompiles stale templates under a new unit
//!   generation
//! - **Pluggable loaders**: filesystem, external paths, in-memory and composite
//! - **Provider registry**: helpers contributed through `inventory`, imported by
//!   name or discovered by auto-scan
//! - **Process-wide lifecycle**: idempotent `initialize`, fail-fast `engine()`,
//!   explicit `teardown`
//!
//! ## Example
//!
//! ```rust,ignore
//! use stencil_engine::{EngineConfig, TemplateEngine};
//!
//! let config = EngineConfig::builder()
//!     .template_path("templates")
//!     .template_reloadable(true)
//!     .build()?;
//! let engine = TemplateEngine::new(config)?;
//! let page = engine.get_template("pages/index.hbs").await?;
//! let html = page.render(&serde_json::json!({ "title": "Home" }))?;
//! ```

pub mod cache;
pub mod compiler;
pub mod config;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod loader;
pub mod name;
pub mod resource;
pub mod symbols;
pub mod template;

pub use compiler::{Compiler, ExecutableUnit, Generation, HandlebarsCompiler, Program, UnitLoader};
pub use config::{EngineConfig, EngineConfigBuilder};
pub use engine::{EngineBuilder, TemplateEngine, VERSION};
pub use error::{Result, TemplateError};
pub use loader::{
    CompositeResourceLoader, FileSystemResourceLoader, LoaderKind, MemoryResourceLoader,
    ResourceLoader,
};
pub use name::normalize_name;
pub use resource::{Fingerprint, Resource, ResourceOrigin};
pub use symbols::{Capability, GlobalVariable, ProviderEntry, ProviderModule, SymbolTable};
pub use template::CompiledTemplate;

// Provider modules are submitted with this macro by downstream crates.
pub use inventory;
