//! Process-wide engine slot
//!
//! Hosting code calls [`initialize`] once at startup and [`teardown`] at
//! shutdown. Concurrent initialization is idempotent: the first caller builds
//! the engine and everyone else gets that same instance.

use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::engine::TemplateEngine;
use crate::error::{Result, TemplateError};

static ENGINE: RwLock<Option<Arc<TemplateEngine>>> = parking_lot::const_rwlock(None);

/// Build the process-wide engine from `config`, or return the existing one
pub fn initialize(config: EngineConfig) -> Result<Arc<TemplateEngine>> {
    initialize_with(|| TemplateEngine::new(config))
}

/// Build the process-wide engine from a configuration file
pub fn initialize_from_file(path: impl AsRef<Path>) -> Result<Arc<TemplateEngine>> {
    initialize_with(|| TemplateEngine::from_file(path))
}

/// Install the engine produced by `build` unless one is already installed
///
/// `build` runs under the slot's write lock, so it runs at most once among
/// racing callers. A failed build leaves the slot empty.
pub fn initialize_with<F>(build: F) -> Result<Arc<TemplateEngine>>
where
    F: FnOnce() -> Result<Arc<TemplateEngine>>,
{
    let mut slot = ENGINE.write();
    if let Some(engine) = slot.as_ref() {
        debug!("template engine already initialized");
        return Ok(Arc::clone(engine));
    }

    let engine = build()?;
    *slot = Some(Arc::clone(&engine));
    info!(version = engine.version(), "process-wide template engine initialized");
    Ok(engine)
}

/// The process-wide engine
pub fn engine() -> Result<Arc<TemplateEngine>> {
    ENGINE
        .read()
        .as_ref()
        .map(Arc::clone)
        .ok_or(TemplateError::EngineNotInitialized)
}

pub fn is_available() -> bool {
    ENGINE.read().is_some()
}

/// Release the process-wide engine, returning it if one was installed
///
/// Callers still holding the engine or its templates keep them alive.
pub fn teardown() -> Option<Arc<TemplateEngine>> {
    let engine = ENGINE.write().take();
    if engine.is_some() {
        info!("process-wide template engine released");
    }
    engine
}
