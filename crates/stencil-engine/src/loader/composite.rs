//! Loader that aggregates several loaders

use std::path::Path;

use async_trait::async_trait;

use super::ResourceLoader;
use crate::error::Result;
use crate::resource::{Fingerprint, Resource};

/// Tries each loader in order; the first one that has the name wins
#[derive(Default)]
pub struct CompositeResourceLoader {
    loaders: Vec<Box<dyn ResourceLoader>>,
}

impl CompositeResourceLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a loader with lower precedence than those already added
    pub fn with(mut self, loader: impl ResourceLoader + 'static) -> Self {
        self.loaders.push(Box::new(loader));
        self
    }

    pub fn push(&mut self, loader: Box<dyn ResourceLoader>) {
        self.loaders.push(loader);
    }

    pub fn len(&self) -> usize {
        self.loaders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loaders.is_empty()
    }
}

#[async_trait]
impl ResourceLoader for CompositeResourceLoader {
    fn kind(&self) -> &'static str {
        "composite"
    }

    fn initialize(&mut self, base_path: &Path, encoding: &str) -> Result<()> {
        for loader in &mut self.loaders {
            loader.initialize(base_path, encoding)?;
        }
        Ok(())
    }

    async fn load(&self, name: &str) -> Result<Option<Resource>> {
        for loader in &self.loaders {
            if let Some(resource) = loader.load(name).await? {
                return Ok(Some(resource));
            }
        }
        Ok(None)
    }

    async fn fingerprint(&self, name: &str) -> Result<Option<Fingerprint>> {
        for loader in &self.loaders {
            if let Some(fingerprint) = loader.fingerprint(name).await? {
                return Ok(Some(fingerprint));
            }
        }
        Ok(None)
    }
}
