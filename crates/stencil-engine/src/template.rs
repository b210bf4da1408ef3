//! Compiled templates handed out by the engine

use std::fmt;
use std::sync::{Arc, Weak};

use serde::Serialize;
use serde_json::Value;

use crate::compiler::{ExecutableUnit, Generation};
use crate::engine::TemplateEngine;
use crate::error::{Result, TemplateError};
use crate::resource::Fingerprint;

/// An executable unit plus the source fingerprint it was compiled from
///
/// Named templates come from the template cache and carry the fingerprint
/// of their resource; ad-hoc templates from
/// [`TemplateEngine::create_template`] have neither name nor fingerprint.
pub struct CompiledTemplate {
    name: Option<String>,
    unit: Arc<ExecutableUnit>,
    fingerprint: Option<Fingerprint>,
    engine: Weak<TemplateEngine>,
}

impl CompiledTemplate {
    pub(crate) fn new(
        name: Option<String>,
        unit: Arc<ExecutableUnit>,
        fingerprint: Option<Fingerprint>,
        engine: Weak<TemplateEngine>,
    ) -> Self {
        Self {
            name,
            unit,
            fingerprint,
            engine,
        }
    }

    /// Normalized resource name, `None` for ad-hoc templates
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn unit(&self) -> &Arc<ExecutableUnit> {
        &self.unit
    }

    /// Fingerprint of the source this template was compiled from
    pub fn fingerprint(&self) -> Option<Fingerprint> {
        self.fingerprint
    }

    pub fn generation(&self) -> Generation {
        self.unit.generation()
    }

    /// Render against a JSON context
    pub fn render(&self, data: &Value) -> Result<String> {
        self.unit.execute(data)
    }

    /// Render against any serializable context
    pub fn render_with<T: Serialize>(&self, data: &T) -> Result<String> {
        let data = serde_json::to_value(data).map_err(|err| TemplateError::Render {
            name: self.unit.name().to_string(),
            message: format!("render data is not serializable: {err}"),
        })?;
        self.render(&data)
    }

    /// Look this template up again through its engine
    ///
    /// Returns the current cache entry, recompiled if the source changed and
    /// the engine reloads templates. Ad-hoc templates return themselves.
    pub async fn refresh(self: &Arc<Self>) -> Result<Arc<CompiledTemplate>> {
        let Some(name) = self.name.as_deref() else {
            return Ok(Arc::clone(self));
        };
        let engine = self
            .engine
            .upgrade()
            .ok_or(TemplateError::EngineNotInitialized)?;
        engine.get_template(name).await
    }
}

impl fmt::Debug for CompiledTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledTemplate")
            .field("name", &self.name)
            .field("unit", &self.unit)
            .field("fingerprint", &self.fingerprint)
            .finish_non_exhaustive()
    }
}
