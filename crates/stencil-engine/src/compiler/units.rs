//! Generation-tagged loader for executable units
//!
//! Every unit records the generation that was current when it was defined.
//! A reload advances the generation for units defined afterwards; units of
//! earlier generations stay valid for as long as someone holds them and are
//! dropped with their last reference.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{Result, TemplateError};

/// Logical version of a batch of compiled units
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(u64);

impl Generation {
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "g{}", self.0)
    }
}

/// Compiled form of a template, ready to run against render data
pub trait Program: Send + Sync {
    fn execute(&self, data: &Value) -> std::result::Result<String, String>;
}

/// A program defined by a [`UnitLoader`]
pub struct ExecutableUnit {
    id: u64,
    name: String,
    generation: Generation,
    compiled_at: DateTime<Utc>,
    program: Box<dyn Program>,
}

impl ExecutableUnit {
    /// Unique within the loader that defined it
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn compiled_at(&self) -> DateTime<Utc> {
        self.compiled_at
    }

    pub fn execute(&self, data: &Value) -> Result<String> {
        self.program.execute(data).map_err(|message| TemplateError::Render {
            name: self.name.clone(),
            message,
        })
    }
}

impl fmt::Debug for ExecutableUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutableUnit")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("generation", &self.generation)
            .field("compiled_at", &self.compiled_at)
            .finish_non_exhaustive()
    }
}

/// Defines executable units under the current generation
pub struct UnitLoader {
    reloadable: bool,
    generation: AtomicU64,
    next_id: AtomicU64,
    artifact_dir: Option<PathBuf>,
    live: Mutex<Vec<(Generation, Weak<ExecutableUnit>)>>,
}

impl UnitLoader {
    /// Create a loader; `artifact_dir` receives a copy of every persisted source
    pub fn new(reloadable: bool, artifact_dir: Option<PathBuf>) -> Self {
        Self {
            reloadable,
            generation: AtomicU64::new(1),
            next_id: AtomicU64::new(1),
            artifact_dir,
            live: Mutex::new(Vec::new()),
        }
    }

    pub fn is_reloadable(&self) -> bool {
        self.reloadable
    }

    pub fn current_generation(&self) -> Generation {
        Generation(self.generation.load(Ordering::Acquire))
    }

    /// Start a new generation for units defined from now on
    ///
    /// A non-reloadable loader stays on its first generation.
    pub fn advance(&self) -> Generation {
        if !self.reloadable {
            return self.current_generation();
        }
        let next = Generation(self.generation.fetch_add(1, Ordering::AcqRel) + 1);
        info!(generation = %next, "unit loader advanced");
        next
    }

    /// Wrap `program` as a unit of the current generation
    pub fn define(&self, name: &str, program: Box<dyn Program>) -> Arc<ExecutableUnit> {
        let generation = self.current_generation();
        let unit = Arc::new(ExecutableUnit {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            name: name.to_string(),
            generation,
            compiled_at: Utc::now(),
            program,
        });

        let mut live = self.live.lock();
        live.retain(|(_, unit)| unit.strong_count() > 0);
        live.push((generation, Arc::downgrade(&unit)));
        debug!(name, id = unit.id, %generation, "unit defined");
        unit
    }

    /// Directory receiving a copy of every compiled source, if configured
    pub fn artifact_dir(&self) -> Option<&Path> {
        self.artifact_dir.as_deref()
    }

    /// Write the source `unit` was compiled from into the artifact directory
    ///
    /// Failures are logged and otherwise ignored.
    pub async fn persist(&self, unit: &ExecutableUnit, source: &str) {
        let Some(dir) = &self.artifact_dir else {
            return;
        };
        let path = artifact_path(dir, unit.name(), unit.generation());
        let written = async {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&path, source).await
        }
        .await;
        if let Err(err) = written {
            warn!(name = unit.name(), path = %path.display(), error = %err, "failed to write compiled artifact");
        }
    }

    /// Blocking variant of [`persist`](Self::persist) for synchronous callers
    pub fn persist_blocking(&self, unit: &ExecutableUnit, source: &str) {
        let Some(dir) = &self.artifact_dir else {
            return;
        };
        let path = artifact_path(dir, unit.name(), unit.generation());
        let written = path
            .parent()
            .map_or(Ok(()), std::fs::create_dir_all)
            .and_then(|()| std::fs::write(&path, source));
        if let Err(err) = written {
            warn!(name = unit.name(), path = %path.display(), error = %err, "failed to write compiled artifact");
        }
    }

    /// Generations that still have at least one unit in use, oldest first
    pub fn live_generations(&self) -> Vec<Generation> {
        let mut live = self.live.lock();
        live.retain(|(_, unit)| unit.strong_count() > 0);
        let mut generations: Vec<Generation> = live.iter().map(|(g, _)| *g).collect();
        generations.sort();
        generations.dedup();
        generations
    }

    /// Number of units still referenced
    pub fn live_units(&self) -> usize {
        let mut live = self.live.lock();
        live.retain(|(_, unit)| unit.strong_count() > 0);
        live.len()
    }
}

impl fmt::Debug for UnitLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitLoader")
            .field("reloadable", &self.reloadable)
            .field("generation", &self.current_generation())
            .field("artifact_dir", &self.artifact_dir)
            .finish_non_exhaustive()
    }
}

/// Path of the artifact written for `name` under `generation`
pub fn artifact_path(dir: &Path, name: &str, generation: Generation) -> PathBuf {
    dir.join(format!("{}.{generation}.hbs", name.trim_start_matches('/')))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct Echo(&'static str);

    impl Program for Echo {
        fn execute(&self, _data: &Value) -> std::result::Result<String, String> {
            Ok(self.0.to_string())
        }
    }

    struct Failing;

    impl Program for Failing {
        fn execute(&self, _data: &Value) -> std::result::Result<String, String> {
            Err("boom".to_string())
        }
    }

    #[test]
    fn test_units_carry_the_current_generation() {
        let loader = UnitLoader::new(true, None);
        let first = loader.define("/a.hbs", Box::new(Echo("a")));
        loader.advance();
        let second = loader.define("/a.hbs", Box::new(Echo("a2")));

        assert!(second.generation() > first.generation());
        assert_ne!(first.id(), second.id());
    }

    #[test]
    fn test_old_generation_keeps_running_after_reload() {
        let loader = UnitLoader::new(true, None);
        let old = loader.define("/page.hbs", Box::new(Echo("old")));
        loader.advance();
        let new = loader.define("/page.hbs", Box::new(Echo("new")));

        assert_eq!(old.execute(&Value::Null).unwrap(), "old");
        assert_eq!(new.execute(&Value::Null).unwrap(), "new");
        assert_eq!(loader.live_generations().len(), 2);

        drop(old);
        assert_eq!(loader.live_generations(), vec![new.generation()]);
        assert_eq!(loader.live_units(), 1);
    }

    #[test]
    fn test_non_reloadable_loader_stays_on_one_generation() {
        let loader = UnitLoader::new(false, None);
        let before = loader.current_generation();
        assert_eq!(loader.advance(), before);
        assert_eq!(loader.current_generation(), before);
    }

    #[test]
    fn test_program_failure_becomes_render_error() {
        let loader = UnitLoader::new(false, None);
        let unit = loader.define("/bad.hbs", Box::new(Failing));
        let err = unit.execute(&Value::Null).unwrap_err();
        assert!(matches!(err, TemplateError::Render { ref name, .. } if name == "/bad.hbs"));
    }

    #[tokio::test]
    async fn test_artifacts_written_per_generation() {
        let temp_dir = TempDir::new().unwrap();
        let loader = UnitLoader::new(true, Some(temp_dir.path().to_path_buf()));

        let first = loader.define("/pages/index.hbs", Box::new(Echo("v1")));
        loader.persist(&first, "v1").await;
        loader.advance();
        let second = loader.define("/pages/index.hbs", Box::new(Echo("v2")));
        loader.persist(&second, "v2").await;

        let first_path = artifact_path(temp_dir.path(), "/pages/index.hbs", first.generation());
        let second_path = artifact_path(temp_dir.path(), "/pages/index.hbs", second.generation());
        assert!(first_path.ends_with("pages/index.hbs.g1.hbs"));
        assert_eq!(std::fs::read_to_string(first_path).unwrap(), "v1");
        assert_eq!(std::fs::read_to_string(second_path).unwrap(), "v2");
    }

    #[test]
    fn test_blocking_persist_and_disabled_dir() {
        let temp_dir = TempDir::new().unwrap();
        let loader = UnitLoader::new(false, Some(temp_dir.path().join("out")));
        let unit = loader.define("inline-0", Box::new(Echo("x")));
        loader.persist_blocking(&unit, "x");
        let path = artifact_path(temp_dir.path().join("out").as_path(), "inline-0", unit.generation());
        assert_eq!(std::fs::read_to_string(path).unwrap(), "x");

        let silent = UnitLoader::new(false, None);
        assert!(silent.artifact_dir().is_none());
        silent.persist_blocking(&unit, "x");
    }
}
