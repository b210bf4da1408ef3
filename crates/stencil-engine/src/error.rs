//! Error types for the template runtime

use stencil_cache::CacheError;
use thiserror::Error;

/// Errors surfaced by engine operations
///
/// Cloneable so a single producer outcome can be handed to every waiter of a
/// cache entry.
#[derive(Debug, Clone, Error)]
pub enum TemplateError {
    /// The named resource does not exist
    #[error("Resource not found: {name}")]
    ResourceNotFound { name: String },

    /// The resource exists but its source does not compile
    #[error("Compilation failed for {name}: {message}")]
    Compilation { name: String, message: String },

    /// An operation ran before the process-wide engine was initialized
    #[error("Template engine is not initialized")]
    EngineNotInitialized,

    /// A resource name could not be normalized
    #[error("Invalid resource name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    /// Reading a resource failed for a reason other than absence
    #[error("IO error reading {name}: {message}")]
    Io { name: String, message: String },

    /// Executing a compiled template failed
    #[error("Render error in {name}: {message}")]
    Render { name: String, message: String },

    /// Configuration rejected while building the engine
    #[error("Configuration error: {0}")]
    Config(String),

    /// A declared import could not be resolved
    #[error("Symbol resolution error: {0}")]
    Symbol(String),

    /// Failure around a cache production
    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl TemplateError {
    pub fn not_found(name: impl Into<String>) -> Self {
        TemplateError::ResourceNotFound { name: name.into() }
    }

    pub fn io(name: impl Into<String>, err: &std::io::Error) -> Self {
        TemplateError::Io {
            name: name.into(),
            message: err.to_string(),
        }
    }

    /// "Does not exist", as opposed to "exists but is broken"
    pub fn is_not_found(&self) -> bool {
        matches!(self, TemplateError::ResourceNotFound { .. })
    }

    pub fn is_compilation(&self) -> bool {
        matches!(self, TemplateError::Compilation { .. })
    }
}

impl From<config::ConfigError> for TemplateError {
    fn from(err: config::ConfigError) -> Self {
        TemplateError::Config(err.to_string())
    }
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, TemplateError>;
