//! Resource loaders
//!
//! A loader turns a normalized resource name into content plus a
//! [`Fingerprint`]. Implementations are interchangeable; the engine only sees
//! the [`ResourceLoader`] trait.

pub mod composite;
pub mod filesystem;
pub mod memory;

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TemplateError};
use crate::resource::{Fingerprint, Resource};

pub use composite::CompositeResourceLoader;
pub use filesystem::FileSystemResourceLoader;
pub use memory::MemoryResourceLoader;

/// Source of template resources
#[async_trait]
pub trait ResourceLoader: Send + Sync {
    /// Short identifier used in logs
    fn kind(&self) -> &'static str;

    /// Prepare the loader; called once before any lookup
    fn initialize(&mut self, base_path: &Path, encoding: &str) -> Result<()>;

    /// Load `name`, or `Ok(None)` if it does not exist
    async fn load(&self, name: &str) -> Result<Option<Resource>>;

    /// Current fingerprint of `name`, or `Ok(None)` if it does not exist
    ///
    /// The default reads the whole resource; loaders with a cheaper metadata
    /// probe should override it.
    async fn fingerprint(&self, name: &str) -> Result<Option<Fingerprint>> {
        Ok(self.load(name).await?.map(|resource| resource.fingerprint()))
    }
}

/// Loader implementation selected by configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoaderKind {
    /// Files under the configured template root
    #[default]
    #[serde(rename = "filesystem")]
    FileSystem,
    /// Names are absolute paths on the local filesystem
    External,
}

impl std::str::FromStr for LoaderKind {
    type Err = TemplateError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "filesystem" | "file" => Ok(LoaderKind::FileSystem),
            "external" => Ok(LoaderKind::External),
            other => Err(TemplateError::Config(format!("unknown template loader '{other}'"))),
        }
    }
}

/// Instantiate the loader for `kind`; the caller initializes it
pub fn create_loader(kind: LoaderKind) -> Box<dyn ResourceLoader> {
    match kind {
        LoaderKind::FileSystem => Box::new(FileSystemResourceLoader::new()),
        LoaderKind::External => Box::new(FileSystemResourceLoader::external()),
    }
}

/// Reject input encodings the loaders cannot decode
///
/// Template sources are read as UTF-8.
pub fn check_encoding(encoding: &str) -> Result<()> {
    match encoding.to_ascii_lowercase().as_str() {
        "utf-8" | "utf8" => Ok(()),
        other => Err(TemplateError::Config(format!(
            "unsupported input encoding '{other}', only UTF-8 is supported"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utf8_spellings_are_accepted() {
        assert!(check_encoding("UTF-8").is_ok());
        assert!(check_encoding("utf8").is_ok());
    }

    #[test]
    fn test_other_encodings_are_rejected() {
        let err = check_encoding("GBK").unwrap_err();
        assert!(matches!(err, TemplateError::Config(_)));
    }

    #[test]
    fn test_loader_kind_parsing() {
        assert_eq!("filesystem".parse::<LoaderKind>().unwrap(), LoaderKind::FileSystem);
        assert_eq!("External".parse::<LoaderKind>().unwrap(), LoaderKind::External);
        assert!("jar".parse::<LoaderKind>().is_err());
    }

    #[test]
    fn test_create_loader_kinds() {
        assert_eq!(create_loader(LoaderKind::FileSystem).kind(), "filesystem");
        assert_eq!(create_loader(LoaderKind::External).kind(), "external");
    }
}
