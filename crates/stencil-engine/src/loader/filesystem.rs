//! Filesystem-backed resource loader

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info};

use super::{check_encoding, ResourceLoader};
use crate::error::{Result, TemplateError};
use crate::resource::{Fingerprint, Resource, ResourceOrigin};

/// Loads templates from files
///
/// Rooted loaders resolve names below the configured template directory;
/// external loaders treat each name as an absolute path. Fingerprints are
/// modification times, probed through file metadata alone.
#[derive(Debug, Clone, Default)]
pub struct FileSystemResourceLoader {
    root: Option<PathBuf>,
    external: bool,
}

impl FileSystemResourceLoader {
    /// Create an uninitialized rooted loader
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an uninitialized loader for absolute paths
    pub fn external() -> Self {
        Self {
            root: None,
            external: true,
        }
    }

    /// Create a rooted loader and initialize it for UTF-8 sources
    pub fn with_root(root: impl AsRef<Path>) -> Result<Self> {
        let mut loader = Self::new();
        loader.initialize(root.as_ref(), "utf-8")?;
        Ok(loader)
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    fn resolve(&self, name: &str) -> Result<PathBuf> {
        let root = self.root.as_ref().ok_or_else(|| {
            TemplateError::Config(format!("{} loader used before initialize", self.kind()))
        })?;
        Ok(root.join(name.trim_start_matches('/')))
    }

    fn origin(&self, path: PathBuf) -> ResourceOrigin {
        if self.external {
            ResourceOrigin::External(path)
        } else {
            ResourceOrigin::FileSystem(path)
        }
    }

    /// Metadata of a regular file at `path`, `None` if there is none
    async fn file_metadata(name: &str, path: &Path) -> Result<Option<std::fs::Metadata>> {
        match tokio::fs::metadata(path).await {
            Ok(metadata) if metadata.is_file() => Ok(Some(metadata)),
            Ok(_) => Ok(None),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(TemplateError::io(name, &err)),
        }
    }

    fn modified(name: &str, metadata: &std::fs::Metadata) -> Result<Fingerprint> {
        metadata
            .modified()
            .map(Fingerprint::from_modified)
            .map_err(|err| TemplateError::io(name, &err))
    }
}

#[async_trait]
impl ResourceLoader for FileSystemResourceLoader {
    fn kind(&self) -> &'static str {
        if self.external {
            "external"
        } else {
            "filesystem"
        }
    }

    fn initialize(&mut self, base_path: &Path, encoding: &str) -> Result<()> {
        check_encoding(encoding)?;

        if self.external {
            self.root = Some(PathBuf::from("/"));
            return Ok(());
        }

        let metadata = std::fs::metadata(base_path).map_err(|err| {
            TemplateError::Config(format!(
                "template path {} is not accessible: {err}",
                base_path.display()
            ))
        })?;
        if !metadata.is_dir() {
            return Err(TemplateError::Config(format!(
                "template path {} is not a directory",
                base_path.display()
            )));
        }

        info!(root = %base_path.display(), "filesystem resource loader initialized");
        self.root = Some(base_path.to_path_buf());
        Ok(())
    }

    async fn load(&self, name: &str) -> Result<Option<Resource>> {
        let path = self.resolve(name)?;
        let Some(metadata) = Self::file_metadata(name, &path).await? else {
            debug!(name, path = %path.display(), "resource not found");
            return Ok(None);
        };

        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            // Deleted between the metadata probe and the read.
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(TemplateError::io(name, &err)),
        };
        let content = String::from_utf8(bytes).map_err(|err| TemplateError::Io {
            name: name.to_string(),
            message: format!("not valid UTF-8: {err}"),
        })?;

        let fingerprint = Self::modified(name, &metadata)?;
        debug!(name, %fingerprint, bytes = content.len(), "resource loaded");
        Ok(Some(Resource::new(name, content, fingerprint, self.origin(path))))
    }

    async fn fingerprint(&self, name: &str) -> Result<Option<Fingerprint>> {
        let path = self.resolve(name)?;
        match Self::file_metadata(name, &path).await? {
            Some(metadata) => Self::modified(name, &metadata).map(Some),
            None => Ok(None),
        }
    }
}
