//! Template resources and their fingerprints

use std::{
    fmt,
    path::PathBuf,
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use serde::{Deserialize, Serialize};

/// Comparable marker of a resource's last known state
///
/// Loaders pick the meaning: the filesystem loader uses the modification time
/// in nanoseconds, the in-memory loader a revision counter. Any difference
/// means the resource changed; larger values are newer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Fingerprint(u64);

impl Fingerprint {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Fingerprint from a modification time
    pub fn from_modified(modified: SystemTime) -> Self {
        let nanos = modified
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_nanos() as u64)
            .unwrap_or(0);
        Self(nanos)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}", self.0)
    }
}

/// Where a resource's content came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceOrigin {
    /// File under the configured template root
    FileSystem(PathBuf),
    /// Registered with an in-memory loader
    Memory,
    /// Absolute path outside any template root
    External(PathBuf),
}

/// Immutable snapshot of a template source
///
/// Never mutated after loading; a change in the underlying source produces a
/// new `Resource` that replaces this one in the cache.
#[derive(Debug, Clone)]
pub struct Resource {
    name: String,
    content: Arc<str>,
    fingerprint: Fingerprint,
    origin: ResourceOrigin,
}

impl Resource {
    pub fn new(
        name: impl Into<String>,
        content: impl Into<Arc<str>>,
        fingerprint: Fingerprint,
        origin: ResourceOrigin,
    ) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
            fingerprint,
            origin,
        }
    }

    /// Normalized name this resource was loaded under
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    pub fn origin(&self) -> &ResourceOrigin {
        &self.origin
    }

    /// Content length in bytes
    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_later_modification_is_newer() {
        let earlier = Fingerprint::from_modified(UNIX_EPOCH + Duration::from_secs(10));
        let later = Fingerprint::from_modified(UNIX_EPOCH + Duration::from_secs(11));
        assert!(later > earlier);
        assert_ne!(later, earlier);
    }

    #[test]
    fn test_pre_epoch_times_clamp_to_zero() {
        let before = UNIX_EPOCH - Duration::from_secs(1);
        assert_eq!(Fingerprint::from_modified(before), Fingerprint::new(0));
    }

    #[test]
    fn test_resource_accessors() {
        let resource = Resource::new("/greet.tpl", "Hello", Fingerprint::new(1), ResourceOrigin::Memory);
        assert_eq!(resource.name(), "/greet.tpl");
        assert_eq!(resource.content(), "Hello");
        assert_eq!(resource.len(), 5);
        assert_eq!(resource.origin(), &ResourceOrigin::Memory);
        assert_eq!(resource.fingerprint().to_string(), "1");
    }
}
