//! Compile-time registry of template capability providers
//!
//! Crates contribute helpers by submitting a [`ProviderModule`] through
//! `inventory`; the engine discovers them once at construction, either by
//! explicit import or by auto-scan.
//!
//! ```rust,ignore
//! use stencil_engine::symbols::{Capability, ProviderEntry, ProviderModule};
//!
//! inventory::submit! {
//!     ProviderModule::new("acme.text", "slugs", Capability::Functions, &[
//!         ProviderEntry::Function("slugify", slugify),
//!     ])
//! }
//! ```

use serde_json::Value;

/// Plain function callable from templates; receives the evaluated arguments
pub type TemplateFunction = fn(&[Value]) -> Result<Value, String>;

/// Block tag; receives the evaluated arguments and the rendered body
pub type TagFunction = fn(&[Value], &str) -> Result<String, String>;

/// Capability marker a provider module declares
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Methods applied to a receiver passed as the first argument
    Methods,
    /// Free functions
    Functions,
    /// Block tags wrapping template content
    Tags,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Methods => "methods",
            Capability::Functions => "functions",
            Capability::Tags => "tags",
        }
    }
}

/// One symbol exported by a provider module
#[derive(Clone, Copy)]
pub enum ProviderEntry {
    Function(&'static str, TemplateFunction),
    Tag(&'static str, TagFunction),
}

impl ProviderEntry {
    pub fn name(&self) -> &'static str {
        match self {
            ProviderEntry::Function(name, _) | ProviderEntry::Tag(name, _) => name,
        }
    }
}

impl std::fmt::Debug for ProviderEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderEntry::Function(name, _) => f.debug_tuple("Function").field(name).finish(),
            ProviderEntry::Tag(name, _) => f.debug_tuple("Tag").field(name).finish(),
        }
    }
}

/// A named group of symbols sharing one capability
#[derive(Debug)]
pub struct ProviderModule {
    /// Dotted package the module belongs to, used by auto-scan filters
    pub package: &'static str,
    pub name: &'static str,
    pub capability: Capability,
    pub entries: &'static [ProviderEntry],
}

impl ProviderModule {
    pub const fn new(
        package: &'static str,
        name: &'static str,
        capability: Capability,
        entries: &'static [ProviderEntry],
    ) -> Self {
        Self {
            package,
            name,
            capability,
            entries,
        }
    }

    /// `package.name`, the form used by declared imports
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.package, self.name)
    }

    /// Whether the module lives in `package` or one of its subpackages
    pub fn in_package(&self, package: &str) -> bool {
        self.package == package
            || self
                .package
                .strip_prefix(package)
                .is_some_and(|rest| rest.starts_with('.'))
    }
}

inventory::collect!(ProviderModule);

/// Every provider module linked into the binary
pub fn registered_modules() -> impl Iterator<Item = &'static ProviderModule> {
    inventory::iter::<ProviderModule>.into_iter()
}

/// Look up a module by qualified name, or by bare name when unambiguous
pub fn find_module(name: &str) -> Option<&'static ProviderModule> {
    let name = name.trim();
    if let Some(module) = registered_modules().find(|m| m.qualified_name() == name) {
        return Some(module);
    }

    let mut by_name = registered_modules().filter(|m| m.name == name);
    match (by_name.next(), by_name.next()) {
        (Some(module), None) => Some(module),
        _ => None,
    }
}

/// Modules carrying a capability marker, optionally restricted to packages
///
/// An empty package list scans everything.
pub fn scan(packages: &[String]) -> Vec<&'static ProviderModule> {
    registered_modules()
        .filter(|module| packages.is_empty() || packages.iter().any(|p| module.in_package(p)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shout(args: &[Value]) -> Result<Value, String> {
        let text = args.first().and_then(Value::as_str).unwrap_or_default();
        Ok(Value::String(format!("{}!", text.to_uppercase())))
    }

    inventory::submit! {
        ProviderModule::new(
            "stencil.test.registry",
            "shouting",
            Capability::Functions,
            &[ProviderEntry::Function("shout", shout)],
        )
    }

    #[test]
    fn test_submitted_modules_are_discovered() {
        let module = find_module("stencil.test.registry.shouting").unwrap();
        assert_eq!(module.capability, Capability::Functions);
        assert_eq!(module.entries[0].name(), "shout");
    }

    #[test]
    fn test_bare_name_lookup() {
        assert!(find_module("shouting").is_some());
        assert!(find_module("no_such_module").is_none());
    }

    #[test]
    fn test_scan_filters_by_package() {
        let scoped = scan(&["stencil.test".to_string()]);
        assert!(scoped.iter().any(|m| m.name == "shouting"));
        assert!(scoped.iter().all(|m| m.in_package("stencil.test")));

        let none = scan(&["stencil.tes".to_string()]);
        assert!(none.iter().all(|m| m.name != "shouting"));
    }

    #[test]
    fn test_in_package_requires_segment_boundary() {
        let module = ProviderModule::new("acme.text", "x", Capability::Tags, &[]);
        assert!(module.in_package("acme"));
        assert!(module.in_package("acme.text"));
        assert!(!module.in_package("acm"));
        assert!(!module.in_package("acme.text.more"));
    }
}
