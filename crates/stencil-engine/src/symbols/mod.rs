//! Symbol table consulted by the compiler
//!
//! Built once at engine construction from declared imports and the optional
//! auto-scan over registered provider modules. Read-only afterwards.

pub mod builtin;
pub mod registry;

use std::collections::BTreeMap;
use std::fmt;
use std::time::Instant;

use serde_json::Value;
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::error::{Result, TemplateError};

pub use registry::{
    find_module, registered_modules, scan, Capability, ProviderEntry, ProviderModule,
    TagFunction, TemplateFunction,
};

/// Declared type of a global variable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    String,
    Number,
    Boolean,
    Array,
    Object,
    Any,
}

impl ValueType {
    fn from_type_name(type_name: &str) -> Self {
        let base = type_name.rsplit(['.', ':']).next().unwrap_or(type_name);
        if base.ends_with("[]") {
            return ValueType::Array;
        }
        match base.split('<').next().unwrap_or(base) {
            "String" | "string" | "str" | "char" => ValueType::String,
            "int" | "long" | "short" | "byte" | "double" | "float" | "Integer" | "Long"
            | "Double" | "Float" | "Number" | "i32" | "i64" | "u32" | "u64" | "f32" | "f64" => {
                ValueType::Number
            }
            "boolean" | "Boolean" | "bool" => ValueType::Boolean,
            "List" | "Vec" | "Array" | "Collection" | "Set" => ValueType::Array,
            "Map" | "HashMap" | "Object" | "BTreeMap" => ValueType::Object,
            _ => ValueType::Any,
        }
    }

    /// Whether `value` is acceptable; `null` always is
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) | (ValueType::Any, _) => true,
            (ValueType::String, Value::String(_)) => true,
            (ValueType::Number, Value::Number(_)) => true,
            (ValueType::Boolean, Value::Bool(_)) => true,
            (ValueType::Array, Value::Array(_)) => true,
            (ValueType::Object, Value::Object(_)) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueType::String => "string",
            ValueType::Number => "number",
            ValueType::Boolean => "boolean",
            ValueType::Array => "array",
            ValueType::Object => "object",
            ValueType::Any => "any",
        };
        f.write_str(name)
    }
}

/// A global variable declared as `"<type> <id>"`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalVariable {
    pub type_name: String,
    pub id: String,
    pub value_type: ValueType,
}

impl GlobalVariable {
    pub fn parse(declaration: &str) -> Result<Self> {
        let mut parts = declaration.split_whitespace();
        match (parts.next(), parts.next(), parts.next()) {
            (Some(type_name), Some(id), None) if is_identifier(id) => Ok(Self {
                type_name: type_name.to_string(),
                id: id.to_string(),
                value_type: ValueType::from_type_name(type_name),
            }),
            _ => Err(TemplateError::Symbol(format!(
                "global variable must be declared as '<type> <id>', got '{}'",
                declaration.trim()
            ))),
        }
    }

    /// Check the variable's value in `data`, if present
    pub fn check(&self, data: &Value) -> std::result::Result<(), String> {
        match data.get(&self.id) {
            Some(value) if !self.value_type.accepts(value) => Err(format!(
                "global '{}' is declared as {} but got {}",
                self.id, self.type_name, value
            )),
            _ => Ok(()),
        }
    }
}

fn is_identifier(id: &str) -> bool {
    let mut chars = id.chars();
    chars
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

/// Everything the compiler may resolve while compiling a template
#[derive(Default, Clone)]
pub struct SymbolTable {
    packages: Vec<String>,
    classes: BTreeMap<String, String>,
    methods: BTreeMap<String, TemplateFunction>,
    functions: BTreeMap<String, TemplateFunction>,
    tags: BTreeMap<String, TagFunction>,
    globals: BTreeMap<String, GlobalVariable>,
    modules: Vec<String>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from declared imports, then auto-scan when enabled
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        let mut table = Self::new();

        for package in config.import_packages() {
            table.add_import_package(package);
        }
        for class in config.import_classes() {
            table.add_import_class(class)?;
        }
        for name in config.import_methods() {
            table.add_provider_by_name(name, Capability::Methods)?;
        }
        for name in config.import_functions() {
            table.add_provider_by_name(name, Capability::Functions)?;
        }
        for name in config.import_tags() {
            table.add_provider_by_name(name, Capability::Tags)?;
        }
        for declaration in config.import_variables() {
            table.add_global_variable(GlobalVariable::parse(declaration)?);
        }

        if config.import_autoscan() {
            table.autoscan(config.import_autoscan_packages());
        }

        debug!(
            packages = table.packages.len(),
            classes = table.classes.len(),
            methods = table.methods.len(),
            functions = table.functions.len(),
            tags = table.tags.len(),
            globals = table.globals.len(),
            "symbol table built"
        );
        Ok(table)
    }

    /// Register every provider module within `packages` (all when empty)
    pub fn autoscan(&mut self, packages: &[String]) -> usize {
        let started = Instant::now();
        let modules = scan(packages);
        for module in &modules {
            self.add_provider(module);
        }
        info!(
            modules = modules.len(),
            packages = ?packages,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "provider auto-scan finished"
        );
        modules.len()
    }

    pub fn add_import_package(&mut self, package: &str) {
        let package = package.trim().to_string();
        if !self.packages.contains(&package) {
            self.packages.push(package);
        }
    }

    /// Import a qualified class name so templates can use its simple name
    pub fn add_import_class(&mut self, qualified: &str) -> Result<()> {
        let qualified = qualified.trim();
        let simple = qualified
            .rsplit(['.', ':'])
            .next()
            .filter(|simple| !simple.is_empty())
            .ok_or_else(|| TemplateError::Symbol(format!("invalid class import '{qualified}'")))?;
        self.classes.insert(simple.to_string(), qualified.to_string());
        Ok(())
    }

    /// Register a declared provider, checking its capability marker
    pub fn add_provider_by_name(&mut self, name: &str, expected: Capability) -> Result<()> {
        let module = find_module(name)
            .ok_or_else(|| TemplateError::Symbol(format!("unknown provider module '{name}'")))?;
        if module.capability != expected {
            return Err(TemplateError::Symbol(format!(
                "provider module '{}' provides {}, not {}",
                module.qualified_name(),
                module.capability.as_str(),
                expected.as_str()
            )));
        }
        self.add_provider(module);
        Ok(())
    }

    pub fn add_provider(&mut self, module: &ProviderModule) {
        let qualified = module.qualified_name();
        if self.modules.contains(&qualified) {
            return;
        }

        for entry in module.entries {
            match (module.capability, *entry) {
                (Capability::Methods, ProviderEntry::Function(name, function)) => {
                    self.methods.insert(name.to_string(), function);
                }
                (Capability::Functions, ProviderEntry::Function(name, function)) => {
                    self.functions.insert(name.to_string(), function);
                }
                (Capability::Tags, ProviderEntry::Tag(name, tag)) => {
                    self.tags.insert(name.to_string(), tag);
                }
                (capability, entry) => {
                    debug!(
                        module = %qualified,
                        entry = entry.name(),
                        capability = capability.as_str(),
                        "skipping entry that does not match the module capability"
                    );
                }
            }
        }
        self.modules.push(qualified);
    }

    pub fn add_global_variable(&mut self, variable: GlobalVariable) {
        self.globals.insert(variable.id.clone(), variable);
    }

    /// Qualified name for an imported simple class name
    pub fn resolve_class(&self, simple: &str) -> Option<&str> {
        self.classes.get(simple).map(String::as_str)
    }

    pub fn packages(&self) -> &[String] {
        &self.packages
    }

    /// Qualified names of the provider modules registered so far
    pub fn modules(&self) -> &[String] {
        &self.modules
    }

    pub fn method(&self, name: &str) -> Option<TemplateFunction> {
        self.methods.get(name).copied()
    }

    pub fn function(&self, name: &str) -> Option<TemplateFunction> {
        self.functions.get(name).copied()
    }

    pub fn tag(&self, name: &str) -> Option<TagFunction> {
        self.tags.get(name).copied()
    }

    pub fn methods(&self) -> impl Iterator<Item = (&str, TemplateFunction)> {
        self.methods.iter().map(|(name, f)| (name.as_str(), *f))
    }

    pub fn functions(&self) -> impl Iterator<Item = (&str, TemplateFunction)> {
        self.functions.iter().map(|(name, f)| (name.as_str(), *f))
    }

    pub fn tags(&self) -> impl Iterator<Item = (&str, TagFunction)> {
        self.tags.iter().map(|(name, f)| (name.as_str(), *f))
    }

    pub fn global(&self, id: &str) -> Option<&GlobalVariable> {
        self.globals.get(id)
    }

    pub fn globals(&self) -> impl Iterator<Item = &GlobalVariable> {
        self.globals.values()
    }
}

impl fmt::Debug for SymbolTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SymbolTable")
            .field("packages", &self.packages)
            .field("classes", &self.classes)
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .field("functions", &self.functions.keys().collect::<Vec<_>>())
            .field("tags", &self.tags.keys().collect::<Vec<_>>())
            .field("globals", &self.globals)
            .field("modules", &self.modules)
            .finish()
    }
}
