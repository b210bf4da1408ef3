//! Engine configuration
//!
//! An [`EngineConfig`] is finalized once through [`EngineConfigBuilder::build`]
//! (or one of the file/property loaders, which go through the same
//! validation) and is immutable afterwards.

use std::path::{Path, PathBuf};

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Result, TemplateError};
use crate::loader::{check_encoding, LoaderKind};
use crate::symbols::GlobalVariable;

/// Prefix of environment variables overriding file settings
pub const ENV_PREFIX: &str = "STENCIL";

const LIST_KEYS: [&str; 7] = [
    "import_packages",
    "import_classes",
    "import_methods",
    "import_functions",
    "import_tags",
    "import_variables",
    "import_autoscan_packages",
];

/// Finalized engine configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    template_path: PathBuf,
    input_encoding: String,
    template_reloadable: bool,
    compile_path: Option<PathBuf>,
    template_loader: LoaderKind,
    import_packages: Vec<String>,
    import_classes: Vec<String>,
    import_methods: Vec<String>,
    import_functions: Vec<String>,
    import_tags: Vec<String>,
    import_variables: Vec<String>,
    import_autoscan: bool,
    import_autoscan_packages: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            template_path: PathBuf::from("."),
            input_encoding: "utf-8".to_string(),
            template_reloadable: false,
            compile_path: None,
            template_loader: LoaderKind::FileSystem,
            import_packages: Vec::new(),
            import_classes: Vec::new(),
            import_methods: Vec::new(),
            import_functions: Vec::new(),
            import_tags: Vec::new(),
            import_variables: Vec::new(),
            import_autoscan: false,
            import_autoscan_packages: Vec::new(),
        }
    }
}

impl EngineConfig {
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    /// Start a builder from this configuration, to override some settings
    pub fn into_builder(self) -> EngineConfigBuilder {
        EngineConfigBuilder { config: self }
    }

    /// Load from a configuration file, overridden by `STENCIL_*` variables
    ///
    /// The file format follows its extension. A missing file yields the
    /// defaults plus whatever the environment sets.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let mut environment = Environment::with_prefix(ENV_PREFIX)
            .try_parsing(true)
            .list_separator(",");
        for key in LIST_KEYS {
            environment = environment.with_list_parse_key(key);
        }

        let settings = Config::builder()
            .add_source(File::from(path.as_ref()).required(false))
            .add_source(environment)
            .build()?;

        let config: EngineConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Build from dotted `key = value` properties
    ///
    /// Recognized keys: `template.path`, `template.loader`,
    /// `template.reloadable`, `compile.path`, `input.encoding`,
    /// `import.packages`, `import.classes`, `import.methods`,
    /// `import.functions`, `import.tags`, `import.variables`,
    /// `import.autoscan` and `import.autoscan.packages`. List values are
    /// comma separated. Unknown keys are ignored with a warning.
    pub fn from_properties<I, K, V>(properties: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut builder = EngineConfigBuilder::default();
        for (key, value) in properties {
            let key = key.as_ref().trim();
            let value = value.as_ref().trim();
            builder = match key {
                "template.path" => builder.template_path(value),
                "template.loader" => builder.template_loader(value.parse()?),
                "template.reloadable" => builder.template_reloadable(parse_bool(key, value)?),
                "compile.path" if value.is_empty() => builder,
                "compile.path" => builder.compile_path(value),
                "input.encoding" => builder.input_encoding(value),
                "import.packages" => builder.import_packages(split_list(value)),
                "import.classes" => builder.import_classes(split_list(value)),
                "import.methods" => builder.import_methods(split_list(value)),
                "import.functions" => builder.import_functions(split_list(value)),
                "import.tags" => builder.import_tags(split_list(value)),
                "import.variables" => builder.import_variables(split_list(value)),
                "import.autoscan" => builder.import_autoscan(parse_bool(key, value)?),
                "import.autoscan.packages" => builder.import_autoscan_packages(split_list(value)),
                other => {
                    warn!(key = other, "ignoring unknown engine property");
                    builder
                }
            };
        }
        builder.build()
    }

    pub fn template_path(&self) -> &Path {
        &self.template_path
    }

    pub fn input_encoding(&self) -> &str {
        &self.input_encoding
    }

    pub fn template_reloadable(&self) -> bool {
        self.template_reloadable
    }

    /// Directory compiled sources are written to, if any
    pub fn compile_path(&self) -> Option<&Path> {
        self.compile_path.as_deref()
    }

    pub fn template_loader(&self) -> LoaderKind {
        self.template_loader
    }

    pub fn import_packages(&self) -> &[String] {
        &self.import_packages
    }

    pub fn import_classes(&self) -> &[String] {
        &self.import_classes
    }

    pub fn import_methods(&self) -> &[String] {
        &self.import_methods
    }

    pub fn import_functions(&self) -> &[String] {
        &self.import_functions
    }

    pub fn import_tags(&self) -> &[String] {
        &self.import_tags
    }

    /// Global variable declarations in `"<type> <id>"` form
    pub fn import_variables(&self) -> &[String] {
        &self.import_variables
    }

    pub fn import_autoscan(&self) -> bool {
        self.import_autoscan
    }

    pub fn import_autoscan_packages(&self) -> &[String] {
        &self.import_autoscan_packages
    }

    fn validate(&self) -> Result<()> {
        if self.template_path.as_os_str().is_empty() {
            return Err(TemplateError::Config("template path must not be empty".to_string()));
        }
        check_encoding(&self.input_encoding)?;

        let lists = [
            ("import.packages", &self.import_packages),
            ("import.classes", &self.import_classes),
            ("import.methods", &self.import_methods),
            ("import.functions", &self.import_functions),
            ("import.tags", &self.import_tags),
            ("import.variables", &self.import_variables),
            ("import.autoscan.packages", &self.import_autoscan_packages),
        ];
        for (key, entries) in lists {
            if entries.iter().any(|entry| entry.trim().is_empty()) {
                return Err(TemplateError::Config(format!("{key} contains an empty entry")));
            }
        }

        for declaration in &self.import_variables {
            GlobalVariable::parse(declaration)?;
        }

        if !self.import_autoscan && !self.import_autoscan_packages.is_empty() {
            warn!("import.autoscan.packages is set but auto-scan is disabled");
        }
        Ok(())
    }
}

/// Builder finalizing an [`EngineConfig`]
#[derive(Debug, Clone, Default)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    pub fn template_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.template_path = path.into();
        self
    }

    pub fn input_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.config.input_encoding = encoding.into();
        self
    }

    pub fn template_reloadable(mut self, reloadable: bool) -> Self {
        self.config.template_reloadable = reloadable;
        self
    }

    pub fn compile_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.compile_path = Some(path.into());
        self
    }

    pub fn template_loader(mut self, kind: LoaderKind) -> Self {
        self.config.template_loader = kind;
        self
    }

    pub fn import_packages<I: IntoIterator<Item = S>, S: Into<String>>(mut self, items: I) -> Self {
        self.config.import_packages.extend(items.into_iter().map(Into::into));
        self
    }

    pub fn import_classes<I: IntoIterator<Item = S>, S: Into<String>>(mut self, items: I) -> Self {
        self.config.import_classes.extend(items.into_iter().map(Into::into));
        self
    }

    pub fn import_methods<I: IntoIterator<Item = S>, S: Into<String>>(mut self, items: I) -> Self {
        self.config.import_methods.extend(items.into_iter().map(Into::into));
        self
    }

    pub fn import_functions<I: IntoIterator<Item = S>, S: Into<String>>(mut self, items: I) -> Self {
        self.config.import_functions.extend(items.into_iter().map(Into::into));
        self
    }

    pub fn import_tags<I: IntoIterator<Item = S>, S: Into<String>>(mut self, items: I) -> Self {
        self.config.import_tags.extend(items.into_iter().map(Into::into));
        self
    }

    pub fn import_variables<I: IntoIterator<Item = S>, S: Into<String>>(mut self, items: I) -> Self {
        self.config.import_variables.extend(items.into_iter().map(Into::into));
        self
    }

    pub fn import_autoscan(mut self, enabled: bool) -> Self {
        self.config.import_autoscan = enabled;
        self
    }

    pub fn import_autoscan_packages<I: IntoIterator<Item = S>, S: Into<String>>(
        mut self,
        items: I,
    ) -> Self {
        self.config
            .import_autoscan_packages
            .extend(items.into_iter().map(Into::into));
        self
    }

    /// Validate and freeze the configuration
    pub fn build(self) -> Result<EngineConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => Ok(true),
        "false" | "no" | "0" => Ok(false),
        _ => Err(TemplateError::Config(format!("{key}: expected a boolean, got '{value}'"))),
    }
}
