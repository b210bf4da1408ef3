//! Handlebars-backed compiler
//!
//! Each unit owns its own registry holding exactly one template, so a
//! recompiled unit never disturbs one that is still rendering. Functions and
//! methods from the symbol table become inline helpers, tags become block
//! helpers.

use std::sync::Arc;

use handlebars::{
    no_escape, Context, Handlebars, Helper, HelperDef, HelperResult, Output, RenderContext,
    RenderError, RenderErrorReason, Renderable, ScopedJson, StringOutput,
};
use serde_json::Value;
use tracing::debug;

use super::units::{ExecutableUnit, Program, UnitLoader};
use super::Compiler;
use crate::error::{Result, TemplateError};
use crate::symbols::{GlobalVariable, SymbolTable, TagFunction, TemplateFunction};

/// Compiles Handlebars sources against a symbol table
pub struct HandlebarsCompiler {
    symbols: Arc<SymbolTable>,
    units: Arc<UnitLoader>,
}

impl HandlebarsCompiler {
    pub fn new(symbols: Arc<SymbolTable>, units: Arc<UnitLoader>) -> Self {
        Self { symbols, units }
    }

    pub fn unit_loader(&self) -> &Arc<UnitLoader> {
        &self.units
    }

    fn registry(&self) -> Handlebars<'static> {
        let mut registry = Handlebars::new();
        registry.register_escape_fn(no_escape);

        for (name, function) in self.symbols.methods().chain(self.symbols.functions()) {
            registry.register_helper(
                name,
                Box::new(FunctionHelper {
                    name: name.to_string(),
                    function,
                }),
            );
        }
        for (name, tag) in self.symbols.tags() {
            registry.register_helper(
                name,
                Box::new(TagHelper {
                    name: name.to_string(),
                    tag,
                }),
            );
        }
        registry
    }
}

impl Compiler for HandlebarsCompiler {
    fn compile(&self, source: &str, name: &str) -> Result<Arc<ExecutableUnit>> {
        let mut registry = self.registry();
        registry
            .register_template_string(name, source)
            .map_err(|err| TemplateError::Compilation {
                name: name.to_string(),
                message: err.to_string(),
            })?;
        debug!(name, bytes = source.len(), "template compiled");

        let program = HandlebarsProgram {
            registry,
            template: name.to_string(),
            globals: self.symbols.globals().cloned().collect(),
        };
        Ok(self.units.define(name, Box::new(program)))
    }
}

struct HandlebarsProgram {
    registry: Handlebars<'static>,
    template: String,
    globals: Vec<GlobalVariable>,
}

impl Program for HandlebarsProgram {
    fn execute(&self, data: &Value) -> std::result::Result<String, String> {
        for global in &self.globals {
            global.check(data)?;
        }
        self.registry
            .render(&self.template, data)
            .map_err(|err| err.to_string())
    }
}

fn helper_error(helper: &str, message: String) -> RenderError {
    RenderErrorReason::Other(format!("{helper}: {message}")).into()
}

fn arguments(h: &Helper<'_>) -> Vec<Value> {
    h.params().iter().map(|param| param.value().clone()).collect()
}

/// `{{name arg...}}`, usable as a subexpression
struct FunctionHelper {
    name: String,
    function: TemplateFunction,
}

impl HelperDef for FunctionHelper {
    fn call_inner<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        _: &'reg Handlebars<'reg>,
        _: &'rc Context,
        _: &mut RenderContext<'reg, 'rc>,
    ) -> std::result::Result<ScopedJson<'rc>, RenderError> {
        let value = (self.function)(&arguments(h)).map_err(|message| helper_error(&self.name, message))?;
        Ok(ScopedJson::Derived(value))
    }
}

/// `{{#name arg...}}body{{/name}}`
struct TagHelper {
    name: String,
    tag: TagFunction,
}

impl HelperDef for TagHelper {
    fn call<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        registry: &'reg Handlebars<'reg>,
        ctx: &'rc Context,
        rc: &mut RenderContext<'reg, 'rc>,
        out: &mut dyn Output,
    ) -> HelperResult {
        let mut body = StringOutput::new();
        if let Some(template) = h.template() {
            template.render(registry, ctx, rc, &mut body)?;
        }
        let body = body
            .into_string()
            .map_err(|err| helper_error(&self.name, err.to_string()))?;

        let rendered = (self.tag)(&arguments(h), &body).map_err(|message| helper_error(&self.name, message))?;
        out.write(&rendered)?;
        Ok(())
    }
}
