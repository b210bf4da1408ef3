//! Template compilation
//!
//! The engine sees compilation only through [`Compiler`]; the bundled
//! implementation is [`HandlebarsCompiler`].

pub mod handlebars;
pub mod units;

use std::sync::Arc;

use crate::error::Result;

pub use self::handlebars::HandlebarsCompiler;
pub use units::{artifact_path, ExecutableUnit, Generation, Program, UnitLoader};

/// Turns template source into an executable unit
pub trait Compiler: Send + Sync {
    /// Compile `source`, reporting problems against `name`
    fn compile(&self, source: &str, name: &str) -> Result<Arc<ExecutableUnit>>;
}
