//! Engine caches built on [`stencil_cache::SingleFlightCache`]

pub mod resources;
pub mod templates;

pub use resources::ResourceCache;
pub use templates::TemplateCache;
