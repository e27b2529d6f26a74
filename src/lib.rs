//! Vellum - a page template engine.
//!
//! Template sets are compiled concurrently into a shared [`Registry`];
//! [`Renderer::exec`] injects the per-request [`CommonContext`], renders into a
//! buffer, and flushes a complete response or nothing at all.

pub mod asset;
pub mod cli;
pub mod config;
pub mod context;
pub mod http;
pub mod logger;
pub mod page;
pub mod render;
pub mod serve;
pub mod template;
pub mod watch;

pub use asset::{AssetError, AssetSource, DirSource, MemorySource};
pub use context::{CommonContext, ContextBuilder};
pub use http::{Headers, Request};
pub use page::PageData;
pub use render::{RenderError, Renderer, ResponseSink};
pub use template::{CompileError, Registry, TemplateGroup, TemplateSet};
