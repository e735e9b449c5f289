//! # Template Module
//!
//! Template compilation and rendering.
//!
//! ## Pipeline
//!
//! 1. **Parse**: a [`Dialect`] chosen by source extension turns text into a
//!    [`TemplateAst`].
//! 2. **Process**: [`ProcessPhase`] resolves `include`/`decorate` references
//!    and tag handlers into a dependency graph of [`TemplateModel`]s. Cycles,
//!    unknown tags and unresolved includes are reported here as
//!    [`TemplateError`]s with a stable code and argument list.
//! 3. **Emit**: [`EmitPhase`] lowers models into [`CompiledTemplate`]
//!    programs and writes them through an [`EmitContext`].
//! 4. **Render**: [`render()`] interprets a program against a JSON context.
//!
//! [`TemplateCache`] runs steps 1-3 on demand, once per path, and serves
//! programs to the renderer. [`Template`] is the handle controllers use.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use phasekit::template::{
//!     DialectRegistry, MemoryRepository, TagRegistry, TemplateCache, TemplateRepository,
//! };
//!
//! let repo = Arc::new(MemoryRepository::new());
//! repo.insert("layout.gtmpl", "<main>#{insert/}</main>").unwrap();
//! repo.insert(
//!     "hello.gtmpl",
//!     "#{decorate path=layout.gtmpl/}#{title value=Greeting/}Hello ${name}",
//! )
//! .unwrap();
//!
//! let cache = TemplateCache::new(
//!     repo as Arc<dyn TemplateRepository>,
//!     Arc::new(TagRegistry::builtin()),
//!     Arc::new(DialectRegistry::builtin()),
//!     false,
//! );
//! let template = cache.template("hello.gtmpl").unwrap();
//! let rendered = template.render(&serde_json::json!({"name": "<Ada>"})).unwrap();
//! assert_eq!(rendered.output, "<main>Hello &lt;Ada&gt;</main>");
//! assert_eq!(rendered.title.as_deref(), Some("Greeting"));
//! ```

pub mod ast;
pub mod cache;
pub mod dialect;
pub mod emit;
pub mod error;
pub mod parser;
pub mod path;
pub mod process;
pub mod render;
pub mod source;
pub mod tags;

use serde::Serialize;

use crate::io::Charset;
use crate::response::{Content, Response};

pub use ast::{Node, Position, TagNode, TemplateAst};
pub use cache::{Resolved, TemplateCache};
pub use dialect::{Dialect, DialectRegistry, GtmplDialect, TextDialect};
pub use emit::{
    CompiledTemplate, DirectoryEmitContext, EmitContext, EmitPhase, Instruction, MemoryEmitContext,
};
pub use error::{EmitError, RenderError, TemplateError};
pub use path::TemplatePath;
pub use process::{
    ProcessContext, ProcessPhase, ProcessResult, ResolutionState, SimpleProcessContext,
    TemplateModel,
};
pub use render::{render, RenderContext, Rendered, TagCall, TemplateLookup};
pub use source::{FileSystemRepository, MemoryRepository, TemplateRepository, TemplateSource};
pub use tags::{Include, TagHandler, TagPackage, TagRegistry, TemplateTag, TemplateTagPackage};

impl TemplateCache {
    /// Handle to the template at `path`, compiling it now.
    ///
    /// # Errors
    ///
    /// Illegal paths and the structural errors of the template.
    pub fn template(&self, path: &str) -> Result<Template, TemplateError> {
        let path = TemplatePath::parse(path)?;
        self.resolve(&path)?;
        Ok(Template {
            path,
            cache: self.clone(),
        })
    }
}

/// Compiled template bound to the cache that serves it
#[derive(Debug, Clone)]
pub struct Template {
    path: TemplatePath,
    cache: TemplateCache,
}

impl Template {
    #[must_use]
    pub fn path(&self) -> &TemplatePath {
        &self.path
    }

    /// Version of the template as currently resolved
    pub fn version(&self) -> Result<u64, TemplateError> {
        Ok(self.cache.resolve(&self.path)?.model.version())
    }

    pub fn render<T: Serialize + ?Sized>(&self, context: &T) -> Result<Rendered, RenderError> {
        let data =
            serde_json::to_value(context).map_err(|e| RenderError::Context(e.to_string()))?;
        render(&self.path, &data, &self.cache, self.cache.tags())
    }

    /// Rendered output as `200` HTML content
    pub fn ok<T: Serialize + ?Sized>(&self, context: &T) -> Result<Content, RenderError> {
        self.with_status(200, context)
    }

    /// Rendered output as `404` HTML content
    pub fn not_found<T: Serialize + ?Sized>(&self, context: &T) -> Result<Content, RenderError> {
        self.with_status(404, context)
    }

    /// Rendered output as HTML content, carrying the rendered title
    pub fn with_status<T: Serialize + ?Sized>(
        &self,
        code: u16,
        context: &T,
    ) -> Result<Content, RenderError> {
        let rendered = self.render(context)?;
        let content = Response::content(code, rendered.output)
            .with_mime_type("text/html")
            .with_charset(Charset::Utf8);
        Ok(match rendered.title {
            Some(title) => content.with_title(title),
            None => content,
        })
    }
}
