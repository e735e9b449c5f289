//! # Tags
//!
//! Tag handlers are named units of template logic invoked with `#{name ..}`.
//! They take part in both phases of a template's life:
//!
//! - **process**: [`TagHandler::process`] validates parameters and declares the
//!   templates the tag depends on. The process phase resolves those, detects
//!   cycles and rewrites the parameter to the canonical path.
//! - **render**: [`TagHandler::render`] produces output through the
//!   [`RenderContext`].
//!
//! The table of handlers is explicit. [`TagRegistry::builtin`] holds `decorate`,
//! `insert`, `include`, `title` and `param`; reusable [`TagPackage`]s are
//! enabled by name at startup with [`TagRegistry::with_packages`].

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value as JsonValue};
use tracing::{debug, warn};

use super::ast::TagNode;
use super::error::{RenderError, TemplateError};
use super::path::TemplatePath;
use super::render::{RenderContext, TagCall};
use crate::config::ConfigError;

/// A template this tag depends on.
///
/// `param` names the tag parameter holding the reference; the process phase
/// rewrites it to the canonical path. An empty `param` declares a fixed
/// dependency with nothing to rewrite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Include {
    pub param: String,
    pub path: String,
}

impl Include {
    #[must_use]
    pub fn param(param: &str, path: &str) -> Self {
        Self {
            param: param.to_string(),
            path: path.to_string(),
        }
    }

    #[must_use]
    pub fn fixed(path: &TemplatePath) -> Self {
        Self {
            param: String::new(),
            path: format!("/{path}"),
        }
    }
}

pub trait TagHandler: Send + Sync {
    fn name(&self) -> &str;

    /// Validate the tag at compile time and list the templates it includes
    fn process(&self, _template: &TemplatePath, _tag: &TagNode) -> Result<Vec<Include>, TemplateError> {
        Ok(Vec::new())
    }

    fn render(&self, call: &TagCall<'_>, ctx: &mut RenderContext<'_>) -> Result<(), RenderError>;
}

fn required_param<'t>(
    template: &TemplatePath,
    tag: &'t TagNode,
    parameter: &str,
) -> Result<&'t str, TemplateError> {
    tag.params
        .get(parameter)
        .map(String::as_str)
        .ok_or_else(|| TemplateError::MissingTagParameter {
            tag: tag.name.clone(),
            parameter: parameter.to_string(),
            template: template.clone(),
            position: tag.position,
        })
}

fn is_expression(value: &str) -> bool {
    value.starts_with("${")
}

/// Path parameter of `include`/`decorate`, resolved at compile time.
///
/// Only literal paths are accepted so the whole dependency graph is known,
/// and checked for cycles, before anything renders.
fn path_include(template: &TemplatePath, tag: &TagNode) -> Result<Vec<Include>, TemplateError> {
    let path = required_param(template, tag, "path")?;
    if is_expression(path) {
        return Err(TemplateError::IllegalPath {
            path: path.to_string(),
            reason: format!("#{{{}}} needs a literal path in {template}", tag.name),
        });
    }
    Ok(vec![Include::param("path", path)])
}

fn render_path(ctx: &RenderContext<'_>, call: &TagCall<'_>) -> Result<TemplatePath, RenderError> {
    let raw = ctx
        .param(call, "path")?
        .ok_or_else(|| RenderError::MissingParameter("path".to_string()))?;
    Ok(TemplatePath::parse(&raw)?)
}

/// `#{decorate path=layout.gtmpl/}`: wrap the current template in a layout
#[derive(Debug, Default, Clone, Copy)]
pub struct DecorateTag;

impl TagHandler for DecorateTag {
    fn name(&self) -> &str {
        "decorate"
    }

    fn process(&self, template: &TemplatePath, tag: &TagNode) -> Result<Vec<Include>, TemplateError> {
        path_include(template, tag)
    }

    fn render(&self, call: &TagCall<'_>, ctx: &mut RenderContext<'_>) -> Result<(), RenderError> {
        let layout = render_path(ctx, call)?;
        ctx.set_decorator(layout);
        Ok(())
    }
}

/// `#{insert/}`: slot receiving the decorated content
#[derive(Debug, Default, Clone, Copy)]
pub struct InsertTag;

impl TagHandler for InsertTag {
    fn name(&self) -> &str {
        "insert"
    }

    fn render(&self, _call: &TagCall<'_>, ctx: &mut RenderContext<'_>) -> Result<(), RenderError> {
        let content = ctx.current_insert().unwrap_or_default().to_string();
        ctx.write(&content);
        Ok(())
    }
}

/// `#{include path=part.gtmpl/}`
#[derive(Debug, Default, Clone, Copy)]
pub struct IncludeTag;

impl TagHandler for IncludeTag {
    fn name(&self) -> &str {
        "include"
    }

    fn process(&self, template: &TemplatePath, tag: &TagNode) -> Result<Vec<Include>, TemplateError> {
        path_include(template, tag)
    }

    fn render(&self, call: &TagCall<'_>, ctx: &mut RenderContext<'_>) -> Result<(), RenderError> {
        let path = render_path(ctx, call)?;
        let output = ctx.render_template(&path)?;
        ctx.write(&output);
        Ok(())
    }
}

/// `#{title value=.../}` or `#{title}...#{/title}`
#[derive(Debug, Default, Clone, Copy)]
pub struct TitleTag;

impl TagHandler for TitleTag {
    fn name(&self) -> &str {
        "title"
    }

    fn process(&self, template: &TemplatePath, tag: &TagNode) -> Result<Vec<Include>, TemplateError> {
        if tag.body.is_none() {
            required_param(template, tag, "value")?;
        }
        Ok(Vec::new())
    }

    fn render(&self, call: &TagCall<'_>, ctx: &mut RenderContext<'_>) -> Result<(), RenderError> {
        let title = match (ctx.param(call, "value")?, call.body) {
            (Some(value), _) => value,
            (None, Some(body)) => ctx.render_body(body)?,
            (None, None) => return Err(RenderError::MissingParameter("value".to_string())),
        };
        ctx.set_title(title);
        Ok(())
    }
}

/// `#{param name=user required/}`: declare a template parameter
#[derive(Debug, Default, Clone, Copy)]
pub struct ParamTag;

impl TagHandler for ParamTag {
    fn name(&self) -> &str {
        "param"
    }

    fn process(&self, template: &TemplatePath, tag: &TagNode) -> Result<Vec<Include>, TemplateError> {
        required_param(template, tag, "name")?;
        Ok(Vec::new())
    }

    fn render(&self, call: &TagCall<'_>, ctx: &mut RenderContext<'_>) -> Result<(), RenderError> {
        let name = call
            .raw_param("name")
            .ok_or_else(|| RenderError::MissingParameter("name".to_string()))?;
        if call.raw_param("required") == Some("true") && !ctx.is_defined(name) {
            return Err(RenderError::MissingParameter(name.to_string()));
        }
        Ok(())
    }
}

/// Simple tag backed by a template.
///
/// Tag parameters become variables of the tag template and the tag body is
/// available through `#{insert/}`.
#[derive(Debug, Clone)]
pub struct TemplateTag {
    name: String,
    path: TemplatePath,
}

impl TemplateTag {
    #[must_use]
    pub fn new(name: impl Into<String>, path: TemplatePath) -> Self {
        Self {
            name: name.into(),
            path,
        }
    }

    #[must_use]
    pub fn path(&self) -> &TemplatePath {
        &self.path
    }
}

impl TagHandler for TemplateTag {
    fn name(&self) -> &str {
        &self.name
    }

    fn process(&self, _template: &TemplatePath, _tag: &TagNode) -> Result<Vec<Include>, TemplateError> {
        Ok(vec![Include::fixed(&self.path)])
    }

    fn render(&self, call: &TagCall<'_>, ctx: &mut RenderContext<'_>) -> Result<(), RenderError> {
        let mut variables = Map::new();
        for name in call.params.keys() {
            if let Some(value) = ctx.param(call, name)? {
                variables.insert(name.clone(), JsonValue::String(value));
            }
        }
        let body = match call.body {
            Some(body) => ctx.render_body(body)?,
            None => String::new(),
        };
        let path = self.path.clone();
        let output = ctx.with_variables(variables, |ctx| {
            ctx.with_insert(body, |ctx| ctx.render_template(&path))
        })?;
        ctx.write(&output);
        Ok(())
    }
}

/// Named, reusable set of tags
pub trait TagPackage: Send + Sync {
    fn name(&self) -> &str;

    fn tags(&self) -> Vec<Arc<dyn TagHandler>>;
}

/// Package of template-backed tags
#[derive(Debug, Clone, Default)]
pub struct TemplateTagPackage {
    name: String,
    tags: Vec<TemplateTag>,
}

impl TemplateTagPackage {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tags: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_tag(mut self, name: impl Into<String>, path: TemplatePath) -> Self {
        self.tags.push(TemplateTag::new(name, path));
        self
    }
}

impl TagPackage for TemplateTagPackage {
    fn name(&self) -> &str {
        &self.name
    }

    fn tags(&self) -> Vec<Arc<dyn TagHandler>> {
        self.tags
            .iter()
            .map(|t| Arc::new(t.clone()) as Arc<dyn TagHandler>)
            .collect()
    }
}

/// Tag name → handler table
#[derive(Clone, Default)]
pub struct TagRegistry {
    handlers: HashMap<String, Arc<dyn TagHandler>>,
}

impl TagRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(DecorateTag));
        registry.register(Arc::new(InsertTag));
        registry.register(Arc::new(IncludeTag));
        registry.register(Arc::new(TitleTag));
        registry.register(Arc::new(ParamTag));
        registry
    }

    /// Built-in tags plus the tags of every enabled package.
    ///
    /// # Errors
    ///
    /// [`ConfigError::UnknownTagPackage`] when an enabled name matches no
    /// available package.
    pub fn with_packages(
        enabled: &[String],
        available: &[Arc<dyn TagPackage>],
    ) -> Result<Self, ConfigError> {
        let mut registry = Self::builtin();
        for name in enabled {
            let package = available
                .iter()
                .find(|p| p.name() == name)
                .ok_or_else(|| ConfigError::UnknownTagPackage(name.clone()))?;
            let tags = package.tags();
            debug!(package = %name, tags = tags.len(), "Enabling tag package");
            for tag in tags {
                registry.register(tag);
            }
        }
        Ok(registry)
    }

    pub fn register(&mut self, handler: Arc<dyn TagHandler>) {
        let name = handler.name().to_string();
        if self.handlers.insert(name.clone(), handler).is_some() {
            warn!(tag = %name, "Replacing tag handler");
        }
    }

    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<Arc<dyn TagHandler>> {
        self.handlers.get(name).cloned()
    }

    /// Registered names, sorted
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for TagRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
