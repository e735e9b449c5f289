//! # Render
//!
//! Interpreter for compiled template programs.
//!
//! Expressions are evaluated with `minijinja` expression semantics against a
//! JSON context. `${..}` output is HTML-escaped, `<%= .. %>` output is not.
//! Undefined and `none` values render as the empty string.

use std::collections::BTreeMap;
use std::sync::Arc;

use minijinja::Environment;
use once_cell::sync::Lazy;
use serde_json::{Map, Value as JsonValue};

use super::ast::Position;
use super::emit::{CompiledTemplate, Instruction};
use super::error::RenderError;
use super::path::TemplatePath;
use super::tags::TagRegistry;

/// Maximum nesting of included, decorating and tag templates
pub const MAX_RENDER_DEPTH: usize = 32;

static EXPRESSIONS: Lazy<Environment<'static>> = Lazy::new(Environment::new);

/// Shared expression environment, also used for compile-time validation
pub(crate) fn expressions() -> &'static Environment<'static> {
    &EXPRESSIONS
}

/// Source of compiled programs during rendering
pub trait TemplateLookup {
    fn compiled(&self, path: &TemplatePath) -> Result<Arc<CompiledTemplate>, RenderError>;
}

/// Render output
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Rendered {
    pub output: String,
    /// Set by the `title` tag
    pub title: Option<String>,
}

/// A tag occurrence as seen by its handler at render time
#[derive(Debug, Clone, Copy)]
pub struct TagCall<'p> {
    pub name: &'p str,
    pub params: &'p BTreeMap<String, String>,
    pub body: Option<&'p [Instruction]>,
    pub position: Position,
}

impl TagCall<'_> {
    #[must_use]
    pub fn raw_param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }
}

struct Scope {
    json: JsonValue,
    value: minijinja::Value,
}

impl Scope {
    fn new(json: JsonValue) -> Self {
        let value = minijinja::Value::from_serialize(&json);
        Self { json, value }
    }
}

/// Mutable state of one render pass
pub struct RenderContext<'a> {
    lookup: &'a dyn TemplateLookup,
    tags: &'a TagRegistry,
    scopes: Vec<Scope>,
    buffers: Vec<String>,
    inserts: Vec<String>,
    decorator: Option<TemplatePath>,
    title: Option<String>,
    depth: usize,
}

/// Render the template at `path` with `data` as expression context
pub fn render(
    path: &TemplatePath,
    data: &JsonValue,
    lookup: &dyn TemplateLookup,
    tags: &TagRegistry,
) -> Result<Rendered, RenderError> {
    let mut ctx = RenderContext {
        lookup,
        tags,
        scopes: vec![Scope::new(data.clone())],
        buffers: Vec::new(),
        inserts: Vec::new(),
        decorator: None,
        title: None,
        depth: 0,
    };
    let output = ctx.render_template(path)?;
    Ok(Rendered {
        output,
        title: ctx.title,
    })
}

fn display(value: &minijinja::Value) -> String {
    if value.is_undefined() || value.is_none() {
        String::new()
    } else {
        value.to_string()
    }
}

impl<'a> RenderContext<'a> {
    fn scope(&self) -> &minijinja::Value {
        // the root scope is pushed at construction and never popped
        static EMPTY: Lazy<minijinja::Value> = Lazy::new(minijinja::Value::default);
        self.scopes.last().map_or(&EMPTY, |s| &s.value)
    }

    /// Evaluate an expression against the current scope
    pub fn eval(&self, source: &str, position: Position) -> Result<minijinja::Value, RenderError> {
        let failed = |e: minijinja::Error| RenderError::Expression {
            source_text: source.to_string(),
            position,
            message: e.to_string(),
        };
        let expression = expressions().compile_expression(source).map_err(failed)?;
        expression.eval(self.scope()).map_err(failed)
    }

    /// Whether `name` is defined in the current scope
    #[must_use]
    pub fn is_defined(&self, name: &str) -> bool {
        self.eval(name, Position::default())
            .map(|v| !v.is_undefined() && !v.is_none())
            .unwrap_or(false)
    }

    /// Tag parameter value; `${expr}` values are evaluated
    pub fn param(&self, call: &TagCall<'_>, name: &str) -> Result<Option<String>, RenderError> {
        let Some(raw) = call.raw_param(name) else {
            return Ok(None);
        };
        match raw.strip_prefix("${").and_then(|r| r.strip_suffix('}')) {
            Some(expr) => Ok(Some(display(&self.eval(expr.trim(), call.position)?))),
            None => Ok(Some(raw.to_string())),
        }
    }

    pub fn write(&mut self, text: &str) {
        if let Some(buffer) = self.buffers.last_mut() {
            buffer.push_str(text);
        }
    }

    fn capture(
        &mut self,
        produce: impl FnOnce(&mut Self) -> Result<(), RenderError>,
    ) -> Result<String, RenderError> {
        self.buffers.push(String::new());
        let result = produce(self);
        let captured = self.buffers.pop().unwrap_or_default();
        result.map(|()| captured)
    }

    /// Render instructions into a string instead of the output
    pub fn render_body(&mut self, body: &[Instruction]) -> Result<String, RenderError> {
        self.capture(|ctx| ctx.execute(body))
    }

    /// Run `produce` with extra variables layered over the current scope
    pub fn with_variables<T>(
        &mut self,
        variables: Map<String, JsonValue>,
        produce: impl FnOnce(&mut Self) -> Result<T, RenderError>,
    ) -> Result<T, RenderError> {
        let mut merged = match self.scopes.last().map(|s| &s.json) {
            Some(JsonValue::Object(base)) => base.clone(),
            _ => Map::new(),
        };
        merged.extend(variables);
        self.scopes.push(Scope::new(JsonValue::Object(merged)));
        let result = produce(self);
        self.scopes.pop();
        result
    }

    /// Render another template, applying its decorators
    pub fn render_template(&mut self, path: &TemplatePath) -> Result<String, RenderError> {
        if self.depth >= MAX_RENDER_DEPTH {
            return Err(RenderError::RecursionLimit(MAX_RENDER_DEPTH));
        }
        self.depth += 1;
        let outer_decorator = self.decorator.take();
        let result = self.render_decorated(path);
        self.decorator = outer_decorator;
        self.depth -= 1;
        result
    }

    fn render_decorated(&mut self, path: &TemplatePath) -> Result<String, RenderError> {
        let compiled = self.lookup.compiled(path)?;
        let mut output = self.capture(|ctx| ctx.execute(&compiled.program))?;
        while let Some(layout) = self.decorator.take() {
            if self.depth >= MAX_RENDER_DEPTH {
                return Err(RenderError::RecursionLimit(MAX_RENDER_DEPTH));
            }
            let layout = self.lookup.compiled(&layout)?;
            self.inserts.push(output);
            let decorated = self.capture(|ctx| ctx.execute(&layout.program));
            self.inserts.pop();
            output = decorated?;
        }
        Ok(output)
    }

    /// Wrap the template being rendered inside `layout`
    pub fn set_decorator(&mut self, layout: TemplatePath) {
        self.decorator = Some(layout);
    }

    /// Content waiting to be inserted by the innermost decoration slot
    #[must_use]
    pub fn current_insert(&self) -> Option<&str> {
        self.inserts.last().map(String::as_str)
    }

    /// Make `content` the insertion content while `produce` runs
    pub fn with_insert<T>(
        &mut self,
        content: String,
        produce: impl FnOnce(&mut Self) -> Result<T, RenderError>,
    ) -> Result<T, RenderError> {
        self.inserts.push(content);
        let result = produce(self);
        self.inserts.pop();
        result
    }

    pub fn set_title(&mut self, title: String) {
        self.title = Some(title);
    }

    fn execute(&mut self, program: &[Instruction]) -> Result<(), RenderError> {
        for instruction in program {
            match instruction {
                Instruction::Text { text } => self.write(text),
                Instruction::Expr {
                    source,
                    escaped,
                    position,
                } => {
                    let value = display(&self.eval(source, *position)?);
                    if *escaped {
                        let escaped = html_escape::encode_safe(&value).into_owned();
                        self.write(&escaped);
                    } else {
                        self.write(&value);
                    }
                }
                Instruction::Url {
                    target,
                    args,
                    position,
                } => {
                    let mut query = url::form_urlencoded::Serializer::new(String::new());
                    query.append_pair("method", target);
                    for (name, expr) in args {
                        let value = display(&self.eval(expr, *position)?);
                        query.append_pair(name, &value);
                    }
                    let url = format!("?{}", query.finish());
                    let escaped = html_escape::encode_double_quoted_attribute(&url).into_owned();
                    self.write(&escaped);
                }
                Instruction::Tag {
                    name,
                    params,
                    body,
                    position,
                } => {
                    let handler = self
                        .tags
                        .resolve(name)
                        .ok_or_else(|| RenderError::UnknownTag(name.clone()))?;
                    let call = TagCall {
                        name,
                        params,
                        body: body.as_deref(),
                        position: *position,
                    };
                    handler.render(&call, self)?;
                }
            }
        }
        Ok(())
    }
}
