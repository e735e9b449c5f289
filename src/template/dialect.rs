use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::warn;

use super::ast::{Node, Position, TemplateAst};
use super::parser::{self, SyntaxError};
use super::path::TemplatePath;

/// A template syntax bound to a source file extension
pub trait Dialect: Send + Sync {
    fn name(&self) -> &str;

    /// Extension of source files, without the dot
    fn source_extension(&self) -> &str;

    /// Extension of the generated program resource
    fn target_extension(&self) -> &str;

    fn parse(&self, source: &str) -> Result<TemplateAst, SyntaxError>;
}

/// Full template syntax: expressions, tags and controller URLs
#[derive(Debug, Default, Clone, Copy)]
pub struct GtmplDialect;

impl Dialect for GtmplDialect {
    fn name(&self) -> &str {
        "gtmpl"
    }

    fn source_extension(&self) -> &str {
        "gtmpl"
    }

    fn target_extension(&self) -> &str {
        "tmpl.json"
    }

    fn parse(&self, source: &str) -> Result<TemplateAst, SyntaxError> {
        parser::parse(source)
    }
}

/// Literal text, no markup recognised
#[derive(Debug, Default, Clone, Copy)]
pub struct TextDialect;

impl Dialect for TextDialect {
    fn name(&self) -> &str {
        "txt"
    }

    fn source_extension(&self) -> &str {
        "txt"
    }

    fn target_extension(&self) -> &str {
        "txt.json"
    }

    fn parse(&self, source: &str) -> Result<TemplateAst, SyntaxError> {
        let nodes = if source.is_empty() {
            Vec::new()
        } else {
            vec![Node::Text {
                text: source.to_string(),
                position: Position::new(1, 1),
            }]
        };
        Ok(TemplateAst { nodes })
    }
}

/// Source extension → dialect table
#[derive(Clone, Default)]
pub struct DialectRegistry {
    dialects: BTreeMap<String, Arc<dyn Dialect>>,
}

impl DialectRegistry {
    /// Empty table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Table with the `gtmpl` and `txt` dialects
    #[must_use]
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(GtmplDialect));
        registry.register(Arc::new(TextDialect));
        registry
    }

    pub fn register(&mut self, dialect: Arc<dyn Dialect>) {
        let extension = dialect.source_extension().to_string();
        if let Some(previous) = self.dialects.insert(extension.clone(), dialect) {
            warn!(
                extension = %extension,
                replaced = previous.name(),
                "Replacing template dialect"
            );
        }
    }

    #[must_use]
    pub fn for_extension(&self, extension: &str) -> Option<Arc<dyn Dialect>> {
        self.dialects.get(extension).cloned()
    }

    /// Dialect handling `path`, by its extension
    #[must_use]
    pub fn for_path(&self, path: &TemplatePath) -> Option<Arc<dyn Dialect>> {
        path.extension().and_then(|ext| self.for_extension(ext))
    }

    pub fn extensions(&self) -> impl Iterator<Item = &str> + '_ {
        self.dialects.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for DialectRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.dialects.keys()).finish()
    }
}
