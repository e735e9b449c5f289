use thiserror::Error;

use super::ast::Position;
use super::path::TemplatePath;

/// Compile-time diagnostic.
///
/// Each variant has a stable [`code`](TemplateError::code) and an ordered
/// [`arguments`](TemplateError::arguments) list that tooling and tests assert on.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TemplateError {
    /// A template under resolution was requested again.
    ///
    /// `chain` is the resolution stack from the repeated template to the one
    /// that requested it.
    #[error("Template cycle: {}", join_chain(.chain))]
    Cycle {
        path: TemplatePath,
        chain: Vec<TemplatePath>,
    },
    #[error("Unknown tag '{name}' in {template} at {position}")]
    UnknownTag {
        name: String,
        template: TemplatePath,
        position: Position,
    },
    /// No source exists for a referenced path
    #[error("Template {path} could not be resolved{}", .from.as_ref().map(|f| format!(" (referenced from {f})")).unwrap_or_default())]
    NotResolved {
        path: String,
        from: Option<TemplatePath>,
    },
    #[error("Syntax error in {template} at {position}: {message}")]
    Syntax {
        template: TemplatePath,
        position: Position,
        message: String,
    },
    #[error("Could not read template {template}: {message}")]
    Io {
        template: TemplatePath,
        message: String,
    },
    #[error("Illegal template path '{path}': {reason}")]
    IllegalPath { path: String, reason: String },
    #[error("Tag '{tag}' in {template} at {position} is missing parameter '{parameter}'")]
    MissingTagParameter {
        tag: String,
        parameter: String,
        template: TemplatePath,
        position: Position,
    },
    #[error(transparent)]
    Emit(#[from] EmitError),
}

fn join_chain(chain: &[TemplatePath]) -> String {
    chain
        .iter()
        .map(TemplatePath::as_str)
        .collect::<Vec<_>>()
        .join("->")
}

impl TemplateError {
    /// Stable diagnostic code
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            TemplateError::Cycle { .. } => "TEMPLATE_CYCLE",
            TemplateError::UnknownTag { .. } => "UNKNOWN_TAG",
            TemplateError::NotResolved { .. } => "TEMPLATE_NOT_RESOLVED",
            TemplateError::Syntax { .. } => "TEMPLATE_SYNTAX_ERROR",
            TemplateError::Io { .. } => "TEMPLATE_IO_ERROR",
            TemplateError::IllegalPath { .. } => "TEMPLATE_ILLEGAL_PATH",
            TemplateError::MissingTagParameter { .. } => "TAG_MISSING_PARAMETER",
            TemplateError::Emit(_) => "TEMPLATE_EMIT_ERROR",
        }
    }

    /// Ordered diagnostic arguments
    #[must_use]
    pub fn arguments(&self) -> Vec<String> {
        match self {
            TemplateError::Cycle { path, chain } => vec![path.to_string(), join_chain(chain)],
            TemplateError::UnknownTag { name, .. } => vec![name.clone()],
            TemplateError::NotResolved { path, .. } => vec![path.clone()],
            TemplateError::Syntax {
                template,
                position,
                message,
            } => vec![template.to_string(), position.to_string(), message.clone()],
            TemplateError::Io { template, message } => vec![template.to_string(), message.clone()],
            TemplateError::IllegalPath { path, reason } => vec![path.clone(), reason.clone()],
            TemplateError::MissingTagParameter { tag, parameter, .. } => {
                vec![tag.clone(), parameter.clone()]
            }
            TemplateError::Emit(e) => vec![e.to_string()],
        }
    }
}

/// Failure writing generated resources
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EmitError {
    #[error("Resource {0} already exists")]
    AlreadyExists(String),
    #[error("Could not write resource {path}: {message}")]
    Io { path: String, message: String },
    #[error("Could not serialize template program: {0}")]
    Serialize(String),
}

/// Failure while rendering a compiled template.
///
/// Structural problems are caught at compile time; these are data problems.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Expression '{source_text}' at {position} failed: {message}")]
    Expression {
        source_text: String,
        position: Position,
        message: String,
    },
    #[error("Missing template parameter '{0}'")]
    MissingParameter(String),
    #[error("Compiled template {0} is not available")]
    TemplateUnavailable(String),
    #[error("Tag '{0}' is not registered")]
    UnknownTag(String),
    #[error("Template nesting exceeds {0} levels")]
    RecursionLimit(usize),
    #[error("Render context is not serializable: {0}")]
    Context(String),
    #[error(transparent)]
    Compile(#[from] TemplateError),
}
