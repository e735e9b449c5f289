//! # Emit Phase
//!
//! Lowers resolved [`TemplateModel`]s into serializable [`CompiledTemplate`]
//! programs and writes them as generated resources through an [`EmitContext`].
//!
//! The emission context supplies exactly two capabilities:
//!
//! - `resolve_tag_handler(name)` - the handler for a tag, or `None`
//! - `create_resource(path, content)` - write a generated file; fails if the
//!   path already exists or the write fails
//!
//! Resources are written with the dialect's target extension, so
//! `pages/index.gtmpl` produces `pages/index.tmpl.json`.

use std::collections::{BTreeMap, HashSet};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::ast::{Node, Position};
use super::error::{EmitError, TemplateError};
use super::path::TemplatePath;
use super::process::TemplateModel;
use super::tags::{TagHandler, TagRegistry};

/// One step of a compiled template program
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Instruction {
    Text {
        text: String,
    },
    Expr {
        source: String,
        escaped: bool,
        position: Position,
    },
    Url {
        target: String,
        args: Vec<(String, String)>,
        position: Position,
    },
    Tag {
        name: String,
        params: BTreeMap<String, String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        body: Option<Vec<Instruction>>,
        position: Position,
    },
}

/// Executable form of a template, as written to the generated resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledTemplate {
    pub path: TemplatePath,
    pub dialect: String,
    pub version: u64,
    pub hash: String,
    pub dependencies: Vec<TemplatePath>,
    pub program: Vec<Instruction>,
}

/// Compile-time collaborator of the emit phase
pub trait EmitContext {
    fn resolve_tag_handler(&self, name: &str) -> Option<Arc<dyn TagHandler>>;

    fn create_resource(&mut self, path: &TemplatePath, content: &str) -> Result<(), EmitError>;
}

/// Walks template models and produces their programs
pub struct EmitPhase<'c, C: EmitContext + ?Sized> {
    context: &'c mut C,
}

impl<'c, C: EmitContext + ?Sized> EmitPhase<'c, C> {
    pub fn new(context: &'c mut C) -> Self {
        Self { context }
    }

    /// Lower a model without writing anything
    pub fn compile(&self, model: &TemplateModel) -> Result<CompiledTemplate, TemplateError> {
        let program = self.lower(model, &model.ast().nodes)?;
        Ok(CompiledTemplate {
            path: model.path().clone(),
            dialect: model.dialect().to_string(),
            version: model.version(),
            hash: model.hash().to_string(),
            dependencies: model.dependencies().to_vec(),
            program,
        })
    }

    /// Lower a model and write its program as a generated resource
    pub fn emit(&mut self, model: &TemplateModel) -> Result<CompiledTemplate, TemplateError> {
        let compiled = self.compile(model)?;
        let target = model.path().with_extension(model.target_extension());
        let content = serde_json::to_string_pretty(&compiled)
            .map_err(|e| EmitError::Serialize(e.to_string()))?;
        self.context.create_resource(&target, &content)?;
        debug!(template = %model.path(), resource = %target, "Emitted template program");
        Ok(compiled)
    }

    /// Emit every model once, in the given order
    pub fn emit_all<'m>(
        &mut self,
        models: impl IntoIterator<Item = &'m Arc<TemplateModel>>,
    ) -> Result<Vec<CompiledTemplate>, TemplateError> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for model in models {
            if seen.insert(model.path().clone()) {
                out.push(self.emit(model)?);
            }
        }
        info!(count = out.len(), "Emitted template programs");
        Ok(out)
    }

    fn lower(&self, model: &TemplateModel, nodes: &[Node]) -> Result<Vec<Instruction>, TemplateError> {
        let mut program = Vec::with_capacity(nodes.len());
        for node in nodes {
            program.push(match node {
                Node::Text { text, .. } => Instruction::Text { text: text.clone() },
                Node::Expr {
                    source,
                    escaped,
                    position,
                } => Instruction::Expr {
                    source: source.clone(),
                    escaped: *escaped,
                    position: *position,
                },
                Node::Url {
                    target,
                    args,
                    position,
                } => Instruction::Url {
                    target: target.clone(),
                    args: args.clone(),
                    position: *position,
                },
                Node::Tag(tag) => {
                    if self.context.resolve_tag_handler(&tag.name).is_none() {
                        return Err(TemplateError::UnknownTag {
                            name: tag.name.clone(),
                            template: model.path().clone(),
                            position: tag.position,
                        });
                    }
                    let body = match &tag.body {
                        Some(body) => Some(self.lower(model, body)?),
                        None => None,
                    };
                    Instruction::Tag {
                        name: tag.name.clone(),
                        params: tag.params.clone(),
                        body,
                        position: tag.position,
                    }
                }
            });
        }
        Ok(program)
    }
}

/// Writes generated resources under a directory
pub struct DirectoryEmitContext {
    root: PathBuf,
    tags: Arc<TagRegistry>,
}

impl DirectoryEmitContext {
    pub fn new(root: impl Into<PathBuf>, tags: Arc<TagRegistry>) -> Self {
        Self {
            root: root.into(),
            tags,
        }
    }
}

impl EmitContext for DirectoryEmitContext {
    fn resolve_tag_handler(&self, name: &str) -> Option<Arc<dyn TagHandler>> {
        self.tags.resolve(name)
    }

    fn create_resource(&mut self, path: &TemplatePath, content: &str) -> Result<(), EmitError> {
        let file = path.to_fs_path(&self.root);
        let io_error = |e: std::io::Error| EmitError::Io {
            path: file.display().to_string(),
            message: e.to_string(),
        };
        if let Some(parent) = file.parent() {
            fs::create_dir_all(parent).map_err(io_error)?;
        }
        let mut handle = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&file)
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::AlreadyExists {
                    EmitError::AlreadyExists(file.display().to_string())
                } else {
                    io_error(e)
                }
            })?;
        handle.write_all(content.as_bytes()).map_err(io_error)?;
        Ok(())
    }
}

/// Keeps generated resources in memory
pub struct MemoryEmitContext {
    tags: Arc<TagRegistry>,
    resources: BTreeMap<TemplatePath, String>,
}

impl MemoryEmitContext {
    #[must_use]
    pub fn new(tags: Arc<TagRegistry>) -> Self {
        Self {
            tags,
            resources: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn resources(&self) -> &BTreeMap<TemplatePath, String> {
        &self.resources
    }
}

impl EmitContext for MemoryEmitContext {
    fn resolve_tag_handler(&self, name: &str) -> Option<Arc<dyn TagHandler>> {
        self.tags.resolve(name)
    }

    fn create_resource(&mut self, path: &TemplatePath, content: &str) -> Result<(), EmitError> {
        if self.resources.contains_key(path) {
            return Err(EmitError::AlreadyExists(path.to_string()));
        }
        self.resources.insert(path.clone(), content.to_string());
        Ok(())
    }
}
