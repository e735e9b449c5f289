//! # Process Phase
//!
//! Turns template sources into a resolved dependency graph of
//! [`TemplateModel`]s.
//!
//! Each template moves through [`ResolutionState`]: `Unresolved` until first
//! referenced, `Resolving` while it sits on the traversal stack, `Resolved`
//! once every dependency is resolved, `Error` when loading, parsing or
//! resolution fails.
//!
//! The traversal is an explicit depth-first walk over an arena of slots keyed
//! by canonical path. Re-requesting a path that is still `Resolving` is a
//! cycle; the error carries the stack from the repeated template to the
//! requester, so `index.gtmpl -> foo.gtmpl -> index.gtmpl` reports
//! `["index.gtmpl", "index.gtmpl->foo.gtmpl"]`. Dependencies are visited in
//! document order, which keeps the reported chain deterministic.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;

use sha2::{Digest, Sha256};
use tracing::debug;

use super::ast::{Node, Position, TemplateAst};
use super::dialect::{Dialect, DialectRegistry};
use super::error::TemplateError;
use super::path::TemplatePath;
use super::render::expressions;
use super::source::{TemplateRepository, TemplateSource};
use super::tags::{TagHandler, TagRegistry};

/// A loaded, parsed template whose dependencies are resolved
#[derive(Debug, Clone)]
pub struct TemplateModel {
    path: TemplatePath,
    dialect: String,
    target_extension: String,
    ast: TemplateAst,
    last_modified: SystemTime,
    version: u64,
    hash: String,
    dependencies: Vec<TemplatePath>,
}

impl TemplateModel {
    #[must_use]
    pub fn path(&self) -> &TemplatePath {
        &self.path
    }

    /// Name of the dialect that parsed the source
    #[must_use]
    pub fn dialect(&self) -> &str {
        &self.dialect
    }

    #[must_use]
    pub fn target_extension(&self) -> &str {
        &self.target_extension
    }

    /// AST with include parameters rewritten to canonical paths
    #[must_use]
    pub fn ast(&self) -> &TemplateAst {
        &self.ast
    }

    #[must_use]
    pub fn last_modified(&self) -> SystemTime {
        self.last_modified
    }

    /// Starts at 1, incremented each time a changed source is reprocessed
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// First 16 hex chars of the SHA-256 of the source
    #[must_use]
    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// Direct dependencies in document order
    #[must_use]
    pub fn dependencies(&self) -> &[TemplatePath] {
        &self.dependencies
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionState {
    Unresolved,
    Resolving,
    Resolved,
    Error,
}

/// Compile-time collaborator of the process phase
pub trait ProcessContext {
    /// Canonical path of an existing template, `None` when nothing is there
    fn resolve_template(&self, path: &TemplatePath) -> Option<TemplatePath>;

    fn load(&self, path: &TemplatePath) -> Result<TemplateSource, TemplateError>;

    fn resolve_tag_handler(&self, name: &str) -> Option<Arc<dyn TagHandler>>;

    fn dialect_for(&self, path: &TemplatePath) -> Option<Arc<dyn Dialect>>;

    /// Model from an earlier pass, used for versioning
    fn previous(&self, _path: &TemplatePath) -> Option<Arc<TemplateModel>> {
        None
    }

    /// Model known to be current; its subtree is not processed again
    fn resolved(&self, _path: &TemplatePath) -> Option<Arc<TemplateModel>> {
        None
    }
}

/// Outcome of resolving one root template
#[derive(Debug, Clone)]
pub struct ProcessResult {
    pub root: Arc<TemplateModel>,
    /// Models built by this pass, dependencies before dependents
    pub models: Vec<Arc<TemplateModel>>,
}

struct Slot {
    path: TemplatePath,
    state: ResolutionState,
    model: Option<Arc<TemplateModel>>,
}

struct Frame {
    slot: usize,
    pending: TemplateModel,
    next: usize,
}

pub struct ProcessPhase<'c, C: ProcessContext + ?Sized> {
    context: &'c C,
}

pub(crate) fn content_hash(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    digest.iter().take(8).map(|b| format!("{b:02x}")).collect()
}

impl<'c, C: ProcessContext + ?Sized> ProcessPhase<'c, C> {
    pub fn new(context: &'c C) -> Self {
        Self { context }
    }

    /// Resolve `root` and everything it depends on.
    ///
    /// # Errors
    ///
    /// The first structural error met: cycle, unknown tag, unresolved
    /// include, syntax or read failure.
    pub fn resolve(&self, root: &TemplatePath) -> Result<ProcessResult, TemplateError> {
        if let Some(model) = self.context.resolved(root) {
            return Ok(ProcessResult {
                root: model,
                models: Vec::new(),
            });
        }
        let mut slots: Vec<Slot> = Vec::new();
        let mut index: HashMap<TemplatePath, usize> = HashMap::new();
        let mut stack: Vec<Frame> = Vec::new();
        let mut built: Vec<Arc<TemplateModel>> = Vec::new();

        let first = Self::slot(&mut slots, &mut index, root);
        let frame = self.enter(&mut slots, first)?;
        stack.push(frame);

        loop {
            let Some(top) = stack.last_mut() else {
                break;
            };
            if let Some(dependency) = top.pending.dependencies.get(top.next).cloned() {
                top.next += 1;
                let requester = top.slot;
                let slot = Self::slot(&mut slots, &mut index, &dependency);
                match slots[slot].state {
                    ResolutionState::Resolved => {}
                    ResolutionState::Resolving => {
                        let chain: Vec<TemplatePath> = stack
                            .iter()
                            .skip_while(|f| f.slot != slot)
                            .map(|f| slots[f.slot].path.clone())
                            .collect();
                        slots[requester].state = ResolutionState::Error;
                        return Err(TemplateError::Cycle {
                            path: dependency,
                            chain,
                        });
                    }
                    ResolutionState::Unresolved | ResolutionState::Error => {
                        if let Some(model) = self.context.resolved(&dependency) {
                            slots[slot].state = ResolutionState::Resolved;
                            slots[slot].model = Some(model);
                            continue;
                        }
                        let frame = self.enter(&mut slots, slot)?;
                        stack.push(frame);
                    }
                }
            } else if let Some(done) = stack.pop() {
                let model = Arc::new(done.pending);
                debug!(
                    template = %model.path,
                    version = model.version,
                    dependencies = model.dependencies.len(),
                    "Template resolved"
                );
                slots[done.slot].state = ResolutionState::Resolved;
                slots[done.slot].model = Some(Arc::clone(&model));
                built.push(model);
            }
        }

        let root_model = slots[first]
            .model
            .clone()
            .ok_or_else(|| TemplateError::NotResolved {
                path: root.to_string(),
                from: None,
            })?;
        Ok(ProcessResult {
            root: root_model,
            models: built,
        })
    }

    fn slot(
        slots: &mut Vec<Slot>,
        index: &mut HashMap<TemplatePath, usize>,
        path: &TemplatePath,
    ) -> usize {
        *index.entry(path.clone()).or_insert_with(|| {
            slots.push(Slot {
                path: path.clone(),
                state: ResolutionState::Unresolved,
                model: None,
            });
            slots.len() - 1
        })
    }

    fn enter(&self, slots: &mut [Slot], slot: usize) -> Result<Frame, TemplateError> {
        slots[slot].state = ResolutionState::Resolving;
        match self.prepare(&slots[slot].path) {
            Ok(pending) => Ok(Frame {
                slot,
                pending,
                next: 0,
            }),
            Err(e) => {
                slots[slot].state = ResolutionState::Error;
                Err(e)
            }
        }
    }

    /// Load, parse and process the tags of one template
    fn prepare(&self, path: &TemplatePath) -> Result<TemplateModel, TemplateError> {
        let dialect = self
            .context
            .dialect_for(path)
            .ok_or_else(|| TemplateError::IllegalPath {
                path: path.to_string(),
                reason: "no dialect for this extension".to_string(),
            })?;
        let source = self.context.load(path)?;
        let hash = content_hash(&source.content);
        let previous = self.context.previous(path);

        if let Some(prev) = &previous {
            if prev.last_modified == source.last_modified && prev.hash == hash {
                debug!(template = %path, version = prev.version, "Template unchanged");
                return Ok(TemplateModel::clone(prev));
            }
        }
        let version = previous.as_ref().map_or(1, |p| p.version + 1);

        let mut ast = dialect.parse(&source.content).map_err(|e| TemplateError::Syntax {
            template: path.clone(),
            position: e.position,
            message: e.message,
        })?;
        let dependencies = self.process_tags(path, &mut ast)?;
        validate_expressions(path, &ast)?;

        Ok(TemplateModel {
            path: path.clone(),
            dialect: dialect.name().to_string(),
            target_extension: dialect.target_extension().to_string(),
            ast,
            last_modified: source.last_modified,
            version,
            hash,
            dependencies,
        })
    }

    fn process_tags(
        &self,
        path: &TemplatePath,
        ast: &mut TemplateAst,
    ) -> Result<Vec<TemplatePath>, TemplateError> {
        let mut dependencies: Vec<TemplatePath> = Vec::new();
        ast.visit_tags_mut(|tag| -> Result<(), TemplateError> {
            let handler = self
                .context
                .resolve_tag_handler(&tag.name)
                .ok_or_else(|| TemplateError::UnknownTag {
                    name: tag.name.clone(),
                    template: path.clone(),
                    position: tag.position,
                })?;
            for include in handler.process(path, tag)? {
                let target = path.resolve(&include.path)?;
                let resolved = self.context.resolve_template(&target).ok_or_else(|| {
                    TemplateError::NotResolved {
                        path: target.to_string(),
                        from: Some(path.clone()),
                    }
                })?;
                if !include.param.is_empty() {
                    tag.params.insert(include.param, resolved.to_string());
                }
                if !dependencies.contains(&resolved) {
                    dependencies.push(resolved);
                }
            }
            Ok(())
        })?;
        Ok(dependencies)
    }
}

fn validate_expression(
    path: &TemplatePath,
    source: &str,
    position: Position,
) -> Result<(), TemplateError> {
    expressions()
        .compile_expression(source)
        .map(|_| ())
        .map_err(|e| TemplateError::Syntax {
            template: path.clone(),
            position,
            message: format!("invalid expression '{source}': {e}"),
        })
}

fn validate_expressions(path: &TemplatePath, ast: &TemplateAst) -> Result<(), TemplateError> {
    for node in ast.walk() {
        match node {
            Node::Expr {
                source, position, ..
            } => validate_expression(path, source, *position)?,
            Node::Url { args, position, .. } => {
                for (_, expr) in args {
                    validate_expression(path, expr, *position)?;
                }
            }
            Node::Tag(tag) => {
                for value in tag.params.values() {
                    if let Some(expr) = value.strip_prefix("${").and_then(|v| v.strip_suffix('}')) {
                        validate_expression(path, expr.trim(), tag.position)?;
                    }
                }
            }
            Node::Text { .. } => {}
        }
    }
    Ok(())
}

/// Process context over a repository and fixed tag/dialect tables
pub struct SimpleProcessContext<'a> {
    repository: &'a dyn TemplateRepository,
    tags: &'a TagRegistry,
    dialects: &'a DialectRegistry,
}

impl<'a> SimpleProcessContext<'a> {
    pub fn new(
        repository: &'a dyn TemplateRepository,
        tags: &'a TagRegistry,
        dialects: &'a DialectRegistry,
    ) -> Self {
        Self {
            repository,
            tags,
            dialects,
        }
    }
}

impl ProcessContext for SimpleProcessContext<'_> {
    fn resolve_template(&self, path: &TemplatePath) -> Option<TemplatePath> {
        self.repository.exists(path).then(|| path.clone())
    }

    fn load(&self, path: &TemplatePath) -> Result<TemplateSource, TemplateError> {
        self.repository.load(path)
    }

    fn resolve_tag_handler(&self, name: &str) -> Option<Arc<dyn TagHandler>> {
        self.tags.resolve(name)
    }

    fn dialect_for(&self, path: &TemplatePath) -> Option<Arc<dyn Dialect>> {
        self.dialects.for_path(path)
    }
}
