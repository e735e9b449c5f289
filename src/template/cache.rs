//! # Template Cache
//!
//! Process-wide store of resolved and compiled templates.
//!
//! ## Concurrency
//!
//! - Lookups take a read lock on the unit table; a missing unit is inserted
//!   under the write lock with a double-check.
//! - Each unit holds a [`OnceCell`]. The first caller compiles, concurrent
//!   callers for the same path block on the cell and observe the same result,
//!   so a path is compiled at most once per unit.
//! - Compilations run one at a time under a single compile lock. A caller
//!   that waited for the lock finds the dependencies compiled by the previous
//!   holder and reuses them, so a shared include is loaded and compiled once
//!   even when its dependents are requested concurrently.
//! - Invalidation and [`TemplateCache::clear`] take the same lock. An edit
//!   reported while a compilation is in flight drops that compilation's
//!   results once it finishes, and the next resolution sees the new source.
//!
//! ## Versioning
//!
//! Models are kept across invalidation. Reprocessing a path whose source
//! timestamp changed yields version `previous + 1`; an untouched source keeps
//! its version.
//!
//! ## Dynamic mode
//!
//! In dynamic mode every resolution first checks the source timestamps of the
//! template and its transitive dependencies. A stale source invalidates itself
//! and every template depending on it. Failed units are not kept, so a fixed
//! source compiles on the next request. Outside dynamic mode the first outcome
//! of a path, success or failure, is final.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::dialect::{Dialect, DialectRegistry};
use super::emit::{CompiledTemplate, EmitPhase, MemoryEmitContext};
use super::error::{RenderError, TemplateError};
use super::path::TemplatePath;
use super::process::{ProcessContext, ProcessPhase, TemplateModel};
use super::render::TemplateLookup;
use super::source::{TemplateRepository, TemplateSource};
use super::tags::{TagHandler, TagRegistry};

/// A resolved template together with its program
#[derive(Debug, Clone)]
pub struct Resolved {
    pub model: Arc<TemplateModel>,
    pub program: Arc<CompiledTemplate>,
}

#[derive(Default)]
struct Unit {
    cell: OnceCell<Result<Resolved, TemplateError>>,
}

struct CacheInner {
    repository: Arc<dyn TemplateRepository>,
    tags: Arc<TagRegistry>,
    dialects: Arc<DialectRegistry>,
    dynamic: bool,
    units: RwLock<HashMap<TemplatePath, Arc<Unit>>>,
    models: RwLock<HashMap<TemplatePath, Arc<TemplateModel>>>,
    compiled: RwLock<HashMap<TemplatePath, Resolved>>,
    dependents: RwLock<HashMap<TemplatePath, HashSet<TemplatePath>>>,
    compilations: AtomicU64,
    compile_lock: Mutex<()>,
}

/// Shared handle to the template cache; clones share state
#[derive(Clone)]
pub struct TemplateCache {
    inner: Arc<CacheInner>,
}

impl TemplateCache {
    pub fn new(
        repository: Arc<dyn TemplateRepository>,
        tags: Arc<TagRegistry>,
        dialects: Arc<DialectRegistry>,
        dynamic: bool,
    ) -> Self {
        info!(dynamic, "Template cache created");
        Self {
            inner: Arc::new(CacheInner {
                repository,
                tags,
                dialects,
                dynamic,
                units: RwLock::new(HashMap::new()),
                models: RwLock::new(HashMap::new()),
                compiled: RwLock::new(HashMap::new()),
                dependents: RwLock::new(HashMap::new()),
                compilations: AtomicU64::new(0),
                compile_lock: Mutex::new(()),
            }),
        }
    }

    #[must_use]
    pub fn is_dynamic(&self) -> bool {
        self.inner.dynamic
    }

    #[must_use]
    pub fn repository(&self) -> &Arc<dyn TemplateRepository> {
        &self.inner.repository
    }

    #[must_use]
    pub fn tags(&self) -> &Arc<TagRegistry> {
        &self.inner.tags
    }

    /// Resolve and compile `path`, or return the cached result.
    ///
    /// # Errors
    ///
    /// The structural error of the template or one of its dependencies.
    pub fn resolve(&self, path: &TemplatePath) -> Result<Resolved, TemplateError> {
        if self.inner.dynamic {
            for stale in self.inner.stale_sources(path) {
                self.invalidate(&stale);
            }
        }
        let unit = self.unit(path);
        let outcome = unit.cell.get_or_init(|| self.compile(path));
        match outcome {
            Ok(resolved) => Ok(resolved.clone()),
            Err(e) => {
                if self.inner.dynamic {
                    let mut units = self.inner.units.write();
                    if units.get(path).is_some_and(|u| Arc::ptr_eq(u, &unit)) {
                        units.remove(path);
                    }
                }
                Err(e.clone())
            }
        }
    }

    fn unit(&self, path: &TemplatePath) -> Arc<Unit> {
        {
            let units = self.inner.units.read();
            if let Some(unit) = units.get(path) {
                debug!(template = %path, "Template cache hit");
                return Arc::clone(unit);
            }
        }
        let mut units = self.inner.units.write();
        // another caller may have inserted it while we waited
        if let Some(unit) = units.get(path) {
            return Arc::clone(unit);
        }
        debug!(template = %path, "Template cache miss");
        let unit = Arc::new(Unit::default());
        units.insert(path.clone(), Arc::clone(&unit));
        unit
    }

    fn compile(&self, path: &TemplatePath) -> Result<Resolved, TemplateError> {
        let _guard = self.inner.compile_lock.lock();
        let context = CacheContext { inner: &self.inner };
        let result = ProcessPhase::new(&context).resolve(path).map_err(|e| {
            warn!(template = %path, code = e.code(), error = %e, "Template compilation failed");
            e
        })?;

        let mut emit_context = MemoryEmitContext::new(Arc::clone(&self.inner.tags));
        let emit = EmitPhase::new(&mut emit_context);
        for model in &result.models {
            let program = Arc::new(emit.compile(model)?);
            self.inner.store(Resolved {
                model: Arc::clone(model),
                program,
            });
            self.inner.compilations.fetch_add(1, Ordering::Relaxed);
            info!(
                template = %model.path(),
                version = model.version(),
                hash = model.hash(),
                "Template compiled"
            );
        }

        self.inner
            .compiled
            .read()
            .get(path)
            .cloned()
            .ok_or_else(|| TemplateError::NotResolved {
                path: path.to_string(),
                from: None,
            })
    }

    /// Drop `path` and every template depending on it, directly or not.
    ///
    /// Returns the invalidated paths, `path` first.
    pub fn invalidate(&self, path: &TemplatePath) -> Vec<TemplatePath> {
        let _guard = self.inner.compile_lock.lock();
        let affected = {
            let dependents = self.inner.dependents.read();
            let mut affected = vec![path.clone()];
            let mut seen: HashSet<TemplatePath> = HashSet::from([path.clone()]);
            let mut next = 0;
            while let Some(current) = affected.get(next).cloned() {
                next += 1;
                if let Some(parents) = dependents.get(&current) {
                    let mut parents: Vec<_> = parents.iter().collect();
                    parents.sort();
                    for parent in parents {
                        if seen.insert(parent.clone()) {
                            affected.push(parent.clone());
                        }
                    }
                }
            }
            affected
        };
        {
            let mut units = self.inner.units.write();
            let mut compiled = self.inner.compiled.write();
            for p in &affected {
                units.remove(p);
                compiled.remove(p);
            }
        }
        info!(template = %path, invalidated = affected.len(), "Template invalidated");
        affected
    }

    /// Forget everything, including versions
    pub fn clear(&self) {
        let _guard = self.inner.compile_lock.lock();
        self.inner.units.write().clear();
        self.inner.compiled.write().clear();
        self.inner.models.write().clear();
        self.inner.dependents.write().clear();
        info!("Template cache cleared");
    }

    /// Current version of every processed template
    #[must_use]
    pub fn versions(&self) -> BTreeMap<TemplatePath, u64> {
        self.inner
            .models
            .read()
            .iter()
            .map(|(path, model)| (path.clone(), model.version()))
            .collect()
    }

    /// Number of templates processed and compiled so far
    #[must_use]
    pub fn compilation_count(&self) -> u64 {
        self.inner.compilations.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for TemplateCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateCache")
            .field("dynamic", &self.inner.dynamic)
            .field("compiled", &self.inner.compiled.read().len())
            .finish()
    }
}

impl TemplateLookup for TemplateCache {
    fn compiled(&self, path: &TemplatePath) -> Result<Arc<CompiledTemplate>, RenderError> {
        Ok(self.resolve(path)?.program)
    }
}

impl CacheInner {
    fn store(&self, resolved: Resolved) {
        let path = resolved.model.path().clone();
        {
            let mut dependents = self.dependents.write();
            for dependency in resolved.model.dependencies() {
                dependents
                    .entry(dependency.clone())
                    .or_default()
                    .insert(path.clone());
            }
        }
        self.models
            .write()
            .insert(path.clone(), Arc::clone(&resolved.model));
        self.compiled.write().insert(path, resolved);
    }

    /// Known templates reachable from `path` whose source timestamp changed
    fn stale_sources(&self, path: &TemplatePath) -> Vec<TemplatePath> {
        let models = self.models.read();
        let mut pending = vec![path.clone()];
        let mut seen = HashSet::new();
        let mut stale = Vec::new();
        while let Some(current) = pending.pop() {
            if !seen.insert(current.clone()) {
                continue;
            }
            let Some(model) = models.get(&current) else {
                continue;
            };
            if self.repository.last_modified(&current) != Some(model.last_modified()) {
                debug!(template = %current, "Template source changed");
                stale.push(current.clone());
            }
            pending.extend(model.dependencies().iter().cloned());
        }
        stale
    }
}

struct CacheContext<'a> {
    inner: &'a CacheInner,
}

impl ProcessContext for CacheContext<'_> {
    fn resolve_template(&self, path: &TemplatePath) -> Option<TemplatePath> {
        self.inner.repository.exists(path).then(|| path.clone())
    }

    fn load(&self, path: &TemplatePath) -> Result<TemplateSource, TemplateError> {
        self.inner.repository.load(path)
    }

    fn resolve_tag_handler(&self, name: &str) -> Option<Arc<dyn TagHandler>> {
        self.inner.tags.resolve(name)
    }

    fn dialect_for(&self, path: &TemplatePath) -> Option<Arc<dyn Dialect>> {
        self.inner.dialects.for_path(path)
    }

    fn previous(&self, path: &TemplatePath) -> Option<Arc<TemplateModel>> {
        self.inner.models.read().get(path).cloned()
    }

    fn resolved(&self, path: &TemplatePath) -> Option<Arc<TemplateModel>> {
        let model = self.inner.compiled.read().get(path).map(|r| Arc::clone(&r.model))?;
        if self.inner.dynamic && !self.inner.stale_sources(path).is_empty() {
            return None;
        }
        Some(model)
    }
}
