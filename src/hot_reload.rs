//! # Hot Reload Module
//!
//! Watches a template directory and invalidates cached templates whose
//! sources change, so the next render recompiles them together with every
//! template that includes or decorates them.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use phasekit::hot_reload::watch_templates;
//!
//! let watcher = watch_templates("templates", cache.clone())?;
//! // Keep `watcher` alive for as long as changes should be picked up
//! ```
//!
//! [`watch_configured`] does the same for `AppConfig::templates_dir`, and
//! only when `AppConfig::watch` is set.
//!
//! A dynamic-mode [`TemplateCache`] already notices changed timestamps on
//! its own; the watcher makes a static cache follow edits too, and catches
//! deletions between renders.
//!
//! Hot reload is meant for development. Errors in a changed template are
//! reported on the next resolution; the watcher itself only logs.

use crate::config::AppConfig;
use crate::template::{TemplateCache, TemplatePath};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Template paths touched by `event`, relative to `root`
fn changed_templates(root: &Path, event: &Event) -> Vec<TemplatePath> {
    if !matches!(
        event.kind,
        EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_)
    ) {
        return Vec::new();
    }
    event
        .paths
        .iter()
        .filter_map(|file| TemplatePath::from_fs_path(root, file))
        .collect()
}

/// Watch `dir` recursively, invalidating changed sources in `cache`.
///
/// # Errors
///
/// The watcher cannot be created or `dir` cannot be watched.
pub fn watch_templates<P: AsRef<Path>>(
    dir: P,
    cache: TemplateCache,
) -> notify::Result<RecommendedWatcher> {
    let dir = dir.as_ref();
    let root: PathBuf = dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf());
    let watch_root = root.clone();

    let mut watcher = RecommendedWatcher::new(
        move |res: Result<Event, notify::Error>| match res {
            Ok(event) => {
                for path in changed_templates(&watch_root, &event) {
                    debug!(template = %path, kind = ?event.kind, "hot-reload: source changed");
                    let invalidated = cache.invalidate(&path);
                    info!(
                        template = %path,
                        invalidated = invalidated.len(),
                        "hot-reload: template invalidated"
                    );
                }
            }
            Err(e) => warn!(error = %e, "hot-reload: watch error"),
        },
        Config::default(),
    )?;

    watcher.watch(&root, RecursiveMode::Recursive)?;
    info!(dir = %root.display(), "hot-reload: watching templates");
    Ok(watcher)
}

/// Watch `config.templates_dir` when `config.watch` is set.
///
/// # Errors
///
/// As [`watch_templates`].
pub fn watch_configured(
    config: &AppConfig,
    cache: &TemplateCache,
) -> notify::Result<Option<RecommendedWatcher>> {
    if !config.watch {
        debug!("hot-reload: disabled by configuration");
        return Ok(None);
    }
    watch_templates(&config.templates_dir, cache.clone()).map(Some)
}
