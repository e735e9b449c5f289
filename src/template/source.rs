//! Template sources: where template text and its modification time come from.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;

use super::error::TemplateError;
use super::path::TemplatePath;

/// Loaded template text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateSource {
    pub content: String,
    pub last_modified: SystemTime,
}

pub trait TemplateRepository: Send + Sync {
    /// Whether a source exists at `path`
    fn exists(&self, path: &TemplatePath) -> bool;

    fn load(&self, path: &TemplatePath) -> Result<TemplateSource, TemplateError>;

    /// Modification time without loading the content
    fn last_modified(&self, path: &TemplatePath) -> Option<SystemTime>;

    /// Every source path, sorted
    fn list(&self) -> Vec<TemplatePath>;
}

/// Sources under a directory
#[derive(Debug, Clone)]
pub struct FileSystemRepository {
    root: PathBuf,
}

impl FileSystemRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_files(&path, out);
        } else {
            out.push(path);
        }
    }
}

impl TemplateRepository for FileSystemRepository {
    fn exists(&self, path: &TemplatePath) -> bool {
        path.to_fs_path(&self.root).is_file()
    }

    fn load(&self, path: &TemplatePath) -> Result<TemplateSource, TemplateError> {
        let file = path.to_fs_path(&self.root);
        let io_error = |e: std::io::Error| TemplateError::Io {
            template: path.clone(),
            message: e.to_string(),
        };
        let content = fs::read_to_string(&file).map_err(io_error)?;
        let last_modified = fs::metadata(&file)
            .and_then(|m| m.modified())
            .map_err(io_error)?;
        Ok(TemplateSource {
            content,
            last_modified,
        })
    }

    fn last_modified(&self, path: &TemplatePath) -> Option<SystemTime> {
        fs::metadata(path.to_fs_path(&self.root))
            .and_then(|m| m.modified())
            .ok()
    }

    fn list(&self) -> Vec<TemplatePath> {
        let mut files = Vec::new();
        collect_files(&self.root, &mut files);
        let mut paths: Vec<TemplatePath> = files
            .iter()
            .filter_map(|f| TemplatePath::from_fs_path(&self.root, f))
            .collect();
        paths.sort();
        paths
    }
}

/// In-memory sources with a logical clock for modification times
#[derive(Debug, Default)]
pub struct MemoryRepository {
    sources: RwLock<BTreeMap<TemplatePath, TemplateSource>>,
    clock: AtomicU64,
}

impl MemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn tick(&self) -> SystemTime {
        let tick = self.clock.fetch_add(1, Ordering::SeqCst) + 1;
        UNIX_EPOCH + Duration::from_secs(tick)
    }

    /// Add or replace a source, advancing its modification time
    pub fn insert(&self, path: &str, content: impl Into<String>) -> Result<TemplatePath, TemplateError> {
        let path = TemplatePath::parse(path)?;
        let source = TemplateSource {
            content: content.into(),
            last_modified: self.tick(),
        };
        self.sources.write().insert(path.clone(), source);
        Ok(path)
    }

    /// Advance the modification time without changing the content
    pub fn touch(&self, path: &TemplatePath) -> bool {
        let now = self.tick();
        match self.sources.write().get_mut(path) {
            Some(source) => {
                source.last_modified = now;
                true
            }
            None => false,
        }
    }

    pub fn remove(&self, path: &TemplatePath) -> bool {
        self.sources.write().remove(path).is_some()
    }
}

impl TemplateRepository for MemoryRepository {
    fn exists(&self, path: &TemplatePath) -> bool {
        self.sources.read().contains_key(path)
    }

    fn load(&self, path: &TemplatePath) -> Result<TemplateSource, TemplateError> {
        self.sources
            .read()
            .get(path)
            .cloned()
            .ok_or_else(|| TemplateError::NotResolved {
                path: path.to_string(),
                from: None,
            })
    }

    fn last_modified(&self, path: &TemplatePath) -> Option<SystemTime> {
        self.sources.read().get(path).map(|s| s.last_modified)
    }

    fn list(&self) -> Vec<TemplatePath> {
        self.sources.read().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn touch_advances_modification_time() {
        let repo = MemoryRepository::new();
        let path = repo.insert("a.gtmpl", "hello").unwrap();
        let before = repo.last_modified(&path).unwrap();
        assert!(repo.touch(&path));
        assert!(repo.last_modified(&path).unwrap() > before);
        assert_eq!(repo.load(&path).unwrap().content, "hello");
    }

    #[test]
    fn filesystem_lists_nested_sources() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("pages")).unwrap();
        fs::write(dir.path().join("pages/index.gtmpl"), "x").unwrap();
        fs::write(dir.path().join("layout.gtmpl"), "y").unwrap();

        let repo = FileSystemRepository::new(dir.path());
        let listed: Vec<String> = repo.list().iter().map(ToString::to_string).collect();
        assert_eq!(listed, vec!["layout.gtmpl", "pages/index.gtmpl"]);
        assert!(repo.exists(&TemplatePath::parse("pages/index.gtmpl").unwrap()));
        assert_eq!(
            repo.load(&TemplatePath::parse("layout.gtmpl").unwrap())
                .unwrap()
                .content,
            "y"
        );
    }
}
