use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::error::TemplateError;

/// Canonical template path relative to the template root, e.g. `pages/index.gtmpl`.
///
/// Templates are keyed by this value: two spellings that normalize to the same
/// segments (`./a/../b.gtmpl` and `/b.gtmpl`) are the same template.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TemplatePath(Arc<str>);

impl TemplatePath {
    /// Normalize `raw`, resolving `.` and `..` segments.
    ///
    /// # Errors
    ///
    /// [`TemplateError::IllegalPath`] for empty paths, paths escaping the root,
    /// and paths with empty segments or backslashes.
    pub fn parse(raw: &str) -> Result<Self, TemplateError> {
        Self::normalize(raw, &[])
    }

    fn normalize(raw: &str, base: &[&str]) -> Result<Self, TemplateError> {
        let illegal = |reason: &str| TemplateError::IllegalPath {
            path: raw.to_string(),
            reason: reason.to_string(),
        };
        if raw.trim().is_empty() {
            return Err(illegal("empty path"));
        }
        if raw.contains('\\') {
            return Err(illegal("backslash in path"));
        }
        let mut segments: Vec<&str> = if raw.starts_with('/') {
            Vec::new()
        } else {
            base.to_vec()
        };
        for segment in raw.trim_start_matches('/').split('/') {
            match segment {
                "." => {}
                ".." => {
                    if segments.pop().is_none() {
                        return Err(illegal("path escapes the template root"));
                    }
                }
                "" => return Err(illegal("empty path segment")),
                s => segments.push(s),
            }
        }
        if segments.is_empty() {
            return Err(illegal("path names no template"));
        }
        Ok(Self(Arc::from(segments.join("/"))))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last segment
    #[must_use]
    pub fn name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// Extension of the last segment, without the dot
    #[must_use]
    pub fn extension(&self) -> Option<&str> {
        self.name().rsplit_once('.').map(|(_, ext)| ext)
    }

    /// Directory segments
    #[must_use]
    pub fn parent_segments(&self) -> Vec<&str> {
        let mut segments: Vec<&str> = self.0.split('/').collect();
        segments.pop();
        segments
    }

    /// Resolve `reference` the way an include inside this template does:
    /// absolute references start from the root, others from this template's directory.
    pub fn resolve(&self, reference: &str) -> Result<Self, TemplateError> {
        Self::normalize(reference, &self.parent_segments())
    }

    /// Same path with the last extension replaced
    #[must_use]
    pub fn with_extension(&self, extension: &str) -> Self {
        let stem = match self.0.rsplit_once('.') {
            Some((stem, ext)) if !ext.contains('/') => stem,
            _ => &self.0,
        };
        Self(Arc::from(format!("{stem}.{extension}")))
    }

    /// Location of this template under a filesystem root
    #[must_use]
    pub fn to_fs_path(&self, root: &Path) -> PathBuf {
        self.0.split('/').fold(root.to_path_buf(), |p, s| p.join(s))
    }

    /// Template path of a file under `root`, if it lies inside it
    #[must_use]
    pub fn from_fs_path(root: &Path, file: &Path) -> Option<Self> {
        let relative = file.strip_prefix(root).ok()?;
        let joined = relative
            .components()
            .map(|c| c.as_os_str().to_str())
            .collect::<Option<Vec<_>>>()?
            .join("/");
        Self::parse(&joined).ok()
    }
}

impl fmt::Display for TemplatePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for TemplatePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TemplatePath({})", self.0)
    }
}

impl Serialize for TemplatePath {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for TemplatePath {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_dot_segments() {
        let p = TemplatePath::parse("/pages/./admin/../index.gtmpl").unwrap();
        assert_eq!(p.as_str(), "pages/index.gtmpl");
        assert_eq!(p.name(), "index.gtmpl");
        assert_eq!(p.extension(), Some("gtmpl"));
    }

    #[test]
    fn rejects_escaping_paths() {
        assert!(TemplatePath::parse("../secret.gtmpl").is_err());
        assert!(TemplatePath::parse("").is_err());
        assert!(TemplatePath::parse("a//b.gtmpl").is_err());
    }

    #[test]
    fn resolves_relative_to_parent_directory() {
        let p = TemplatePath::parse("pages/index.gtmpl").unwrap();
        assert_eq!(p.resolve("layout.gtmpl").unwrap().as_str(), "pages/layout.gtmpl");
        assert_eq!(p.resolve("../shared/nav.gtmpl").unwrap().as_str(), "shared/nav.gtmpl");
        assert_eq!(p.resolve("/root.gtmpl").unwrap().as_str(), "root.gtmpl");
    }

    #[test]
    fn replaces_extension() {
        let p = TemplatePath::parse("a/index.gtmpl").unwrap();
        assert_eq!(p.with_extension("tmpl.json").as_str(), "a/index.tmpl.json");
    }
}
