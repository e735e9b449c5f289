//! # Application Configuration
//!
//! [`AppConfig`] is read from a YAML file and then overridden by
//! environment variables:
//!
//! ```yaml
//! run_mode: dev            # dev | prod | live
//! templates_dir: templates
//! output_dir: target/phasekit
//! request_encoding: UTF-8  # UTF-8 | ISO-8859-1
//! tag_packages: [layout]
//! verbose_errors: true     # defaults from run_mode
//! watch: true
//! ```
//!
//! ## Environment Variables
//!
//! - `PHASEKIT_RUN_MODE` overrides `run_mode`
//! - `PHASEKIT_TEMPLATES_DIR` overrides `templates_dir`
//! - `PHASEKIT_REQUEST_ENCODING` overrides `request_encoding`
//!
//! ## Run modes
//!
//! `dev` and `live` re-check template sources on every resolution and
//! render faults verbosely. `prod` resolves each template once and keeps
//! fault detail away from clients.

use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Deserializer};
use thiserror::Error;
use tracing::{debug, info};

use crate::io::Charset;
use crate::template::{DialectRegistry, FileSystemRepository, TagRegistry, TemplateCache};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unknown tag package '{0}'")]
    UnknownTagPackage(String),
    #[error("Failed to read configuration {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid configuration: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid value '{value}' for {key}")]
    InvalidValue { key: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    Dev,
    #[default]
    Prod,
    Live,
}

impl RunMode {
    /// Template sources are re-checked on every resolution
    #[must_use]
    pub fn is_dynamic(self) -> bool {
        matches!(self, RunMode::Dev | RunMode::Live)
    }

    /// Whether faults are rendered with their cause chain by default
    #[must_use]
    pub fn verbose_default(self) -> bool {
        self.is_dynamic()
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunMode::Dev => "dev",
            RunMode::Prod => "prod",
            RunMode::Live => "live",
        })
    }
}

impl FromStr for RunMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dev" => Ok(RunMode::Dev),
            "prod" => Ok(RunMode::Prod),
            "live" => Ok(RunMode::Live),
            _ => Err(ConfigError::InvalidValue {
                key: "run_mode",
                value: s.to_string(),
            }),
        }
    }
}

fn deserialize_charset<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Charset, D::Error> {
    let name = String::deserialize(deserializer)?;
    name.parse().map_err(serde::de::Error::custom)
}

fn default_request_encoding() -> Charset {
    Charset::Iso8859_1
}

fn default_templates_dir() -> PathBuf {
    PathBuf::from("templates")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("target/phasekit")
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub run_mode: RunMode,
    pub templates_dir: PathBuf,
    /// Where `phasekit compile` writes generated template programs
    pub output_dir: PathBuf,
    /// Encoding for bodies that do not set `ENCODING`
    #[serde(deserialize_with = "deserialize_charset")]
    pub request_encoding: Charset,
    /// External tag packages to enable, by name
    pub tag_packages: Vec<String>,
    pub verbose_errors: Option<bool>,
    /// Invalidate cached templates when their sources change
    pub watch: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            run_mode: RunMode::default(),
            templates_dir: default_templates_dir(),
            output_dir: default_output_dir(),
            request_encoding: default_request_encoding(),
            tag_packages: Vec::new(),
            verbose_errors: None,
            watch: false,
        }
    }
}

impl AppConfig {
    /// # Errors
    ///
    /// [`ConfigError::Parse`] for malformed YAML or unknown keys.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Read `path` and apply environment overrides.
    ///
    /// # Errors
    ///
    /// Unreadable files, malformed YAML and invalid override values.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let yaml = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_yaml_str(&yaml)?;
        config.apply_env()?;
        info!(
            config = %path.display(),
            run_mode = %config.run_mode,
            templates_dir = %config.templates_dir.display(),
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Apply `PHASEKIT_*` overrides.
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidValue`] for an unparseable override.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| env::var(key).ok())
    }

    fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(mode) = lookup("PHASEKIT_RUN_MODE") {
            self.run_mode = mode.parse()?;
            debug!(run_mode = %self.run_mode, "Run mode from environment");
        }
        if let Some(dir) = lookup("PHASEKIT_TEMPLATES_DIR") {
            self.templates_dir = PathBuf::from(dir);
        }
        if let Some(encoding) = lookup("PHASEKIT_REQUEST_ENCODING") {
            self.request_encoding =
                encoding
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue {
                        key: "request_encoding",
                        value: encoding.clone(),
                    })?;
        }
        Ok(())
    }

    /// Verbose fault rendering, explicit or derived from the run mode
    #[must_use]
    pub fn verbose(&self) -> bool {
        self.verbose_errors
            .unwrap_or_else(|| self.run_mode.verbose_default())
    }

    /// Cache over `templates_dir`, re-checking sources in dynamic run modes
    #[must_use]
    pub fn template_cache(
        &self,
        tags: Arc<TagRegistry>,
        dialects: Arc<DialectRegistry>,
    ) -> TemplateCache {
        TemplateCache::new(
            Arc::new(FileSystemRepository::new(&self.templates_dir)),
            tags,
            dialects,
            self.run_mode.is_dynamic(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn empty_document_is_default() {
        let config = AppConfig::from_yaml_str("").unwrap();
        assert_eq!(config.run_mode, RunMode::Prod);
        assert_eq!(config.request_encoding, Charset::Iso8859_1);
        assert_eq!(config.templates_dir, PathBuf::from("templates"));
        assert!(!config.verbose());
    }

    #[test]
    fn yaml_fields_parse() {
        let config = AppConfig::from_yaml_str(
            "run_mode: live\nrequest_encoding: UTF-8\ntag_packages: [layout]\nwatch: true\n",
        )
        .unwrap();
        assert_eq!(config.run_mode, RunMode::Live);
        assert!(config.run_mode.is_dynamic());
        assert_eq!(config.request_encoding, Charset::Utf8);
        assert_eq!(config.tag_packages, vec!["layout".to_string()]);
        assert!(config.watch);
        assert!(config.verbose());
    }

    #[test]
    fn template_cache_follows_run_mode_and_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.gtmpl"), "hi").unwrap();
        let mut config = AppConfig {
            templates_dir: dir.path().to_path_buf(),
            ..AppConfig::default()
        };
        let tags = Arc::new(TagRegistry::builtin());
        let dialects = Arc::new(DialectRegistry::builtin());
        let cache = config.template_cache(Arc::clone(&tags), Arc::clone(&dialects));
        assert!(!cache.is_dynamic());
        assert!(cache.template("a.gtmpl").is_ok());

        config.run_mode = RunMode::Dev;
        assert!(config.template_cache(tags, dialects).is_dynamic());
    }

    #[test]
    fn explicit_verbosity_wins() {
        let config = AppConfig::from_yaml_str("run_mode: dev\nverbose_errors: false\n").unwrap();
        assert!(!config.verbose());
    }

    #[test]
    fn unknown_keys_and_charsets_are_rejected() {
        assert!(matches!(
            AppConfig::from_yaml_str("colour: blue\n"),
            Err(ConfigError::Parse(_))
        ));
        assert!(AppConfig::from_yaml_str("request_encoding: EBCDIC\n").is_err());
    }

    #[test]
    fn overrides_replace_file_values() {
        let vars: HashMap<&str, &str> = [
            ("PHASEKIT_RUN_MODE", "dev"),
            ("PHASEKIT_TEMPLATES_DIR", "/srv/tmpl"),
            ("PHASEKIT_REQUEST_ENCODING", "utf8"),
        ]
        .into_iter()
        .collect();
        let mut config = AppConfig::default();
        config
            .apply_overrides(|key| vars.get(key).map(ToString::to_string))
            .unwrap();
        assert_eq!(config.run_mode, RunMode::Dev);
        assert_eq!(config.templates_dir, PathBuf::from("/srv/tmpl"));
        assert_eq!(config.request_encoding, Charset::Utf8);

        let err = config
            .apply_overrides(|key| (key == "PHASEKIT_RUN_MODE").then(|| "staging".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "run_mode", .. }));
    }
}
