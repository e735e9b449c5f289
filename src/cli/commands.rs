use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::template::{
    DialectRegistry, DirectoryEmitContext, EmitError, EmitPhase, FileSystemRepository, ProcessPhase,
    SimpleProcessContext, TagPackage, TagRegistry, TemplateError, TemplateModel,
    TemplatePath, TemplateRepository, TemplateTagPackage,
};

/// Name of the package holding tags declared with `--tag`
pub const LOCAL_TAG_PACKAGE: &str = "local";

/// Command-line interface for phasekit templates
#[derive(Parser, Debug)]
#[command(name = "phasekit")]
#[command(about = "phasekit template compiler and renderer", long_about = None)]
pub struct Cli {
    /// YAML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Template tag as NAME=PATH, rendered from the template at PATH
    #[arg(long = "tag", global = true, value_parser = parse_tag)]
    pub tags: Vec<(String, TemplatePath)>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check every template and write its compiled program
    Compile {
        /// Template source directory (default from configuration)
        #[arg(short, long)]
        templates: Option<PathBuf>,

        /// Output directory for compiled programs (default from configuration)
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Remove the output directory before writing
        #[arg(short, long, default_value_t = false)]
        force: bool,
    },
    /// Render one template to stdout
    Render {
        #[arg(long)]
        templates: Option<PathBuf>,

        /// Template path relative to the template directory
        #[arg(long)]
        template: String,

        /// JSON file holding the render context
        #[arg(long)]
        context: Option<PathBuf>,
    },
}

fn parse_tag(raw: &str) -> Result<(String, TemplatePath), String> {
    let (name, path) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=PATH, got '{raw}'"))?;
    if name.is_empty() {
        return Err(format!("empty tag name in '{raw}'"));
    }
    let path = TemplatePath::parse(path).map_err(|e| e.to_string())?;
    Ok((name.to_string(), path))
}

fn load_config(path: Option<&Path>) -> anyhow::Result<AppConfig> {
    match path {
        Some(path) => Ok(AppConfig::load(path)?),
        None => {
            let mut config = AppConfig::default();
            config.apply_env()?;
            Ok(config)
        }
    }
}

fn tag_registry(config: &AppConfig, tags: &[(String, TemplatePath)]) -> anyhow::Result<TagRegistry> {
    let mut enabled = config.tag_packages.clone();
    let mut available: Vec<Arc<dyn TagPackage>> = Vec::new();
    if !tags.is_empty() {
        let package = tags
            .iter()
            .fold(TemplateTagPackage::new(LOCAL_TAG_PACKAGE), |p, (name, path)| {
                p.with_tag(name.clone(), path.clone())
            });
        available.push(Arc::new(package));
        if !enabled.iter().any(|n| n == LOCAL_TAG_PACKAGE) {
            enabled.push(LOCAL_TAG_PACKAGE.to_string());
        }
    }
    Ok(TagRegistry::with_packages(&enabled, &available)?)
}

/// Outcome of a compile run
#[derive(Debug, Default)]
pub struct CompileReport {
    pub compiled: Vec<TemplatePath>,
    /// Distinct structural errors, in discovery order
    pub errors: Vec<TemplateError>,
}

/// Process every source with a known dialect, then emit each model once.
///
/// Nothing is written when any template fails or any target already exists.
pub fn compile_templates(
    repository: &dyn TemplateRepository,
    tags: &Arc<TagRegistry>,
    dialects: &DialectRegistry,
    out: &Path,
) -> CompileReport {
    let context = SimpleProcessContext::new(repository, tags, dialects);
    let phase = ProcessPhase::new(&context);
    let mut models: BTreeMap<TemplatePath, Arc<TemplateModel>> = BTreeMap::new();
    let mut seen = BTreeSet::new();
    let mut report = CompileReport::default();

    for path in repository.list() {
        if dialects.for_path(&path).is_none() {
            continue;
        }
        match phase.resolve(&path) {
            Ok(result) => {
                for model in result.models {
                    models.entry(model.path().clone()).or_insert(model);
                }
            }
            Err(e) => {
                if seen.insert((e.code(), e.arguments())) {
                    report.errors.push(e);
                }
            }
        }
    }
    if !report.errors.is_empty() {
        return report;
    }

    // every target is checked before any is written
    for model in models.values() {
        let target = model
            .path()
            .with_extension(model.target_extension())
            .to_fs_path(out);
        if target.exists() {
            report
                .errors
                .push(EmitError::AlreadyExists(target.display().to_string()).into());
        }
    }
    if !report.errors.is_empty() {
        return report;
    }

    let mut emit_context = DirectoryEmitContext::new(out, Arc::clone(tags));
    let mut emit = EmitPhase::new(&mut emit_context);
    match emit.emit_all(models.values()) {
        Ok(compiled) => report.compiled = compiled.into_iter().map(|c| c.path).collect(),
        Err(e) => report.errors.push(e),
    }
    report
}

/// Parse arguments from the process and run
pub fn run_cli() -> anyhow::Result<()> {
    run(Cli::parse())
}

pub fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(cli.config.as_deref())?;
    let tags = Arc::new(tag_registry(&config, &cli.tags)?);
    let dialects = Arc::new(DialectRegistry::builtin());

    match cli.command {
        Commands::Compile {
            templates,
            out,
            force,
        } => {
            let templates = templates.unwrap_or_else(|| config.templates_dir.clone());
            let out = out.unwrap_or_else(|| config.output_dir.clone());
            if force && out.exists() {
                warn!(out = %out.display(), "Removing previous output");
                std::fs::remove_dir_all(&out)
                    .with_context(|| format!("Failed to remove {}", out.display()))?;
            }
            let repository = FileSystemRepository::new(&templates);
            let report = compile_templates(&repository, &tags, &dialects, &out);
            for e in &report.errors {
                eprintln!("{}: {}", e.code(), e.arguments().join(", "));
            }
            if !report.errors.is_empty() {
                bail!("{} template error(s) in {}", report.errors.len(), templates.display());
            }
            info!(
                templates = %templates.display(),
                out = %out.display(),
                count = report.compiled.len(),
                "Templates compiled"
            );
            for path in &report.compiled {
                println!("{path}");
            }
            Ok(())
        }
        Commands::Render {
            templates,
            template,
            context,
        } => {
            let mut config = config;
            if let Some(templates) = templates {
                config.templates_dir = templates;
            }
            let data: serde_json::Value = match context {
                Some(file) => {
                    let raw = std::fs::read_to_string(&file)
                        .with_context(|| format!("Failed to read {}", file.display()))?;
                    serde_json::from_str(&raw)
                        .with_context(|| format!("Invalid JSON in {}", file.display()))?
                }
                None => serde_json::Value::Object(serde_json::Map::new()),
            };
            let cache = config.template_cache(tags, dialects);
            let template = cache.template(&template).map_err(|e| {
                anyhow::anyhow!("{}: {}", e.code(), e.arguments().join(", "))
            })?;
            let rendered = template.render(&data)?;
            if let Some(title) = &rendered.title {
                info!(template = %template.path(), title = %title, "Rendered");
            }
            print!("{}", rendered.output);
            Ok(())
        }
    }
}
