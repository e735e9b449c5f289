//! Unit tests for CLI commands

use std::fs;
use std::sync::Arc;

use crate::cli::{compile_templates, run, Cli, Commands, LOCAL_TAG_PACKAGE};
use crate::template::{DialectRegistry, FileSystemRepository, TagRegistry};
use clap::Parser;

#[test]
fn compile_command_parses() {
    let cli = Cli::try_parse_from([
        "phasekit",
        "compile",
        "--templates",
        "tmpl",
        "--out",
        "gen",
        "--force",
    ])
    .unwrap();
    match cli.command {
        Commands::Compile {
            templates,
            out,
            force,
        } => {
            assert_eq!(templates.unwrap().to_string_lossy(), "tmpl");
            assert_eq!(out.unwrap().to_string_lossy(), "gen");
            assert!(force);
        }
        other => panic!("Expected Compile command, got {other:?}"),
    }
}

#[test]
fn tag_option_takes_name_and_path() {
    let cli = Cli::try_parse_from([
        "phasekit",
        "render",
        "--template",
        "a.gtmpl",
        "--tag",
        "card=widgets/card.gtmpl",
    ])
    .unwrap();
    assert_eq!(cli.tags.len(), 1);
    assert_eq!(cli.tags[0].0, "card");
    assert_eq!(cli.tags[0].1.as_str(), "widgets/card.gtmpl");

    assert!(Cli::try_parse_from(["phasekit", "render", "--template", "a", "--tag", "card"]).is_err());
    assert_eq!(LOCAL_TAG_PACKAGE, "local");
}

#[test]
fn compile_writes_one_program_per_template() {
    let src = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    fs::create_dir_all(src.path().join("pages")).unwrap();
    fs::write(src.path().join("layout.gtmpl"), "<body>#{insert/}</body>").unwrap();
    fs::write(
        src.path().join("pages/index.gtmpl"),
        "#{decorate path=../layout.gtmpl/}Hi",
    )
    .unwrap();
    fs::write(src.path().join("notes.md"), "ignored").unwrap();

    let repository = FileSystemRepository::new(src.path());
    let report = compile_templates(
        &repository,
        &Arc::new(TagRegistry::builtin()),
        &DialectRegistry::builtin(),
        out.path(),
    );
    assert!(report.errors.is_empty(), "{:?}", report.errors);
    assert_eq!(report.compiled.len(), 2);
    assert!(out.path().join("layout.tmpl.json").is_file());
    assert!(out.path().join("pages/index.tmpl.json").is_file());
}

#[test]
fn compile_reports_each_structural_error_once() {
    let src = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    fs::write(src.path().join("index.gtmpl"), "#{include path=foo.gtmpl/}").unwrap();
    fs::write(src.path().join("foo.gtmpl"), "#{include path=index.gtmpl/}").unwrap();
    fs::write(src.path().join("other.gtmpl"), "#{notfound/}").unwrap();

    let repository = FileSystemRepository::new(src.path());
    let report = compile_templates(
        &repository,
        &Arc::new(TagRegistry::builtin()),
        &DialectRegistry::builtin(),
        out.path(),
    );
    let codes: Vec<&str> = report.errors.iter().map(|e| e.code()).collect();
    assert!(codes.contains(&"UNKNOWN_TAG"));
    assert!(codes.contains(&"TEMPLATE_CYCLE"));
    assert!(report.compiled.is_empty());
    assert_eq!(fs::read_dir(out.path()).unwrap().count(), 0);
}

#[test]
fn render_fails_for_missing_template() {
    let src = tempfile::tempdir().unwrap();
    let cli = Cli::try_parse_from([
        "phasekit",
        "render",
        "--templates",
        src.path().to_str().unwrap(),
        "--template",
        "missing.gtmpl",
    ])
    .unwrap();
    let err = run(cli).unwrap_err();
    assert!(err.to_string().contains("missing.gtmpl"), "{err}");
}

#[test]
fn existing_target_blocks_the_whole_compile() {
    let src = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    fs::write(src.path().join("a.gtmpl"), "a").unwrap();
    fs::write(src.path().join("b.gtmpl"), "b").unwrap();
    fs::write(src.path().join("z.gtmpl"), "z").unwrap();
    fs::write(out.path().join("b.tmpl.json"), "{}").unwrap();

    let repository = FileSystemRepository::new(src.path());
    let report = compile_templates(
        &repository,
        &Arc::new(TagRegistry::builtin()),
        &DialectRegistry::builtin(),
        out.path(),
    );
    let codes: Vec<&str> = report.errors.iter().map(|e| e.code()).collect();
    assert_eq!(codes.len(), 1);
    assert!(report.compiled.is_empty());
    assert!(!out.path().join("a.tmpl.json").exists());
    assert!(!out.path().join("z.tmpl.json").exists());
    assert_eq!(fs::read_to_string(out.path().join("b.tmpl.json")).unwrap(), "{}");
}
