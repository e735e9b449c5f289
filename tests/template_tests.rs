//! Template compilation, caching and rendering through the public API
//!
//! Covers the structural diagnostics (cycles, unknown tags, unresolved
//! includes), versioning of changed sources, single-flight compilation under
//! concurrency including shared includes and edits that land mid-compile, and
//! the built-in tags at render time.

mod common;

use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use common::templates::{cache, cache_with_tags, repository, slow_cache, SlowRepository};
use phasekit::response::WithProperties;
use phasekit::template::{
    DialectRegistry, EmitError, EmitPhase, MemoryEmitContext, ProcessPhase, RenderError,
    SimpleProcessContext, TagPackage, TagRegistry, TemplateError, TemplatePath,
    TemplateTagPackage,
};
use serde_json::json;

fn path(p: &str) -> TemplatePath {
    TemplatePath::parse(p).unwrap()
}

#[test]
fn include_cycle_is_reported_once_with_its_chain() {
    let repo = repository(&[
        ("index.gtmpl", "#{include path=foo.gtmpl/}"),
        ("foo.gtmpl", "#{include path=index.gtmpl/}"),
    ]);
    let err = cache(&repo, false).resolve(&path("index.gtmpl")).unwrap_err();
    assert_eq!(err.code(), "TEMPLATE_CYCLE");
    assert_eq!(err.arguments(), vec!["index.gtmpl", "index.gtmpl->foo.gtmpl"]);
}

#[test]
fn cycle_report_is_deterministic() {
    let repo = repository(&[
        ("a.gtmpl", "#{include path=b.gtmpl/}"),
        ("b.gtmpl", "#{decorate path=c.gtmpl/}"),
        ("c.gtmpl", "#{include path=a.gtmpl/}"),
    ]);
    let first = cache(&repo, false).resolve(&path("a.gtmpl")).unwrap_err();
    let second = cache(&repo, false).resolve(&path("a.gtmpl")).unwrap_err();
    assert_eq!(first.arguments(), second.arguments());
    assert_eq!(first.arguments(), vec!["a.gtmpl", "a.gtmpl->b.gtmpl->c.gtmpl"]);
}

#[test]
fn unknown_tag_names_the_tag() {
    let repo = repository(&[("index.gtmpl", "<p>#{notfound/}</p>")]);
    let err = cache(&repo, false).resolve(&path("index.gtmpl")).unwrap_err();
    assert_eq!(err.code(), "UNKNOWN_TAG");
    assert_eq!(err.arguments(), vec!["notfound"]);
}

#[test]
fn unresolved_include_is_not_a_cycle() {
    let repo = repository(&[("index.gtmpl", "#{include path=gone.gtmpl/}")]);
    let err = cache(&repo, false).resolve(&path("index.gtmpl")).unwrap_err();
    assert_eq!(err.code(), "TEMPLATE_NOT_RESOLVED");
    assert!(matches!(err, TemplateError::NotResolved { .. }));
    assert_eq!(err.arguments(), vec!["gone.gtmpl"]);
}

#[test]
fn process_and_emit_phases_run_standalone() {
    let repo = repository(&[
        ("layout.gtmpl", "<html>#{insert/}</html>"),
        ("page.gtmpl", "#{decorate path=layout.gtmpl/}${greeting}"),
    ]);
    let tags = Arc::new(TagRegistry::builtin());
    let dialects = DialectRegistry::builtin();
    let context = SimpleProcessContext::new(repo.as_ref(), &tags, &dialects);
    let result = ProcessPhase::new(&context).resolve(&path("page.gtmpl")).unwrap();
    let order: Vec<&str> = result.models.iter().map(|m| m.path().as_str()).collect();
    assert_eq!(order, vec!["layout.gtmpl", "page.gtmpl"]);
    assert_eq!(result.root.dependencies(), &[path("layout.gtmpl")]);

    let mut emit_context = MemoryEmitContext::new(Arc::clone(&tags));
    EmitPhase::new(&mut emit_context)
        .emit_all(result.models.iter())
        .unwrap();
    let written: Vec<&str> = emit_context.resources().keys().map(TemplatePath::as_str).collect();
    assert_eq!(written, vec!["layout.tmpl.json", "page.tmpl.json"]);

    let err = EmitPhase::new(&mut emit_context).emit(&result.root).unwrap_err();
    assert!(matches!(err, TemplateError::Emit(EmitError::AlreadyExists(_))));
}

#[test]
fn unchanged_source_keeps_its_version() {
    let repo = repository(&[("index.gtmpl", "hello")]);
    let cache = cache(&repo, true);
    let first = cache.resolve(&path("index.gtmpl")).unwrap();
    let second = cache.resolve(&path("index.gtmpl")).unwrap();
    assert_eq!(first.model.version(), 1);
    assert_eq!(second.model.version(), 1);
    assert!(Arc::ptr_eq(&first.model, &second.model));
    assert_eq!(cache.compilation_count(), 1);
}

#[test]
fn touched_source_gets_a_new_version_and_dependents_recompile() {
    let repo = repository(&[
        ("index.gtmpl", "[#{include path=part.gtmpl/}]"),
        ("part.gtmpl", "v1"),
    ]);
    let cache = cache(&repo, true);
    let index = cache.template("index.gtmpl").unwrap();
    assert_eq!(index.render(&json!({})).unwrap().output, "[v1]");

    repo.insert("part.gtmpl", "v2").unwrap();
    assert_eq!(index.render(&json!({})).unwrap().output, "[v2]");
    assert_eq!(cache.versions().get(&path("part.gtmpl")), Some(&2));
    // the including template was recompiled but its own source is unchanged
    assert_eq!(cache.versions().get(&path("index.gtmpl")), Some(&1));

    repo.touch(&path("part.gtmpl"));
    assert_eq!(cache.resolve(&path("part.gtmpl")).unwrap().model.version(), 3);
}

#[test]
fn static_cache_ignores_changes_until_invalidated() {
    let repo = repository(&[("index.gtmpl", "one")]);
    let cache = cache(&repo, false);
    let template = cache.template("index.gtmpl").unwrap();
    repo.insert("index.gtmpl", "two").unwrap();
    assert_eq!(template.render(&json!({})).unwrap().output, "one");

    assert_eq!(cache.invalidate(&path("index.gtmpl")), vec![path("index.gtmpl")]);
    assert_eq!(template.render(&json!({})).unwrap().output, "two");
    assert_eq!(template.version().unwrap(), 2);
}

#[test]
fn concurrent_first_resolution_compiles_once() {
    let repo = repository(&[
        ("index.gtmpl", "#{include path=part.gtmpl/}"),
        ("part.gtmpl", "${x}"),
    ]);
    let cache = cache(&repo, false);
    let barrier = Arc::new(Barrier::new(2));
    let handles: Vec<_> = (0..2)
        .map(|_| {
            let cache = cache.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                cache.resolve(&path("index.gtmpl")).unwrap()
            })
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert!(Arc::ptr_eq(&results[0].model, &results[1].model));
    assert!(Arc::ptr_eq(&results[0].program, &results[1].program));
    // index and part, once each
    assert_eq!(cache.compilation_count(), 2);
}

#[test]
fn shared_include_requested_mid_compile_is_loaded_once() {
    let repo = Arc::new(SlowRepository::new(
        repository(&[
            ("index.gtmpl", "#{include path=part.gtmpl/}"),
            ("part.gtmpl", "${x}"),
        ]),
        "part.gtmpl",
        Duration::from_millis(200),
    ));
    let cache = slow_cache(&repo);
    let index = {
        let cache = cache.clone();
        thread::spawn(move || cache.resolve(&path("index.gtmpl")).unwrap())
    };
    // index is now stalled loading part
    thread::sleep(Duration::from_millis(50));
    let part = cache.resolve(&path("part.gtmpl")).unwrap();
    let index = index.join().unwrap();

    assert_eq!(repo.loads(), 1);
    assert_eq!(cache.compilation_count(), 2);
    assert_eq!(index.model.dependencies(), &[path("part.gtmpl")]);
    assert_eq!(part.model.version(), 1);
}

#[test]
fn edit_during_compilation_is_not_lost() {
    let repo = Arc::new(SlowRepository::new(
        repository(&[("a.gtmpl", "old")]),
        "a.gtmpl",
        Duration::from_millis(200),
    ));
    let cache = slow_cache(&repo);
    let first = {
        let cache = cache.clone();
        thread::spawn(move || cache.resolve(&path("a.gtmpl")).unwrap())
    };
    // the compilation has read "old" and is stalled
    thread::sleep(Duration::from_millis(50));
    repo.inner.insert("a.gtmpl", "new").unwrap();
    cache.invalidate(&path("a.gtmpl"));
    first.join().unwrap();

    let output = cache
        .template("a.gtmpl")
        .unwrap()
        .render(&json!({}))
        .unwrap()
        .output;
    assert_eq!(output, "new");
}

#[test]
fn computed_include_path_is_rejected() {
    let repo = repository(&[
        ("index.gtmpl", "#{include path=${part}/}"),
        ("part.gtmpl", "p"),
    ]);
    let err = cache(&repo, false).resolve(&path("index.gtmpl")).unwrap_err();
    assert_eq!(err.code(), "TEMPLATE_ILLEGAL_PATH");
}

#[test]
fn decorate_include_and_title_render_together() {
    let repo = repository(&[
        (
            "layout.gtmpl",
            "<html><body>#{include path=nav.gtmpl/}#{insert/}</body></html>",
        ),
        ("nav.gtmpl", "<nav>${site}</nav>"),
        (
            "blog/show.gtmpl",
            "#{decorate path=../layout.gtmpl/}#{title}${post.title} - ${site}#{/title}<h1>${post.title}</h1><%= post.html %>",
        ),
    ]);
    let cache = cache(&repo, false);
    let rendered = cache
        .template("blog/show.gtmpl")
        .unwrap()
        .render(&json!({
            "site": "Notes",
            "post": {"title": "A & B", "html": "<em>hi</em>"}
        }))
        .unwrap();
    assert_eq!(
        rendered.output,
        "<html><body><nav>Notes</nav><h1>A &amp; B</h1><em>hi</em></body></html>"
    );
    assert_eq!(rendered.title.as_deref(), Some("A &amp; B - Notes"));
}

#[test]
fn controller_urls_are_encoded() {
    let repo = repository(&[("links.gtmpl", "<a href=\"@{Blog.show(id=post.id, q=term)}\">x</a>")]);
    let output = cache(&repo, false)
        .template("links.gtmpl")
        .unwrap()
        .render(&json!({"post": {"id": 7}, "term": "a&b c"}))
        .unwrap()
        .output;
    assert_eq!(
        output,
        "<a href=\"?method=Blog.show&amp;id=7&amp;q=a%26b+c\">x</a>"
    );
}

#[test]
fn required_param_must_be_supplied() {
    let repo = repository(&[("card.gtmpl", "#{param name=user required/}<b>${user}</b>")]);
    let template = cache(&repo, false).template("card.gtmpl").unwrap();
    assert_eq!(
        template.render(&json!({"user": "ada"})).unwrap().output,
        "<b>ada</b>"
    );
    let err = template.render(&json!({})).unwrap_err();
    assert!(matches!(err, RenderError::MissingParameter(name) if name == "user"));
}

#[test]
fn template_tags_from_a_package_receive_params_and_body() {
    let repo = repository(&[
        ("tags/panel.gtmpl", "<section class=\"${kind}\">#{insert/}</section>"),
        ("page.gtmpl", "#{panel kind=warning}Careful, ${who}#{/panel}"),
    ]);
    let package: Arc<dyn TagPackage> = Arc::new(
        TemplateTagPackage::new("widgets").with_tag("panel", path("tags/panel.gtmpl")),
    );
    let tags = TagRegistry::with_packages(&["widgets".to_string()], &[package]).unwrap();
    let output = cache_with_tags(&repo, tags, false)
        .template("page.gtmpl")
        .unwrap()
        .render(&json!({"who": "Bob"}))
        .unwrap()
        .output;
    assert_eq!(output, "<section class=\"warning\">Careful, Bob</section>");
}

#[test]
fn rendered_template_becomes_titled_content() {
    let repo = repository(&[("missing.gtmpl", "#{title value=Gone/}nothing here")]);
    let content = cache(&repo, false)
        .template("missing.gtmpl")
        .unwrap()
        .not_found(&json!({}))
        .unwrap();
    assert_eq!(content.code(), 404);
    assert_eq!(content.title(), Some("Gone"));
    assert_eq!(content.mime_type(), Some("text/html"));
    assert!(!content.properties().is_empty());
}

#[test]
fn text_dialect_is_literal() {
    let repo = repository(&[("robots.txt", "User-agent: ${not_an_expression}")]);
    let output = cache(&repo, false)
        .template("robots.txt")
        .unwrap()
        .render(&json!({}))
        .unwrap()
        .output;
    assert_eq!(output, "User-agent: ${not_an_expression}");
}

#[test]
fn unknown_extension_is_an_illegal_path() {
    let repo = repository(&[("notes.md", "# hi")]);
    let err = cache(&repo, false).resolve(&path("notes.md")).unwrap_err();
    assert_eq!(err.code(), "TEMPLATE_ILLEGAL_PATH");
}
