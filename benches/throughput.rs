use std::hint::black_box;
use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion};
use phasekit::bridge::HttpBridge;
use phasekit::controller::{ControllerMethod, ControllerRegistry, ParameterDescriptor};
use phasekit::dispatcher::Dispatcher;
use phasekit::response::Response;
use phasekit::template::{
    DialectRegistry, MemoryRepository, TagRegistry, TemplateCache, TemplatePath, TemplateRepository,
};
use serde_json::json;

fn blog_templates(dynamic: bool) -> TemplateCache {
    let repo = Arc::new(MemoryRepository::new());
    let sources = [
        (
            "layout.gtmpl",
            "<html><head><title>${site}</title></head><body>#{include path=nav.gtmpl/}#{insert/}</body></html>",
        ),
        ("nav.gtmpl", "<nav><a href=\"@{Blog.index()}\">${site}</a></nav>"),
        (
            "post.gtmpl",
            "#{decorate path=layout.gtmpl/}#{title}${post.title}#{/title}<h1>${post.title}</h1><p>${post.summary}</p>",
        ),
    ];
    for (path, content) in sources {
        repo.insert(path, content).ok();
    }
    TemplateCache::new(
        repo as Arc<dyn TemplateRepository>,
        Arc::new(TagRegistry::builtin()),
        Arc::new(DialectRegistry::builtin()),
        dynamic,
    )
}

fn bench_dispatch(c: &mut Criterion) {
    let mut registry = ControllerRegistry::new();
    registry.register(
        ControllerMethod::view("Blog", "show")
            .param(ParameterDescriptor::required("id"))
            .param(ParameterDescriptor::optional("tag").multiple()),
        |inv| Ok(Response::ok_content(format!("post {}", inv.arguments.get("id").unwrap_or_default()))),
    );
    let dispatcher = Dispatcher::new(registry);
    let request = http::Request::get("/?method=Blog.show&id=42&tag=a&tag=b")
        .body(Vec::new())
        .unwrap();

    c.bench_function("dispatch_view", |b| {
        b.iter(|| {
            let mut bridge = HttpBridge::from_request(black_box(&request)).unwrap();
            dispatcher.serve(&mut bridge, false).unwrap();
            black_box(bridge.status());
        })
    });
}

fn bench_render(c: &mut Criterion) {
    let context = json!({
        "site": "Notes",
        "post": {"title": "Fish & Chips", "summary": "Battered <cod> & chips"}
    });
    for (name, dynamic) in [("render_static", false), ("render_dynamic", true)] {
        let template = blog_templates(dynamic).template("post.gtmpl").unwrap();
        c.bench_function(name, |b| {
            b.iter(|| black_box(template.render(black_box(&context)).unwrap()))
        });
    }

    c.bench_function("compile_cold", |b| {
        let path = TemplatePath::parse("post.gtmpl").unwrap();
        b.iter(|| {
            let cache = blog_templates(false);
            black_box(cache.resolve(&path).unwrap());
        })
    });
}

criterion_group!(benches, bench_dispatch, bench_render);
criterion_main!(benches);
