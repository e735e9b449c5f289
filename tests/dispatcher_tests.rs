//! Phase dispatch through the public API
//!
//! # Test Coverage
//!
//! - Argument binding: zero parameters, required, optional, multi-valued
//! - Fault capture: returned errors and panics become `Error` responses
//! - Interceptors: short-circuit, after-hooks, counters
//! - ACTION → VIEW hand-over, by redirect or by direct rendering
//! - Controllers rendering templates

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use common::http::{body_text, get, post_form};
use common::templates::{cache, repository};
use phasekit::controller::{ControllerMethod, ControllerRegistry, MethodId, ParameterDescriptor, Phase};
use phasekit::dispatcher::{DispatchError, Dispatcher, Interaction};
use phasekit::interceptor::{Interceptor, StatsInterceptor, TracingInterceptor};
use phasekit::property::REDIRECT_AFTER_ACTION;
use phasekit::response::{Response, WithProperties};
use serde_json::json;

fn target(id: &str) -> MethodId {
    id.parse().unwrap()
}

#[test]
fn zero_parameter_view_dispatches_without_arguments() {
    let mut registry = ControllerRegistry::new();
    registry.register(ControllerMethod::view("Home", "index"), |inv| {
        assert!(inv.arguments.is_empty());
        Ok(Response::ok_content("home"))
    });
    let dispatcher = Dispatcher::new(registry);
    let interaction = Interaction::new(Phase::View).with_target(target("Home.index"));
    let response = dispatcher.dispatch(&interaction).unwrap();
    assert_eq!(response.code(), Some(200));
}

#[test]
fn missing_required_parameter_fails_before_invocation() {
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&calls);
    let mut registry = ControllerRegistry::new();
    registry.register(
        ControllerMethod::view("A", "oneArg").param(ParameterDescriptor::required("foo")),
        move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(Response::ok())
        },
    );
    let dispatcher = Dispatcher::new(registry);
    let interaction = Interaction::new(Phase::View).with_target(target("A.oneArg"));
    let err = dispatcher.dispatch(&interaction).unwrap_err();
    assert_eq!(
        err,
        DispatchError::MissingParameter {
            method: target("A.oneArg"),
            parameter: "foo".to_string()
        }
    );
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let bridge = get(&dispatcher, "/?method=A.oneArg", false);
    assert_eq!(bridge.status(), 400);
}

#[test]
fn optional_and_multi_valued_parameters_bind_in_order() {
    let mut registry = ControllerRegistry::new();
    registry.register(
        ControllerMethod::view("Search", "run")
            .param(ParameterDescriptor::required("q"))
            .param(ParameterDescriptor::optional("page"))
            .param(ParameterDescriptor::optional("tag").multiple()),
        |inv| {
            let tags = inv.arguments.get_all("tag").join("|");
            Ok(Response::ok_content(format!(
                "{} {:?} {}",
                inv.arguments.get("q").unwrap_or_default(),
                inv.arguments.get("page"),
                tags
            )))
        },
    );
    let dispatcher = Dispatcher::new(registry);
    let bridge = get(&dispatcher, "/?method=Search.run&q=rust&tag=b&tag=a", false);
    assert_eq!(body_text(&bridge), "rust None b|a");
}

#[test]
fn faults_and_panics_become_error_responses() {
    let mut registry = ControllerRegistry::new();
    registry
        .register(ControllerMethod::resource("Files", "broken"), |_| -> anyhow::Result<Response> {
            anyhow::bail!("storage offline")
        })
        .register(ControllerMethod::resource("Files", "explode"), |_| -> anyhow::Result<Response> {
            panic!("index out of range")
        });
    let dispatcher = Dispatcher::new(registry);

    let broken = get(&dispatcher, "/?phase=resource&method=Files.broken", true);
    assert_eq!(broken.status(), 500);
    assert!(body_text(&broken).contains("storage offline"));

    let exploded = get(&dispatcher, "/?phase=resource&method=Files.explode", false);
    assert_eq!(exploded.status(), 500);
    assert!(exploded.body().is_empty());
}

#[test]
fn action_view_outcome_redirects_by_default() {
    let mut registry = ControllerRegistry::new();
    registry
        .register(
            ControllerMethod::action("Blog", "save").param(ParameterDescriptor::required("title")),
            |inv| {
                let title = inv.arguments.get("title").unwrap_or_default();
                Ok(Response::view(target("Blog.show")).with_parameter("title", title))
            },
        )
        .register(
            ControllerMethod::view("Blog", "show").param(ParameterDescriptor::required("title")),
            |inv| Ok(Response::ok_content(inv.arguments.get("title").unwrap_or_default().to_string())),
        );
    let dispatcher = Dispatcher::new(registry);
    let bridge = post_form(&dispatcher, "/?method=Blog.save", "title=Hello+there");
    assert_eq!(bridge.status(), 302);
    assert_eq!(bridge.header("location"), Some("?method=Blog.show&title=Hello+there"));
}

#[test]
fn action_view_without_redirect_renders_directly() {
    let mut registry = ControllerRegistry::new();
    registry
        .register(ControllerMethod::action("Blog", "save"), |_| {
            Ok(Response::view(target("Blog.show"))
                .with_parameter("id", "9")
                .with_no(&REDIRECT_AFTER_ACTION))
        })
        .register(
            ControllerMethod::view("Blog", "show").param(ParameterDescriptor::required("id")),
            |inv| Ok(Response::ok_content(format!("post {}", inv.arguments.get("id").unwrap_or_default()))),
        );
    let dispatcher = Dispatcher::new(registry);
    let bridge = post_form(&dispatcher, "/?method=Blog.save", "");
    assert_eq!(bridge.status(), 200);
    assert_eq!(body_text(&bridge), "post 9");
}

#[test]
fn direct_view_shares_the_action_interaction() {
    let seen: Arc<Mutex<Vec<(String, bool)>>> = Arc::default();
    let mut registry = ControllerRegistry::new();
    let record = Arc::clone(&seen);
    registry.register(ControllerMethod::action("Blog", "save"), move |inv| {
        record
            .lock()
            .unwrap()
            .push((inv.interaction_id.to_string(), inv.interaction.is_follow_up()));
        Ok(Response::view(target("Blog.show")).with_no(&REDIRECT_AFTER_ACTION))
    });
    let record = Arc::clone(&seen);
    registry.register(ControllerMethod::view("Blog", "show"), move |inv| {
        record
            .lock()
            .unwrap()
            .push((inv.interaction_id.to_string(), inv.interaction.is_follow_up()));
        Ok(Response::ok_content(
            inv.interaction.property("request-path").unwrap_or_default().to_string(),
        ))
    });
    let dispatcher = Dispatcher::new(registry);
    let bridge = post_form(&dispatcher, "/blog?method=Blog.save", "");
    assert_eq!(body_text(&bridge), "/blog");

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].0, seen[1].0);
    assert_eq!((seen[0].1, seen[1].1), (false, true));
}

struct Maintenance;

impl Interceptor for Maintenance {
    fn before(&self, _interaction: &Interaction) -> Option<Response> {
        Some(Response::status(503).into())
    }
}

struct Stamp;

impl Interceptor for Stamp {
    fn after(&self, _interaction: &Interaction, response: &mut Response, _latency: Duration) {
        if let Response::Content(content) = std::mem::replace(response, Response::ok().into()) {
            *response = content.with_header("X-Stamp", ["yes"]).into();
        }
    }
}

#[test]
fn interceptor_can_answer_instead_of_the_controller() {
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&calls);
    let mut registry = ControllerRegistry::new();
    registry.register(ControllerMethod::view("Home", "index"), move |_| {
        seen.fetch_add(1, Ordering::SeqCst);
        Ok(Response::ok())
    });
    let stats = Arc::new(StatsInterceptor::new());
    let mut dispatcher = Dispatcher::new(registry);
    dispatcher.add_interceptor(Arc::new(TracingInterceptor));
    dispatcher.add_interceptor(Arc::new(Maintenance));
    dispatcher.add_interceptor(Arc::clone(&stats) as Arc<dyn Interceptor>);

    let bridge = get(&dispatcher, "/", false);
    assert_eq!(bridge.status(), 503);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(stats.interactions(), 1);
}

#[test]
fn after_hooks_can_decorate_the_response() {
    let mut registry = ControllerRegistry::new();
    registry.register(ControllerMethod::view("Home", "index"), |_| Ok(Response::ok_content("hi")));
    let mut dispatcher = Dispatcher::new(registry);
    dispatcher.add_interceptor(Arc::new(Stamp));
    let bridge = get(&dispatcher, "/", false);
    assert_eq!(bridge.header("x-stamp"), Some("yes"));
    assert_eq!(body_text(&bridge), "hi");
}

#[test]
fn controllers_render_templates() {
    let repo = repository(&[
        ("layout.gtmpl", "<title>${page_title}</title>#{insert/}"),
        ("post.gtmpl", "#{decorate path=layout.gtmpl/}<h1>${post.title}</h1>"),
    ]);
    let templates = cache(&repo, false);
    let template = templates.template("post.gtmpl").unwrap();

    let mut registry = ControllerRegistry::new();
    registry.register(
        ControllerMethod::view("Blog", "show").param(ParameterDescriptor::required("title")),
        move |inv| {
            let title = inv.arguments.get("title").unwrap_or_default();
            Ok(template.ok(&json!({"page_title": "Blog", "post": {"title": title}}))?)
        },
    );
    let dispatcher = Dispatcher::new(registry);
    let bridge = get(&dispatcher, "/?method=Blog.show&title=Fish+%26+Chips", false);
    assert_eq!(bridge.status(), 200);
    assert_eq!(
        body_text(&bridge),
        "<title>Blog</title><h1>Fish &amp; Chips</h1>"
    );
    assert_eq!(bridge.header("content-type"), Some("text/html; charset=UTF-8"));
}

#[test]
fn concurrent_interactions_are_independent() {
    let mut registry = ControllerRegistry::new();
    registry.register(
        ControllerMethod::view("Echo", "say").param(ParameterDescriptor::required("n")),
        |inv| Ok(Response::ok_content(inv.arguments.get("n").unwrap_or_default().to_string())),
    );
    let dispatcher = Arc::new(Dispatcher::new(registry));
    let handles: Vec<_> = (0..8)
        .map(|n| {
            let dispatcher = Arc::clone(&dispatcher);
            thread::spawn(move || {
                let bridge = get(&dispatcher, &format!("/?method=Echo.say&n={n}"), false);
                body_text(&bridge) == n.to_string()
            })
        })
        .collect();
    assert!(handles.into_iter().all(|h| h.join().unwrap()));
}
