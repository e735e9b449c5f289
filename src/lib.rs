//! # phasekit
//!
//! **phasekit** is the core of a phase-driven MVC framework: controller
//! methods answer interactions in one of three [phases](controller::Phase),
//! return a typed [`Response`](response::Response), and usually render
//! compiled templates to build it.
//!
//! ## Architecture
//!
//! - **[`property`]** - typed, multi-valued property bag carried by responses
//! - **[`response`]** - the outcome model: redirect, status, body, content, error, view
//! - **[`io`]** - chunk protocol and the streams a response is written through
//! - **[`template`]** - dialect parsing, include/decorate resolution with cycle
//!   detection, program emission, rendering, and the process-wide cache
//! - **[`controller`]** - controller method descriptors and their registry
//! - **[`dispatcher`]** - phase dispatch, argument binding, fault capture
//! - **[`interceptor`]** - hooks around each controller invocation
//! - **[`bridge`]** - the transport seam, with an in-memory HTTP bridge
//! - **[`config`]**, **[`logging`]**, **[`hot_reload`]**, **[`cli`]** - runtime plumbing
//!
//! ## Request Flow
//!
//! ```text
//! bridge ──► Interaction ──► Dispatcher ──► controller method
//!                                  │               │
//!                                  │         Template::ok(ctx)
//!                                  │               │
//!                                  ◄──── Response ◄┘
//!            bridge::end ◄──── properties, then body chunks
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use phasekit::bridge::HttpBridge;
//! use phasekit::controller::{ControllerMethod, ControllerRegistry, ParameterDescriptor};
//! use phasekit::dispatcher::Dispatcher;
//! use phasekit::response::Response;
//!
//! let mut registry = ControllerRegistry::new();
//! registry.register(
//!     ControllerMethod::view("Greeter", "hello").param(ParameterDescriptor::required("name")),
//!     |inv| Ok(Response::ok_content(format!("hello {}", inv.arguments.get("name").unwrap_or("")))),
//! );
//! let dispatcher = Dispatcher::new(registry);
//!
//! let request = http::Request::get("/?method=Greeter.hello&name=Ada")
//!     .body(Vec::new())
//!     .unwrap();
//! let mut bridge = HttpBridge::from_request(&request).unwrap();
//! dispatcher.serve(&mut bridge, false).unwrap();
//! assert_eq!(bridge.status(), 200);
//! assert_eq!(bridge.body(), b"hello Ada");
//! ```
//!
//! ## Failure Handling
//!
//! Template structural errors (cycles, unknown tags, unresolved includes) are
//! reported at compile time with a stable code and argument list. Faults and
//! panics inside controller methods become [`Error`](response::Error)
//! responses; they never escape the dispatcher.

pub mod bridge;
pub mod cli;
pub mod config;
pub mod controller;
pub mod dispatcher;
pub mod hot_reload;
pub mod interceptor;
pub mod io;
pub mod logging;
pub mod property;
pub mod response;
pub mod template;

pub use config::{AppConfig, ConfigError, RunMode};
pub use controller::{ControllerMethod, ControllerRegistry, MethodId, Phase};
pub use dispatcher::{DispatchError, Dispatcher, Interaction};
pub use response::{Response, WithProperties};
pub use template::{Template, TemplateCache, TemplateError};
