//! # Controller Module
//!
//! Controller method descriptors, phases, and the registry the dispatcher
//! resolves targets from.
//!
//! A controller method is identified by a [`MethodId`] (`Type.method`), bound to
//! one [`Phase`], and declares its parameters with [`ParameterDescriptor`]s.
//! Implementations are plain closures returning `anyhow::Result<impl Into<Response>>`:
//!
//! ```rust
//! use phasekit::controller::{ControllerMethod, ControllerRegistry, ParameterDescriptor};
//! use phasekit::response::Response;
//!
//! let mut registry = ControllerRegistry::new();
//! registry.register(
//!     ControllerMethod::view("Greeter", "hello").param(ParameterDescriptor::required("name")),
//!     |inv| Ok(Response::ok_content(format!("hello {}", inv.arguments.get("name").unwrap_or("")))),
//! );
//! ```

mod method;
mod phase;
mod registry;

pub use method::{Arguments, Cardinality, ControllerMethod, MethodId, ParameterDescriptor};
pub use phase::Phase;
pub use registry::{ControllerRegistry, Handler, RegisteredMethod};

use smallvec::SmallVec;
use std::sync::Arc;

/// Maximum inline request parameters before heap allocation
pub const MAX_INLINE_PARAMS: usize = 8;

/// Request parameters; repeated names carry multiple values
pub type ParamVec = SmallVec<[(Arc<str>, String); MAX_INLINE_PARAMS]>;
