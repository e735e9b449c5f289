//! # Dispatcher Module
//!
//! Matches an inbound [`Interaction`] to a controller method, invokes it, and
//! normalizes its outcome into a [`Response`](crate::response::Response).
//!
//! ## Request Flow
//!
//! 1. The bridge builds an [`Interaction`]: phase, optional target method,
//!    request parameters and read-only container properties
//! 2. The dispatcher resolves the target, or the phase default when none is
//!    named, and checks that it answers the interaction's phase
//! 3. Declared parameters are bound by name; a missing required parameter
//!    fails before anything runs
//! 4. Interceptors run `before`; one of them may answer instead of the method
//! 5. The method runs. Returned faults and panics become `Error` responses
//! 6. Interceptors run `after` with the response and latency
//!
//! At most one controller method runs per interaction. [`Dispatcher::process`]
//! additionally hands the response to a [`Bridge`](crate::bridge::Bridge),
//! turning dispatch failures into `404`/`400` statuses and `View` outcomes
//! into redirects.
//!
//! ## Example
//!
//! ```rust
//! use phasekit::controller::{ControllerMethod, ControllerRegistry, Phase};
//! use phasekit::dispatcher::{Dispatcher, Interaction};
//! use phasekit::response::Response;
//!
//! let mut registry = ControllerRegistry::new();
//! registry.register(ControllerMethod::view("Home", "index"), |_| {
//!     Ok(Response::ok_content("welcome"))
//! });
//! let dispatcher = Dispatcher::new(registry);
//!
//! let response = dispatcher.dispatch(&Interaction::new(Phase::View)).unwrap();
//! assert_eq!(response.code(), Some(200));
//! ```

mod core;
mod interaction;

pub use self::core::{DispatchError, Dispatcher};
pub use self::interaction::{
    Interaction, InteractionId, Invocation, METHOD_PARAMETER, PHASE_PARAMETER,
};
