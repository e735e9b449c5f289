//! # Interceptor Module
//!
//! Hooks run by the dispatcher around every controller invocation.
//!
//! `before` runs after the target method is resolved and its arguments bound.
//! Returning a response from `before` short-circuits the invocation; the
//! remaining interceptors still see the interaction. `after` runs for every
//! interceptor with the final response and the measured latency, and may
//! amend the response (for example to add headers).

mod core;
mod stats;
mod tracing;

pub use self::core::Interceptor;
pub use self::stats::StatsInterceptor;
pub use self::tracing::TracingInterceptor;
