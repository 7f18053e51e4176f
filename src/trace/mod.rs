//! Connection phase tracing.
//!
//! [`PhaseTracer`] holds the hooks that turn lifecycle events into histogram
//! observations. [`RequestTrace`] binds a tracer to one request's start time
//! and travels with the request through `http::Extensions`, where the base
//! transport picks it up.

mod context;
mod tracer;

pub use context::RequestTrace;
pub use tracer::PhaseTracer;
