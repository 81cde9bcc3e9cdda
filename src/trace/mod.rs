//! Step-level tracing of the interpreter
//!
//! - [`render`]: bounded, never-failing value rendering
//! - [`diff`]: added / updated / removed bindings between two snapshots
//! - [`tracer`]: the [`StepTracer`] hook that produces [`TraceEvent`]s
//! - [`event`]: the event records themselves

pub mod diff;
pub mod event;
pub mod render;
pub mod tracer;

pub use event::TraceEvent;
pub use tracer::{EventSink, StepTracer};
