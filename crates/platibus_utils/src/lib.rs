//! platibus_utils
//!
//! Shared plumbing with no bus semantics of its own:
//!
//! - `logging`: tracing subscriber initialization.
//! - `diagnostics`: the diagnostic event model and sink trait the queue,
//!   transport and subscription components emit through.

pub mod diagnostics;
pub mod logging;

pub use diagnostics::{
    DiagnosticEvent, DiagnosticEventKind, DiagnosticEventSink, MemorySink, TracingEventSink,
};
