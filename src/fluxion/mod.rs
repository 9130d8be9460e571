//! Fluxion streaming dataflow runtime.
//!
//! Organized into two layers:
//! - [`runtime`] — the execution core: time, values, the proc graph, the
//!   multi-input merge, group indexing, windows, epochs, and the scheduler.
//! - [`procs`] — the processing nodes built on the core: sources, filters,
//!   per-group transforms, reduction, the temporal join, and sinks.

pub mod procs;
pub mod runtime;
