//! Execution core for the fluxion dataflow runtime.
//!
//! This module contains the foundational machinery every proc is built on:
//!
//! - [`time`] — [`Moment`](time::Moment) instants and calendar-aware
//!   [`Span`](time::Span) durations; everything else orders events by these.
//! - [`types`] — the dynamically typed [`Value`](types::Value) enum and the
//!   [`Point`](types::Point) record flowing through the graph.
//! - [`graph`] — the [`Proc`](graph::Proc) trait, node wiring, and the
//!   five-event propagation protocol.
//! - [`fanin`] — multi-input temporal merge producing a single ordered
//!   event sequence per node.
//! - [`groups`] — group-by key indexing with stable per-group ids.
//! - [`aggregate`] / [`window`] — the aggregator library and the trailing
//!   time-window wrapper.
//! - [`epoch`] — epoch-boundary detection with reentrant chunking.
//! - [`scheduler`] — the cooperative task queue that replaces timer-based
//!   continuations.
//! - [`program`] — the outer controller: start, drive, deactivate.

pub mod aggregate;
pub mod epoch;
pub mod error;
pub mod fanin;
pub mod graph;
pub mod groups;
pub mod program;
pub mod scheduler;
pub mod time;
pub mod types;
pub mod window;

pub use error::{RuntimeError, RuntimeResult, Warning};
pub use time::{Moment, Span};
pub use types::{Event, Point, Value};
