//! # fluxion
//!
//! A single-process streaming dataflow runtime. Programs are compiled (by an
//! external front end) into a graph of processing nodes ("procs") that
//! exchange discrete points (field/value records), marks (batch boundaries),
//! ticks (time-progress heartbeats), and eof signals.
//!
//! The crate provides the execution core: node wiring and the event
//! propagation protocol, multi-input temporal merge, group-by key indexing,
//! sliding-window aggregation, epoch-batched reduction, and an
//! arrival-order-independent temporal relational join.
//!
//! ## Quick Start
//!
//! ```rust
//! use fluxion::fluxion::procs::{CollectSink, EmitProc, EmitOptions};
//! use fluxion::fluxion::runtime::program::Program;
//! use fluxion::fluxion::runtime::time::{Moment, Span};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut program = Program::new();
//!     let source = program.add(EmitProc::new(EmitOptions {
//!         from: Some(Moment::from_millis(0)),
//!         every: Span::seconds(1),
//!         limit: Some(10),
//!         ..Default::default()
//!     })?);
//!     let sink = program.add(CollectSink::new());
//!     program.connect(&source, &sink)?;
//!     program.start()?;
//!     program.run()?;
//!     Ok(())
//! }
//! ```

#![allow(clippy::collapsible_if)]
#![allow(clippy::large_enum_variant)]
#![allow(clippy::type_complexity)]

pub mod fluxion;
