//! Processing nodes.
//!
//! Each proc implements the [`Proc`](crate::fluxion::runtime::graph::Proc)
//! protocol over the runtime core. Sources originate points, sinks terminate
//! the graph, and everything in between transforms the merged event stream.

pub mod emit;
pub mod filter;
pub mod head;
pub mod join;
pub mod pass;
pub mod put;
pub mod reduce;
pub mod sink;
pub mod sort;
pub mod uniq;

pub use emit::{EmitOptions, EmitProc};
pub use filter::FilterProc;
pub use head::{HeadProc, TakeMode};
pub use join::{JoinOptions, JoinProc};
pub use pass::PassProc;
pub use put::PutProc;
pub use reduce::{ReduceOptions, ReduceProc, ReducerSpec};
pub use sink::{CollectSink, LogSink};
pub use sort::{SortColumn, SortOptions, SortProc};
pub use uniq::UniqProc;
