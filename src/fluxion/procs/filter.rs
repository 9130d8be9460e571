//! Per-point predicate filter.
//!
//! The predicate is a compiled per-point expression supplied by the graph
//! builder. A type error inside the predicate is converted to a warning and
//! the offending point is dropped; the stream continues.

use crate::fluxion::runtime::error::RuntimeResult;
use crate::fluxion::runtime::graph::{InputId, Proc, ProcBase};
use crate::fluxion::runtime::types::Point;

/// Compiled predicate over one point
pub type Predicate = Box<dyn Fn(&Point) -> RuntimeResult<bool>>;

/// Keeps points for which the predicate holds.
pub struct FilterProc {
    base: ProcBase,
    predicate: Predicate,
}

impl FilterProc {
    /// Create a filter from a compiled predicate
    pub fn new(predicate: Predicate) -> Self {
        FilterProc {
            base: ProcBase::new("filter"),
            predicate,
        }
    }
}

impl Proc for FilterProc {
    fn base(&self) -> &ProcBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ProcBase {
        &mut self.base
    }

    fn consume(&mut self, points: Vec<Point>, _from: InputId) {
        let mut kept = Vec::with_capacity(points.len());
        for point in points {
            match (self.predicate)(&point) {
                Ok(true) => kept.push(point),
                Ok(false) => {}
                Err(err) => self.base.warn(format!("skipping point: {}", err)),
            }
        }
        self.base.emit(kept);
    }
}
