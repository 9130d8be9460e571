//! Per-point computed assignments.
//!
//! Applies a compiled assignment function to a copy of each point. The same
//! error policy as filter applies: a runtime error inside the expression
//! becomes a warning and the point passes through unmodified.

use crate::fluxion::runtime::error::RuntimeResult;
use crate::fluxion::runtime::graph::{InputId, Proc, ProcBase};
use crate::fluxion::runtime::types::Point;

/// Compiled assignment over one point
pub type Assignment = Box<dyn Fn(&mut Point) -> RuntimeResult<()>>;

/// Rewrites each point through a compiled assignment.
pub struct PutProc {
    base: ProcBase,
    assignment: Assignment,
}

impl PutProc {
    /// Create a put from a compiled assignment
    pub fn new(assignment: Assignment) -> Self {
        PutProc {
            base: ProcBase::new("put"),
            assignment,
        }
    }
}

impl Proc for PutProc {
    fn base(&self) -> &ProcBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ProcBase {
        &mut self.base
    }

    fn consume(&mut self, points: Vec<Point>, _from: InputId) {
        let mut out = Vec::with_capacity(points.len());
        for point in points {
            // Points are immutable once emitted; work on a copy.
            let mut updated = point.clone();
            match (self.assignment)(&mut updated) {
                Ok(()) => out.push(updated),
                Err(err) => {
                    self.base.warn(format!("assignment failed: {}", err));
                    out.push(point);
                }
            }
        }
        self.base.emit(out);
    }
}
