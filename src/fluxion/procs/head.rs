//! Per-group first-N / all-but-first-N.
//!
//! One take core serves both procs: `head` passes the first `limit` points
//! of each group and drops the rest; `skip` drops the first `limit` and
//! passes the rest. Counters are per group-by key and reset at each batch
//! boundary, so a batched stream heads every batch independently.

use crate::fluxion::runtime::error::{RuntimeError, RuntimeResult};
use crate::fluxion::runtime::fanin::FanIn;
use crate::fluxion::runtime::graph::{InputId, Proc, ProcBase};
use crate::fluxion::runtime::groups::Groups;
use crate::fluxion::runtime::time::Moment;
use crate::fluxion::runtime::types::{Event, Point};

/// Which side of the first `limit` points passes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TakeMode {
    /// Pass the first `limit` points per group
    Head,
    /// Drop the first `limit` points per group
    Skip,
}

/// Take proc: head or skip, optionally per group.
pub struct HeadProc {
    base: ProcBase,
    mode: TakeMode,
    limit: usize,
    fanin: FanIn,
    counts: Groups<usize>,
}

impl HeadProc {
    /// Create a head/skip proc passing or dropping `limit` points per
    /// group keyed by the `by` fields.
    pub fn new(mode: TakeMode, limit: i64, by: Vec<String>) -> RuntimeResult<Self> {
        let name = match mode {
            TakeMode::Head => "head",
            TakeMode::Skip => "skip",
        };
        if limit < 0 {
            return Err(RuntimeError::config_error(
                name,
                format!("limit must be non-negative, got {}", limit),
            ));
        }
        Ok(HeadProc {
            base: ProcBase::new(name),
            mode,
            limit: limit as usize,
            fanin: FanIn::new(0),
            counts: Groups::new(by),
        })
    }

    fn on_event(&mut self, event: Event) {
        match event {
            Event::Points(points) => {
                let mut kept = Vec::with_capacity(points.len());
                for point in points {
                    let base = &self.base;
                    let (row, _) =
                        self.counts
                            .lookup(&point, |w| base.warn(w), |_| 0usize);
                    let seen = row.state;
                    row.state += 1;
                    let passes = match self.mode {
                        TakeMode::Head => seen < self.limit,
                        TakeMode::Skip => seen >= self.limit,
                    };
                    if passes {
                        kept.push(point);
                    }
                }
                self.base.emit(kept);
            }
            Event::Mark(time) => {
                // Each batch counts from zero again.
                self.counts.reset_groups();
                self.base.emit_mark(time);
            }
            Event::Tick(time) => self.base.emit_tick(time),
            Event::Eof => self.base.emit_eof(),
        }
    }
}

impl Proc for HeadProc {
    fn base(&self) -> &ProcBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ProcBase {
        &mut self.base
    }

    fn start(&mut self) -> RuntimeResult<()> {
        self.fanin = FanIn::new(self.base.input_count().max(1));
        Ok(())
    }

    fn consume(&mut self, points: Vec<Point>, from: InputId) {
        for event in self.fanin.push_points(from, points) {
            self.on_event(event);
        }
    }

    fn consume_mark(&mut self, time: Moment, from: InputId) {
        for event in self.fanin.push_mark(from, time) {
            self.on_event(event);
        }
    }

    fn consume_tick(&mut self, time: Moment, from: InputId) {
        for event in self.fanin.push_tick(from, time) {
            self.on_event(event);
        }
    }

    fn consume_eof(&mut self, from: InputId) {
        for event in self.fanin.push_eof(from) {
            self.on_event(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fluxion::runtime::types::Value;

    fn pt(ms: i64, host: &str) -> Point {
        Point::new()
            .with("host", Value::String(host.into()))
            .at(Moment::from_millis(ms))
    }

    fn run(proc_: &mut HeadProc, points: Vec<Point>) {
        proc_.start().unwrap();
        proc_.consume(points, 0);
        proc_.consume_eof(0);
    }

    #[test]
    fn head_counts_per_group() {
        let mut head =
            HeadProc::new(TakeMode::Head, 1, vec!["host".into()]).unwrap();
        // Without a downstream edge emit drops traffic; we only check the
        // counters by observing group state after a run.
        run(
            &mut head,
            vec![pt(1, "a"), pt(2, "a"), pt(3, "b"), pt(4, "b")],
        );
        assert_eq!(head.counts.len(), 2);
    }

    #[test]
    fn negative_limit_is_rejected() {
        assert!(HeadProc::new(TakeMode::Head, -1, Vec::new()).is_err());
        assert!(HeadProc::new(TakeMode::Skip, -3, Vec::new()).is_err());
    }
}
