//! Consecutive-duplicate suppression.
//!
//! Passes a point when the configured fields differ from the previous
//! point of its group; consecutive duplicates are dropped. State resets at
//! each batch boundary so every batch de-duplicates independently.

use crate::fluxion::runtime::error::{RuntimeError, RuntimeResult};
use crate::fluxion::runtime::fanin::FanIn;
use crate::fluxion::runtime::graph::{InputId, Proc, ProcBase};
use crate::fluxion::runtime::groups::Groups;
use crate::fluxion::runtime::time::Moment;
use crate::fluxion::runtime::types::{Event, Point, Value};

/// Drops points whose compared fields repeat the previous point's.
pub struct UniqProc {
    base: ProcBase,
    fields: Vec<String>,
    fanin: FanIn,
    last_seen: Groups<Option<Vec<Value>>>,
}

impl UniqProc {
    /// Create a uniq over the compared `fields`, de-duplicating separately
    /// per `by` group.
    pub fn new(fields: Vec<String>, by: Vec<String>) -> RuntimeResult<Self> {
        if fields.is_empty() {
            return Err(RuntimeError::config_error(
                "uniq",
                "at least one field to compare is required",
            ));
        }
        Ok(UniqProc {
            base: ProcBase::new("uniq"),
            fields,
            fanin: FanIn::new(0),
            last_seen: Groups::new(by),
        })
    }

    fn signature(&self, point: &Point) -> Vec<Value> {
        self.fields
            .iter()
            .map(|f| point.get(f).cloned().unwrap_or(Value::Null))
            .collect()
    }

    fn on_event(&mut self, event: Event) {
        match event {
            Event::Points(points) => {
                let mut kept = Vec::with_capacity(points.len());
                for point in points {
                    let signature = self.signature(&point);
                    let base = &self.base;
                    let (row, _) =
                        self.last_seen
                            .lookup(&point, |w| base.warn(w), |_| None);
                    if row.state.as_ref() != Some(&signature) {
                        row.state = Some(signature);
                        kept.push(point);
                    }
                }
                self.base.emit(kept);
            }
            Event::Mark(time) => {
                self.last_seen.reset_groups();
                self.base.emit_mark(time);
            }
            Event::Tick(time) => self.base.emit_tick(time),
            Event::Eof => self.base.emit_eof(),
        }
    }
}

impl Proc for UniqProc {
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

    #[test]
    fn requires_compare_fields() {
        assert!(UniqProc::new(Vec::new(), Vec::new()).is_err());
        assert!(UniqProc::new(vec!["v".into()], Vec::new()).is_ok());
    }
}
