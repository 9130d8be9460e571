//! Batch sorter.
//!
//! Buffers each batch per group, sorts by the configured columns with the
//! total value order, and emits on mark or eof. Sorted output carries no
//! timestamps: order replaces time, and downstream procs that need time
//! again must re-derive it.
//!
//! The buffer is bounded: once a group reaches `limit` points the overflow
//! is dropped with a warning rather than aborting the stream.

use std::cmp::Ordering;

use crate::fluxion::runtime::error::{RuntimeError, RuntimeResult};
use crate::fluxion::runtime::fanin::FanIn;
use crate::fluxion::runtime::graph::{InputId, Proc, ProcBase};
use crate::fluxion::runtime::groups::Groups;
use crate::fluxion::runtime::time::Moment;
use crate::fluxion::runtime::types::{Event, Point, Value};

/// Default per-group buffer bound
const DEFAULT_LIMIT: usize = 100_000;

/// One sort column: a field and a direction.
#[derive(Debug, Clone)]
pub struct SortColumn {
    /// Field to sort by
    pub field: String,
    /// Sort descending instead of ascending
    pub descending: bool,
}

impl SortColumn {
    /// Ascending sort on a field
    pub fn asc(field: impl Into<String>) -> Self {
        SortColumn {
            field: field.into(),
            descending: false,
        }
    }

    /// Descending sort on a field
    pub fn desc(field: impl Into<String>) -> Self {
        SortColumn {
            field: field.into(),
            descending: true,
        }
    }
}

/// Options for [`SortProc`].
#[derive(Debug, Clone)]
pub struct SortOptions {
    /// Sort columns, most significant first
    pub columns: Vec<SortColumn>,
    /// Sort separately per group
    pub by: Vec<String>,
    /// Per-group buffer bound; overflow warns and drops
    pub limit: Option<usize>,
}

struct SortBuffer {
    points: Vec<Point>,
    overflowed: bool,
}

/// Buffers and sorts each batch.
pub struct SortProc {
    base: ProcBase,
    columns: Vec<SortColumn>,
    limit: usize,
    fanin: FanIn,
    buffers: Groups<SortBuffer>,
}

impl SortProc {
    /// Validate options and build the sorter.
    pub fn new(options: SortOptions) -> RuntimeResult<Self> {
        if options.columns.is_empty() {
            return Err(RuntimeError::config_error(
                "sort",
                "at least one sort column is required",
            ));
        }
        if options.limit == Some(0) {
            return Err(RuntimeError::config_error(
                "sort",
                "limit must be positive",
            ));
        }
        Ok(SortProc {
            base: ProcBase::new("sort"),
            columns: options.columns,
            limit: options.limit.unwrap_or(DEFAULT_LIMIT),
            fanin: FanIn::new(0),
            buffers: Groups::new(options.by),
        })
    }

    fn compare(columns: &[SortColumn], a: &Point, b: &Point) -> Ordering {
        for column in columns {
            let va = a.get(&column.field).unwrap_or(&Value::Null);
            let vb = b.get(&column.field).unwrap_or(&Value::Null);
            let ord = va.total_cmp(vb);
            let ord = if column.descending { ord.reverse() } else { ord };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }

    fn flush(&mut self) {
        let columns = std::mem::take(&mut self.columns);
        let mut out = Vec::new();
        self.buffers.apply(|_, row| {
            let mut points = std::mem::take(&mut row.state.points);
            points.sort_by(|a, b| Self::compare(&columns, a, b));
            for mut point in points {
                point.clear_time();
                out.push(point);
            }
        });
        self.columns = columns;
        self.buffers.reset_groups();
        self.base.emit(out);
    }

    fn on_event(&mut self, event: Event) {
        match event {
            Event::Points(points) => {
                for point in points {
                    let limit = self.limit;
                    let base = &self.base;
                    let (row, _) = self.buffers.lookup(
                        &point,
                        |w| base.warn(w),
                        |_| SortBuffer {
                            points: Vec::new(),
                            overflowed: false,
                        },
                    );
                    if row.state.points.len() >= limit {
                        if !row.state.overflowed {
                            row.state.overflowed = true;
                            base.warn(format!(
                                "sort buffer exceeded {} points, dropping overflow",
                                limit
                            ));
                        }
                        continue;
                    }
                    row.state.points.push(point);
                }
            }
            Event::Mark(time) => {
                self.flush();
                self.base.emit_mark(time);
            }
            Event::Tick(time) => self.base.emit_tick(time),
            Event::Eof => {
                self.flush();
                self.base.emit_eof();
            }
        }
    }
}

impl Proc for SortProc {
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
