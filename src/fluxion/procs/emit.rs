//! Synthetic point source.
//!
//! Generates `limit` points spaced `every` apart starting at `from`, or
//! replays an explicit point list. This is the built-in implementation of
//! the source `read` contract; adapters implement the same trait at the
//! program boundary.
//!
//! Sources self-throttle: each `pump` draws at most one read batch, so a
//! single source cannot monopolize the cooperative scheduler.

use crate::fluxion::runtime::error::{RuntimeError, RuntimeResult};
use crate::fluxion::runtime::graph::{Proc, ProcBase};
use crate::fluxion::runtime::program::{ReadResult, Source};
use crate::fluxion::runtime::time::{Moment, Span};
use crate::fluxion::runtime::types::Point;

/// Points drawn per read invocation
const READ_BATCH: usize = 100;

/// Options for [`EmitProc`].
#[derive(Clone)]
pub struct EmitOptions {
    /// Timestamp of the first generated point; defaults to the wall clock
    pub from: Option<Moment>,
    /// Stop generating at this time (exclusive)
    pub to: Option<Moment>,
    /// Spacing between generated points
    pub every: Span,
    /// Number of points to generate
    pub limit: Option<usize>,
    /// Replay these points instead of generating; conflicts with the
    /// generator options
    pub points: Option<Vec<Point>>,
}

impl Default for EmitOptions {
    fn default() -> Self {
        EmitOptions {
            from: None,
            to: None,
            every: Span::seconds(1),
            limit: None,
            points: None,
        }
    }
}

/// Source proc generating a synthetic timed stream.
pub struct EmitProc {
    base: ProcBase,
    from: Moment,
    to: Moment,
    every: Span,
    limit: Option<usize>,
    replay: Option<Vec<Point>>,
    next_time: Moment,
    emitted: usize,
    exhausted: bool,
}

impl EmitProc {
    /// Validate options and build the source.
    pub fn new(options: EmitOptions) -> RuntimeResult<Self> {
        if options.points.is_some()
            && (options.from.is_some() || options.to.is_some() || options.limit.is_some())
        {
            return Err(RuntimeError::config_error(
                "emit",
                "the points option conflicts with from/to/limit",
            ));
        }
        if options.points.is_none() && !options.every.is_positive() {
            return Err(RuntimeError::config_error(
                "emit",
                format!("every must be positive, got {}", options.every),
            ));
        }
        let from = options.from.unwrap_or_else(Moment::now);
        if options.every.is_calendar() && !from.finite() {
            return Err(RuntimeError::config_error(
                "emit",
                "a calendar every requires a finite from",
            ));
        }
        Ok(EmitProc {
            base: ProcBase::new("emit"),
            from,
            to: options.to.unwrap_or(Moment::MAX),
            every: options.every,
            limit: options.limit,
            replay: options.points,
            next_time: from,
            emitted: 0,
            exhausted: false,
        })
    }
}

impl Source for EmitProc {
    fn read(&mut self, _from: &Moment, to: &Moment, limit: usize) -> RuntimeResult<ReadResult> {
        if let Some(replay) = &mut self.replay {
            let take = replay.len().min(limit);
            let points: Vec<Point> = replay.drain(..take).collect();
            let done = replay.is_empty();
            return Ok(ReadResult { points, done });
        }

        let mut points = Vec::new();
        loop {
            if points.len() >= limit {
                return Ok(ReadResult {
                    points,
                    done: false,
                });
            }
            if self.limit.map_or(false, |n| self.emitted >= n)
                || self.next_time >= *to
                || self.next_time >= self.to
            {
                return Ok(ReadResult { points, done: true });
            }
            points.push(Point::new().at(self.next_time));
            self.emitted += 1;
            self.next_time = self.next_time.add_span(&self.every);
        }
    }
}

impl Proc for EmitProc {
    fn base(&self) -> &ProcBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ProcBase {
        &mut self.base
    }

    fn is_source(&self) -> bool {
        true
    }

    fn pump(&mut self) -> RuntimeResult<bool> {
        if self.exhausted {
            return Ok(true);
        }
        let from = self.from;
        let result = self.read(&from, &Moment::MAX, READ_BATCH)?;
        self.base.emit(result.points);
        if result.done {
            self.exhausted = true;
            self.base.emit_eof();
        }
        Ok(self.exhausted)
    }
}
