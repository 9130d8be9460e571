//! Group-by aggregation over batches, epochs, and windows.
//!
//! Reduce folds the merged input stream into one result point per group.
//! Three batching regimes:
//! - **mark-delimited** (no `every`): results flush at each upstream mark
//!   and at eof, stamped with the batch start.
//! - **epoch-batched** (`every`, optionally aligned with `on`): a
//!   [`PeriodicEpoch`] walks crossed boundaries, flushing each closed epoch
//!   and emitting reduce's own closing marks; upstream marks are swallowed.
//! - **windowed** (`every` plus `over`): aggregators are wrapped in a
//!   trailing window, so each epoch reports over the last `over` of data.
//!
//! When a single input batch crosses thousands of epoch boundaries the
//! advancement defers to the scheduler; points arriving meanwhile are
//! queued and replayed afterwards, producing output identical to fully
//! synchronous execution.

use crate::fluxion::runtime::aggregate::{Aggregator, AggregatorFactory, builtin_factory};
use crate::fluxion::runtime::epoch::{Advance, PeriodicEpoch};
use crate::fluxion::runtime::error::{RuntimeError, RuntimeResult};
use crate::fluxion::runtime::fanin::FanIn;
use crate::fluxion::runtime::graph::{InputId, Proc, ProcBase};
use crate::fluxion::runtime::groups::Groups;
use crate::fluxion::runtime::time::{Moment, Span};
use crate::fluxion::runtime::types::{Event, Point};
use crate::fluxion::runtime::window::WindowMaker;

/// One output field: its name and the aggregator that computes it.
pub struct ReducerSpec {
    /// Output field name
    pub field: String,
    /// Factory producing one aggregator instance per group
    pub factory: AggregatorFactory,
}

impl ReducerSpec {
    /// A builtin aggregator, e.g. `ReducerSpec::builtin("total", "sum",
    /// Some("value"))`.
    pub fn builtin(
        out_field: impl Into<String>,
        name: &str,
        source_field: Option<&str>,
    ) -> RuntimeResult<Self> {
        Ok(ReducerSpec {
            field: out_field.into(),
            factory: builtin_factory(name, source_field)?,
        })
    }
}

/// Options for [`ReduceProc`].
#[derive(Debug, Clone, Default)]
pub struct ReduceOptions {
    /// Group-by fields
    pub by: Vec<String>,
    /// Epoch interval; absent means mark-delimited batching
    pub every: Option<Span>,
    /// Alignment anchor for `every`
    pub on: Option<Moment>,
    /// Trailing window span; requires `every`
    pub over: Option<Span>,
    /// Drop group rows after each epoch instead of re-emitting idle groups
    pub forget: bool,
}

/// Group-by aggregation proc.
pub struct ReduceProc {
    base: ProcBase,
    specs: Vec<ReducerSpec>,
    every: Option<Span>,
    windowed: bool,
    forget: bool,
    fanin: FanIn,
    groups: Groups<Vec<Box<dyn Aggregator>>>,
    epochs: Option<PeriodicEpoch>,
    batch_start: Option<Moment>,
    pending_eof: bool,
    warned_timeless: bool,
}

impl ReduceProc {
    /// Validate options, wrap factories for windowing, and build the proc.
    pub fn new(options: ReduceOptions, specs: Vec<ReducerSpec>) -> RuntimeResult<Self> {
        if specs.is_empty() {
            return Err(RuntimeError::config_error(
                "reduce",
                "at least one aggregate is required",
            ));
        }
        if options.every.is_none() {
            if options.on.is_some() {
                return Err(RuntimeError::config_error(
                    "reduce",
                    "the on option requires every",
                ));
            }
            if options.over.is_some() {
                return Err(RuntimeError::config_error(
                    "reduce",
                    "the over option requires every",
                ));
            }
        }
        if options.over.is_some() && options.forget {
            return Err(RuntimeError::config_error(
                "reduce",
                "forget cannot be combined with over: the window controls retention",
            ));
        }
        let windowed = options.over.is_some();
        let specs = match options.over {
            Some(over) => specs
                .into_iter()
                .map(|spec| {
                    Ok(ReducerSpec {
                        field: spec.field,
                        factory: WindowMaker::new(over, spec.factory)?.into_factory(),
                    })
                })
                .collect::<RuntimeResult<Vec<_>>>()?,
            None => specs,
        };
        let epochs = match options.every {
            Some(every) => Some(PeriodicEpoch::new(every, options.on)?),
            None => None,
        };
        Ok(ReduceProc {
            base: ProcBase::new("reduce"),
            specs,
            every: options.every,
            windowed,
            forget: options.forget,
            fanin: FanIn::new(0),
            groups: Groups::new(options.by),
            epochs,
            batch_start: None,
            pending_eof: false,
            warned_timeless: false,
        })
    }

    fn deferred(&self) -> bool {
        self.epochs.as_ref().map_or(false, |e| e.deferred())
    }

    fn update_groups(&mut self, point: &Point) {
        let specs = &self.specs;
        let base = &self.base;
        let (row, _) = self.groups.lookup(
            point,
            |w| base.warn(w),
            |_| specs.iter().map(|s| (s.factory)()).collect(),
        );
        for agg in row.state.iter_mut() {
            agg.update(point);
        }
    }

    /// Walk epoch boundaries up to `t`, flushing each closed epoch.
    fn advance_epochs(&mut self, t: Moment) -> Advance {
        let Some(epochs) = self.epochs.as_mut() else {
            return Advance::Complete;
        };
        let interval = *epochs.interval();
        let groups = &mut self.groups;
        let base = &self.base;
        let specs = &self.specs;
        let windowed = self.windowed;
        let forget = self.forget;
        let result = epochs.advance(&t, &mut |boundary| {
            flush_epoch(groups, base, specs, windowed, forget, boundary, &interval);
        });
        match result {
            Ok(outcome) => outcome,
            Err(err) => {
                base.warn(format!("epoch advance failed: {}", err));
                Advance::Complete
            }
        }
    }

    fn resume_epochs(&mut self) {
        let outcome = {
            let Some(epochs) = self.epochs.as_mut() else {
                return;
            };
            let interval = *epochs.interval();
            let groups = &mut self.groups;
            let base = &self.base;
            let specs = &self.specs;
            let windowed = self.windowed;
            let forget = self.forget;
            epochs.resume(&mut |boundary| {
                flush_epoch(groups, base, specs, windowed, forget, boundary, &interval);
            })
        };
        match outcome {
            Ok(Advance::Deferred) => {
                self.base.schedule_wake();
                return;
            }
            Ok(Advance::Complete) => {}
            Err(err) => {
                self.base.warn(format!("epoch advance failed: {}", err));
            }
        }
        // Replay traffic that arrived during the deferral; it may defer
        // again, in which case a fresh continuation is already scheduled.
        let queued = self
            .epochs
            .as_mut()
            .map(|e| e.take_queued())
            .unwrap_or_default();
        for batch in queued {
            self.ingest(batch);
            if self.deferred() {
                return;
            }
        }
        if self.pending_eof {
            self.pending_eof = false;
            self.finish();
        }
    }

    fn ingest(&mut self, points: Vec<Point>) {
        if self.deferred() {
            if let Some(epochs) = self.epochs.as_mut() {
                epochs.queue_points(points);
            }
            return;
        }
        let mut points = points.into_iter();
        while let Some(point) = points.next() {
            match point.time() {
                Some(t) => {
                    if self.batch_start.is_none() {
                        self.batch_start = Some(t);
                    }
                    if self.advance_epochs(t) == Advance::Deferred {
                        // The walk paused mid-advance; this point and the
                        // rest of the batch belong after it completes.
                        let mut rest = vec![point];
                        rest.extend(points);
                        if let Some(epochs) = self.epochs.as_mut() {
                            epochs.queue_points(rest);
                        }
                        self.base.schedule_wake();
                        return;
                    }
                    self.update_groups(&point);
                }
                None => {
                    if self.every.is_some() {
                        if !self.warned_timeless {
                            self.warned_timeless = true;
                            self.base
                                .warn("skipping timeless point: every requires timestamps");
                        }
                    } else {
                        self.update_groups(&point);
                    }
                }
            }
        }
    }

    /// Flush whatever state remains and emit eof.
    fn finish(&mut self) {
        if self.every.is_some() {
            // Final partial epoch: results stamped with the open epoch's
            // start, no closing mark since the stream simply ends.
            let stamp = self.epochs.as_ref().and_then(|e| e.epoch());
            if stamp.is_some() || !self.groups.is_empty() {
                let points = collect_results(
                    &mut self.groups,
                    &self.specs,
                    self.windowed,
                    None,
                    stamp,
                );
                self.base.emit(points);
            }
        } else {
            let stamp = self.batch_start.take();
            let points =
                collect_results(&mut self.groups, &self.specs, self.windowed, None, stamp);
            self.base.emit(points);
            self.groups.reset_groups();
        }
        self.base.emit_eof();
    }

    fn on_event(&mut self, event: Event) {
        match event {
            Event::Points(points) => self.ingest(points),
            Event::Mark(time) => {
                if self.every.is_some() {
                    // Reduce defines its own batching; upstream marks are
                    // swallowed.
                    return;
                }
                let stamp = self.batch_start.replace(time);
                let points = collect_results(
                    &mut self.groups,
                    &self.specs,
                    self.windowed,
                    None,
                    stamp.or(Some(time)),
                );
                self.base.emit(points);
                if self.forget {
                    self.groups.reset_groups();
                } else {
                    self.groups.apply(|_, row| {
                        for agg in row.state.iter_mut() {
                            agg.reset();
                        }
                    });
                }
                self.base.emit_mark(time);
            }
            Event::Tick(time) => {
                if self.deferred() {
                    // Heartbeats are droppable; replayed traffic restores
                    // time progress once the walk completes.
                    return;
                }
                if self.advance_epochs(time) == Advance::Deferred {
                    self.base.schedule_wake();
                    return;
                }
                self.base.emit_tick(time);
            }
            Event::Eof => {
                if self.deferred() {
                    self.pending_eof = true;
                    return;
                }
                self.finish();
            }
        }
    }
}

/// Emit one closed epoch: result points stamped with the epoch start,
/// followed by reduce's closing mark at the boundary.
fn flush_epoch(
    groups: &mut Groups<Vec<Box<dyn Aggregator>>>,
    base: &ProcBase,
    specs: &[ReducerSpec],
    windowed: bool,
    forget: bool,
    boundary: Moment,
    interval: &Span,
) {
    let epoch_start = boundary.sub_span(interval);
    let points = collect_results(groups, specs, windowed, Some(boundary), Some(epoch_start));
    base.emit(points);
    base.emit_mark(boundary);
    if windowed {
        // The window controls retention; rows persist.
        return;
    }
    if forget {
        groups.reset_groups();
    } else {
        groups.apply(|_, row| {
            for agg in row.state.iter_mut() {
                agg.reset();
            }
        });
    }
}

/// Build one result point per group, in id-allocation order.
fn collect_results(
    groups: &mut Groups<Vec<Box<dyn Aggregator>>>,
    specs: &[ReducerSpec],
    windowed: bool,
    advance_to: Option<Moment>,
    stamp: Option<Moment>,
) -> Vec<Point> {
    groups.ensure_sentinel(|_| specs.iter().map(|s| (s.factory)()).collect());
    let by: Vec<String> = groups.by().to_vec();
    let mut out = Vec::new();
    groups.apply(|_, row| {
        if windowed {
            if let Some(boundary) = advance_to {
                // The epsilon boundary keeps the window half-open at the
                // batch edge.
                for agg in row.state.iter_mut() {
                    agg.advance(&boundary.epsilon());
                }
            }
        }
        let mut point = Point::new();
        if let Some(t) = stamp {
            point.set_time(t);
        }
        for (field, value) in by.iter().zip(row.key.iter()) {
            point.set(field.clone(), value.clone());
        }
        for (spec, agg) in specs.iter().zip(row.state.iter()) {
            point.set(spec.field.clone(), agg.result());
        }
        out.push(point);
    });
    out
}

impl Proc for ReduceProc {
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

    fn wake(&mut self) {
        self.resume_epochs();
    }
}
