//! Epoch-boundary detection for batched and windowed reduction.
//!
//! Given an interval and an optional alignment anchor, a [`PeriodicEpoch`]
//! tracks the current epoch (computed via quantize) and, on each incoming
//! timestamp, walks through every crossed boundary invoking a callback once
//! per boundary. The first observed timestamp only establishes the opening
//! epoch; it crosses nothing.
//!
//! A single input batch can span thousands of epochs (one late point after
//! a long idle stream). To keep the synchronous call graph bounded, a
//! advancement is chunked: after [`MAX_SYNC_EPOCHS`] boundaries the walk
//! reports [`Advance::Deferred`] and the owning proc schedules a
//! continuation, queueing any points that arrive in the meantime and
//! replaying them afterwards. The produced boundary sequence is identical
//! to fully synchronous execution.

use super::error::{RuntimeError, RuntimeResult};
use super::time::{Moment, Span};
use super::types::Point;

/// Boundaries processed synchronously before deferring to the scheduler
pub const MAX_SYNC_EPOCHS: usize = 1000;

/// Outcome of one advancement slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    /// The walk reached the target timestamp
    Complete,
    /// The synchronous chunk limit was hit; call `resume` from a
    /// scheduled task
    Deferred,
}

/// Tracks epoch boundaries of a fixed or calendar interval.
pub struct PeriodicEpoch {
    interval: Span,
    anchor: Option<Moment>,
    epoch: Option<Moment>,
    target: Option<Moment>,
    queued: Vec<Vec<Point>>,
}

impl PeriodicEpoch {
    /// Create an advancer for the given interval, aligned to `anchor`
    /// (epoch-aligned when absent). The interval must move time forward.
    pub fn new(interval: Span, anchor: Option<Moment>) -> RuntimeResult<Self> {
        if !interval.is_positive() {
            return Err(RuntimeError::config_error(
                "epoch",
                format!("epoch interval must be positive, got {}", interval),
            ));
        }
        if interval.is_calendar() && interval.milli_count() != 0 {
            return Err(RuntimeError::config_error(
                "epoch",
                "epoch interval cannot mix calendar months with fixed milliseconds",
            ));
        }
        Ok(PeriodicEpoch {
            interval,
            anchor,
            epoch: None,
            target: None,
            queued: Vec::new(),
        })
    }

    /// The current epoch start, once the first timestamp has been seen
    pub fn epoch(&self) -> Option<Moment> {
        self.epoch
    }

    /// The epoch interval
    pub fn interval(&self) -> &Span {
        &self.interval
    }

    /// True while an advancement is parked on the scheduler
    pub fn deferred(&self) -> bool {
        self.target.is_some()
    }

    /// Advance through every boundary up to `to`, invoking `on_epoch` once
    /// per crossed boundary with the new epoch start.
    ///
    /// Returns [`Advance::Deferred`] when the chunk limit is hit; the
    /// caller queues subsequent input via [`PeriodicEpoch::queue_points`]
    /// and calls [`PeriodicEpoch::resume`] from a scheduled task until it
    /// reports completion.
    pub fn advance(
        &mut self,
        to: &Moment,
        on_epoch: &mut dyn FnMut(Moment),
    ) -> RuntimeResult<Advance> {
        if !to.finite() {
            return Ok(Advance::Complete);
        }
        if self.epoch.is_none() {
            // First timestamp: establish the opening epoch, cross nothing.
            self.epoch = Some(to.quantize(&self.interval, self.anchor.as_ref())?);
            return Ok(Advance::Complete);
        }
        self.target = Some(match self.target {
            Some(t) => t.max(*to),
            None => *to,
        });
        self.resume(on_epoch)
    }

    /// Continue a deferred advancement. Also callable when idle, in which
    /// case it reports completion immediately.
    pub fn resume(&mut self, on_epoch: &mut dyn FnMut(Moment)) -> RuntimeResult<Advance> {
        let Some(target) = self.target else {
            return Ok(Advance::Complete);
        };
        let mut epoch = self.epoch.expect("resume before first epoch");
        let mut steps = 0;
        loop {
            let next = epoch.add_span(&self.interval);
            if next > target {
                break;
            }
            epoch = next;
            self.epoch = Some(epoch);
            on_epoch(epoch);
            steps += 1;
            if steps >= MAX_SYNC_EPOCHS {
                return Ok(Advance::Deferred);
            }
        }
        self.target = None;
        Ok(Advance::Complete)
    }

    /// Queue a point batch that arrived while an advancement was deferred
    pub fn queue_points(&mut self, points: Vec<Point>) {
        self.queued.push(points);
    }

    /// Take the batches queued during deferral, in arrival order
    pub fn take_queued(&mut self) -> Vec<Vec<Point>> {
        std::mem::take(&mut self.queued)
    }
}
