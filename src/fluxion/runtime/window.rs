//! Trailing time-window wrapper for aggregators.
//!
//! [`WindowMaker`] wraps an aggregator factory so that every produced
//! instance maintains a trailing window of `span`: each instance keeps a
//! private time-ordered point buffer, and `advance(time)` defines the
//! trailing edge as `time - span`.
//!
//! Two retention strategies, chosen by the inner aggregator:
//! - **incremental** (`can_expire()`): points feed the inner aggregator
//!   immediately, and `advance` expires stale points one at a time through
//!   the inner `expire`.
//! - **replay-only**: `advance` merely trims the buffer, and `result()`
//!   replays the entire current buffer through a fresh inner instance.
//!
//! The trailing edge inherits the epsilon flag of the advance time, so a
//! point exactly on the edge of a batch boundary lands on the correct side
//! of the window.

use std::collections::VecDeque;

use super::aggregate::{Aggregator, AggregatorFactory};
use super::error::{RuntimeError, RuntimeResult};
use super::time::{Moment, Span};
use super::types::{Point, Value};

/// Wraps an aggregator factory into a windowed aggregator factory.
pub struct WindowMaker {
    span: Span,
    inner: AggregatorFactory,
}

impl WindowMaker {
    /// Create a window of the given span over the inner factory. The span
    /// must move time forward.
    pub fn new(span: Span, inner: AggregatorFactory) -> RuntimeResult<Self> {
        if !span.is_positive() {
            return Err(RuntimeError::config_error(
                "window",
                format!("window span must be positive, got {}", span),
            ));
        }
        Ok(WindowMaker { span, inner })
    }

    /// The windowed factory: every produced aggregator carries its own
    /// buffer and window state.
    pub fn into_factory(self) -> AggregatorFactory {
        let WindowMaker { span, inner } = self;
        std::rc::Rc::new(move || {
            Box::new(WindowedAggregator::new(span, inner.clone())) as Box<dyn Aggregator>
        })
    }
}

struct WindowedAggregator {
    span: Span,
    factory: AggregatorFactory,
    inner: Box<dyn Aggregator>,
    incremental: bool,
    buffer: VecDeque<Point>,
}

impl WindowedAggregator {
    fn new(span: Span, factory: AggregatorFactory) -> Self {
        let inner = (factory)();
        let incremental = inner.can_expire();
        WindowedAggregator {
            span,
            factory,
            inner,
            incremental,
            buffer: VecDeque::new(),
        }
    }
}

impl Aggregator for WindowedAggregator {
    fn update(&mut self, point: &Point) {
        if self.incremental {
            self.inner.update(point);
        }
        self.buffer.push_back(point.clone());
    }

    fn advance(&mut self, time: &Moment) {
        let edge = time.sub_span(&self.span);
        loop {
            let expired = match self.buffer.front().and_then(|p| p.time()) {
                Some(t) => t < edge,
                // Timeless points never expire; they sit at the buffer
                // head only if the stream begins with them.
                None => false,
            };
            if !expired {
                break;
            }
            let point = self.buffer.pop_front().unwrap();
            if self.incremental {
                self.inner.expire(&point);
            }
        }
    }

    fn result(&self) -> Value {
        if self.incremental {
            self.inner.result()
        } else {
            let mut fresh = (self.factory)();
            for point in &self.buffer {
                fresh.update(point);
            }
            fresh.result()
        }
    }

    fn reset(&mut self) {
        self.buffer.clear();
        self.inner = (self.factory)();
    }
}
