//! Built-in sinks.
//!
//! Every terminal node of a program must sink: it receives the process /
//! mark / tick / eof calls and signals completion through [`Proc::done`].
//! [`CollectSink`] buffers everything it sees (the test sink); [`LogSink`]
//! writes each batch through the `log` facade as JSON lines.

use crate::fluxion::runtime::graph::{InputId, Proc, ProcBase};
use crate::fluxion::runtime::time::Moment;
use crate::fluxion::runtime::types::Point;

/// Buffers received traffic for inspection; done once eof arrives.
pub struct CollectSink {
    base: ProcBase,
    points: Vec<Point>,
    marks: Vec<Moment>,
    ticks: Vec<Moment>,
    eof: bool,
}

impl CollectSink {
    /// Create an empty collector
    pub fn new() -> Self {
        CollectSink {
            base: ProcBase::new("collect"),
            points: Vec::new(),
            marks: Vec::new(),
            ticks: Vec::new(),
            eof: false,
        }
    }

    /// Points received so far, in arrival order
    pub fn points(&self) -> &[Point] {
        &self.points
    }

    /// Marks received so far
    pub fn marks(&self) -> &[Moment] {
        &self.marks
    }

    /// Ticks received so far
    pub fn ticks(&self) -> &[Moment] {
        &self.ticks
    }

    /// True once eof has arrived on every input edge
    pub fn saw_eof(&self) -> bool {
        self.eof
    }

    /// Drain the collected points
    pub fn take_points(&mut self) -> Vec<Point> {
        std::mem::take(&mut self.points)
    }
}

impl Default for CollectSink {
    fn default() -> Self {
        Self::new()
    }
}

impl Proc for CollectSink {
    fn base(&self) -> &ProcBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ProcBase {
        &mut self.base
    }

    fn is_sink(&self) -> bool {
        true
    }

    fn done(&self) -> bool {
        self.eof
    }

    fn consume(&mut self, points: Vec<Point>, _from: InputId) {
        self.points.extend(points);
    }

    fn consume_mark(&mut self, time: Moment, _from: InputId) {
        self.marks.push(time);
    }

    fn consume_tick(&mut self, time: Moment, _from: InputId) {
        self.ticks.push(time);
    }

    fn consume_eof(&mut self, from: InputId) {
        if self.base_mut().note_eof(from) {
            self.eof = true;
        }
    }
}

/// Writes each received batch as JSON lines through the `log` facade.
pub struct LogSink {
    base: ProcBase,
    eof: bool,
}

impl LogSink {
    /// Create a logging sink
    pub fn new() -> Self {
        LogSink {
            base: ProcBase::new("log"),
            eof: false,
        }
    }
}

impl Default for LogSink {
    fn default() -> Self {
        Self::new()
    }
}

impl Proc for LogSink {
    fn base(&self) -> &ProcBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ProcBase {
        &mut self.base
    }

    fn is_sink(&self) -> bool {
        true
    }

    fn done(&self) -> bool {
        self.eof
    }

    fn consume(&mut self, points: Vec<Point>, _from: InputId) {
        for point in &points {
            match serde_json::to_string(point) {
                Ok(line) => log::info!("{}", line),
                Err(err) => self.base.warn(format!("unserializable point: {}", err)),
            }
        }
    }

    fn consume_mark(&mut self, time: Moment, _from: InputId) {
        log::debug!("mark {}", time);
    }

    fn consume_tick(&mut self, time: Moment, _from: InputId) {
        log::debug!("tick {}", time);
    }

    fn consume_eof(&mut self, from: InputId) {
        if self.base_mut().note_eof(from) {
            self.eof = true;
        }
    }
}
