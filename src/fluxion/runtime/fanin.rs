//! Multi-input temporal merge.
//!
//! A proc with several upstream edges sees one correctly interleaved event
//! sequence, as if from a single input. Each edge keeps a FIFO of
//! timestamped items; the merge repeatedly takes the earliest head item,
//! with marks beating points at equal time so closing-batch semantics are
//! observed before new-batch data. Redundant marks and ticks are
//! de-duplicated, and eof is withheld until every edge is done.
//!
//! Per-edge item order is assumed non-decreasing; that is enforced by
//! upstream monotonicity, not re-checked here. The merge output is the
//! monotonicity guarantee every downstream consumer relies on.

use std::collections::VecDeque;

use super::graph::InputId;
use super::time::Moment;
use super::types::{Event, Point};

#[derive(Debug)]
enum Item {
    Point(Point),
    Mark(Moment),
    Tick(Moment),
    Eof,
}

// Selection priority at equal time: marks close the previous batch before
// new data, eof sorts after everything on its edge.
fn kind_rank(item: &Item) -> u8 {
    match item {
        Item::Mark(_) => 0,
        Item::Point(_) => 1,
        Item::Tick(_) => 2,
        Item::Eof => 3,
    }
}

#[derive(Debug)]
struct EdgeQueue {
    queue: VecDeque<(Moment, Item)>,
    last_enqueued: Moment,
    done: bool,
}

impl EdgeQueue {
    fn new() -> Self {
        EdgeQueue {
            queue: VecDeque::new(),
            last_enqueued: Moment::MIN,
            done: false,
        }
    }

    fn push(&mut self, time: Moment, item: Item) {
        self.last_enqueued = self.last_enqueued.max(time);
        self.queue.push_back((time, item));
    }
}

/// Merges N upstream edges into one time-ordered event sequence.
///
/// Push methods enqueue one item and return every event that became
/// deliverable as a result; consecutive points are coalesced into a single
/// [`Event::Points`] batch.
#[derive(Debug)]
pub struct FanIn {
    edges: Vec<EdgeQueue>,
    last_emitted: Option<Moment>,
    last_mark: Option<Moment>,
    last_tick: Option<Moment>,
    eof_emitted: bool,
}

impl FanIn {
    /// Create a merge over `inputs` edges
    pub fn new(inputs: usize) -> Self {
        FanIn {
            edges: (0..inputs).map(|_| EdgeQueue::new()).collect(),
            last_emitted: None,
            last_mark: None,
            last_tick: None,
            eof_emitted: false,
        }
    }

    /// Number of edges being merged
    pub fn input_count(&self) -> usize {
        self.edges.len()
    }

    /// The latest timestamp already emitted (the merge watermark)
    pub fn watermark(&self) -> Option<Moment> {
        self.last_emitted
    }

    /// Enqueue a batch of points from one edge and drain
    pub fn push_points(&mut self, from: InputId, points: Vec<Point>) -> Vec<Event> {
        for point in points {
            // Timeless points inherit their edge's last seen time so they
            // keep FIFO position without advancing the watermark.
            let effective = point.time().unwrap_or(self.edges[from].last_enqueued);
            self.edges[from].push(effective, Item::Point(point));
        }
        self.drain()
    }

    /// Enqueue a mark from one edge and drain
    pub fn push_mark(&mut self, from: InputId, time: Moment) -> Vec<Event> {
        self.edges[from].push(time, Item::Mark(time));
        self.drain()
    }

    /// Enqueue a tick from one edge and drain
    pub fn push_tick(&mut self, from: InputId, time: Moment) -> Vec<Event> {
        self.edges[from].push(time, Item::Tick(time));
        self.drain()
    }

    /// Enqueue eof from one edge and drain
    pub fn push_eof(&mut self, from: InputId) -> Vec<Event> {
        self.edges[from].push(Moment::MAX, Item::Eof);
        self.drain()
    }

    /// Enqueue any event from one edge and drain
    pub fn push_event(&mut self, from: InputId, event: Event) -> Vec<Event> {
        match event {
            Event::Points(points) => self.push_points(from, points),
            Event::Mark(time) => self.push_mark(from, time),
            Event::Tick(time) => self.push_tick(from, time),
            Event::Eof => self.push_eof(from),
        }
    }

    /// True once every edge has delivered eof
    pub fn finished(&self) -> bool {
        self.edges.iter().all(|e| e.done)
    }

    fn earliest_edge(&self) -> Option<usize> {
        let mut best: Option<(usize, Moment, u8)> = None;
        for (idx, edge) in self.edges.iter().enumerate() {
            if let Some((time, item)) = edge.queue.front() {
                let rank = kind_rank(item);
                match best {
                    Some((_, bt, br)) if (bt, br) <= (*time, rank) => {}
                    _ => best = Some((idx, *time, rank)),
                }
            }
        }
        best.map(|(idx, _, _)| idx)
    }

    fn can_drain(&self) -> bool {
        let Some(idx) = self.earliest_edge() else {
            return false;
        };
        // Every edge must have a queued item (done edges never will and do
        // not block), or the earliest head must tie the watermark so ties
        // resolve without waiting on a currently-empty edge.
        let all_ready = self
            .edges
            .iter()
            .all(|e| e.done || !e.queue.is_empty());
        if all_ready {
            return true;
        }
        let head_time = self.edges[idx].queue.front().map(|(t, _)| *t);
        head_time.is_some() && head_time == self.last_emitted
    }

    fn drain(&mut self) -> Vec<Event> {
        let mut out = Vec::new();
        let mut batch: Vec<Point> = Vec::new();

        while self.can_drain() {
            let idx = match self.earliest_edge() {
                Some(idx) => idx,
                None => break,
            };
            let (time, item) = self.edges[idx].queue.pop_front().unwrap();
            match item {
                Item::Point(point) => {
                    if point.time().is_some() {
                        self.last_emitted = Some(match self.last_emitted {
                            Some(last) => last.max(time),
                            None => time,
                        });
                    }
                    batch.push(point);
                }
                Item::Mark(mark) => {
                    if self.last_mark.map_or(true, |last| mark > last) {
                        if !batch.is_empty() {
                            out.push(Event::Points(std::mem::take(&mut batch)));
                        }
                        self.last_mark = Some(mark);
                        self.last_emitted = Some(match self.last_emitted {
                            Some(last) => last.max(mark),
                            None => mark,
                        });
                        out.push(Event::Mark(mark));
                    }
                }
                Item::Tick(tick) => {
                    if self.last_tick.map_or(true, |last| tick > last) {
                        if !batch.is_empty() {
                            out.push(Event::Points(std::mem::take(&mut batch)));
                        }
                        self.last_tick = Some(tick);
                        out.push(Event::Tick(tick));
                    }
                }
                Item::Eof => {
                    self.edges[idx].done = true;
                    if self.finished() && !self.eof_emitted {
                        self.eof_emitted = true;
                        if !batch.is_empty() {
                            out.push(Event::Points(std::mem::take(&mut batch)));
                        }
                        out.push(Event::Eof);
                    }
                }
            }
        }

        if !batch.is_empty() {
            out.push(Event::Points(batch));
        }
        out
    }
}
