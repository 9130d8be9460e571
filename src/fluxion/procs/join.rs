//! Temporal relational join.
//!
//! Joins N input edges on a set of key fields, producing results that are
//! independent of arrival order while preserving causality and strict
//! output-timestamp monotonicity.
//!
//! Each edge keeps a queue of *input groups*: maximal runs of points
//! sharing an effective timestamp — a single instant for unbatched edges,
//! or everything between two marks for batched edges (stamped with the
//! closing mark, so results never precede their inputs). A group's
//! lifecycle is queued → live (head of queue) → complete (a strictly later
//! item closed it) → ready (qualifies to join) → expired (discarded,
//! exactly once).
//!
//! The drive loop recomputes the edge predicates from the current queue
//! heads, discards expired groups, forces progress when every edge's next
//! group is knowable but no join can fire, and joins once every edge is
//! ready. The join itself buckets each edge's live points by the key
//! fields and emits the per-key cartesian product with last-write field
//! union, stamped with the leader's live time.
//!
//! Eof is modeled as a +infinity group on the edge; the join's own eof
//! fires once every non-table edge is at eof.

use std::collections::{HashMap, VecDeque};

use crate::fluxion::runtime::error::{RuntimeError, RuntimeResult};
use crate::fluxion::runtime::graph::{InputId, Proc, ProcBase};
use crate::fluxion::runtime::time::{Moment, Span};
use crate::fluxion::runtime::types::{Point, Value};

/// Options for [`JoinProc`].
#[derive(Debug, Clone, Default)]
pub struct JoinOptions {
    /// Join-key fields. Empty means a pure temporal zip: all live points
    /// fall into one bucket.
    pub fields: Vec<String>,
    /// Each input group joins at most once
    pub zip: bool,
    /// Maximum age of a follower group relative to the leader; older
    /// groups are expired unmatched. Mutually exclusive with `zip`.
    pub max_offset: Option<Span>,
    /// Index of the outer edge: its rows are preserved unmatched and its
    /// live time stamps the output
    pub outer: Option<usize>,
    /// Input indexes treated as timeless tables: they match the best
    /// available version and never gate progress or eof
    pub tables: Vec<usize>,
}

#[derive(Debug)]
struct InputGroup {
    start: Moment,
    complete: Option<Moment>,
    points: Vec<Point>,
    joined: bool,
}

impl InputGroup {
    fn eof_sentinel() -> Self {
        InputGroup {
            start: Moment::MAX,
            complete: Some(Moment::MAX),
            points: Vec::new(),
            joined: false,
        }
    }

    fn is_sentinel(&self) -> bool {
        !self.start.finite() && self.points.is_empty()
    }
}

#[derive(Debug)]
struct JoinInput {
    table: bool,
    batched: bool,
    queue: VecDeque<InputGroup>,
    pending_batch: Vec<Point>,
    lower_bound: Moment,
    eof: bool,
    warned_missing_key: bool,
}

impl JoinInput {
    fn new(table: bool) -> Self {
        JoinInput {
            table,
            batched: false,
            queue: VecDeque::new(),
            pending_batch: Vec::new(),
            lower_bound: Moment::MIN,
            eof: false,
            warned_missing_key: false,
        }
    }

    /// The live group: the queue head, unless that is the eof sentinel.
    fn live(&self) -> Option<&InputGroup> {
        self.queue.front().filter(|g| !g.is_sentinel())
    }

    fn live_time(&self) -> Option<Moment> {
        self.live().map(|g| g.start)
    }

    /// The following group's effective timestamp, once knowable.
    fn next_time(&self) -> Option<Moment> {
        self.queue.get(1).map(|g| g.start)
    }

    /// True when the next group is known to start strictly after `t`.
    fn next_exceeds(&self, t: Moment) -> bool {
        match self.next_time() {
            Some(next) => next > t,
            None => self.lower_bound > t,
        }
    }

    /// No live data and none can ever arrive.
    fn exhausted(&self) -> bool {
        self.eof && self.live().is_none() && self.pending_batch.is_empty()
    }

    fn close_open_group(&mut self, at: Moment) {
        if let Some(back) = self.queue.back_mut() {
            if back.complete.is_none() && at > back.start {
                back.complete = Some(at);
            }
        }
    }

    fn add_point(&mut self, point: Point, warn: &mut dyn FnMut(String)) {
        let time = point.time().unwrap_or(self.lower_bound);
        if time < self.lower_bound {
            warn(format!(
                "dropping out-of-order point at {} (watermark {})",
                time, self.lower_bound
            ));
            return;
        }
        self.lower_bound = time;
        if self.batched {
            self.pending_batch.push(point);
            return;
        }
        match self.queue.back_mut() {
            Some(back) if back.complete.is_none() && back.start == time => {
                back.points.push(point);
            }
            _ => {
                self.close_open_group(time);
                self.queue.push_back(InputGroup {
                    start: time,
                    complete: None,
                    points: vec![point],
                    joined: false,
                });
            }
        }
    }

    fn add_mark(&mut self, time: Moment) {
        self.lower_bound = self.lower_bound.max(time);
        if !self.batched {
            // First mark flips the edge to batched; any per-instant groups
            // already queued close here.
            self.batched = true;
            self.close_open_group(time);
        }
        if !self.pending_batch.is_empty() {
            // The batch is stamped with its closing mark, so the result of
            // joining it can never precede its points.
            let points = std::mem::take(&mut self.pending_batch);
            self.queue.push_back(InputGroup {
                start: time,
                complete: Some(time),
                points,
                joined: false,
            });
        }
    }

    fn add_tick(&mut self, time: Moment) {
        self.lower_bound = self.lower_bound.max(time);
        self.close_open_group(time);
    }

    fn add_eof(&mut self) {
        if self.eof {
            return;
        }
        self.eof = true;
        if !self.pending_batch.is_empty() {
            // A batch cut short by eof closes at the last time seen.
            let points = std::mem::take(&mut self.pending_batch);
            let start = self.lower_bound;
            self.queue.push_back(InputGroup {
                start,
                complete: Some(start),
                points,
                joined: false,
            });
        }
        self.close_open_group(Moment::MAX);
        self.queue.push_back(InputGroup::eof_sentinel());
    }
}

/// Temporal n-way relational join proc.
pub struct JoinProc {
    base: ProcBase,
    options: JoinOptions,
    inputs: Vec<JoinInput>,
    last_output: Option<Moment>,
    eof_sent: bool,
}

impl JoinProc {
    /// Validate option combinations and build the join. Contradictions
    /// involving edge indexes are checked at start, once all edges are
    /// known.
    pub fn new(options: JoinOptions) -> RuntimeResult<Self> {
        if options.zip && options.max_offset.is_some() {
            return Err(RuntimeError::config_error(
                "join",
                "zip and max_offset are mutually exclusive",
            ));
        }
        if let Some(offset) = &options.max_offset {
            if !offset.is_positive() {
                return Err(RuntimeError::config_error(
                    "join",
                    format!("max_offset must be positive, got {}", offset),
                ));
            }
        }
        if let Some(outer) = options.outer {
            if options.tables.contains(&outer) {
                return Err(RuntimeError::config_error(
                    "join",
                    "the outer edge cannot be a table",
                ));
            }
        }
        Ok(JoinProc {
            base: ProcBase::new("join"),
            options,
            inputs: Vec::new(),
            last_output: None,
            eof_sent: false,
        })
    }

    fn leader_time(&self) -> Option<Moment> {
        self.inputs
            .iter()
            .filter(|i| !i.table)
            .filter_map(|i| i.live_time())
            .max()
    }

    /// The timestamp that would stamp the next result: the outer edge's
    /// live time under outer, the leader's otherwise.
    fn output_time(&self) -> Option<Moment> {
        match self.options.outer {
            Some(outer) => self.inputs[outer].live_time(),
            None => self.leader_time(),
        }
    }

    fn is_ready(&self, idx: usize) -> bool {
        let input = &self.inputs[idx];
        if input.table {
            return input
                .queue
                .front()
                .map_or(false, |g| !g.is_sentinel() && g.complete.is_some());
        }
        let Some(live) = input.live() else {
            return false;
        };
        if live.complete.is_none() {
            return false;
        }
        let Some(leader_time) = self.leader_time() else {
            return false;
        };
        if live.start == leader_time {
            // Leader: joins only strictly past the last output, which is
            // what makes output timestamps strictly increasing.
            self.last_output.map_or(true, |last| live.start > last)
        } else {
            // Follower: provably the newest usable match.
            input.next_exceeds(leader_time)
        }
    }

    fn is_expired(&self, idx: usize) -> bool {
        let input = &self.inputs[idx];
        let Some(live) = input.live() else {
            return false;
        };
        if input.table {
            // A table version is superseded once a newer complete version
            // is already usable at the leader's time.
            return match (input.next_time(), self.leader_time()) {
                (Some(next), Some(leader)) => next.finite() && next <= leader,
                _ => false,
            };
        }
        // (a) a better own-edge match exists for some other live group
        if let Some(next) = input.next_time() {
            let other_live = self
                .inputs
                .iter()
                .enumerate()
                .filter(|(i, other)| *i != idx && !other.table)
                .filter_map(|(_, other)| other.live_time())
                .max();
            if let Some(other) = other_live {
                if next <= other {
                    return true;
                }
            }
        }
        // (b) zip mode: already joined once
        if self.options.zip {
            if let Some(last) = self.last_output {
                if live.start <= last {
                    return true;
                }
            }
        }
        // (c) too old relative to the current leader
        if let Some(offset) = &self.options.max_offset {
            if let Some(leader) = self.leader_time() {
                if live.start < leader.sub_span(offset) {
                    return true;
                }
            }
        }
        false
    }

    fn all_ready(&self) -> bool {
        match self.options.outer {
            Some(outer) => {
                // The outer edge drives; every other edge must be ready or
                // provably out of data.
                self.is_ready(outer)
                    && self
                        .inputs
                        .iter()
                        .enumerate()
                        .all(|(i, input)| {
                            i == outer || self.is_ready(i) || input.exhausted()
                        })
            }
            None => {
                if self.inputs.iter().any(|i| !i.table && i.exhausted()) {
                    // A drained edge can never contribute again; no
                    // further inner joins are possible.
                    return false;
                }
                self.inputs
                    .iter()
                    .enumerate()
                    .all(|(i, _)| self.is_ready(i))
            }
        }
    }

    /// True when every edge's next group is knowable, so discarding a
    /// group provably cannot lose a better match. An edge with no live
    /// group and no eof may still produce anything; it blocks forcing.
    fn can_force_progress(&self) -> bool {
        self.inputs.iter().all(|input| {
            input.table
                || input.exhausted()
                || (input.live().is_some() && input.next_time().is_some())
        })
    }

    fn force_progress(&mut self) -> bool {
        match self.options.outer {
            Some(outer) => {
                let input = &mut self.inputs[outer];
                let Some(front) = input.queue.front() else {
                    return false;
                };
                if front.is_sentinel() || front.complete.is_none() {
                    return false;
                }
                let group = input.queue.pop_front().unwrap();
                if !group.joined {
                    // Outer rows emit exactly once even when unmatched.
                    self.emit_unmatched_outer(group);
                }
                true
            }
            None => {
                // Discard the group with the globally earliest next time.
                let victim = self
                    .inputs
                    .iter()
                    .enumerate()
                    .filter(|(_, input)| !input.table && input.live().is_some())
                    .filter_map(|(i, input)| input.next_time().map(|n| (n, i)))
                    .min_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));
                match victim {
                    Some((_, idx)) => {
                        self.inputs[idx].queue.pop_front();
                        true
                    }
                    None => false,
                }
            }
        }
    }

    fn emit_unmatched_outer(&mut self, group: InputGroup) {
        let time = group.start;
        if let Some(last) = self.last_output {
            if time <= last {
                return;
            }
        }
        let mut out = Vec::with_capacity(group.points.len());
        for point in group.points {
            let mut p = point;
            p.set_time(time);
            out.push(p);
        }
        self.last_output = Some(time);
        let batched = self.inputs[self.options.outer.unwrap()].batched;
        self.base.emit(out);
        if batched {
            self.base.emit_mark(time);
        }
    }

    /// Bucket one edge's live points by the join-key fields.
    fn bucket(&mut self, idx: usize) -> HashMap<Vec<Value>, Vec<Point>> {
        let fields = self.options.fields.clone();
        let input = &mut self.inputs[idx];
        let mut buckets: HashMap<Vec<Value>, Vec<Point>> = HashMap::new();
        let Some(live) = input.queue.front() else {
            return buckets;
        };
        for point in &live.points {
            if fields.is_empty() {
                buckets.entry(Vec::new()).or_default().push(point.clone());
                continue;
            }
            let mut key = Vec::with_capacity(fields.len());
            let mut missing = false;
            for field in &fields {
                match point.get(field) {
                    Some(v) => key.push(v.clone()),
                    None => {
                        missing = true;
                        break;
                    }
                }
            }
            if missing {
                if !input.warned_missing_key {
                    input.warned_missing_key = true;
                    self.base
                        .warn("skipping point missing a join field".to_string());
                }
                continue;
            }
            buckets.entry(key).or_default().push(point.clone());
        }
        buckets
    }

    fn emit_join(&mut self) {
        let Some(output_time) = self.output_time() else {
            return;
        };
        let outer = self.options.outer;

        // Participating edges in input order. Under outer join a non-table
        // edge whose live data is newer than the output time contributes
        // nothing: results never contain points from their own future.
        let n = self.inputs.len();
        let mut buckets = Vec::with_capacity(n);
        for idx in 0..n {
            let future = outer.is_some()
                && Some(idx) != outer
                && !self.inputs[idx].table
                && self.inputs[idx]
                    .live_time()
                    .map_or(false, |t| t > output_time);
            if future {
                buckets.push(HashMap::new());
            } else {
                buckets.push(self.bucket(idx));
            }
        }

        // The key universe: outer edge's keys under outer, the
        // intersection across all edges otherwise.
        let driver = outer.unwrap_or(0);
        let mut keys: Vec<Vec<Value>> = buckets[driver].keys().cloned().collect();
        if outer.is_none() {
            keys.retain(|key| buckets.iter().all(|b| b.contains_key(key)));
        }
        // Deterministic output order regardless of hash iteration.
        keys.sort_by(|a, b| {
            a.iter()
                .zip(b.iter())
                .map(|(x, y)| x.total_cmp(y))
                .find(|o| *o != std::cmp::Ordering::Equal)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut out = Vec::new();
        for key in keys {
            // Cartesian product across edges, folding last-write unions in
            // edge order.
            let mut rows: Vec<Point> = vec![Point::new()];
            for bucket in buckets.iter() {
                let Some(matches) = bucket.get(&key) else {
                    // Under outer join a missing edge contributes nothing;
                    // inner keys were already intersected.
                    continue;
                };
                let mut next = Vec::with_capacity(rows.len() * matches.len());
                for row in &rows {
                    for point in matches {
                        next.push(row.union(point));
                    }
                }
                rows = next;
            }
            for mut row in rows {
                row.set_time(output_time);
                out.push(row);
            }
        }

        for input in self.inputs.iter_mut() {
            if let Some(front) = input.queue.front_mut() {
                front.joined = true;
            }
        }

        // Strictly increasing by construction: the ready predicate only
        // lets a join fire past the last output.
        self.last_output = Some(output_time);

        let mark = self
            .inputs
            .iter()
            .filter(|i| !i.table)
            .any(|i| i.batched && i.live_time() == Some(output_time));
        self.base.emit(out);
        if mark {
            self.base.emit_mark(output_time);
        }

        if let Some(outer) = outer {
            // Outer groups emit exactly once: retire the driver now rather
            // than waiting for the progress-forcing discard.
            self.inputs[outer].queue.pop_front();
        }
    }

    /// The drive loop: discard expired groups, force progress where the
    /// predicates allow, join when every edge is ready, stop when more
    /// input is needed.
    fn advance(&mut self) {
        loop {
            let mut discarded = false;
            for idx in 0..self.inputs.len() {
                while self.is_expired(idx) {
                    let group = self.inputs[idx].queue.pop_front().unwrap();
                    if Some(idx) == self.options.outer && !group.joined {
                        // Even an expired outer group surfaces its rows.
                        self.emit_unmatched_outer(group);
                    }
                    discarded = true;
                }
            }
            if discarded {
                continue;
            }
            if self.all_ready() {
                self.emit_join();
                continue;
            }
            if self.can_force_progress() && self.force_progress() {
                continue;
            }
            break;
        }
        self.maybe_eof();
    }

    fn maybe_eof(&mut self) {
        if self.eof_sent {
            return;
        }
        // Tables never gate eof, unless every edge is a table.
        let mut gated = self.inputs.iter().filter(|i| !i.table);
        let done = if self.inputs.iter().all(|i| i.table) {
            self.inputs.iter().all(|i| i.eof)
        } else {
            gated.all(|i| i.eof)
        };
        if done {
            self.eof_sent = true;
            self.base.emit_eof();
        }
    }
}

impl Proc for JoinProc {
    fn base(&self) -> &ProcBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ProcBase {
        &mut self.base
    }

    fn start(&mut self) -> RuntimeResult<()> {
        let n = self.base.input_count();
        if n < 2 {
            return Err(RuntimeError::join_error(format!(
                "join requires at least two inputs, got {}",
                n
            )));
        }
        if let Some(outer) = self.options.outer {
            if outer >= n {
                return Err(RuntimeError::join_error(format!(
                    "outer references input {} but only {} are wired",
                    outer, n
                )));
            }
        }
        for table in &self.options.tables {
            if *table >= n {
                return Err(RuntimeError::join_error(format!(
                    "table references input {} but only {} are wired",
                    table, n
                )));
            }
        }
        self.inputs = (0..n)
            .map(|i| JoinInput::new(self.options.tables.contains(&i)))
            .collect();
        Ok(())
    }

    fn consume(&mut self, points: Vec<Point>, from: InputId) {
        let base = &self.base;
        let input = &mut self.inputs[from];
        let mut warn = |msg: String| base.warn(msg);
        for point in points {
            input.add_point(point, &mut warn);
        }
        self.advance();
    }

    fn consume_mark(&mut self, time: Moment, from: InputId) {
        self.inputs[from].add_mark(time);
        self.advance();
    }

    fn consume_tick(&mut self, time: Moment, from: InputId) {
        self.inputs[from].add_tick(time);
        self.advance();
        if !self.eof_sent {
            self.base.emit_tick(time);
        }
    }

    fn consume_eof(&mut self, from: InputId) {
        self.inputs[from].add_eof();
        self.advance();
    }
}
