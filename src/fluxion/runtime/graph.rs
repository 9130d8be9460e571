//! Proc graph: node lifecycle, wiring, and the event propagation protocol.
//!
//! A program is a directed acyclic graph of procs. Upstream nodes push
//! traffic downstream by calling the `consume` family on each registered
//! edge; the default implementations forward unchanged to the `emit` family,
//! which fans out to every edge of the node's "default" output (or a named
//! output, when routing demands it).
//!
//! Wiring invariant: a downstream node is connected to a given upstream
//! output exactly once; double registration is a graph error.
//!
//! Teardown uses a generation-counter traversal: the controller stamps each
//! reachable node with a monotonically increasing generation id, so a node
//! reachable over multiple paths (diamond topologies, `combine`d fragments)
//! tears down exactly once.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use super::error::{RuntimeError, RuntimeResult, Warning, Warnings};
use super::scheduler::Scheduler;
use super::time::Moment;
use super::types::Point;

/// Unique identifier for graph nodes
pub type NodeId = u32;

/// Index of a registered input edge on a node
pub type InputId = usize;

/// Shared handle to a proc in the graph
pub type ProcHandle = Rc<RefCell<dyn Proc>>;

/// The output name used when no explicit routing is requested
pub const DEFAULT_OUT: &str = "default";

fn next_node_id() -> NodeId {
    use std::sync::atomic::{AtomicU32, Ordering};
    static NEXT: AtomicU32 = AtomicU32::new(1);
    NEXT.fetch_add(1, Ordering::Relaxed)
}

/// One downstream connection of a named output.
pub struct Edge {
    /// The downstream node
    pub target: ProcHandle,
    /// The input registration on the downstream node; passed back as
    /// `from` on every consume call along this edge
    pub input: InputId,
}

/// Per-node bookkeeping shared by every proc implementation.
///
/// Holds the output edge lists, the input registrations, the teardown
/// generation stamp, and handles to the program-wide warning collector and
/// scheduler. Procs embed one `ProcBase` and expose it through
/// [`Proc::base`]/[`Proc::base_mut`].
///
/// Node ids are process-unique and assigned at construction, so wiring
/// checks work before a proc has joined a program.
pub struct ProcBase {
    name: &'static str,
    id: NodeId,
    outs: HashMap<String, Vec<Edge>>,
    ins: Vec<(NodeId, String)>,
    eof_seen: Vec<bool>,
    eof_done: bool,
    last_visited: u64,
    warnings: Warnings,
    scheduler: Scheduler,
    self_handle: Option<std::rc::Weak<RefCell<dyn Proc>>>,
}

impl ProcBase {
    /// Create a detached base for the named proc kind. The program assigns
    /// the shared handles when the proc is added.
    pub fn new(name: &'static str) -> Self {
        ProcBase {
            name,
            id: next_node_id(),
            outs: HashMap::new(),
            ins: Vec::new(),
            eof_seen: Vec::new(),
            eof_done: false,
            last_visited: 0,
            warnings: Warnings::default(),
            scheduler: Scheduler::default(),
            self_handle: None,
        }
    }

    /// Proc kind name, used in warnings and logs
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Node id within the owning program
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Called by the program when the proc joins a graph
    pub(crate) fn attach(
        &mut self,
        warnings: Warnings,
        scheduler: Scheduler,
        self_handle: std::rc::Weak<RefCell<dyn Proc>>,
    ) {
        self.warnings = warnings;
        self.scheduler = scheduler;
        self.self_handle = Some(self_handle);
    }

    /// Schedule this proc's [`Proc::wake`] on the shared task queue. A
    /// no-op for procs that never joined a program.
    pub fn schedule_wake(&self) {
        let Some(weak) = self.self_handle.clone() else {
            return;
        };
        self.scheduler.schedule(move || {
            if let Some(handle) = weak.upgrade() {
                handle.borrow_mut().wake();
            }
        });
    }

    /// The shared scheduler handle
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Report a warning attributed to this proc
    pub fn warn(&self, message: impl Into<String>) {
        self.warnings.report(Warning::new(self.name, message));
    }

    /// Number of registered input edges
    pub fn input_count(&self) -> usize {
        self.ins.len()
    }

    /// True when at least one downstream edge is registered on any output
    pub fn has_outputs(&self) -> bool {
        self.outs.values().any(|edges| !edges.is_empty())
    }

    /// Register an input edge from the given upstream output. Fails on
    /// double registration.
    fn register_input(&mut self, upstream: NodeId, out_name: &str) -> RuntimeResult<InputId> {
        if self
            .ins
            .iter()
            .any(|(id, out)| *id == upstream && out == out_name)
        {
            return Err(RuntimeError::graph_error(format!(
                "node {} is already connected to output '{}' of node {}",
                self.id, out_name, upstream
            )));
        }
        self.ins.push((upstream, out_name.to_string()));
        self.eof_seen.push(false);
        Ok(self.ins.len() - 1)
    }

    fn add_edge(&mut self, out_name: &str, edge: Edge) {
        self.outs.entry(out_name.to_string()).or_default().push(edge);
    }

    /// Record an eof arrival on the given edge. Returns true exactly once:
    /// when every registered input has reported eof.
    pub fn note_eof(&mut self, from: InputId) -> bool {
        if let Some(slot) = self.eof_seen.get_mut(from) {
            *slot = true;
        }
        if !self.eof_done && self.eof_seen.iter().all(|seen| *seen) {
            self.eof_done = true;
            return true;
        }
        false
    }

    /// Emit points on the default output
    pub fn emit(&self, points: Vec<Point>) {
        self.emit_to(DEFAULT_OUT, points);
    }

    /// Emit points on a named output, fanning out to every registered edge
    pub fn emit_to(&self, out: &str, points: Vec<Point>) {
        if points.is_empty() {
            return;
        }
        let Some(edges) = self.outs.get(out) else {
            return;
        };
        // The clone per extra edge is the copy-on-write convention: each
        // downstream owns its batch.
        for edge in &edges[1..] {
            edge.target.borrow_mut().consume(points.clone(), edge.input);
        }
        if let Some(edge) = edges.first() {
            edge.target.borrow_mut().consume(points, edge.input);
        }
    }

    /// Emit a batch-boundary mark on every output
    pub fn emit_mark(&self, time: Moment) {
        for edges in self.outs.values() {
            for edge in edges {
                edge.target.borrow_mut().consume_mark(time, edge.input);
            }
        }
    }

    /// Emit a time heartbeat on every output
    pub fn emit_tick(&self, time: Moment) {
        for edges in self.outs.values() {
            for edge in edges {
                edge.target.borrow_mut().consume_tick(time, edge.input);
            }
        }
    }

    /// Emit eof on every output
    pub fn emit_eof(&self) {
        for edges in self.outs.values() {
            for edge in edges {
                edge.target.borrow_mut().consume_eof(edge.input);
            }
        }
    }

    fn downstream_handles(&self) -> Vec<ProcHandle> {
        self.outs
            .values()
            .flat_map(|edges| edges.iter().map(|e| e.target.clone()))
            .collect()
    }
}

/// A graph vertex transforming the event stream.
///
/// The consume family is called by exactly one upstream per registered
/// edge; defaults forward unchanged, so a pass-through proc only overrides
/// what it transforms. Eof is withheld until every input edge has
/// delivered one.
pub trait Proc {
    /// The embedded bookkeeping
    fn base(&self) -> &ProcBase;

    /// Mutable access to the embedded bookkeeping
    fn base_mut(&mut self) -> &mut ProcBase;

    /// True for procs that originate data (graph heads must be sources)
    fn is_source(&self) -> bool {
        false
    }

    /// True for procs that terminate the graph (terminal nodes must sink)
    fn is_sink(&self) -> bool {
        false
    }

    /// Called once after wiring is complete and before any traffic flows
    fn start(&mut self) -> RuntimeResult<()> {
        Ok(())
    }

    /// Sources: emit the next self-throttled batch of traffic, returning
    /// true once the source is exhausted (its eof emitted). The program
    /// controller pumps sources until all report true. Non-sources are
    /// vacuously exhausted.
    fn pump(&mut self) -> RuntimeResult<bool> {
        Ok(true)
    }

    /// Sinks: true once eof has been fully processed downstream. The
    /// program resolves when every sink is done. Non-sinks are vacuously
    /// done.
    fn done(&self) -> bool {
        true
    }

    /// Data points arriving on one input edge
    fn consume(&mut self, points: Vec<Point>, from: InputId) {
        let _ = from;
        self.base().emit(points);
    }

    /// A batch-boundary mark arriving on one input edge
    fn consume_mark(&mut self, time: Moment, from: InputId) {
        let _ = from;
        self.base().emit_mark(time);
    }

    /// A time heartbeat arriving on one input edge
    fn consume_tick(&mut self, time: Moment, from: InputId) {
        let _ = from;
        self.base().emit_tick(time);
    }

    /// Eof arriving on one input edge; forwarded once all edges are done
    fn consume_eof(&mut self, from: InputId) {
        if self.base_mut().note_eof(from) {
            self.base().emit_eof();
        }
    }

    /// A scheduled continuation fired; procs that defer work override this
    fn wake(&mut self) {}

    /// Node-specific cleanup, invoked exactly once by the teardown traversal
    fn teardown(&mut self) {}
}

/// Wire `upstream`'s default output to a new input edge on `downstream`.
pub fn connect(upstream: &ProcHandle, downstream: &ProcHandle) -> RuntimeResult<InputId> {
    shortcut(upstream, DEFAULT_OUT, downstream)
}

/// Wire a named output of `upstream` to a new input edge on `downstream`.
pub fn shortcut(
    upstream: &ProcHandle,
    out_name: &str,
    downstream: &ProcHandle,
) -> RuntimeResult<InputId> {
    if Rc::ptr_eq(upstream, downstream) {
        return Err(RuntimeError::graph_error(
            "cannot connect a node to itself",
        ));
    }
    let upstream_id = upstream.borrow().base().id();
    let input = downstream
        .borrow_mut()
        .base_mut()
        .register_input(upstream_id, out_name)?;
    upstream.borrow_mut().base_mut().add_edge(
        out_name,
        Edge {
            target: downstream.clone(),
            input,
        },
    );
    Ok(input)
}

/// A graph fragment under construction: the nodes traffic enters through
/// (`heads`) and leaves through (`tails`).
///
/// Fragments are how the graph builder assembles a program: `then` chains
/// two fragments tail-to-head, `combine` merges two independently built
/// fragments into one cluster with the union of their heads and tails.
#[derive(Clone, Default)]
pub struct ProcChain {
    /// Entry nodes of the fragment
    pub heads: Vec<ProcHandle>,
    /// Exit nodes of the fragment
    pub tails: Vec<ProcHandle>,
}

impl ProcChain {
    /// A fragment containing a single node
    pub fn single(node: ProcHandle) -> Self {
        ProcChain {
            heads: vec![node.clone()],
            tails: vec![node],
        }
    }

    /// Connect every tail of `self` to every head of `next`, producing the
    /// combined fragment.
    pub fn then(self, next: ProcChain) -> RuntimeResult<ProcChain> {
        for tail in &self.tails {
            for head in &next.heads {
                connect(tail, head)?;
            }
        }
        Ok(ProcChain {
            heads: self.heads,
            tails: next.tails,
        })
    }

    /// Merge two independently built fragments into one logical cluster.
    pub fn combine(mut self, mut other: ProcChain) -> ProcChain {
        self.heads.append(&mut other.heads);
        self.tails.append(&mut other.tails);
        self
    }
}

/// Tear down every node reachable from `heads`, exactly once per node.
///
/// `generation` must be strictly greater than any generation previously
/// used on these nodes; the program controller maintains the counter.
pub fn deactivate(heads: &[ProcHandle], generation: u64) {
    for head in heads {
        deactivate_node(head, generation);
    }
}

fn deactivate_node(handle: &ProcHandle, generation: u64) {
    let downstream = {
        let mut node = handle.borrow_mut();
        if node.base().last_visited >= generation {
            return;
        }
        node.base_mut().last_visited = generation;
        log::debug!("tearing down {} node {}", node.base().name(), node.base().id());
        node.teardown();
        node.base().downstream_handles()
    };
    for next in downstream {
        deactivate_node(&next, generation);
    }
}
