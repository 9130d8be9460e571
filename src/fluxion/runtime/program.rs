//! Program controller: the outer driver of a proc graph.
//!
//! A [`Program`] owns the nodes, the shared warning collector, the
//! cooperative scheduler, and the teardown generation counter. `start`
//! validates the graph shape — every head must be a source, every terminal
//! node must be a sink — and gives each node its start hook; `run` pumps
//! the sources to exhaustion, draining the scheduler between rounds, until
//! every sink reports done; `deactivate` tears the graph down exactly once
//! via the generation-counter traversal.

use std::cell::RefCell;
use std::rc::Rc;

use super::error::{RuntimeError, RuntimeResult, Warnings};
use super::graph::{self, InputId, Proc, ProcHandle};
use super::scheduler::Scheduler;
use super::time::Moment;
use super::types::Point;

/// One batch drawn from a source.
pub struct ReadResult {
    /// The points read, in time order
    pub points: Vec<Point>,
    /// True when the source has no more data
    pub done: bool,
}

/// The adapter-facing read contract every source-type node implements.
///
/// `limit` is the self-throttle: implementations return at most that many
/// points per invocation and keep their own cursor between calls.
pub trait Source {
    /// Read the next batch within `[from, to)`
    fn read(&mut self, from: &Moment, to: &Moment, limit: usize) -> RuntimeResult<ReadResult>;
}

/// Owns and drives a proc graph.
pub struct Program {
    nodes: Vec<ProcHandle>,
    warnings: Warnings,
    scheduler: Scheduler,
    generation: u64,
    started: bool,
}

impl Program {
    /// Create an empty program
    pub fn new() -> Self {
        Program {
            nodes: Vec::new(),
            warnings: Warnings::new(),
            scheduler: Scheduler::new(),
            generation: 0,
            started: false,
        }
    }

    /// Add a proc to the program, returning its typed handle. The proc is
    /// attached to the program's warning collector and scheduler.
    pub fn add<P: Proc + 'static>(&mut self, proc: P) -> Rc<RefCell<P>> {
        let handle = Rc::new(RefCell::new(proc));
        let dyn_handle: ProcHandle = handle.clone();
        handle.borrow_mut().base_mut().attach(
            self.warnings.clone(),
            self.scheduler.clone(),
            Rc::downgrade(&dyn_handle),
        );
        self.nodes.push(dyn_handle);
        handle
    }

    /// Wire `upstream`'s default output to `downstream`
    pub fn connect<A: Proc + 'static, B: Proc + 'static>(
        &mut self,
        upstream: &Rc<RefCell<A>>,
        downstream: &Rc<RefCell<B>>,
    ) -> RuntimeResult<InputId> {
        let up: ProcHandle = upstream.clone();
        let down: ProcHandle = downstream.clone();
        graph::connect(&up, &down)
    }

    /// Wire a named output of `upstream` to `downstream`
    pub fn shortcut<A: Proc + 'static, B: Proc + 'static>(
        &mut self,
        upstream: &Rc<RefCell<A>>,
        out_name: &str,
        downstream: &Rc<RefCell<B>>,
    ) -> RuntimeResult<InputId> {
        let up: ProcHandle = upstream.clone();
        let down: ProcHandle = downstream.clone();
        graph::shortcut(&up, out_name, &down)
    }

    /// Graph heads: nodes with no registered inputs
    pub fn get_sources(&self) -> Vec<ProcHandle> {
        self.nodes
            .iter()
            .filter(|n| n.borrow().base().input_count() == 0)
            .cloned()
            .collect()
    }

    /// Sink-typed nodes
    pub fn get_sinks(&self) -> Vec<ProcHandle> {
        self.nodes
            .iter()
            .filter(|n| n.borrow().is_sink())
            .cloned()
            .collect()
    }

    /// Terminal nodes: nodes with no downstream edges
    pub fn get_terminal_nodes(&self) -> Vec<ProcHandle> {
        self.nodes
            .iter()
            .filter(|n| !n.borrow().base().has_outputs())
            .cloned()
            .collect()
    }

    /// The shared warning collector
    pub fn warnings(&self) -> &Warnings {
        &self.warnings
    }

    /// Validate the graph shape and start every node.
    pub fn start(&mut self) -> RuntimeResult<()> {
        if self.started {
            return Err(RuntimeError::graph_error("program already started"));
        }
        for head in self.get_sources() {
            if !head.borrow().is_source() {
                return Err(RuntimeError::graph_error(format!(
                    "graph head '{}' is not a source",
                    head.borrow().base().name()
                )));
            }
        }
        for terminal in self.get_terminal_nodes() {
            if !terminal.borrow().is_sink() {
                return Err(RuntimeError::graph_error(format!(
                    "terminal node '{}' is not a sink",
                    terminal.borrow().base().name()
                )));
            }
        }
        for node in &self.nodes {
            node.borrow_mut().start()?;
        }
        self.started = true;
        Ok(())
    }

    /// Drive the program to completion: pump every source until exhausted,
    /// drain the scheduler between rounds, and verify every sink is done.
    pub fn run(&mut self) -> RuntimeResult<()> {
        if !self.started {
            return Err(RuntimeError::graph_error("program not started"));
        }
        let sources = self.get_sources();
        loop {
            let mut all_done = true;
            for source in &sources {
                if !source.borrow_mut().pump()? {
                    all_done = false;
                }
            }
            self.scheduler.run_until_idle();
            if all_done {
                break;
            }
        }
        // Deferred continuations may cascade; drain until quiet.
        while !self.scheduler.is_idle() {
            self.scheduler.run_until_idle();
        }
        for sink in self.get_sinks() {
            if !sink.borrow().done() {
                return Err(RuntimeError::graph_error(format!(
                    "sink '{}' did not complete",
                    sink.borrow().base().name()
                )));
            }
        }
        Ok(())
    }

    /// Tear down every reachable node exactly once. Safe to call more than
    /// once; later calls use a fresh generation and find torn-down nodes.
    pub fn deactivate(&mut self) {
        self.generation += 1;
        let heads = self.get_sources();
        graph::deactivate(&heads, self.generation);
    }
}

impl Default for Program {
    fn default() -> Self {
        Self::new()
    }
}
