//! Cooperative task queue.
//!
//! Execution in the runtime is single-threaded and event-driven: every
//! `consume` call runs synchronously to completion. The only suspension
//! mechanism is this queue — a proc that must yield (epoch advancement
//! chunking, paced delivery) pushes a continuation here and returns; the
//! program controller drains the queue between source read rounds.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

type Task = Box<dyn FnOnce()>;

/// A shared FIFO of deferred continuations.
///
/// Cloning the scheduler clones the handle, not the queue: every proc in a
/// program shares one queue.
#[derive(Clone, Default)]
pub struct Scheduler {
    queue: Rc<RefCell<VecDeque<Task>>>,
}

impl Scheduler {
    /// Create an empty scheduler
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a continuation to run on the next drain
    pub fn schedule(&self, task: impl FnOnce() + 'static) {
        self.queue.borrow_mut().push_back(Box::new(task));
    }

    /// True when no work is queued
    pub fn is_idle(&self) -> bool {
        self.queue.borrow().is_empty()
    }

    /// Run queued tasks until the queue is empty, including tasks scheduled
    /// by the tasks themselves. Returns the number of tasks run.
    pub fn run_until_idle(&self) -> usize {
        let mut ran = 0;
        loop {
            // The borrow must not be held while the task runs: tasks
            // re-enter the scheduler to push continuations.
            let task = self.queue.borrow_mut().pop_front();
            match task {
                Some(task) => {
                    task();
                    ran += 1;
                }
                None => return ran,
            }
        }
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("queued", &self.queue.borrow().len())
            .finish()
    }
}
