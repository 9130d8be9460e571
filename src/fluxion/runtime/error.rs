//! Runtime Error Handling
//!
//! Two severities exist in the runtime. **Construction errors** — invalid
//! option combinations, impossible parameter ranges, bad wiring — are
//! returned synchronously while the graph is being built and are fatal: the
//! program never starts. **Runtime warnings** — out-of-order timestamps, a
//! missing group-by field, a type error inside a per-point expression — are
//! reported through a [`Warning`] side channel and the triggering point or
//! group is skipped; the stream continues.
//!
//! A small set of conditions discovered only once the whole graph is known
//! (for example a join `outer` option naming an input that was never wired)
//! are raised as runtime errors that terminate the affected node.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Errors raised while constructing or running a dataflow graph.
///
/// Each variant carries the context a caller needs to report the failure
/// without re-deriving it: the proc name for configuration problems, the
/// expected/actual pair for type mismatches, the field name for group-by
/// problems.
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeError {
    /// Invalid proc options: unknown option, contradictory combination,
    /// or a value outside the accepted range.
    ConfigError {
        /// Name of the proc being configured
        proc: String,
        /// Description of the configuration problem
        message: String,
    },

    /// Graph wiring errors: double-registered edges, a head that is not a
    /// source, a terminal node that is not a sink.
    GraphError {
        /// Description of the wiring problem
        message: String,
    },

    /// Value type mismatches during expression evaluation or arithmetic.
    TypeError {
        /// Expected type or kind of operand
        expected: String,
        /// Actual type encountered
        actual: String,
    },

    /// Invalid temporal arithmetic, such as quantizing by a span that
    /// mixes calendar months with fixed milliseconds.
    TimeError {
        /// Description of the temporal problem
        message: String,
    },

    /// Join configuration contradictions, including those discovered only
    /// once all edges are known. These terminate the join node.
    JoinError {
        /// Description of the join problem
        message: String,
    },

    /// A buffer or table exceeded its configured bound.
    ResourceError {
        /// Name of the constrained resource
        resource: String,
        /// Description of the constraint violation
        message: String,
    },
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeError::ConfigError { proc, message } => {
                write!(f, "invalid options for '{}': {}", proc, message)
            }
            RuntimeError::GraphError { message } => {
                write!(f, "graph error: {}", message)
            }
            RuntimeError::TypeError { expected, actual } => {
                write!(f, "type error: expected {}, got {}", expected, actual)
            }
            RuntimeError::TimeError { message } => {
                write!(f, "time error: {}", message)
            }
            RuntimeError::JoinError { message } => {
                write!(f, "join error: {}", message)
            }
            RuntimeError::ResourceError { resource, message } => {
                write!(f, "resource error for {}: {}", resource, message)
            }
        }
    }
}

impl std::error::Error for RuntimeError {}

impl RuntimeError {
    /// Create a configuration error for the named proc
    pub fn config_error(proc: impl Into<String>, message: impl Into<String>) -> Self {
        RuntimeError::ConfigError {
            proc: proc.into(),
            message: message.into(),
        }
    }

    /// Create a graph wiring error
    pub fn graph_error(message: impl Into<String>) -> Self {
        RuntimeError::GraphError {
            message: message.into(),
        }
    }

    /// Create a type error
    pub fn type_error(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        RuntimeError::TypeError {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create a temporal arithmetic error
    pub fn time_error(message: impl Into<String>) -> Self {
        RuntimeError::TimeError {
            message: message.into(),
        }
    }

    /// Create a join error
    pub fn join_error(message: impl Into<String>) -> Self {
        RuntimeError::JoinError {
            message: message.into(),
        }
    }

    /// Create a resource error
    pub fn resource_error(resource: impl Into<String>, message: impl Into<String>) -> Self {
        RuntimeError::ResourceError {
            resource: resource.into(),
            message: message.into(),
        }
    }
}

/// Result type for runtime operations
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// A non-fatal condition reported by a running proc.
///
/// Warnings flow to the program's [`Warnings`] collector and are logged;
/// the offending point or group is skipped or defaulted and the stream
/// continues.
#[derive(Debug, Clone, PartialEq)]
pub struct Warning {
    /// Name of the proc that raised the warning
    pub proc: String,
    /// Human-readable description
    pub message: String,
}

impl Warning {
    /// Create a warning attributed to the named proc
    pub fn new(proc: impl Into<String>, message: impl Into<String>) -> Self {
        Warning {
            proc: proc.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.proc, self.message)
    }
}

/// Shared collector for runtime warnings.
///
/// Every proc holds a clone of the handle; the program controller drains the
/// collected warnings after a run. Each warning is also emitted through the
/// `log` facade as it arrives.
#[derive(Debug, Clone, Default)]
pub struct Warnings {
    collected: Rc<RefCell<Vec<Warning>>>,
}

impl Warnings {
    /// Create an empty collector
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a warning and log it
    pub fn report(&self, warning: Warning) {
        log::warn!("{}", warning);
        self.collected.borrow_mut().push(warning);
    }

    /// Number of warnings collected so far
    pub fn len(&self) -> usize {
        self.collected.borrow().len()
    }

    /// True if no warnings have been collected
    pub fn is_empty(&self) -> bool {
        self.collected.borrow().is_empty()
    }

    /// Drain and return all collected warnings
    pub fn take(&self) -> Vec<Warning> {
        self.collected.borrow_mut().drain(..).collect()
    }

    /// Snapshot of the collected warnings without draining
    pub fn snapshot(&self) -> Vec<Warning> {
        self.collected.borrow().clone()
    }
}
