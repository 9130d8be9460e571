//! Identity proc.
//!
//! Forwards everything unchanged. Used as a wiring junction when combining
//! graph fragments, and as the neutral element in graph tests.

use crate::fluxion::runtime::graph::{Proc, ProcBase};

/// Forwards all traffic unchanged via the default protocol.
pub struct PassProc {
    base: ProcBase,
}

impl PassProc {
    /// Create an identity proc
    pub fn new() -> Self {
        PassProc {
            base: ProcBase::new("pass"),
        }
    }
}

impl Default for PassProc {
    fn default() -> Self {
        Self::new()
    }
}

impl Proc for PassProc {
    fn base(&self) -> &ProcBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ProcBase {
        &mut self.base
    }
}
