//! The mutable search state threaded through both engines.
//!
//! This is the explicit replacement for the global `System sys` the
//! original C implementation relies on: every piece of mutable state
//! (bindings, the undo trail, the run table, the trace, the intruder's
//! global knowledge) lives in one place that is passed by reference,
//! rather than as ambient global state.

use crate::knowledge::Knowledge;
use crate::runs::{RunTable, Trace};
use doyac_model::Model;
use doyac_term::{Bindings, MatchMode, Trail};

/// Mutable search state, plus a read-only view of the protocol model and
/// the match mode unification should use.
pub struct SearchContext<'m> {
    pub model: &'m Model,
    pub mode: MatchMode,
    pub bindings: Bindings,
    pub trail: Trail,
    pub runs: RunTable,
    pub trace: Trace,
    /// The Dolev-Yao intruder's global knowledge. Unlike the per-run event
    /// cursor, knowledge is not partitioned by run: every run's sent
    /// messages feed the same intruder.
    pub knowledge: Knowledge,
}

impl<'m> SearchContext<'m> {
    pub fn new(model: &'m Model, mode: MatchMode) -> Self {
        let mut knowledge = Knowledge::new();
        // Clone rather than share: every role variable the model declared
        // keeps the `VarId` layout the loader built, but this search's
        // bindings are private to it.
        let bindings = model.bindings.clone();
        for t in model.initial_knowledge.iter() {
            knowledge.add(&bindings, &model.keys, t);
        }
        SearchContext {
            model,
            mode,
            bindings,
            trail: Trail::new(),
            runs: RunTable::new(),
            trace: Trace::new(),
            knowledge,
        }
    }

    /// A mark that captures the undo position of both the binding trail
    /// and the trace, for the common case of backtracking both together.
    pub fn mark(&self) -> (usize, usize) {
        (self.trail.mark(), self.trace.len())
    }

    pub fn undo_to(&mut self, mark: (usize, usize)) {
        self.trail.undo_to(&mut self.bindings, mark.0);
        self.trace.truncate_to(mark.1);
    }
}
