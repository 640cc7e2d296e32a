//! # doyac-engine
//!
//! The mutable search state and the three traversal strategies built on
//! top of the read-only [`doyac_model::Model`]: a forward interleaving
//! search (§4.H), a backward goal-binding search (§4.I), and an alternative
//! constraint-list matcher used for bounded derivability queries (§4.J).
//! Claim evaluation, intruder knowledge, the attack minimiser and the
//! hide-level pruning oracle are shared by all three.

pub mod backward;
pub mod claims;
pub mod constraint;
pub mod context;
pub mod counters;
pub mod error;
pub mod forward;
pub mod hidelevel;
pub mod knowledge;
pub mod minimise;
pub mod runs;

pub use backward::{BackwardEngine, BackwardOptions};
pub use claims::ClaimStatus;
pub use context::SearchContext;
pub use counters::Counters;
pub use error::{EngineError, EngineResult};
pub use forward::{Attack, AttackStep, ForwardEngine, ForwardOptions, Verdict};
pub use hidelevel::HideLevel;
pub use knowledge::Knowledge;
pub use runs::{Run, RunTable, Trace, TraceStep};

/// Which traversal strategy a driver selected, matching §6's "traversal
/// method" CLI switch.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Traversal {
    Forward,
    Backward,
}

/// Runs the selected engine to completion. A thin dispatch point so a
/// driver only has to build one options record per traversal kind and
/// doesn't need to know about [`ForwardEngine`]/[`BackwardEngine`]
/// directly.
pub fn verify(
    model: &doyac_model::Model,
    traversal: Traversal,
    forward_opts: ForwardOptions,
    backward_opts: BackwardOptions,
) -> EngineResult<Verdict> {
    match traversal {
        Traversal::Forward => ForwardEngine::new(model, forward_opts).run(),
        Traversal::Backward => BackwardEngine::new(model, backward_opts).run(),
    }
}
