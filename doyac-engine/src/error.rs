//! Internal invariant violations.
//!
//! [`EngineError`] is not a surface for ordinary search outcomes — running
//! out of runs, failing to find an attack, a claim being skipped, all of
//! that is represented in the verdict the engines return. This type is for
//! conditions that indicate a bug in the engine itself (an index the run
//! table promised would exist but doesn't, a claim event with no
//! [`doyac_model::ClaimInfo`] attached). Callers that hit one should treat
//! it as fatal.
//!
//! # Error Categories
//!
//! | Category | Variants | Meaning |
//! |----------|----------|---------|
//! | Run table | `InvalidRunId`, `EmptyRunTable` | run bookkeeping violated |
//! | Trail | `TrailUnderflow` | backtrack past a mark that was never set |
//! | Model | `MissingClaimInfo` | a claim event had no claim payload |

use doyac_term::RunId;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// A run id was used that the run table never allocated.
    InvalidRunId(RunId),
    /// `destroy_last_run` was called with no runs instantiated.
    EmptyRunTable,
    /// A backtrack tried to undo past a mark the trail never recorded.
    TrailUnderflow,
    /// A claim event reached the evaluator with no `ClaimInfo` attached.
    MissingClaimInfo,
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::InvalidRunId(id) => write!(f, "run id {} was never allocated", id),
            EngineError::EmptyRunTable => {
                write!(f, "destroy_last_run called with no runs instantiated")
            }
            EngineError::TrailUnderflow => {
                write!(f, "backtrack mark does not correspond to a recorded trail position")
            }
            EngineError::MissingClaimInfo => {
                write!(f, "claim event has no associated ClaimInfo")
            }
        }
    }
}

impl std::error::Error for EngineError {}

pub type EngineResult<T> = Result<T, EngineError>;
