//! # doyac-term
//!
//! The symbolic term algebra: leaves, encryptions and tuples, the variable
//! binding store, termlists/termmaps, and unification. This crate has no
//! notion of protocols, runs-as-executions, or search — it is the algebra
//! everything else is built on.

pub mod keys;
pub mod list;
pub mod term;
pub mod unify;

pub use keys::{inverse_key, KeyTable};
pub use list::{basics_of, local_rename, variables_of, MapStatus, TermList, TermMap};
pub use term::{
    deep_duplicate, deref, distance, duplicate, duplicate_without_variables, is_subterm, normalize,
    occurs, size, term_cmp, term_eq, Bindings, Leaf, LeafKind, RunId, Term, Trail, VarId,
    GLOBAL_RUN,
};
pub use unify::{interm_unify, unify, MatchMode, TypeTable, UnifyError};
