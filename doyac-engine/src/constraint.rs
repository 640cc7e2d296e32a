//! Constraint-list matcher (§4.J).
//!
//! An alternative to the forward engine's per-receive candidate
//! enumeration: rather than trying knowledge candidates against one
//! receive at a time, this solver holds an ordered list of outstanding
//! "derivability" constraints and repeatedly reduces the first
//! non-variable-headed one until the list is empty (success) or no
//! reduction applies (failure). It is exposed as a standalone derivability
//! query — not wired into the default CLI traversal (`DESIGN.md`) — for
//! secrecy checks under symbolic agents, where a single yes/no answer is
//! wanted without building a full trace.

use doyac_term::{deref, unify, Bindings, KeyTable, MatchMode, Term, Trail, TypeTable};

/// One outstanding "is this term derivable from the knowledge" obligation.
#[derive(Clone)]
struct Constraint(Term);

/// Attempts to derive every term in `goals` from `basics` (typically
/// `Knowledge::basic()`) using the constraint-reduction procedure of §4.J.
/// Returns whether every goal was solved; on success, any variable
/// bindings made remain on `bindings` (recorded on `trail`), on failure
/// they are undone.
pub fn derivable(
    bindings: &mut Bindings,
    trail: &mut Trail,
    mode: MatchMode,
    types: &TypeTable,
    keys: &KeyTable,
    knowledge_terms: &[Term],
    goals: &[Term],
) -> bool {
    let mark = trail.mark();
    let mut constraints: Vec<Constraint> = goals.iter().cloned().map(Constraint).collect();
    let ok = solve(bindings, trail, mode, types, keys, knowledge_terms, &mut constraints);
    if !ok {
        trail.undo_to(bindings, mark);
    }
    ok
}

fn solve(
    bindings: &mut Bindings,
    trail: &mut Trail,
    mode: MatchMode,
    types: &TypeTable,
    keys: &KeyTable,
    knowledge_terms: &[Term],
    constraints: &mut Vec<Constraint>,
) -> bool {
    let pos = constraints
        .iter()
        .position(|c| !matches!(deref(bindings, &c.0), Term::Var(..)));
    let index = match pos {
        None => return true,
        Some(i) => i,
    };
    let term = deref(bindings, &constraints[index].0);

    match &term {
        Term::Tuple(l, r) => {
            let mut next = constraints.clone();
            next.remove(index);
            next.push(Constraint((**l).clone()));
            next.push(Constraint((**r).clone()));
            solve(bindings, trail, mode, types, keys, knowledge_terms, &mut next)
        }
        Term::Encrypt(op, key) => {
            // Try unifying the whole ciphertext against a known term
            // first; if that fails, split into payload-known-via-key.
            for known in knowledge_terms {
                let mark = trail.mark();
                if unify(bindings, trail, mode, types, &term, known).is_ok() {
                    let mut next = constraints.clone();
                    next.remove(index);
                    if solve(bindings, trail, mode, types, keys, knowledge_terms, &mut next) {
                        return true;
                    }
                }
                trail.undo_to(bindings, mark);
            }
            if let Some(invkey) = doyac_term::inverse_key(bindings, keys, key) {
                let mut next = constraints.clone();
                next.remove(index);
                next.push(Constraint((**op).clone()));
                next.push(Constraint(invkey));
                if solve(bindings, trail, mode, types, keys, knowledge_terms, &mut next) {
                    return true;
                }
            }
            false
        }
        _ => {
            for known in knowledge_terms {
                let mark = trail.mark();
                if unify(bindings, trail, mode, types, &term, known).is_ok() {
                    let mut next = constraints.clone();
                    next.remove(index);
                    if solve(bindings, trail, mode, types, keys, knowledge_terms, &mut next) {
                        return true;
                    }
                }
                trail.undo_to(bindings, mark);
            }
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use doyac_base::Interner;
    use doyac_term::{Leaf, GLOBAL_RUN};
    use std::rc::Rc;

    #[test]
    fn tuple_derivable_iff_both_components_known() {
        let mut interner = Interner::new();
        let mut bindings = Bindings::new();
        let mut trail = Trail::new();
        let types = TypeTable::new();
        let keys = KeyTable::new();
        let a = Term::Const(Leaf::new(interner.intern("a"), GLOBAL_RUN));
        let b = Term::Const(Leaf::new(interner.intern("b"), GLOBAL_RUN));
        let pair = Term::Tuple(Rc::new(a.clone()), Rc::new(b.clone()));
        let known = [a, b];
        assert!(derivable(
            &mut bindings,
            &mut trail,
            MatchMode::Untyped,
            &types,
            &keys,
            &known,
            &[pair],
        ));
    }

    #[test]
    fn encrypted_term_derivable_via_inverse_key() {
        let mut interner = Interner::new();
        let mut bindings = Bindings::new();
        let mut trail = Trail::new();
        let types = TypeTable::new();
        let mut keys = KeyTable::new();
        let k_leaf = Leaf::new(interner.intern("k"), GLOBAL_RUN);
        keys.add_pair(k_leaf, k_leaf);
        let m = Term::Const(Leaf::new(interner.intern("m"), GLOBAL_RUN));
        let k = Term::Const(k_leaf);
        let enc = Term::Encrypt(Rc::new(m.clone()), Rc::new(k.clone()));
        let known = [m, k];
        assert!(derivable(
            &mut bindings,
            &mut trail,
            MatchMode::Untyped,
            &types,
            &keys,
            &known,
            &[enc],
        ));
    }

    #[test]
    fn missing_term_is_not_derivable() {
        let mut interner = Interner::new();
        let mut bindings = Bindings::new();
        let mut trail = Trail::new();
        let types = TypeTable::new();
        let keys = KeyTable::new();
        let a = Term::Const(Leaf::new(interner.intern("a"), GLOBAL_RUN));
        let b = Term::Const(Leaf::new(interner.intern("b"), GLOBAL_RUN));
        let known = [a];
        assert!(!derivable(
            &mut bindings,
            &mut trail,
            MatchMode::Untyped,
            &types,
            &keys,
            &known,
            &[b],
        ));
        assert_eq!(trail.len(), 0);
    }
}
