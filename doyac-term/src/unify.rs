//! Most general unification, parameterised by match mode, and the
//! subterm-enumerating variant the backward engine builds goals from.

use crate::term::{deref, Bindings, Leaf, RunId, Term, Trail, VarId};
use doyac_base::Symbol;
use rustc_hash::FxHashMap;

/// Controls what a variable may be bound to during unification.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum MatchMode {
    /// A variable may be bound only to a leaf whose declared type is among
    /// the variable's declared type list (or the variable is untyped).
    Typed,
    /// A variable may be bound to any leaf, ignoring declared types.
    Basic,
    /// A variable may be bound to any term, including compounds.
    Untyped,
}

/// Declared leaf types, consulted by [`MatchMode::Typed`].
///
/// Kept separate from [`Term`]/[`Leaf`] (rather than adding a type field to
/// every leaf) for the same reason [`crate::keys::KeyTable`] is separate:
/// most leaves never participate in a typed unification, so the cost of
/// tracking a type is paid only by the protocols that declare one.
#[derive(Default)]
pub struct TypeTable {
    types: FxHashMap<(Symbol, RunId), Symbol>,
}

impl TypeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare(&mut self, leaf: Leaf, ty: Symbol) {
        self.types.insert((leaf.symbol, leaf.run), ty);
    }

    pub fn type_of(&self, leaf: Leaf) -> Option<Symbol> {
        self.types.get(&(leaf.symbol, leaf.run)).copied()
    }
}

/// Why a unification attempt failed. Distinct from an empty binding list:
/// "no bindings were needed" (e.g. unifying a constant with itself) is a
/// success, not a failure.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum UnifyError {
    /// Binding the variable would make it occur within its own value.
    OccursCheck,
    /// Two non-variable leaves with different identity.
    LeafMismatch,
    /// Compound terms of different shape (tuple vs. encryption, or the
    /// kind disagreement surfaces structurally).
    KindMismatch,
    /// The candidate value is not a valid substitution under the active
    /// match mode (e.g. a compound value under `basic`/`typed`, or a leaf
    /// of the wrong declared type under `typed`).
    InvalidForMode,
}

impl std::fmt::Display for UnifyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            UnifyError::OccursCheck => "occurs check failed",
            UnifyError::LeafMismatch => "leaves do not match",
            UnifyError::KindMismatch => "term kinds do not match",
            UnifyError::InvalidForMode => "substitution not valid for active match mode",
        };
        write!(f, "{}", msg)
    }
}

impl std::error::Error for UnifyError {}

/// Attempts to unify `a` and `b` under `mode`. On success, every binding
/// made is recorded on `trail` (so the caller undoes them at its own pace);
/// on failure, any bindings made during the attempt are undone before
/// returning, so a failed call is side-effect free.
pub fn unify(
    bindings: &mut Bindings,
    trail: &mut Trail,
    mode: MatchMode,
    types: &TypeTable,
    a: &Term,
    b: &Term,
) -> Result<(), UnifyError> {
    let mark = trail.mark();
    match unify_inner(bindings, trail, mode, types, a, b) {
        Ok(()) => Ok(()),
        Err(e) => {
            trail.undo_to(bindings, mark);
            Err(e)
        }
    }
}

fn unify_inner(
    bindings: &mut Bindings,
    trail: &mut Trail,
    mode: MatchMode,
    types: &TypeTable,
    a: &Term,
    b: &Term,
) -> Result<(), UnifyError> {
    let da = deref(bindings, a);
    let db = deref(bindings, b);
    if let Term::Var(_, id) = da {
        return bind_var(bindings, trail, mode, types, id, &db);
    }
    if let Term::Var(_, id) = db {
        return bind_var(bindings, trail, mode, types, id, &da);
    }
    match (&da, &db) {
        (Term::Const(l1), Term::Const(l2)) | (Term::Local(l1), Term::Local(l2)) => {
            if l1 == l2 {
                Ok(())
            } else {
                Err(UnifyError::LeafMismatch)
            }
        }
        (Term::Encrypt(o1, k1), Term::Encrypt(o2, k2)) => {
            unify_inner(bindings, trail, mode, types, o1, o2)?;
            unify_inner(bindings, trail, mode, types, k1, k2)
        }
        (Term::Tuple(l1, r1), Term::Tuple(l2, r2)) => {
            unify_inner(bindings, trail, mode, types, l1, l2)?;
            unify_inner(bindings, trail, mode, types, r1, r2)
        }
        _ => Err(UnifyError::KindMismatch),
    }
}

fn bind_var(
    bindings: &mut Bindings,
    trail: &mut Trail,
    mode: MatchMode,
    types: &TypeTable,
    id: VarId,
    value: &Term,
) -> Result<(), UnifyError> {
    if let Term::Var(_, id2) = value {
        if *id2 == id {
            return Ok(());
        }
    }
    if occurs_var(bindings, id, value) {
        return Err(UnifyError::OccursCheck);
    }
    if !valid_substitution(bindings, mode, types, id, value) {
        return Err(UnifyError::InvalidForMode);
    }
    trail.bind(bindings, id, value.clone());
    Ok(())
}

fn occurs_var(bindings: &Bindings, id: VarId, t: &Term) -> bool {
    match deref(bindings, t) {
        Term::Var(_, id2) => id2 == id,
        Term::Encrypt(op, key) => occurs_var(bindings, id, &op) || occurs_var(bindings, id, &key),
        Term::Tuple(l, r) => occurs_var(bindings, id, &l) || occurs_var(bindings, id, &r),
        _ => false,
    }
}

fn valid_substitution(
    bindings: &Bindings,
    mode: MatchMode,
    types: &TypeTable,
    id: VarId,
    value: &Term,
) -> bool {
    match mode {
        MatchMode::Untyped => true,
        MatchMode::Basic => value.is_leaf(),
        MatchMode::Typed => {
            let leaf = match deref(bindings, value).leaf() {
                Some(l) => l,
                None => return false,
            };
            let allowed = bindings.types_of(id);
            if allowed.is_empty() {
                return true;
            }
            match types.type_of(leaf) {
                Some(ty) => allowed.contains(&ty),
                None => false,
            }
        }
    }
}

/// Enumerates every subterm of `haystack` (including `haystack` itself) as
/// a unification candidate against `needle`, invoking `cont` once per
/// successful unification. Bindings made for a candidate are undone before
/// the next candidate is tried, so `cont` sees exactly the bindings from
/// its own candidate and nothing else.
///
/// This is the primitive the backward engine uses to bind a receive goal
/// against a send's message or any of its subterms.
pub fn interm_unify(
    bindings: &mut Bindings,
    trail: &mut Trail,
    mode: MatchMode,
    types: &TypeTable,
    needle: &Term,
    haystack: &Term,
    cont: &mut dyn FnMut(&mut Bindings, &mut Trail),
) {
    let mark = trail.mark();
    if unify(bindings, trail, mode, types, needle, haystack).is_ok() {
        cont(bindings, trail);
    }
    trail.undo_to(bindings, mark);

    match deref(bindings, haystack) {
        Term::Encrypt(op, key) => {
            interm_unify(bindings, trail, mode, types, needle, &op, cont);
            interm_unify(bindings, trail, mode, types, needle, &key, cont);
        }
        Term::Tuple(l, r) => {
            interm_unify(bindings, trail, mode, types, needle, &l, cont);
            interm_unify(bindings, trail, mode, types, needle, &r, cont);
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::term::GLOBAL_RUN;
    use doyac_base::Interner;
    use std::rc::Rc;

    #[test]
    fn unifies_variable_with_constant() {
        let mut interner = Interner::new();
        let mut bindings = Bindings::new();
        let mut trail = Trail::new();
        let types = TypeTable::new();
        let na = interner.intern("Na");
        let var = bindings.fresh_var(na, 0, vec![]);
        let k = Term::Const(Leaf::new(interner.intern("k"), GLOBAL_RUN));
        assert!(unify(&mut bindings, &mut trail, MatchMode::Untyped, &types, &var, &k).is_ok());
        assert_eq!(trail.len(), 1);
    }

    #[test]
    fn basic_mode_rejects_compound_substitution() {
        let mut interner = Interner::new();
        let mut bindings = Bindings::new();
        let mut trail = Trail::new();
        let types = TypeTable::new();
        let na = interner.intern("Na");
        let var = bindings.fresh_var(na, 0, vec![]);
        let a = Term::Const(Leaf::new(interner.intern("a"), GLOBAL_RUN));
        let b = Term::Const(Leaf::new(interner.intern("b"), GLOBAL_RUN));
        let pair = Term::Tuple(Rc::new(a), Rc::new(b));
        let result = unify(&mut bindings, &mut trail, MatchMode::Basic, &types, &var, &pair);
        assert_eq!(result, Err(UnifyError::InvalidForMode));
        assert_eq!(trail.len(), 0);
    }

    #[test]
    fn typed_mode_rejects_mismatched_type() {
        let mut interner = Interner::new();
        let mut bindings = Bindings::new();
        let mut trail = Trail::new();
        let mut types = TypeTable::new();
        let nonce_ty = interner.intern("Nonce");
        let agent_ty = interner.intern("Agent");
        let na = interner.intern("Na");
        let var = bindings.fresh_var(na, 0, vec![nonce_ty]);
        let alice_leaf = Leaf::new(interner.intern("Alice"), GLOBAL_RUN);
        types.declare(alice_leaf, agent_ty);
        let alice = Term::Const(alice_leaf);
        let result = unify(&mut bindings, &mut trail, MatchMode::Typed, &types, &var, &alice);
        assert_eq!(result, Err(UnifyError::InvalidForMode));
    }

    #[test]
    fn occurs_check_rejects_self_reference() {
        let mut interner = Interner::new();
        let mut bindings = Bindings::new();
        let mut trail = Trail::new();
        let types = TypeTable::new();
        let na = interner.intern("Na");
        let var = bindings.fresh_var(na, 0, vec![]);
        let k = Term::Const(Leaf::new(interner.intern("k"), GLOBAL_RUN));
        let enc = Term::Encrypt(Rc::new(var.clone()), Rc::new(k));
        let result = unify(
            &mut bindings,
            &mut trail,
            MatchMode::Untyped,
            &types,
            &var,
            &enc,
        );
        assert_eq!(result, Err(UnifyError::OccursCheck));
    }

    #[test]
    fn interm_unify_finds_a_matching_subterm() {
        let mut interner = Interner::new();
        let mut bindings = Bindings::new();
        let mut trail = Trail::new();
        let types = TypeTable::new();
        let na = interner.intern("Na");
        let a = Term::Const(Leaf::new(interner.intern("a"), GLOBAL_RUN));
        let var = bindings.fresh_var(na, 0, vec![]);
        let haystack = Term::Tuple(Rc::new(a.clone()), Rc::new(var.clone()));
        let mut hits = 0;
        interm_unify(
            &mut bindings,
            &mut trail,
            MatchMode::Untyped,
            &types,
            &a,
            &haystack,
            &mut |_, _| hits += 1,
        );
        assert_eq!(hits, 1);
        assert_eq!(trail.len(), 0);
    }
}
