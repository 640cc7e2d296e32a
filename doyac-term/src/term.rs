//! Term algebra: leaves, encryptions, tuples, and the variable binding store.
//!
//! A leaf is identified by `(symbol, run-id)` — the same symbol used in two
//! different runs denotes two distinct leaves. Variable leaves additionally
//! carry a [`VarId`], an index into a [`Bindings`] table holding the mutable
//! binding cell. Everything else (constants, local names, encryptions,
//! tuples) is structurally immutable once built, so compound terms share
//! their children through `Rc` rather than copying them.

use doyac_base::Symbol;
use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

/// The run a leaf belongs to, or [`RunId::INTRUDER`]/[`RunId::GLOBAL`] for
/// leaves that are not local to any protocol run.
pub type RunId = i32;

/// A leaf that is not local to any run (protocol constants, role names
/// before instantiation).
pub const GLOBAL_RUN: RunId = -1;

/// What a leaf stands for.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum LeafKind {
    /// A protocol constant or agent name.
    Constant,
    /// A fresh name local to a run (a nonce).
    Local,
}

/// The `(symbol, run-id)` pair that identifies a leaf.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Leaf {
    pub symbol: Symbol,
    pub run: RunId,
}

impl Leaf {
    pub fn new(symbol: Symbol, run: RunId) -> Self {
        Leaf { symbol, run }
    }
}

/// An index into a [`Bindings`] table's binding cells.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct VarId(pub u32);

/// A symbolic term: a leaf, an encryption, or a tuple.
///
/// Compound nodes hold their children behind `Rc` so that `duplicate`
/// (shallow, shares children) and structural sharing during unification are
/// cheap clones rather than deep copies.
#[derive(Clone, Debug)]
pub enum Term {
    Const(Leaf),
    Local(Leaf),
    /// A variable leaf: its binding identity and declared type constraints
    /// live in the owning [`Bindings`] table, indexed by `VarId`.
    Var(Leaf, VarId),
    Encrypt(Rc<Term>, Rc<Term>),
    Tuple(Rc<Term>, Rc<Term>),
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
enum Kind {
    Leaf,
    Encrypt,
    Tuple,
}

fn kind_of(t: &Term) -> Kind {
    match t {
        Term::Const(_) | Term::Local(_) | Term::Var(..) => Kind::Leaf,
        Term::Encrypt(..) => Kind::Encrypt,
        Term::Tuple(..) => Kind::Tuple,
    }
}

/// Sub-ordering among the three leaf variants, used by [`term_cmp`].
fn leaf_variant_rank(t: &Term) -> u8 {
    match t {
        Term::Const(_) => 0,
        Term::Local(_) => 1,
        Term::Var(..) => 2,
        _ => unreachable!("leaf_variant_rank called on a non-leaf"),
    }
}

impl Term {
    pub fn op(&self) -> Option<&Rc<Term>> {
        match self {
            Term::Encrypt(op, _) => Some(op),
            _ => None,
        }
    }

    pub fn key(&self) -> Option<&Rc<Term>> {
        match self {
            Term::Encrypt(_, key) => Some(key),
            _ => None,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Term::Const(_) | Term::Local(_) | Term::Var(..))
    }

    pub fn is_variable(&self) -> bool {
        matches!(self, Term::Var(..))
    }

    pub fn leaf(&self) -> Option<Leaf> {
        match self {
            Term::Const(l) | Term::Local(l) | Term::Var(l, _) => Some(*l),
            _ => None,
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Const(l) => write!(f, "#{}@{}", l.symbol.index(), l.run),
            Term::Local(l) => write!(f, "~{}@{}", l.symbol.index(), l.run),
            Term::Var(l, v) => write!(f, "?{}@{}#{}", l.symbol.index(), l.run, v.0),
            Term::Encrypt(op, key) => write!(f, "{{{}}}{}", op, key),
            Term::Tuple(l, r) => write!(f, "({},{})", l, r),
        }
    }
}

/// The mutable variable binding store, indexed by [`VarId`].
///
/// This is the replacement for the mutable-cell-on-the-leaf-node design the
/// term algebra would otherwise use: binding cells are separated from the
/// term tree so that terms can be freely cloned and shared via `Rc` without
/// aliasing mutable state. Every entry also records its declared type list
/// (empty = unconstrained), consulted by the `typed` match mode.
///
/// A model's role variables are declared once against a template
/// `Bindings` at load time; each search clones it so every run of the
/// search starts from the same `VarId` layout without sharing mutable
/// state across searches (see `doyac_model::Model::bindings`).
#[derive(Clone)]
pub struct Bindings {
    cells: Vec<Option<Term>>,
    types: Vec<Vec<Symbol>>,
}

impl Bindings {
    pub fn new() -> Self {
        Bindings {
            cells: Vec::new(),
            types: Vec::new(),
        }
    }

    /// Allocates a fresh variable leaf with an unbound cell.
    pub fn fresh_var(&mut self, symbol: Symbol, run: RunId, types: Vec<Symbol>) -> Term {
        let id = VarId(self.cells.len() as u32);
        self.cells.push(None);
        self.types.push(types);
        Term::Var(Leaf::new(symbol, run), id)
    }

    pub fn get(&self, id: VarId) -> Option<&Term> {
        self.cells[id.0 as usize].as_ref()
    }

    pub fn is_bound(&self, id: VarId) -> bool {
        self.cells[id.0 as usize].is_some()
    }

    pub fn set(&mut self, id: VarId, t: Term) {
        self.cells[id.0 as usize] = Some(t);
    }

    pub fn clear(&mut self, id: VarId) {
        self.cells[id.0 as usize] = None;
    }

    pub fn types_of(&self, id: VarId) -> &[Symbol] {
        &self.types[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Drops every cell allocated after `len`. Used when a run is
    /// destroyed to free the fresh variables its instantiation allocated;
    /// callers must ensure no surviving term still references a `VarId`
    /// at or beyond `len`.
    pub fn truncate(&mut self, len: usize) {
        self.cells.truncate(len);
        self.types.truncate(len);
    }
}

impl Default for Bindings {
    fn default() -> Self {
        Self::new()
    }
}

/// Undo log for variable bindings, so backtracking engines can unwind to a
/// previous mark without tracking which cells they touched.
#[derive(Default)]
pub struct Trail {
    marks: Vec<VarId>,
}

impl Trail {
    pub fn new() -> Self {
        Trail { marks: Vec::new() }
    }

    /// Returns an opaque mark that [`Trail::undo_to`] can later rewind to.
    pub fn mark(&self) -> usize {
        self.marks.len()
    }

    /// Binds `id` to `t` and records it on the trail.
    pub fn bind(&mut self, bindings: &mut Bindings, id: VarId, t: Term) {
        bindings.set(id, t);
        self.marks.push(id);
    }

    /// Clears every binding made since `mark`, in reverse order.
    pub fn undo_to(&mut self, bindings: &mut Bindings, mark: usize) {
        while self.marks.len() > mark {
            let id = self.marks.pop().expect("marks.len() > mark");
            bindings.clear(id);
        }
    }

    pub fn len(&self) -> usize {
        self.marks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.marks.is_empty()
    }
}

/// Follows variable bindings until reaching an unbound variable or a
/// non-variable term.
pub fn deref(bindings: &Bindings, t: &Term) -> Term {
    let mut cur = t.clone();
    loop {
        match cur {
            Term::Var(_, id) => match bindings.get(id) {
                Some(bound) => cur = bound.clone(),
                None => return cur,
            },
            other => return other,
        }
    }
}

/// Structural equality on dereferenced terms.
///
/// Short-circuits via `Rc` pointer identity for compound terms, which
/// catches the common case of comparing a term against itself or against a
/// shared subterm without recursing.
pub fn term_eq(bindings: &Bindings, a: &Term, b: &Term) -> bool {
    let a = deref(bindings, a);
    let b = deref(bindings, b);
    match (&a, &b) {
        (Term::Const(l1), Term::Const(l2)) => l1 == l2,
        (Term::Local(l1), Term::Local(l2)) => l1 == l2,
        (Term::Var(_, id1), Term::Var(_, id2)) => id1 == id2,
        (Term::Encrypt(o1, k1), Term::Encrypt(o2, k2)) => {
            Rc::ptr_eq(o1, o2) && Rc::ptr_eq(k1, k2)
                || (term_eq(bindings, o1, o2) && term_eq(bindings, k1, k2))
        }
        (Term::Tuple(l1, r1), Term::Tuple(l2, r2)) => {
            Rc::ptr_eq(l1, l2) && Rc::ptr_eq(r1, r2)
                || (term_eq(bindings, l1, l2) && term_eq(bindings, r1, r2))
        }
        _ => false,
    }
}

/// Occurrence check: does `needle` occur anywhere within `haystack`
/// (including being equal to it)?
pub fn occurs(bindings: &Bindings, needle: &Term, haystack: &Term) -> bool {
    if term_eq(bindings, needle, haystack) {
        return true;
    }
    match deref(bindings, haystack) {
        Term::Encrypt(op, key) => occurs(bindings, needle, &op) || occurs(bindings, needle, &key),
        Term::Tuple(l, r) => occurs(bindings, needle, &l) || occurs(bindings, needle, &r),
        _ => false,
    }
}

/// Alias kept for readers coming from the spec's `t ⊑ t'` notation: is `a`
/// a subterm of (or equal to) `b`?
pub fn is_subterm(bindings: &Bindings, a: &Term, b: &Term) -> bool {
    occurs(bindings, a, b)
}

/// Rewrites `((a,b),c) -> (a,(b,c))` bottom-up. Idempotent: re-normalising a
/// normal form returns an equal term.
pub fn normalize(bindings: &Bindings, t: &Term) -> Term {
    let t = deref(bindings, t);
    match t {
        Term::Tuple(l, r) => {
            let l = normalize(bindings, &l);
            let r = normalize(bindings, &r);
            match l {
                Term::Tuple(ll, lr) => {
                    let rest = Term::Tuple(lr, Rc::new(r));
                    normalize(bindings, &Term::Tuple(ll, Rc::new(rest)))
                }
                other => Term::Tuple(Rc::new(other), Rc::new(r)),
            }
        }
        Term::Encrypt(op, key) => Term::Encrypt(
            Rc::new(normalize(bindings, &op)),
            Rc::new(normalize(bindings, &key)),
        ),
        other => other,
    }
}

/// Number of nodes in the dereferenced term tree.
pub fn size(bindings: &Bindings, t: &Term) -> usize {
    match deref(bindings, t) {
        Term::Encrypt(op, key) => 1 + size(bindings, &op) + size(bindings, &key),
        Term::Tuple(l, r) => 1 + size(bindings, &l) + size(bindings, &r),
        _ => 1,
    }
}

/// Structural distance in `[0, 1]`. 1 for equal terms; for unequal terms of
/// equal kind, the arithmetic mean of the children's distances (0 for
/// unequal leaves); for unequal kinds, the ratio of sizes if one is a
/// subterm of the other, else 0.
pub fn distance(bindings: &Bindings, a: &Term, b: &Term) -> f64 {
    if term_eq(bindings, a, b) {
        return 1.0;
    }
    let da = deref(bindings, a);
    let db = deref(bindings, b);
    if kind_of(&da) == kind_of(&db) {
        match (da, db) {
            (Term::Encrypt(o1, k1), Term::Encrypt(o2, k2)) => {
                (distance(bindings, &o1, &o2) + distance(bindings, &k1, &k2)) / 2.0
            }
            (Term::Tuple(l1, r1), Term::Tuple(l2, r2)) => {
                (distance(bindings, &l1, &l2) + distance(bindings, &r1, &r2)) / 2.0
            }
            _ => 0.0,
        }
    } else if is_subterm(bindings, &da, &db) {
        size(bindings, &da) as f64 / size(bindings, &db) as f64
    } else if is_subterm(bindings, &db, &da) {
        size(bindings, &db) as f64 / size(bindings, &da) as f64
    } else {
        0.0
    }
}

/// Total order over dereferenced terms, used to canonicalise symmetric
/// choices (agent-symmetry, read-symmetry, order-symmetry reductions).
/// Orders by kind, then symbol, then run-id, then recurses into children.
pub fn term_cmp(bindings: &Bindings, a: &Term, b: &Term) -> Ordering {
    let a = deref(bindings, a);
    let b = deref(bindings, b);
    let (ka, kb) = (kind_of(&a), kind_of(&b));
    if ka != kb {
        return ka.cmp(&kb);
    }
    match (&a, &b) {
        (Term::Encrypt(o1, k1), Term::Encrypt(o2, k2)) => term_cmp(bindings, o1, o2)
            .then_with(|| term_cmp(bindings, k1, k2)),
        (Term::Tuple(l1, r1), Term::Tuple(l2, r2)) => {
            term_cmp(bindings, l1, l2).then_with(|| term_cmp(bindings, r1, r2))
        }
        _ => {
            let (ra, rb) = (leaf_variant_rank(&a), leaf_variant_rank(&b));
            ra.cmp(&rb).then_with(|| {
                let (la, lb) = (a.leaf().unwrap(), b.leaf().unwrap());
                la.symbol.cmp(&lb.symbol).then_with(|| la.run.cmp(&lb.run))
            })
        }
    }
}

/// Shallow copy: the returned term has the same shape but shares its
/// children with `t`. Since compound nodes already hold `Rc` children,
/// this is just a clone.
pub fn duplicate(t: &Term) -> Term {
    t.clone()
}

/// Recursively rebuilds every compound node, following variable bindings as
/// it goes, producing a tree that shares nothing with `t`'s unbound
/// ancestry save the leaves themselves.
pub fn deep_duplicate(bindings: &Bindings, t: &Term) -> Term {
    match deref(bindings, t) {
        Term::Encrypt(op, key) => Term::Encrypt(
            Rc::new(deep_duplicate(bindings, &op)),
            Rc::new(deep_duplicate(bindings, &key)),
        ),
        Term::Tuple(l, r) => Term::Tuple(
            Rc::new(deep_duplicate(bindings, &l)),
            Rc::new(deep_duplicate(bindings, &r)),
        ),
        other => other,
    }
}

/// Inlines every *existing* binding so the result contains no bound
/// variable indirections (variables with no binding are left as-is: there
/// is nothing to inline).
pub fn duplicate_without_variables(bindings: &Bindings, t: &Term) -> Term {
    deep_duplicate(bindings, t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use doyac_base::Interner;

    fn sym(interner: &mut Interner, s: &str) -> Symbol {
        interner.intern(s)
    }

    #[test]
    fn equal_constants_compare_equal() {
        let mut interner = Interner::new();
        let bindings = Bindings::new();
        let a = sym(&mut interner, "Alice");
        let t1 = Term::Const(Leaf::new(a, GLOBAL_RUN));
        let t2 = Term::Const(Leaf::new(a, GLOBAL_RUN));
        assert!(term_eq(&bindings, &t1, &t2));
    }

    #[test]
    fn deref_follows_chain_of_bindings() {
        let mut interner = Interner::new();
        let mut bindings = Bindings::new();
        let na = sym(&mut interner, "Na");
        let var = bindings.fresh_var(na, 0, vec![]);
        let id = match var {
            Term::Var(_, id) => id,
            _ => unreachable!(),
        };
        let target = Term::Const(Leaf::new(na, 0));
        bindings.set(id, target.clone());
        let resolved = deref(&bindings, &var);
        assert!(term_eq(&bindings, &resolved, &target));
    }

    #[test]
    fn trail_undoes_bindings_in_reverse() {
        let mut interner = Interner::new();
        let mut bindings = Bindings::new();
        let mut trail = Trail::new();
        let na = sym(&mut interner, "Na");
        let var = bindings.fresh_var(na, 0, vec![]);
        let id = match var {
            Term::Var(_, id) => id,
            _ => unreachable!(),
        };
        let mark = trail.mark();
        trail.bind(&mut bindings, id, Term::Const(Leaf::new(na, 0)));
        assert!(bindings.is_bound(id));
        trail.undo_to(&mut bindings, mark);
        assert!(!bindings.is_bound(id));
    }

    #[test]
    fn normalize_right_associates_tuples() {
        let mut interner = Interner::new();
        let bindings = Bindings::new();
        let a = Term::Const(Leaf::new(sym(&mut interner, "a"), GLOBAL_RUN));
        let b = Term::Const(Leaf::new(sym(&mut interner, "b"), GLOBAL_RUN));
        let c = Term::Const(Leaf::new(sym(&mut interner, "c"), GLOBAL_RUN));
        let left_heavy = Term::Tuple(
            Rc::new(Term::Tuple(Rc::new(a.clone()), Rc::new(b.clone()))),
            Rc::new(c.clone()),
        );
        let normalized = normalize(&bindings, &left_heavy);
        match normalized {
            Term::Tuple(l, r) => {
                assert!(term_eq(&bindings, &l, &a));
                match &*r {
                    Term::Tuple(rl, rr) => {
                        assert!(term_eq(&bindings, rl, &b));
                        assert!(term_eq(&bindings, rr, &c));
                    }
                    _ => panic!("expected nested tuple"),
                }
            }
            _ => panic!("expected tuple"),
        }
    }

    #[test]
    fn normalize_is_idempotent() {
        let mut interner = Interner::new();
        let bindings = Bindings::new();
        let a = Term::Const(Leaf::new(sym(&mut interner, "a"), GLOBAL_RUN));
        let b = Term::Const(Leaf::new(sym(&mut interner, "b"), GLOBAL_RUN));
        let t = Term::Tuple(Rc::new(a), Rc::new(b));
        let once = normalize(&bindings, &t);
        let twice = normalize(&bindings, &once);
        assert!(term_eq(&bindings, &once, &twice));
    }

    #[test]
    fn distance_of_equal_terms_is_one() {
        let mut interner = Interner::new();
        let bindings = Bindings::new();
        let a = Term::Const(Leaf::new(sym(&mut interner, "a"), GLOBAL_RUN));
        assert_eq!(distance(&bindings, &a, &a), 1.0);
    }

    #[test]
    fn distance_of_unequal_leaves_is_zero() {
        let mut interner = Interner::new();
        let bindings = Bindings::new();
        let a = Term::Const(Leaf::new(sym(&mut interner, "a"), GLOBAL_RUN));
        let b = Term::Const(Leaf::new(sym(&mut interner, "b"), GLOBAL_RUN));
        assert_eq!(distance(&bindings, &a, &b), 0.0);
    }

    #[test]
    fn subterm_distance_is_size_ratio() {
        let mut interner = Interner::new();
        let bindings = Bindings::new();
        let a = Term::Const(Leaf::new(sym(&mut interner, "a"), GLOBAL_RUN));
        let b = Term::Const(Leaf::new(sym(&mut interner, "b"), GLOBAL_RUN));
        let pair = Term::Tuple(Rc::new(a.clone()), Rc::new(b));
        assert_eq!(distance(&bindings, &a, &pair), 1.0 / 3.0);
    }

    #[test]
    fn occurs_check_finds_nested_variable() {
        let mut interner = Interner::new();
        let mut bindings = Bindings::new();
        let na = sym(&mut interner, "Na");
        let var = bindings.fresh_var(na, 0, vec![]);
        let k = Term::Const(Leaf::new(sym(&mut interner, "k"), GLOBAL_RUN));
        let enc = Term::Encrypt(Rc::new(var.clone()), Rc::new(k));
        assert!(occurs(&bindings, &var, &enc));
    }
}
