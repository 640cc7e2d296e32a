//! Term lists and the partial term-keyed map used by the synchronisation
//! checker.

use crate::term::{deref, term_eq, Bindings, Term};
use std::rc::Rc;

/// An ordered sequence of terms with O(n) membership testing.
///
/// Concatenation and removal are destructive (they mutate in place) but
/// never leak: there is no backing arena to free, everything is owned
/// `Vec` storage or shared `Rc` children.
#[derive(Clone, Default)]
pub struct TermList(Vec<Term>);

impl TermList {
    pub fn new() -> Self {
        TermList(Vec::new())
    }

    pub fn push(&mut self, t: Term) {
        self.0.push(t);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Term> {
        self.0.iter()
    }

    pub fn contains(&self, bindings: &Bindings, t: &Term) -> bool {
        self.0.iter().any(|x| term_eq(bindings, x, t))
    }

    /// Shallow copy with the order reversed.
    pub fn reversed(&self) -> TermList {
        let mut v = self.0.clone();
        v.reverse();
        TermList(v)
    }

    /// Destructively appends `other` to the end of `self`.
    pub fn concat(&mut self, mut other: TermList) {
        self.0.append(&mut other.0);
    }

    /// Destructively removes every element equal to `t`, returning how many
    /// were removed.
    pub fn delete(&mut self, bindings: &Bindings, t: &Term) -> usize {
        let before = self.0.len();
        self.0.retain(|x| !term_eq(bindings, x, t));
        before - self.0.len()
    }
}

impl From<Vec<Term>> for TermList {
    fn from(v: Vec<Term>) -> Self {
        TermList(v)
    }
}

impl<'a> IntoIterator for &'a TermList {
    type Item = &'a Term;
    type IntoIter = std::slice::Iter<'a, Term>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Collects the distinct unbound variables occurring in `t`, in the order
/// they are first encountered (by structural descent after dereferencing).
pub fn variables_of(bindings: &Bindings, t: &Term) -> TermList {
    let mut out = TermList::new();
    collect_variables(bindings, t, &mut out);
    out
}

fn collect_variables(bindings: &Bindings, t: &Term, out: &mut TermList) {
    let dt = deref(bindings, t);
    match &dt {
        Term::Var(..) => {
            if !out.contains(bindings, &dt) {
                out.push(dt);
            }
        }
        Term::Encrypt(op, key) => {
            collect_variables(bindings, op, out);
            collect_variables(bindings, key, out);
        }
        Term::Tuple(l, r) => {
            collect_variables(bindings, l, out);
            collect_variables(bindings, r, out);
        }
        _ => {}
    }
}

/// Collects the distinct leaves (constants, local names, and unbound
/// variables) occurring in `t`.
pub fn basics_of(bindings: &Bindings, t: &Term) -> TermList {
    let mut out = TermList::new();
    collect_basics(bindings, t, &mut out);
    out
}

fn collect_basics(bindings: &Bindings, t: &Term, out: &mut TermList) {
    let dt = deref(bindings, t);
    match &dt {
        Term::Encrypt(op, key) => {
            collect_basics(bindings, op, out);
            collect_basics(bindings, key, out);
        }
        Term::Tuple(l, r) => {
            collect_basics(bindings, l, out);
            collect_basics(bindings, r, out);
        }
        _ => {
            if !out.contains(bindings, &dt) {
                out.push(dt);
            }
        }
    }
}

/// Renames `t` by simultaneously substituting each `from[i]` found
/// (structurally) with `to[i]`. Used once, when a role's event list is
/// duplicated into a fresh run: `from` is the role-local names and
/// variables, `to` their per-run replacements.
pub fn local_rename(bindings: &Bindings, t: &Term, from: &TermList, to: &TermList) -> Term {
    let dt = deref(bindings, t);
    for (f, repl) in from.iter().zip(to.iter()) {
        if term_eq(bindings, &dt, f) {
            return repl.clone();
        }
    }
    match dt {
        Term::Encrypt(op, key) => Term::Encrypt(
            Rc::new(local_rename(bindings, &op, from, to)),
            Rc::new(local_rename(bindings, &key, from, to)),
        ),
        Term::Tuple(l, r) => Term::Tuple(
            Rc::new(local_rename(bindings, &l, from, to)),
            Rc::new(local_rename(bindings, &r, from, to)),
        ),
        other => other,
    }
}

/// Status of an entry in a [`TermMap`]. A key absent from the map
/// altogether is the third sentinel, "not in domain", represented as `None`
/// from [`TermMap::get`].
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum MapStatus {
    Todo,
    Good,
}

/// A partial map from terms to a small status value, used by the
/// synchronisation checker to track which preceding labels have been
/// matched. Lookup is O(n) like [`TermList`]; these maps are small
/// (one entry per preceding label of a claim).
#[derive(Default)]
pub struct TermMap {
    entries: Vec<(Term, MapStatus)>,
}

impl TermMap {
    pub fn new() -> Self {
        TermMap::default()
    }

    /// Inserts `key` with status `Todo` if it is not already present.
    pub fn insert_todo(&mut self, bindings: &Bindings, key: Term) {
        if self.get(bindings, &key).is_none() {
            self.entries.push((key, MapStatus::Todo));
        }
    }

    /// Returns `None` if `key` is not in the domain at all ("not in
    /// domain"), otherwise its current status ("to-do" or "good").
    pub fn get(&self, bindings: &Bindings, key: &Term) -> Option<MapStatus> {
        self.entries
            .iter()
            .find(|(k, _)| term_eq(bindings, k, key))
            .map(|(_, s)| *s)
    }

    /// Marks `key` as `Good`. Returns `false` if `key` was not in the
    /// domain.
    pub fn set_good(&mut self, bindings: &Bindings, key: &Term) -> bool {
        for (k, s) in self.entries.iter_mut() {
            if term_eq(bindings, k, key) {
                *s = MapStatus::Good;
                return true;
            }
        }
        false
    }

    pub fn all_good(&self) -> bool {
        self.entries.iter().all(|(_, s)| *s == MapStatus::Good)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::term::{Leaf, GLOBAL_RUN};
    use doyac_base::Interner;

    #[test]
    fn variables_of_deduplicates() {
        let mut interner = Interner::new();
        let mut bindings = Bindings::new();
        let na = interner.intern("Na");
        let var = bindings.fresh_var(na, 0, vec![]);
        let pair = Term::Tuple(Rc::new(var.clone()), Rc::new(var.clone()));
        let vars = variables_of(&bindings, &pair);
        assert_eq!(vars.len(), 1);
    }

    #[test]
    fn basics_of_collects_leaves_not_compounds() {
        let mut interner = Interner::new();
        let bindings = Bindings::new();
        let a = Term::Const(Leaf::new(interner.intern("a"), GLOBAL_RUN));
        let b = Term::Const(Leaf::new(interner.intern("b"), GLOBAL_RUN));
        let enc = Term::Encrypt(Rc::new(a.clone()), Rc::new(b.clone()));
        let basics = basics_of(&bindings, &enc);
        assert_eq!(basics.len(), 2);
    }

    #[test]
    fn local_rename_substitutes_positionally() {
        let mut interner = Interner::new();
        let bindings = Bindings::new();
        let role_name = Term::Const(Leaf::new(interner.intern("I"), GLOBAL_RUN));
        let run_name = Term::Const(Leaf::new(interner.intern("Alice"), 3));
        let from = TermList::from(vec![role_name.clone()]);
        let to = TermList::from(vec![run_name.clone()]);
        let renamed = local_rename(&bindings, &role_name, &from, &to);
        assert!(term_eq(&bindings, &renamed, &run_name));
    }

    #[test]
    fn term_map_tracks_todo_then_good() {
        let mut interner = Interner::new();
        let bindings = Bindings::new();
        let label = Term::Const(Leaf::new(interner.intern("L1"), GLOBAL_RUN));
        let mut map = TermMap::new();
        assert_eq!(map.get(&bindings, &label), None);
        map.insert_todo(&bindings, label.clone());
        assert_eq!(map.get(&bindings, &label), Some(MapStatus::Todo));
        assert!(!map.all_good());
        map.set_good(&bindings, &label);
        assert_eq!(map.get(&bindings, &label), Some(MapStatus::Good));
        assert!(map.all_good());
    }
}
