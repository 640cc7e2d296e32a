//! Intruder knowledge: the set of terms the Dolev-Yao intruder can
//! currently construct, closed under pairing and decryption-by-known-key.
//!
//! Maintains the *minimality invariant*: no term in `basic ∪ encrypted` is
//! ever inferable from the rest of the set. `add` restores this on every
//! call by running [`Knowledge::simplify`] before filing the new term.

use doyac_term::{deref, term_eq, variables_of, Bindings, KeyTable, Term, TermList};

/// The intruder's current knowledge: known leaves, ciphertexts it cannot
/// yet open, and the variables it has ever learned about (tracked so
/// [`Knowledge::substitution_needed`] can cheaply tell whether a later
/// binding invalidated the minimality invariant).
#[derive(Clone, Default)]
pub struct Knowledge {
    basic: TermList,
    encrypted: TermList,
    vars: TermList,
}

impl Knowledge {
    pub fn new() -> Self {
        Knowledge::default()
    }

    pub fn basic(&self) -> &TermList {
        &self.basic
    }

    pub fn encrypted(&self) -> &TermList {
        &self.encrypted
    }

    /// Adds `t` (and, for a tuple, both components) to the knowledge.
    /// Total: never fails, only ever reports whether anything changed.
    pub fn add(&mut self, bindings: &Bindings, keys: &KeyTable, t: &Term) -> bool {
        let t = deref(bindings, t);
        if let Term::Tuple(a, b) = &t {
            // Both sides are always attempted, even if the left side was
            // already known: the right side might not be.
            let left_new = self.add(bindings, keys, a);
            let right_new = self.add(bindings, keys, b);
            return left_new || right_new;
        }

        if self.contains(bindings, keys, &t) {
            return false;
        }

        for v in variables_of(bindings, &t).iter() {
            if !self.vars.contains(bindings, v) {
                self.vars.push(v.clone());
            }
        }

        self.simplify(bindings, keys, &t);

        if t.is_leaf() {
            self.basic.push(t.clone());
        }

        if let Term::Encrypt(op, key) = &t {
            let invkey = doyac_term::inverse_key(bindings, keys, key);
            let key_decryptable = invkey
                .as_ref()
                .map(|ik| self.contains(bindings, keys, ik))
                .unwrap_or(false);
            if key_decryptable {
                self.add(bindings, keys, op);
                if !self.contains(bindings, keys, key) {
                    self.encrypted.push(t.clone());
                }
            } else {
                self.encrypted.push(t.clone());
            }
        }
        true
    }

    /// Scans `encrypted` for ciphertexts `{m}k'` with `k' = inverse(key)`,
    /// removing each and recursively adding its plaintext `m`. Called
    /// whenever a new term is learned, since that term might be the key
    /// that unlocks something already sitting in `encrypted`.
    fn simplify(&mut self, bindings: &Bindings, keys: &KeyTable, key: &Term) {
        let invkey = match doyac_term::inverse_key(bindings, keys, key) {
            Some(ik) => ik,
            None => return,
        };
        let mut unlocked = Vec::new();
        self.encrypted.iter().for_each(|e| {
            if let Term::Encrypt(op, k) = deref(bindings, e) {
                if term_eq(bindings, &k, &invkey) {
                    unlocked.push(op.as_ref().clone());
                }
            }
        });
        if unlocked.is_empty() {
            return;
        }
        for op in &unlocked {
            self.encrypted.delete(
                bindings,
                &Term::Encrypt(std::rc::Rc::new(op.clone()), std::rc::Rc::new(invkey.clone())),
            );
        }
        for op in unlocked {
            self.add(bindings, keys, &op);
        }
    }

    /// Is `t` derivable from this knowledge? Recursion dereferences at
    /// every step, so a bound variable is checked against whatever it
    /// resolves to.
    pub fn contains(&self, bindings: &Bindings, keys: &KeyTable, t: &Term) -> bool {
        let t = deref(bindings, t);
        match &t {
            Term::Encrypt(op, key) => {
                self.encrypted.contains(bindings, &t)
                    || (self.contains(bindings, keys, key) && self.contains(bindings, keys, op))
            }
            Term::Tuple(a, b) => self.contains(bindings, keys, a) && self.contains(bindings, keys, b),
            _ => self.basic.contains(bindings, &t),
        }
    }

    /// True iff any variable this knowledge has ever seen is now bound —
    /// a sign that `basic`/`encrypted` may no longer be minimal and
    /// [`Knowledge::reconstruct`] should be run.
    pub fn substitution_needed(&self, bindings: &Bindings) -> bool {
        self.vars.iter().any(|v| match v {
            Term::Var(_, id) => bindings.is_bound(*id),
            _ => false,
        })
    }

    /// Rebuilds a fresh, minimal knowledge set by re-adding every current
    /// element of `basic ∪ encrypted` from scratch, under the bindings now
    /// in effect.
    pub fn reconstruct(&self, bindings: &Bindings, keys: &KeyTable) -> Knowledge {
        let mut out = Knowledge::new();
        for t in self.basic.iter() {
            out.add(bindings, keys, t);
        }
        for t in self.encrypted.iter() {
            out.add(bindings, keys, t);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use doyac_term::{Leaf, GLOBAL_RUN};
    use doyac_base::Interner;
    use std::rc::Rc;

    fn leaf(interner: &mut Interner, name: &str) -> Term {
        Term::Const(Leaf::new(interner.intern(name), GLOBAL_RUN))
    }

    #[test]
    fn adding_a_leaf_is_immediately_contained() {
        let mut interner = Interner::new();
        let bindings = Bindings::new();
        let keys = KeyTable::new();
        let mut k = Knowledge::new();
        let a = leaf(&mut interner, "a");
        assert!(k.add(&bindings, &keys, &a));
        assert!(k.contains(&bindings, &keys, &a));
        assert!(!k.add(&bindings, &keys, &a));
    }

    #[test]
    fn encrypted_term_decrypted_once_key_is_known() {
        let mut interner = Interner::new();
        let bindings = Bindings::new();
        let mut keys = KeyTable::new();
        let k_leaf = Leaf::new(interner.intern("k"), GLOBAL_RUN);
        keys.add_pair(k_leaf, k_leaf);
        let m = leaf(&mut interner, "m");
        let kt = Term::Const(k_leaf);
        let enc = Term::Encrypt(Rc::new(m.clone()), Rc::new(kt.clone()));

        let mut know = Knowledge::new();
        know.add(&bindings, &keys, &enc);
        assert!(!know.contains(&bindings, &keys, &m));

        know.add(&bindings, &keys, &kt);
        assert!(know.contains(&bindings, &keys, &m));
    }

    #[test]
    fn tuple_known_iff_both_components_known() {
        let mut interner = Interner::new();
        let bindings = Bindings::new();
        let keys = KeyTable::new();
        let a = leaf(&mut interner, "a");
        let b = leaf(&mut interner, "b");
        let pair = Term::Tuple(Rc::new(a.clone()), Rc::new(b.clone()));
        let mut know = Knowledge::new();
        know.add(&bindings, &keys, &a);
        assert!(!know.contains(&bindings, &keys, &pair));
        know.add(&bindings, &keys, &b);
        assert!(know.contains(&bindings, &keys, &pair));
    }

    #[test]
    fn substitution_needed_tracks_bound_vars() {
        let mut interner = Interner::new();
        let mut bindings = Bindings::new();
        let keys = KeyTable::new();
        let na_sym = interner.intern("Na");
        let var = bindings.fresh_var(na_sym, 0, vec![]);
        let mut know = Knowledge::new();
        know.add(&bindings, &keys, &var);
        assert!(!know.substitution_needed(&bindings));
        if let Term::Var(_, id) = var {
            bindings.set(id, leaf(&mut interner, "n1"));
        }
        assert!(know.substitution_needed(&bindings));
    }
}
