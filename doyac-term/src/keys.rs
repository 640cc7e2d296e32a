//! Inverse-key lookup table.
//!
//! Most protocols use symmetric keys (a key is its own inverse) or
//! asymmetric key pairs (public/private). A handful of functions — hashes
//! in particular — are *public* in the sense that anyone can apply them,
//! but have no inverse at all: they are one-way. `inverse_key` models both.

use crate::term::{deref, Bindings, Leaf, Term};
use doyac_base::Symbol;
use rustc_hash::{FxHashMap, FxHashSet};

/// Maps each leaf that is used as a key to the leaf that inverts it, and
/// tracks which function symbols are public one-way functions.
#[derive(Default)]
pub struct KeyTable {
    pairs: FxHashMap<(Symbol, i32), (Symbol, i32)>,
    public_functions: FxHashSet<Symbol>,
}

impl KeyTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `a` and `b` as mutual inverses (symmetric keys register a
    /// leaf as its own inverse by passing the same leaf twice).
    pub fn add_pair(&mut self, a: Leaf, b: Leaf) {
        self.pairs.insert((a.symbol, a.run), (b.symbol, b.run));
        self.pairs.insert((b.symbol, b.run), (a.symbol, a.run));
    }

    /// Marks `symbol` as a public one-way function (e.g. a hash): it has no
    /// inverse, and [`inverse_key`] reports it as hidden.
    pub fn mark_public_function(&mut self, symbol: Symbol) {
        self.public_functions.insert(symbol);
    }

    pub fn is_public_function(&self, symbol: Symbol) -> bool {
        self.public_functions.contains(&symbol)
    }
}

/// Looks up the inverse of key `k`.
///
/// Returns `None` — the "hidden" sentinel — when `k` is a public one-way
/// function or when no inverse pair was registered; either way, the caller
/// should treat `k` as a key nothing can be decrypted with.
pub fn inverse_key(bindings: &Bindings, table: &KeyTable, k: &Term) -> Option<Term> {
    let k = deref(bindings, k);
    let leaf = k.leaf()?;
    if table.is_public_function(leaf.symbol) {
        return None;
    }
    table
        .pairs
        .get(&(leaf.symbol, leaf.run))
        .map(|(symbol, run)| Term::Const(Leaf::new(*symbol, *run)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::term::GLOBAL_RUN;
    use doyac_base::Interner;

    #[test]
    fn symmetric_key_is_its_own_inverse() {
        let mut interner = Interner::new();
        let bindings = Bindings::new();
        let mut table = KeyTable::new();
        let k = Leaf::new(interner.intern("kab"), GLOBAL_RUN);
        table.add_pair(k, k);
        let inv = inverse_key(&bindings, &table, &Term::Const(k)).unwrap();
        assert_eq!(inv.leaf().unwrap(), k);
    }

    #[test]
    fn asymmetric_pair_inverts_to_the_other_half() {
        let mut interner = Interner::new();
        let bindings = Bindings::new();
        let mut table = KeyTable::new();
        let pk = Leaf::new(interner.intern("pk(Alice)"), GLOBAL_RUN);
        let sk = Leaf::new(interner.intern("sk(Alice)"), GLOBAL_RUN);
        table.add_pair(pk, sk);
        let inv = inverse_key(&bindings, &table, &Term::Const(pk)).unwrap();
        assert_eq!(inv.leaf().unwrap(), sk);
        let inv2 = inverse_key(&bindings, &table, &Term::Const(sk)).unwrap();
        assert_eq!(inv2.leaf().unwrap(), pk);
    }

    #[test]
    fn public_function_has_no_inverse() {
        let mut interner = Interner::new();
        let bindings = Bindings::new();
        let mut table = KeyTable::new();
        let hash = interner.intern("hash");
        table.mark_public_function(hash);
        let t = Term::Const(Leaf::new(hash, GLOBAL_RUN));
        assert!(inverse_key(&bindings, &table, &t).is_none());
    }

    #[test]
    fn unregistered_key_has_no_inverse() {
        let mut interner = Interner::new();
        let bindings = Bindings::new();
        let table = KeyTable::new();
        let t = Term::Const(Leaf::new(interner.intern("mystery"), GLOBAL_RUN));
        assert!(inverse_key(&bindings, &table, &t).is_none());
    }
}
