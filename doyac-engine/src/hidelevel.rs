//! Static unreachability pruning via encryption depth.
//!
//! For every global constant, `level(c)` is the shallowest encryption
//! depth at which `c` ever appears across the initial knowledge and every
//! role's send messages. A constant that is always sent at depth 2 or
//! deeper can only reach the intruder by breaking two nested encryptions;
//! if the intruder's construction budget cannot go that deep, any goal
//! term built only from such constants is provably unreachable, and the
//! backward engine can fail the branch before recursing.

use doyac_base::Symbol;
use doyac_model::{EventKind, Model};
use doyac_term::{basics_of, deref, Bindings, RunId, Term};
use rustc_hash::FxHashMap;

#[derive(Default)]
pub struct HideLevel {
    levels: FxHashMap<(Symbol, RunId), u32>,
}

impl HideLevel {
    /// Precomputes `level(c)` for every constant reachable from the
    /// model's initial knowledge and role send messages.
    pub fn compute(model: &Model, bindings: &Bindings) -> Self {
        let mut levels = FxHashMap::default();
        for t in model.initial_knowledge.iter() {
            record_depths(bindings, t, 0, &mut levels);
        }
        for role in model.roles() {
            for ev in role.events_of_kind(EventKind::Send) {
                record_depths(bindings, &ev.message, 0, &mut levels);
            }
        }
        HideLevel { levels }
    }

    pub fn level_of(&self, t: &Term) -> u32 {
        t.leaf()
            .and_then(|l| self.levels.get(&(l.symbol, l.run)).copied())
            .unwrap_or(0)
    }

    /// At least one constant in `t` is ever hidden under an encryption.
    pub fn interesting(&self, bindings: &Bindings, t: &Term) -> bool {
        basics_of(bindings, t)
            .iter()
            .any(|leaf| self.level_of(leaf) > 0)
    }

    /// Every constant in `t` has a hide-level exceeding `budget_depth`:
    /// producing `t` would require breaking an envelope deeper than the
    /// intruder's current construction budget allows.
    pub fn impossible(&self, bindings: &Bindings, t: &Term, budget_depth: u32) -> bool {
        let basics = basics_of(bindings, t);
        !basics.is_empty()
            && basics
                .iter()
                .all(|leaf| self.level_of(leaf) > budget_depth)
    }
}

fn record_depths(bindings: &Bindings, t: &Term, depth: u32, levels: &mut FxHashMap<(Symbol, RunId), u32>) {
    match deref(bindings, t) {
        Term::Encrypt(op, key) => {
            record_depths(bindings, &op, depth + 1, levels);
            record_depths(bindings, &key, depth, levels);
        }
        Term::Tuple(l, r) => {
            record_depths(bindings, &l, depth, levels);
            record_depths(bindings, &r, depth, levels);
        }
        leaf => {
            if let Some(l) = leaf.leaf() {
                let entry = levels.entry((l.symbol, l.run)).or_insert(depth);
                if depth < *entry {
                    *entry = depth;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use doyac_base::Interner;
    use doyac_model::{Protocol, Role};
    use doyac_term::{Bindings, Leaf, GLOBAL_RUN};
    use std::rc::Rc;

    #[test]
    fn constant_only_ever_encrypted_has_positive_level() {
        let mut interner = Interner::new();
        let bindings = Bindings::new();
        let mut model = Model::new();
        let mut proto = Protocol::new(interner.intern("p"));
        let mut role = Role::new(interner.intern("I"));
        let secret_leaf = Leaf::new(interner.intern("s"), GLOBAL_RUN);
        let key_leaf = Leaf::new(interner.intern("k"), GLOBAL_RUN);
        let secret = Term::Const(secret_leaf);
        let key = Term::Const(key_leaf);
        let enc = Term::Encrypt(Rc::new(secret.clone()), Rc::new(key));
        role.push_event(doyac_model::Event::send(
            interner.intern("l1"),
            secret.clone(),
            secret.clone(),
            enc,
        ));
        proto.add_role(role);
        model.add_protocol(proto);

        let hl = HideLevel::compute(&model, &bindings);
        assert_eq!(hl.level_of(&secret), 1);
        assert!(hl.interesting(&bindings, &secret));
    }

    #[test]
    fn unencrypted_constant_has_level_zero() {
        let mut interner = Interner::new();
        let bindings = Bindings::new();
        let mut model = Model::new();
        model
            .initial_knowledge
            .push(Term::Const(Leaf::new(interner.intern("a"), GLOBAL_RUN)));
        let hl = HideLevel::compute(&model, &bindings);
        let a = Term::Const(Leaf::new(interner.intern("a"), GLOBAL_RUN));
        assert_eq!(hl.level_of(&a), 0);
        assert!(!hl.interesting(&bindings, &a));
    }
}
