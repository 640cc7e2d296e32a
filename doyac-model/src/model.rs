//! The top-level, read-only protocol model: every protocol the parser
//! produced, the key/type tables shared across them, the initial
//! knowledge, and which agent names are untrusted.

use crate::event::{Event, EventKind};
use crate::protocol::Protocol;
use crate::role::Role;
use doyac_base::Symbol;
use doyac_term::{Bindings, KeyTable, Term, TermList, TypeTable};
use rustc_hash::FxHashSet;

/// Everything the engines need that is fixed for the whole run of the
/// verifier: read-only once the parser (external to this crate) has
/// finished building it.
pub struct Model {
    pub protocols: Vec<Protocol>,
    pub keys: KeyTable,
    pub types: TypeTable,
    /// Terms the intruder knows before any run has executed (agent names,
    /// public keys, and any protocol-declared public constants).
    pub initial_knowledge: TermList,
    /// The variable-declaration template every role's `variables`/`locals`
    /// `Term::Var` entries were allocated against at load time. A
    /// `SearchContext` clones this once per search so every `VarId` a role
    /// references resolves against the same layout the loader built,
    /// without sharing one mutable binding store across searches.
    pub bindings: Bindings,
    /// Agent names that are untrusted principals: a claim evaluated in a
    /// run whose agents include one of these is vacuously skipped.
    untrusted: FxHashSet<Symbol>,
}

impl Model {
    pub fn new() -> Self {
        Model {
            protocols: Vec::new(),
            keys: KeyTable::new(),
            types: TypeTable::new(),
            initial_knowledge: TermList::new(),
            bindings: Bindings::new(),
            untrusted: FxHashSet::default(),
        }
    }

    pub fn add_protocol(&mut self, protocol: Protocol) {
        self.protocols.push(protocol);
    }

    pub fn protocol(&self, name: Symbol) -> Option<&Protocol> {
        self.protocols.iter().find(|p| p.name == name)
    }

    pub fn mark_untrusted(&mut self, agent: Symbol) {
        self.untrusted.insert(agent);
    }

    pub fn is_untrusted(&self, agent: Symbol) -> bool {
        self.untrusted.contains(&agent)
    }

    pub fn roles(&self) -> impl Iterator<Item = &Role> {
        self.protocols.iter().flat_map(|p| p.roles.iter())
    }

    pub fn events_of_kind(&self, kind: EventKind) -> impl Iterator<Item = &Event> + '_ {
        self.roles()
            .flat_map(move |r| r.events.iter().filter(move |e| e.kind == kind))
    }
}

impl Default for Model {
    fn default() -> Self {
        Self::new()
    }
}

/// Does any leaf of `agents` name an untrusted principal? Used by the
/// claim evaluator's skip rule and by endgame trimming's "untrusted run"
/// check.
pub fn any_untrusted(model: &Model, agents: &[Term]) -> bool {
    agents
        .iter()
        .filter_map(|t| t.leaf())
        .any(|l| model.is_untrusted(l.symbol))
}

#[cfg(test)]
mod tests {
    use super::*;
    use doyac_base::Interner;

    #[test]
    fn protocol_lookup_by_name() {
        let mut interner = Interner::new();
        let mut model = Model::new();
        let ns = interner.intern("ns3");
        model.add_protocol(Protocol::new(ns));
        assert!(model.protocol(ns).is_some());
        assert!(model.protocol(interner.intern("other")).is_none());
    }

    #[test]
    fn untrusted_agents_tracked() {
        let mut interner = Interner::new();
        let mut model = Model::new();
        let eve = interner.intern("Eve");
        assert!(!model.is_untrusted(eve));
        model.mark_untrusted(eve);
        assert!(model.is_untrusted(eve));
    }
}
