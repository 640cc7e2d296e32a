//! Events: the atomic steps a role's protocol description is built from.

use doyac_base::Symbol;
use doyac_term::Term;

/// What kind of step an event is.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum EventKind {
    Send,
    Recv,
    Claim,
    /// A receive whose message is the tuple of variables an instantiation
    /// left open; see [`crate::role::Role::instantiate`] in the run table
    /// for when these are synthesised.
    InternalChoose,
}

/// The security property a [`EventKind::Claim`] event asserts.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum ClaimKind {
    Secret,
    Alive,
    WeakAgree,
    NiSynch,
    NiAgree,
    Commit,
    Running,
}

/// Extra data carried by claim events: which property, and the set of
/// labels that must be matched by a preceding send/receive pair for the
/// claim to hold (empty for `Secret`, `Alive`, `WeakAgree`).
#[derive(Clone, Debug)]
pub struct ClaimInfo {
    pub kind: ClaimKind,
    /// The secret term, for `ClaimKind::Secret`; unused otherwise.
    pub secret: Option<Term>,
    pub preceding_labels: Vec<Symbol>,
}

impl ClaimInfo {
    pub fn secrecy(secret: Term) -> Self {
        ClaimInfo {
            kind: ClaimKind::Secret,
            secret: Some(secret),
            preceding_labels: Vec::new(),
        }
    }

    pub fn synchronisation(kind: ClaimKind, preceding_labels: Vec<Symbol>) -> Self {
        debug_assert!(matches!(
            kind,
            ClaimKind::Alive
                | ClaimKind::WeakAgree
                | ClaimKind::NiSynch
                | ClaimKind::NiAgree
                | ClaimKind::Commit
                | ClaimKind::Running
        ));
        ClaimInfo {
            kind,
            secret: None,
            preceding_labels,
        }
    }
}

/// One step of a role: a send, a receive, a claim, or a synthetic
/// internal-choose.
#[derive(Clone, Debug)]
pub struct Event {
    pub kind: EventKind,
    pub label: Symbol,
    pub from: Term,
    pub to: Term,
    pub message: Term,
    pub claim: Option<ClaimInfo>,
    /// True for the synthetic internal-choose receive a run instantiation
    /// may prefix when agent parameters are still open; renderers hide
    /// these, and the engines treat them specially (§4.F.5, §4.H).
    pub internal: bool,
    /// Partial-order reduction bookkeeping for a receive: the intruder's
    /// knowledge phase the last time this event was tried and found not
    /// enabled. If the phase hasn't advanced since, the forward engine
    /// skips re-trying it. `None` until the first failed attempt.
    pub forbidden_knowledge_phase: Option<u64>,
}

impl Event {
    pub fn send(label: Symbol, from: Term, to: Term, message: Term) -> Self {
        Event {
            kind: EventKind::Send,
            label,
            from,
            to,
            message,
            claim: None,
            internal: false,
            forbidden_knowledge_phase: None,
        }
    }

    pub fn recv(label: Symbol, from: Term, to: Term, message: Term) -> Self {
        Event {
            kind: EventKind::Recv,
            label,
            from,
            to,
            message,
            claim: None,
            internal: false,
            forbidden_knowledge_phase: None,
        }
    }

    pub fn claim(label: Symbol, owner: Term, info: ClaimInfo) -> Self {
        Event {
            kind: EventKind::Claim,
            label,
            from: owner.clone(),
            to: owner,
            message: Term::Const(doyac_term::Leaf::new(Symbol::EMPTY, doyac_term::GLOBAL_RUN)),
            claim: Some(info),
            internal: false,
            forbidden_knowledge_phase: None,
        }
    }

    pub fn internal_choose(label: Symbol, owner: Term, message: Term) -> Self {
        Event {
            kind: EventKind::InternalChoose,
            label,
            from: owner.clone(),
            to: owner,
            message,
            claim: None,
            internal: true,
            forbidden_knowledge_phase: None,
        }
    }
}
