//! Roles: a named ordered sequence of events plus the local names and
//! variables a run instantiation needs to rename.

use crate::event::{Event, EventKind};
use doyac_base::Symbol;
use doyac_term::{is_subterm, Bindings, Term};

#[derive(Clone, Debug)]
pub struct Role {
    pub name: Symbol,
    pub events: Vec<Event>,
    /// Local (fresh-per-run) name declarations, e.g. nonces this role
    /// generates.
    pub locals: Vec<Term>,
    /// Variables this role's events reference, including its own agent
    /// name variable. Instantiation binds or replaces each of these.
    pub variables: Vec<Term>,
}

impl Role {
    pub fn new(name: Symbol) -> Self {
        Role {
            name,
            events: Vec::new(),
            locals: Vec::new(),
            variables: Vec::new(),
        }
    }

    pub fn push_event(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn events_of_kind(&self, kind: EventKind) -> impl Iterator<Item = &Event> {
        self.events.iter().filter(move |e| e.kind == kind)
    }
}

/// Returns the step at which `needle` first appears in an event's message,
/// optionally restricted to a single event kind.
pub fn first_occurrence_of(
    bindings: &Bindings,
    events: &[Event],
    needle: &Term,
    kind: Option<EventKind>,
) -> Option<usize> {
    events.iter().position(|e| {
        if let Some(k) = kind {
            if e.kind != k {
                return false;
            }
        }
        is_subterm(bindings, needle, &e.message)
    })
}
