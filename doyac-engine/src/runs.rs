//! The run table and the linear trace the forward engine builds as it
//! advances runs.
//!
//! A [`Run`] is one instantiated execution of a role. Runs are allocated
//! at the end of the table and destroyed in LIFO order — `destroy_last_run`
//! is the only way to remove one, matching the backtracking discipline the
//! search engines rely on.

use crate::error::{EngineError, EngineResult};
use crate::knowledge::Knowledge;
use doyac_base::Symbol;
use doyac_model::{ClaimInfo, Event, Role};
use doyac_term::{deref, local_rename, term_eq, Bindings, KeyTable, Leaf, RunId, Term, TermList, Trail};
use std::rc::Rc;

/// One instantiated execution of a role.
pub struct Run {
    pub protocol: Symbol,
    pub role: Symbol,
    /// The agent assigned to each role-name of the protocol, in role-name
    /// order; an entry may still be an unbound variable.
    pub agents: Vec<Term>,
    pub events: Vec<Event>,
    /// Cursor into `events`: the index of the next event to fire.
    pub step: usize,
    /// Fresh leaf terms created solely for this run (local nonces, and any
    /// variable left open by the agent assignment); freed on destruction.
    pub artefacts: Vec<Term>,
    /// The smallest earlier run executing the same role with compatible
    /// agents, used to impose a canonical order on symmetric runs.
    pub symmetry_predecessor: Option<RunId>,
}

impl Run {
    pub fn current_event(&self) -> Option<&Event> {
        self.events.get(self.step)
    }

    pub fn is_finished(&self) -> bool {
        self.step >= self.events.len()
    }
}

/// Undo information for one `instantiate` call, so `destroy_last_run` can
/// exactly reverse it.
struct InstantiationRecord {
    fresh_var_count_before: usize,
}

/// The set of live runs, plus enough bookkeeping to undo an instantiation
/// exactly.
#[derive(Default)]
pub struct RunTable {
    runs: Vec<Run>,
    history: Vec<InstantiationRecord>,
}

impl RunTable {
    pub fn new() -> Self {
        RunTable::default()
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// Grows the backing storage to hold at least `r + 1` runs. `Vec`
    /// already grows itself on `push`; this just hints the allocator,
    /// mirroring the amortised-doubling array the run table is specified
    /// to be.
    pub fn ensure_run(&mut self, r: usize) {
        if self.runs.len() <= r {
            self.runs.reserve(r + 1 - self.runs.len());
        }
    }

    pub fn get(&self, id: RunId) -> EngineResult<&Run> {
        self.runs
            .get(id as usize)
            .ok_or(EngineError::InvalidRunId(id))
    }

    pub fn get_mut(&mut self, id: RunId) -> EngineResult<&mut Run> {
        self.runs
            .get_mut(id as usize)
            .ok_or(EngineError::InvalidRunId(id))
    }

    pub fn iter(&self) -> impl Iterator<Item = (RunId, &Run)> {
        self.runs.iter().enumerate().map(|(i, r)| (i as RunId, r))
    }

    /// Instantiates a fresh run of `role` (from `protocol`) under the given
    /// agent assignment. Entries of `agents` shorter than `role.variables`
    /// leave the remaining role-name variables open (fresh, unbound).
    /// Returns the new run id.
    pub fn instantiate(
        &mut self,
        bindings: &mut Bindings,
        protocol: Symbol,
        role: &Role,
        agents: &[Term],
    ) -> RunId {
        let run_id = self.runs.len() as RunId;
        self.ensure_run(run_id as usize);

        let fresh_var_count_before = bindings.len();
        let mut artefacts = Vec::new();
        let mut from = TermList::new();
        let mut to = TermList::new();

        for local in &role.locals {
            if let Some(leaf) = local.leaf() {
                let fresh = Term::Local(Leaf::new(leaf.symbol, run_id));
                from.push(local.clone());
                to.push(fresh.clone());
                artefacts.push(fresh);
            }
        }

        let mut resolved_agents = Vec::with_capacity(role.variables.len());
        for (i, role_var) in role.variables.iter().enumerate() {
            let replacement = if let Some(agent) = agents.get(i) {
                agent.clone()
            } else if let Term::Var(_, id) = role_var {
                let types = bindings.types_of(*id).to_vec();
                let leaf = role_var.leaf().unwrap();
                let fresh = bindings.fresh_var(leaf.symbol, run_id, types);
                artefacts.push(fresh.clone());
                fresh
            } else {
                role_var.clone()
            };
            from.push(role_var.clone());
            to.push(replacement.clone());
            resolved_agents.push(replacement);
        }

        let mut events: Vec<Event> = role
            .events
            .iter()
            .map(|e| rewrite_event(bindings, e, &from, &to))
            .collect();

        let needs_choice = resolved_agents
            .iter()
            .any(|a| matches!(deref(bindings, a), Term::Var(..)));
        if needs_choice {
            let message = resolved_agents
                .iter()
                .cloned()
                .reduce(|l, r| Term::Tuple(Rc::new(l), Rc::new(r)))
                .unwrap_or_else(|| Term::Const(Leaf::new(Symbol::EMPTY, run_id)));
            events.insert(
                0,
                Event::internal_choose(role.name, resolved_agents[0].clone(), message),
            );
        }

        let symmetry_predecessor = self.find_symmetry_predecessor(bindings, role.name, &resolved_agents);

        self.runs.push(Run {
            protocol,
            role: role.name,
            agents: resolved_agents,
            events,
            step: 0,
            artefacts,
            symmetry_predecessor,
        });
        self.history.push(InstantiationRecord {
            fresh_var_count_before,
        });

        run_id
    }

    fn find_symmetry_predecessor(
        &self,
        bindings: &Bindings,
        role: Symbol,
        agents: &[Term],
    ) -> Option<RunId> {
        for (id, run) in self.iter() {
            if run.role == role && compatible_agents(bindings, &run.agents, agents) {
                return Some(id);
            }
        }
        None
    }

    /// The exact inverse of the last `instantiate` call. Must be called in
    /// LIFO order during backtrack: clears bindings made for role
    /// variables left open by that instantiation, frees its artefacts, and
    /// shrinks the run table back down.
    pub fn destroy_last_run(&mut self, bindings: &mut Bindings, trail: &mut Trail) -> EngineResult<()> {
        let record = self.history.pop().ok_or(EngineError::EmptyRunTable)?;
        self.runs.pop().ok_or(EngineError::EmptyRunTable)?;
        // The trail's own undo_to call is the caller's responsibility (it
        // spans more than just this run's bindings); here we only free
        // the fresh variable cells this instantiation allocated, which
        // are always the most recently allocated ones.
        bindings.truncate(record.fresh_var_count_before);
        let _ = trail;
        Ok(())
    }
}

fn compatible_agents(bindings: &Bindings, a: &[Term], b: &[Term]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).all(|(x, y)| {
        x.is_variable() || y.is_variable() || term_eq(bindings, x, y)
    })
}

fn rewrite_event(bindings: &Bindings, event: &Event, from: &TermList, to: &TermList) -> Event {
    Event {
        kind: event.kind,
        label: event.label,
        from: local_rename(bindings, &event.from, from, to),
        to: local_rename(bindings, &event.to, from, to),
        message: local_rename(bindings, &event.message, from, to),
        claim: event.claim.as_ref().map(|c| rewrite_claim(bindings, c, from, to)),
        internal: event.internal,
        forbidden_knowledge_phase: None,
    }
}

/// A claimed secret built from the role's own locals/variables (the usual
/// case: a nonce or session key) needs the same substitution applied to
/// its event's other fields, or it keeps referring to the role template's
/// leaves instead of this run's.
fn rewrite_claim(bindings: &Bindings, claim: &ClaimInfo, from: &TermList, to: &TermList) -> ClaimInfo {
    ClaimInfo {
        kind: claim.kind,
        secret: claim
            .secret
            .as_ref()
            .map(|s| local_rename(bindings, s, from, to)),
        preceding_labels: claim.preceding_labels.clone(),
    }
}

/// One step of the forward engine's interleaved trace: which run fired,
/// which of its events, and the intruder's knowledge snapshot immediately
/// after.
#[derive(Clone)]
pub struct TraceStep {
    pub run: RunId,
    pub event_index: usize,
    pub knowledge_snapshot: Rc<Knowledge>,
}

/// The linear, global trace the forward engine accumulates. Knowledge
/// snapshots are replaced wholesale (never mutated in place) whenever the
/// intruder learns something, so earlier steps keep seeing the knowledge
/// as it was at that point.
#[derive(Default)]
pub struct Trace {
    steps: Vec<TraceStep>,
    /// Running count of distinct states visited, exposed for graph
    /// rendering by an external reporter.
    state_nodes: u64,
}

impl Trace {
    pub fn new() -> Self {
        Trace::default()
    }

    pub fn push(&mut self, run: RunId, event_index: usize, knowledge: Rc<Knowledge>) {
        self.steps.push(TraceStep {
            run,
            event_index,
            knowledge_snapshot: knowledge,
        });
        self.state_nodes += 1;
    }

    pub fn truncate_to(&mut self, len: usize) {
        self.steps.truncate(len);
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn steps(&self) -> &[TraceStep] {
        &self.steps
    }

    pub fn state_nodes(&self) -> u64 {
        self.state_nodes
    }
}
