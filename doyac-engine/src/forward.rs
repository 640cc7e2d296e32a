//! Forward interleaving search engine (§4.H).
//!
//! A depth-first search whose state is `(trace, run cursors, knowledge)`.
//! At every node the engine picks a run whose current event is enabled and
//! advances it, or instantiates a fresh run of some role. Several
//! independently-switchable reductions narrow the branching factor without
//! changing which attacks are reachable.

use crate::claims::{evaluate_claim, ClaimStatus};
use crate::context::SearchContext;
use crate::counters::Counters;
use crate::error::{EngineError, EngineResult};
use crate::hidelevel::HideLevel;
use crate::minimise::minimise;
use doyac_base::Symbol;
use doyac_model::{any_untrusted, Event, EventKind, Model, Role};
use doyac_term::{deep_duplicate, term_cmp, variables_of, MatchMode, RunId, Term};
use log::info;
use std::rc::Rc;

/// Bounds and reduction toggles for one forward search. Mirrors the CLI
/// options table of §6 that a driver would translate into this record.
pub struct ForwardOptions {
    pub match_mode: MatchMode,
    pub max_runs: usize,
    pub max_trace_length: usize,
    /// 0 = none, 1 = stop on first violated claim, 2 = also shrink the
    /// trace-length bound to `|attack| - 1` after the first hit.
    pub prune_level: u8,
    pub agent_symmetry: bool,
    pub read_symmetry: bool,
    pub order_symmetry: bool,
    pub endgame_trimming: bool,
    pub prune_no_more_claims: bool,
    /// Always prefix a run's events with an internal-choose, even when
    /// every agent variable is already fixed by the caller.
    pub force_choose: bool,
    /// Log the periodic "states explored" line (§4.M.1). `--no-progress`
    /// clears this at the CLI boundary.
    pub report_progress: bool,
}

impl Default for ForwardOptions {
    fn default() -> Self {
        ForwardOptions {
            match_mode: MatchMode::Typed,
            max_runs: 5,
            max_trace_length: 20,
            prune_level: 1,
            agent_symmetry: true,
            read_symmetry: true,
            order_symmetry: true,
            endgame_trimming: true,
            prune_no_more_claims: true,
            force_choose: false,
            report_progress: true,
        }
    }
}

/// One step of an [`Attack`], detached from the live search state (runs,
/// bindings) so it survives the engine backtracking past it.
#[derive(Clone, Debug)]
pub struct AttackStep {
    pub protocol: Symbol,
    pub role: Symbol,
    pub run: RunId,
    pub event: Event,
}

/// A minimised violating trace.
#[derive(Clone, Debug)]
pub struct Attack {
    /// Index into `steps` of the event whose claim was violated.
    pub claim_index: usize,
    pub steps: Vec<AttackStep>,
    /// For a secrecy violation, the leaves of the claimed secret the
    /// intruder knows; empty for the synchronisation family.
    pub witness: Vec<Term>,
}

pub enum Verdict {
    /// The search exhausted its bounds with every claim holding at every
    /// occurrence.
    NoAttack,
    /// At least one claim was violated; `attack` is the first (or, under
    /// prune level < 2, the last) one found, already minimised.
    Attack(Attack),
    /// The model had no claim events at all — nothing to check.
    NoClaims,
}

/// Whether the caller above a recursive search step should keep exploring
/// siblings or unwind immediately.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Signal {
    Continue,
    Stop,
}

pub struct ForwardEngine<'m> {
    ctx: SearchContext<'m>,
    opts: ForwardOptions,
    hide: HideLevel,
    counters: Counters,
    knowledge_phase: u64,
    trace_bound: usize,
    claims_total: usize,
    best_attack: Option<Attack>,
}

impl<'m> ForwardEngine<'m> {
    pub fn new(model: &'m Model, opts: ForwardOptions) -> Self {
        let ctx = SearchContext::new(model, opts.match_mode);
        let hide = HideLevel::compute(model, &ctx.bindings);
        let trace_bound = opts.max_trace_length;
        let claims_total = model.events_of_kind(EventKind::Claim).count();
        ForwardEngine {
            ctx,
            opts,
            hide,
            counters: Counters::new(),
            knowledge_phase: 0,
            trace_bound,
            claims_total,
            best_attack: None,
        }
    }

    /// Runs the search to completion (or to the first attack, under prune
    /// level ≥ 1) and returns the verdict.
    pub fn run(mut self) -> EngineResult<Verdict> {
        if self.claims_total == 0 {
            return Ok(Verdict::NoClaims);
        }
        self.search()?;
        info!(
            "forward search done: {} states, {} runs instantiated",
            self.counters.states, self.counters.runs_instantiated
        );
        Ok(match self.best_attack {
            Some(attack) => Verdict::Attack(attack),
            None => Verdict::NoAttack,
        })
    }

    fn search(&mut self) -> EngineResult<Signal> {
        if self.ctx.trace.len() >= self.trace_bound {
            return Ok(Signal::Continue);
        }
        if self.opts.prune_no_more_claims && !self.any_run_has_future_claim() {
            return Ok(Signal::Continue);
        }
        if self.opts.report_progress && self.counters.tick() {
            info!(
                "{} states explored, {} runs live",
                self.counters.states,
                self.ctx.runs.len()
            );
        }

        let run_ids: Vec<RunId> = self.ctx.runs.iter().map(|(id, _)| id).collect();
        for run_id in run_ids {
            if self.opts.order_symmetry && !self.respects_order_symmetry(run_id) {
                continue;
            }
            if self.opts.endgame_trimming && self.is_endgame_tail(run_id)? {
                continue;
            }
            if self.signal_fire(run_id)? == Signal::Stop {
                return Ok(Signal::Stop);
            }
        }

        if self.ctx.runs.len() < self.opts.max_runs {
            let candidates: Vec<(Symbol, Role)> = self
                .ctx
                .model
                .protocols
                .iter()
                .flat_map(|p| p.roles.iter().map(move |r| (p.name, r.clone())))
                .collect();
            for (protocol, role) in candidates {
                if self.opts.agent_symmetry && self.has_symmetric_instantiation(&role) {
                    continue;
                }
                if self.instantiate_and_search(protocol, &role)? == Signal::Stop {
                    return Ok(Signal::Stop);
                }
            }
        }

        Ok(Signal::Continue)
    }

    /// True iff some live run still has a claim ahead of its cursor, or a
    /// role not yet instantiated could still contribute one; used by the
    /// prune-by-no-more-claims reduction (conservative: it only fires once
    /// `max_runs` has been reached, so it never hides an attack reachable
    /// by instantiating a fresh run).
    fn any_run_has_future_claim(&self) -> bool {
        if self.ctx.runs.len() < self.opts.max_runs {
            return true;
        }
        self.ctx.runs.iter().any(|(_, run)| {
            run.events[run.step..]
                .iter()
                .any(|e| e.kind == EventKind::Claim)
        })
    }

    /// Endgame trimming: true if every event from `run`'s cursor to its
    /// end is a receive (which can never add new knowledge) or, for a run
    /// with an untrusted agent, a claim (which would only be vacuously
    /// skipped — §4.G). Such a tail can never enable another run or flip
    /// a claim, so the search never bothers to fire it.
    fn is_endgame_tail(&self, run_id: RunId) -> EngineResult<bool> {
        let run = self.ctx.runs.get(run_id)?;
        if run.is_finished() {
            return Ok(false);
        }
        let untrusted = any_untrusted(self.ctx.model, &run.agents);
        Ok(run.events[run.step..].iter().all(|e| {
            matches!(e.kind, EventKind::Recv | EventKind::InternalChoose)
                || (e.kind == EventKind::Claim && untrusted)
        }))
    }

    /// Order symmetry: among runs that are each other's symmetry
    /// predecessor chain, only the lowest-id run among those still at step
    /// 0 may fire next.
    fn respects_order_symmetry(&self, run_id: RunId) -> bool {
        let run = match self.ctx.runs.get(run_id) {
            Ok(r) => r,
            Err(_) => return true,
        };
        if run.step != 0 {
            return true;
        }
        match run.symmetry_predecessor {
            Some(pred) => self
                .ctx
                .runs
                .get(pred)
                .map(|p| p.step > 0)
                .unwrap_or(true),
            None => true,
        }
    }

    /// Agent symmetry: skip instantiating another fully-open run of `role`
    /// while an earlier one is still unresolved — the lexicographic
    /// canonical order is imposed by always filling the lowest-id open
    /// slot first instead of branching over every permutation.
    fn has_symmetric_instantiation(&self, role: &Role) -> bool {
        self.ctx.runs.iter().any(|(_, run)| {
            run.role == role.name
                && run.step == 0
                && run.agents.iter().any(|a| a.is_variable())
        })
    }

    fn signal_fire(&mut self, run_id: RunId) -> EngineResult<Signal> {
        let finished = self.ctx.runs.get(run_id)?.is_finished();
        if finished {
            return Ok(Signal::Continue);
        }
        let kind = self.ctx.runs.get(run_id)?.current_event().unwrap().kind;
        match kind {
            EventKind::Send => self.fire_send(run_id),
            EventKind::Claim => self.fire_claim(run_id),
            EventKind::Recv | EventKind::InternalChoose => self.fire_receive(run_id),
        }
    }

    fn fire_send(&mut self, run_id: RunId) -> EngineResult<Signal> {
        let message = self.ctx.runs.get(run_id)?.current_event().unwrap().message.clone();
        let step = self.ctx.runs.get(run_id)?.step;

        let before = self.ctx.knowledge.clone();
        self.ctx.trace.push(run_id, step, Rc::new(before.clone()));

        let grew = self
            .ctx
            .knowledge
            .add(&self.ctx.bindings, &self.ctx.model.keys, &message);
        if grew {
            self.knowledge_phase += 1;
        }

        self.ctx.runs.get_mut(run_id)?.step += 1;
        let signal = self.search()?;
        self.ctx.runs.get_mut(run_id)?.step -= 1;

        self.ctx.knowledge = before;
        self.ctx.trace.truncate_to(self.ctx.trace.len() - 1);
        Ok(signal)
    }

    fn fire_claim(&mut self, run_id: RunId) -> EngineResult<Signal> {
        let (label, claim, agents, protocol, role) = {
            let run = self.ctx.runs.get(run_id)?;
            let ev = run.current_event().unwrap();
            (
                ev.label,
                ev.claim.clone().ok_or(EngineError::MissingClaimInfo)?,
                run.agents.clone(),
                run.protocol,
                run.role,
            )
        };
        let _ = label;
        let step = self.ctx.runs.get(run_id)?.step;

        let snapshot = Rc::new(self.ctx.knowledge.clone());
        self.ctx.trace.push(run_id, step, snapshot);
        let global_step = self.ctx.trace.len() - 1;

        let status = evaluate_claim(
            &self.ctx,
            claim.kind,
            run_id,
            role,
            &agents,
            claim.secret.as_ref(),
            global_step,
            &claim.preceding_labels,
        )?;
        self.counters.claims_checked += 1;

        let mut signal = Signal::Continue;
        if let ClaimStatus::Violated(witness) = &status {
            self.counters.claims_failed += 1;
            let attack = self.capture_attack(global_step, witness.clone(), protocol, role)?;
            let record_as_best = match self.opts.prune_level {
                0 => self.best_attack.is_none(),
                _ => true,
            };
            if record_as_best {
                let new_bound = attack.steps.len().saturating_sub(1);
                self.best_attack = Some(attack);
                if self.opts.prune_level >= 2 {
                    self.trace_bound = self.trace_bound.min(new_bound.max(1));
                }
            }
            if self.opts.prune_level >= 1 {
                signal = Signal::Stop;
            }
        }

        if signal == Signal::Continue {
            self.ctx.runs.get_mut(run_id)?.step += 1;
            signal = self.search()?;
            self.ctx.runs.get_mut(run_id)?.step -= 1;
        }

        self.ctx.trace.truncate_to(global_step);
        Ok(signal)
    }

    /// Builds a detached [`Attack`] from the live trace up to
    /// `global_step` inclusive, minimised via [`minimise`].
    fn capture_attack(
        &self,
        global_step: usize,
        witness: Vec<Term>,
        _protocol: Symbol,
        _role: Symbol,
    ) -> EngineResult<Attack> {
        let keep = minimise(&self.ctx, global_step)?;
        let mut steps = Vec::with_capacity(keep.len());
        let mut claim_index = 0;
        for (i, &idx) in keep.iter().enumerate() {
            let ts = &self.ctx.trace.steps()[idx];
            let run = self.ctx.runs.get(ts.run)?;
            let ev = run
                .events
                .get(ts.event_index)
                .ok_or(EngineError::InvalidRunId(ts.run))?;
            let concrete = Event {
                message: deep_duplicate(&self.ctx.bindings, &ev.message),
                from: deep_duplicate(&self.ctx.bindings, &ev.from),
                to: deep_duplicate(&self.ctx.bindings, &ev.to),
                ..ev.clone()
            };
            if idx == global_step {
                claim_index = i;
            }
            steps.push(AttackStep {
                protocol: run.protocol,
                role: run.role,
                run: ts.run,
                event: concrete,
            });
        }
        let witness = witness
            .iter()
            .map(|t| deep_duplicate(&self.ctx.bindings, t))
            .collect();
        Ok(Attack {
            claim_index,
            steps,
            witness,
        })
    }

    fn instantiate_and_search(&mut self, protocol: Symbol, role: &Role) -> EngineResult<Signal> {
        let run_id = self
            .ctx
            .runs
            .instantiate(&mut self.ctx.bindings, protocol, role, &[]);
        self.counters.runs_instantiated += 1;
        let signal = self.search()?;
        self.ctx.runs.destroy_last_run(&mut self.ctx.bindings, &mut self.ctx.trail)?;
        let _ = run_id;
        Ok(signal)
    }

    /// Attempts every legal binding of `run_id`'s pending receive against
    /// the current knowledge, firing and recursing once per success. If no
    /// binding succeeds, records the current knowledge phase on the event
    /// so the engine skips re-trying it until the knowledge grows (§4.H's
    /// forbidden-knowledge partial-order reduction).
    fn fire_receive(&mut self, run_id: RunId) -> EngineResult<Signal> {
        let (message, step, already_forbidden) = {
            let run = self.ctx.runs.get(run_id)?;
            let ev = run.current_event().unwrap();
            (ev.message.clone(), run.step, ev.forbidden_knowledge_phase)
        };
        if already_forbidden == Some(self.knowledge_phase) {
            return Ok(Signal::Continue);
        }
        if self.hide.impossible(&self.ctx.bindings, &message, 0) {
            self.ctx.runs.get_mut(run_id)?.events[step].forbidden_knowledge_phase =
                Some(self.knowledge_phase);
            return Ok(Signal::Continue);
        }

        let free_vars: Vec<Term> = variables_of(&self.ctx.bindings, &message).iter().cloned().collect();
        let mut candidates: Vec<Term> = self.ctx.knowledge.basic().iter().cloned().collect();
        if self.opts.read_symmetry {
            candidates.sort_by(|a, b| term_cmp(&self.ctx.bindings, a, b));
        }

        let mut any_succeeded = false;
        let signal = self.try_bindings(
            run_id,
            &message,
            &free_vars,
            0,
            &candidates,
            step,
            &mut any_succeeded,
        )?;

        if !any_succeeded {
            self.ctx.runs.get_mut(run_id)?.events[step].forbidden_knowledge_phase =
                Some(self.knowledge_phase);
        }
        Ok(signal)
    }

    /// Recursively assigns each distinct free variable of a receive's
    /// message to a knowledge candidate (via ordinary unification, so a
    /// variable occurring twice is forced consistent), and checks the
    /// fully-assigned message against the knowledge once every variable is
    /// fixed.
    fn try_bindings(
        &mut self,
        run_id: RunId,
        message: &Term,
        vars: &[Term],
        var_index: usize,
        candidates: &[Term],
        step: usize,
        any_succeeded: &mut bool,
    ) -> EngineResult<Signal> {
        if var_index == vars.len() {
            if !self
                .ctx
                .knowledge
                .contains(&self.ctx.bindings, &self.ctx.model.keys, message)
            {
                return Ok(Signal::Continue);
            }
            *any_succeeded = true;
            let snapshot = Rc::new(self.ctx.knowledge.clone());
            self.ctx.trace.push(run_id, step, snapshot);
            self.ctx.runs.get_mut(run_id)?.step += 1;
            let signal = self.search()?;
            self.ctx.runs.get_mut(run_id)?.step -= 1;
            self.ctx.trace.truncate_to(self.ctx.trace.len() - 1);
            return Ok(signal);
        }

        let var = &vars[var_index];
        for candidate in candidates {
            let mark = self.ctx.mark();
            let unified = doyac_term::unify(
                &mut self.ctx.bindings,
                &mut self.ctx.trail,
                self.opts.match_mode,
                &self.ctx.model.types,
                var,
                candidate,
            )
            .is_ok();
            if unified {
                let signal = self.try_bindings(
                    run_id,
                    message,
                    vars,
                    var_index + 1,
                    candidates,
                    step,
                    any_succeeded,
                )?;
                if signal == Signal::Stop {
                    self.ctx.undo_to(mark);
                    return Ok(Signal::Stop);
                }
            }
            self.ctx.undo_to(mark);
        }
        Ok(Signal::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use doyac_base::Interner;
    use doyac_model::{ClaimInfo, Protocol};
    use doyac_term::{Leaf, GLOBAL_RUN};

    /// A protocol with a single role that sends a constant and then claims
    /// it secret: the claim is violated immediately, since the initial
    /// knowledge already contains everything the role ever sends.
    fn trivially_broken_model() -> (Model, Interner) {
        let mut interner = Interner::new();
        let mut model = Model::new();
        let p = interner.intern("p");
        let mut proto = Protocol::new(p);
        let mut role = Role::new(interner.intern("A"));
        let secret = Term::Const(Leaf::new(interner.intern("s"), GLOBAL_RUN));
        role.push_event(Event::send(
            interner.intern("l1"),
            secret.clone(),
            secret.clone(),
            secret.clone(),
        ));
        role.push_event(Event::claim(
            interner.intern("l2"),
            secret.clone(),
            ClaimInfo::secrecy(secret.clone()),
        ));
        proto.add_role(role);
        model.add_protocol(proto);
        model.initial_knowledge.push(secret);
        (model, interner)
    }

    #[test]
    fn finds_attack_when_secret_already_public() {
        let (model, _interner) = trivially_broken_model();
        let engine = ForwardEngine::new(
            &model,
            ForwardOptions {
                max_runs: 1,
                ..ForwardOptions::default()
            },
        );
        match engine.run().unwrap() {
            Verdict::Attack(attack) => {
                assert!(!attack.witness.is_empty());
            }
            other => panic!("expected an attack, got a different verdict: {:?}", matches!(other, Verdict::NoAttack)),
        }
    }

    #[test]
    fn no_claims_reports_no_claims_verdict() {
        let mut interner = Interner::new();
        let mut model = Model::new();
        let p = interner.intern("p");
        let mut proto = Protocol::new(p);
        let role = Role::new(interner.intern("A"));
        proto.add_role(role);
        model.add_protocol(proto);
        let engine = ForwardEngine::new(&model, ForwardOptions::default());
        assert!(matches!(engine.run().unwrap(), Verdict::NoClaims));
    }
}
