//! Backward goal-binding search engine (§4.I).
//!
//! Builds a trace outward from its unresolved receives ("goals") rather
//! than forward from an empty state: each goal is bound by finding where
//! its message could have come from (an existing run's send, a freshly
//! instantiated run, or an intruder-construction node), never by
//! enumerating event interleavings the way the forward engine does.

use crate::claims::{evaluate_claim, ClaimStatus};
use crate::context::SearchContext;
use crate::error::{EngineError, EngineResult};
use crate::forward::{Attack, AttackStep, Verdict};
use crate::hidelevel::HideLevel;
use crate::minimise::minimise;
use doyac_base::Symbol;
use doyac_model::{EventKind, Model, Role};
use doyac_term::{deep_duplicate, deref, unify, MatchMode, RunId, Term};
use std::rc::Rc;

/// Every subterm of `t` (including `t` itself), depth-first. The hand
/// rolled counterpart of [`doyac_term::interm_unify`]'s enumeration: unlike
/// that helper, the caller here needs bindings from a successful candidate
/// to stay live across a recursive search call, not be undone before the
/// next candidate is tried.
fn subterms_of(bindings: &doyac_term::Bindings, t: &Term) -> Vec<Term> {
    let mut out = vec![t.clone()];
    match deref(bindings, t) {
        Term::Encrypt(op, key) => {
            out.extend(subterms_of(bindings, &op));
            out.extend(subterms_of(bindings, &key));
        }
        Term::Tuple(l, r) => {
            out.extend(subterms_of(bindings, &l));
            out.extend(subterms_of(bindings, &r));
        }
        _ => {}
    }
    out
}

/// Bounds for a backward search. There is no trace-length concept here in
/// the forward-engine sense (the trace is built goal-first); `max_runs`
/// and `max_goal_depth` are the only termination guarantees.
pub struct BackwardOptions {
    pub match_mode: MatchMode,
    pub max_runs: usize,
    /// Recursion depth cap on goal-binding: every successful bind can
    /// introduce further goals (a fresh run's prefix events), so this
    /// bounds the overall search tree depth.
    pub max_goal_depth: usize,
}

impl Default for BackwardOptions {
    fn default() -> Self {
        BackwardOptions {
            match_mode: MatchMode::Typed,
            max_runs: 5,
            max_goal_depth: 30,
        }
    }
}

/// An unresolved receive: which run it belongs to and the index of the
/// event within that run.
#[derive(Clone, Copy)]
struct Goal {
    run: RunId,
    event_index: usize,
}

pub struct BackwardEngine<'m> {
    ctx: SearchContext<'m>,
    opts: BackwardOptions,
    hide: HideLevel,
    goals: Vec<Goal>,
}

impl<'m> BackwardEngine<'m> {
    pub fn new(model: &'m Model, opts: BackwardOptions) -> Self {
        let ctx = SearchContext::new(model, opts.match_mode);
        let hide = HideLevel::compute(model, &ctx.bindings);
        BackwardEngine {
            ctx,
            opts,
            hide,
            goals: Vec::new(),
        }
    }

    pub fn run(mut self) -> EngineResult<Verdict> {
        if self.ctx.model.events_of_kind(EventKind::Claim).count() == 0 {
            return Ok(Verdict::NoClaims);
        }

        // Seed the search: instantiate one run per role, each contributing
        // its prefix receives as goals. This mirrors §4.I's statement that
        // the backward engine starts from an "already-admitted run".
        let roles: Vec<(Symbol, Role)> = self
            .ctx
            .model
            .protocols
            .iter()
            .flat_map(|p| p.roles.iter().map(move |r| (p.name, r.clone())))
            .collect();
        for (protocol, role) in roles {
            if self.ctx.runs.len() >= self.opts.max_runs {
                break;
            }
            let run_id = self
                .ctx
                .runs
                .instantiate(&mut self.ctx.bindings, protocol, &role, &[]);
            self.seed_goals_from_run(run_id)?;
        }

        let found = self.resolve(0)?;
        Ok(match found {
            Some(attack) => Verdict::Attack(attack),
            None => Verdict::NoAttack,
        })
    }

    fn seed_goals_from_run(&mut self, run_id: RunId) -> EngineResult<()> {
        let run = self.ctx.runs.get(run_id)?;
        for (i, ev) in run.events.iter().enumerate() {
            if matches!(ev.kind, EventKind::Recv | EventKind::InternalChoose) {
                self.goals.push(Goal {
                    run: run_id,
                    event_index: i,
                });
            }
        }
        Ok(())
    }

    /// Picks the first unresolved goal (policy: first-encountered, per
    /// §4.I) and attempts each binding strategy in order. Returns the
    /// first attack found, if any.
    fn resolve(&mut self, depth: usize) -> EngineResult<Option<Attack>> {
        if depth >= self.opts.max_goal_depth {
            return Ok(None);
        }

        let goal_pos = self.goals.iter().position(|g| !self.is_bound(g));
        let goal = match goal_pos {
            None => return self.check_candidate_state(),
            Some(pos) => self.goals[pos],
        };

        let message = {
            let run = self.ctx.runs.get(goal.run)?;
            run.events[goal.event_index].message.clone()
        };

        if self.hide.impossible(&self.ctx.bindings, &message, 0) {
            return Ok(None);
        }

        if let Some(attack) = self.bind_to_existing_run(&goal, &message, depth)? {
            return Ok(Some(attack));
        }
        if self.ctx.runs.len() < self.opts.max_runs {
            if let Some(attack) = self.bind_to_fresh_run(&goal, &message, depth)? {
                return Ok(Some(attack));
            }
        }
        if let Some(attack) = self.bind_to_intruder_construction(&goal, &message, depth)? {
            return Ok(Some(attack));
        }
        Ok(None)
    }

    /// A goal counts as bound once the run that owns it has advanced its
    /// cursor past the goal's event index.
    fn is_bound(&self, goal: &Goal) -> bool {
        self.ctx
            .runs
            .get(goal.run)
            .map(|r| r.step > goal.event_index)
            .unwrap_or(true)
    }

    /// (a) bind to an existing run: unify the goal against every send
    /// event of every live run, including subterms of its message.
    fn bind_to_existing_run(
        &mut self,
        goal: &Goal,
        message: &Term,
        depth: usize,
    ) -> EngineResult<Option<Attack>> {
        let send_messages: Vec<Term> = self
            .ctx
            .runs
            .iter()
            .flat_map(|(_, run)| {
                run.events
                    .iter()
                    .filter(|e| e.kind == EventKind::Send)
                    .map(|e| e.message.clone())
            })
            .collect();

        for send_message in &send_messages {
            for candidate in subterms_of(&self.ctx.bindings, send_message) {
                let mark = self.ctx.mark();
                let unified = unify(
                    &mut self.ctx.bindings,
                    &mut self.ctx.trail,
                    self.opts.match_mode,
                    &self.ctx.model.types,
                    message,
                    &candidate,
                )
                .is_ok();
                if unified {
                    let before = self.ctx.runs.get_mut(goal.run)?.step;
                    self.ctx.runs.get_mut(goal.run)?.step = goal.event_index + 1;
                    if let Some(attack) = self.resolve(depth + 1)? {
                        return Ok(Some(attack));
                    }
                    self.ctx.runs.get_mut(goal.run)?.step = before;
                }
                self.ctx.undo_to(mark);
            }
        }
        Ok(None)
    }

    /// (b) bind to a fresh run: instantiate a new run of the goal's own
    /// role — its prefix events become new goals too — and recurse.
    fn bind_to_fresh_run(
        &mut self,
        goal: &Goal,
        _message: &Term,
        depth: usize,
    ) -> EngineResult<Option<Attack>> {
        let (protocol, role_name) = {
            let run = self.ctx.runs.get(goal.run)?;
            (run.protocol, run.role)
        };
        let role = match self.ctx.model.protocol(protocol).and_then(|p| p.role(role_name)) {
            Some(r) => r.clone(),
            None => return Ok(None),
        };

        let fresh_id = self
            .ctx
            .runs
            .instantiate(&mut self.ctx.bindings, protocol, &role, &[]);
        let goals_before = self.goals.len();
        self.seed_goals_from_run(fresh_id)?;

        let result = self.resolve(depth + 1)?;
        if result.is_none() {
            self.goals.truncate(goals_before);
            self.ctx
                .runs
                .destroy_last_run(&mut self.ctx.bindings, &mut self.ctx.trail)?;
        }
        Ok(result)
    }

    /// (c) bind to an intruder construction: the intruder is modelled as
    /// able to produce any message it already knows, so this strategy
    /// checks the goal against the current global knowledge directly
    /// (the degenerate case of the synthetic intruder role's send).
    fn bind_to_intruder_construction(
        &mut self,
        goal: &Goal,
        message: &Term,
        depth: usize,
    ) -> EngineResult<Option<Attack>> {
        let basics: Vec<Term> = self.ctx.knowledge.basic().iter().cloned().collect();
        for basic in &basics {
            for candidate in subterms_of(&self.ctx.bindings, basic) {
                let mark = self.ctx.mark();
                let unified = unify(
                    &mut self.ctx.bindings,
                    &mut self.ctx.trail,
                    self.opts.match_mode,
                    &self.ctx.model.types,
                    message,
                    &candidate,
                )
                .is_ok();
                if unified {
                    let before = self.ctx.runs.get_mut(goal.run)?.step;
                    self.ctx.runs.get_mut(goal.run)?.step = goal.event_index + 1;
                    if let Some(attack) = self.resolve(depth + 1)? {
                        return Ok(Some(attack));
                    }
                    self.ctx.runs.get_mut(goal.run)?.step = before;
                }
                self.ctx.undo_to(mark);
            }
        }
        Ok(None)
    }

    /// No goals remain: every receive in every live run has been bound to
    /// a source. Check every claim in every run; a violation is an
    /// attack, otherwise this candidate state is consistent and the
    /// search backtracks to look for others.
    fn check_candidate_state(&mut self) -> EngineResult<Option<Attack>> {
        let claim_positions: Vec<(RunId, usize)> = self
            .ctx
            .runs
            .iter()
            .flat_map(|(id, run)| {
                run.events
                    .iter()
                    .enumerate()
                    .filter(|(_, e)| e.kind == EventKind::Claim)
                    .map(move |(i, _)| (id, i))
            })
            .collect();

        for (run_id, event_index) in claim_positions {
            let (claim, agents, role) = {
                let run = self.ctx.runs.get(run_id)?;
                let ev = &run.events[event_index];
                let info = match &ev.claim {
                    Some(c) => c.clone(),
                    None => continue,
                };
                (info, run.agents.clone(), run.role)
            };
            let global_step = self.ctx.trace.len();
            self.ctx
                .trace
                .push(run_id, event_index, Rc::new(self.ctx.knowledge.clone()));
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
            if let ClaimStatus::Violated(witness) = status {
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
                    let concrete = doyac_model::Event {
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
                return Ok(Some(Attack {
                    claim_index,
                    steps,
                    witness,
                }));
            }
            self.ctx.trace.truncate_to(global_step);
        }
        Ok(None)
    }
}
