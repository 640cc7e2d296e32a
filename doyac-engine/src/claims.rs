//! Claim evaluation: secrecy and the synchronisation family
//! (non-injective synchronisation, non-injective agreement, aliveness,
//! weak-agreement, commit, running).
//!
//! Aliveness and weak-agreement are evaluated as non-injective agreement
//! over a smaller preceding-label set — the same algorithm, a degenerate
//! input. Commit and running are likewise reduced to a non-injective
//! agreement scan restricted to their own preceding-label set, rather than
//! tracked as separate state machines (see `DESIGN.md`).

use crate::context::SearchContext;
use crate::error::{EngineError, EngineResult};
use doyac_base::Symbol;
use doyac_model::{any_untrusted, ClaimKind, EventKind};
use doyac_term::{basics_of, term_eq, RunId, Term};
use rustc_hash::FxHashMap;

/// The outcome of checking one claim occurrence.
#[derive(Clone, Debug)]
pub enum ClaimStatus {
    Ok,
    /// For secrecy: the leaves of the claimed secret that are individually
    /// known to the intruder. For the synchronisation family: empty (the
    /// witness is the whole trace, already captured elsewhere).
    Violated(Vec<Term>),
    /// The claim's run included an untrusted principal: vacuously
    /// discharged.
    Skipped,
}

/// Checks a secrecy claim: is `secret` known to the intruder at the
/// knowledge snapshot recorded for global trace step `global_step`?
pub fn evaluate_secrecy(
    ctx: &SearchContext,
    agents: &[Term],
    secret: &Term,
    global_step: usize,
) -> ClaimStatus {
    if any_untrusted(ctx.model, agents) {
        return ClaimStatus::Skipped;
    }
    let snapshot = &ctx.trace.steps()[global_step].knowledge_snapshot;
    if !snapshot.contains(&ctx.bindings, &ctx.model.keys, secret) {
        return ClaimStatus::Ok;
    }
    let witness = basics_of(&ctx.bindings, secret)
        .iter()
        .filter(|leaf| snapshot.contains(&ctx.bindings, &ctx.model.keys, leaf))
        .cloned()
        .collect();
    ClaimStatus::Violated(witness)
}

/// Checks a synchronisation-family claim (non-injective synchronisation,
/// non-injective agreement, aliveness, weak-agreement, commit, running).
///
/// `enforce_order` requires the matching send to precede the matching
/// receive chronologically (non-injective synchronisation); when false,
/// any matching pair regardless of order suffices (every other variant in
/// the family).
pub fn evaluate_synchronisation(
    ctx: &SearchContext,
    claim_run: RunId,
    claim_role: Symbol,
    agents: &[Term],
    global_step: usize,
    preceding_labels: &[Symbol],
    enforce_order: bool,
) -> EngineResult<ClaimStatus> {
    if any_untrusted(ctx.model, agents) {
        return Ok(ClaimStatus::Skipped);
    }

    let mut role_to_run: FxHashMap<Symbol, RunId> = FxHashMap::default();
    role_to_run.insert(claim_role, claim_run);
    let mut label_good: FxHashMap<Symbol, bool> =
        preceding_labels.iter().map(|l| (*l, false)).collect();

    let steps = ctx.trace.steps();
    for idx in (0..global_step).rev() {
        let ts = &steps[idx];
        let run = ctx.runs.get(ts.run)?;
        let ev = run
            .events
            .get(ts.event_index)
            .ok_or(EngineError::InvalidRunId(ts.run))?;
        if ev.kind != EventKind::Send || !label_good.contains_key(&ev.label) {
            continue;
        }
        if *label_good.get(&ev.label).unwrap() {
            continue;
        }

        let send_role = run.role;
        if let Some(&committed) = role_to_run.get(&send_role) {
            if committed != ts.run {
                continue;
            }
        } else {
            role_to_run.insert(send_role, ts.run);
        }

        let recv_range: Box<dyn Iterator<Item = usize>> = if enforce_order {
            Box::new((idx + 1)..global_step)
        } else {
            Box::new((0..global_step).filter(|j| *j != idx))
        };
        for j in recv_range {
            let rts = &steps[j];
            let rrun = ctx.runs.get(rts.run)?;
            let rev = rrun
                .events
                .get(rts.event_index)
                .ok_or(EngineError::InvalidRunId(rts.run))?;
            if rev.kind == EventKind::Recv
                && rev.label == ev.label
                && term_eq(&ctx.bindings, &rev.message, &ev.message)
                && term_eq(&ctx.bindings, &rev.from, &ev.from)
                && term_eq(&ctx.bindings, &rev.to, &ev.to)
            {
                label_good.insert(ev.label, true);
                break;
            }
        }
    }

    if label_good.values().all(|good| *good) {
        Ok(ClaimStatus::Ok)
    } else {
        Ok(ClaimStatus::Violated(Vec::new()))
    }
}

/// Dispatches on [`ClaimKind`] to the right evaluator.
#[allow(clippy::too_many_arguments)]
pub fn evaluate_claim(
    ctx: &SearchContext,
    kind: ClaimKind,
    claim_run: RunId,
    claim_role: Symbol,
    agents: &[Term],
    secret: Option<&Term>,
    global_step: usize,
    preceding_labels: &[Symbol],
) -> EngineResult<ClaimStatus> {
    match kind {
        ClaimKind::Secret => {
            let secret = secret.ok_or(EngineError::MissingClaimInfo)?;
            Ok(evaluate_secrecy(ctx, agents, secret, global_step))
        }
        ClaimKind::NiSynch => evaluate_synchronisation(
            ctx,
            claim_run,
            claim_role,
            agents,
            global_step,
            preceding_labels,
            true,
        ),
        ClaimKind::NiAgree
        | ClaimKind::Alive
        | ClaimKind::WeakAgree
        | ClaimKind::Commit
        | ClaimKind::Running => evaluate_synchronisation(
            ctx,
            claim_run,
            claim_role,
            agents,
            global_step,
            preceding_labels,
            false,
        ),
    }
}
