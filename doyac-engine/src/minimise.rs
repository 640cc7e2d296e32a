//! Attack minimiser.
//!
//! Takes a violating trace and the index of the violated claim, and
//! reduces it to the sub-sequence of events that are actually necessary to
//! reproduce the violation. Every trace slot carries one of four statuses;
//! the algorithm alternates between propagating backward-reachability
//! requirements (`Tod` → `Oke`) and provisionally dropping events that turn
//! out not to be needed (`Unk` → `Red`), until nothing is left undecided.

use crate::context::SearchContext;
use crate::error::EngineResult;
use crate::knowledge::Knowledge;
use doyac_model::EventKind;
use doyac_term::{RunId, Term};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Status {
    Unk,
    Oke,
    Red,
    Tod,
}

struct Slot {
    run: RunId,
    kind: EventKind,
    message: Term,
    status: Status,
}

/// Marks every event of `slots[ev].run` at or before `ev` as required: a
/// receive goes to `Tod` (its producing send still needs locating), a send
/// or claim goes directly to `Oke`.
fn markback(slots: &mut [Slot], ev: usize) {
    let run = slots[ev].run;
    let mut i = ev as isize;
    while i >= 0 {
        let idx = i as usize;
        if slots[idx].run == run {
            match slots[idx].kind {
                EventKind::Recv | EventKind::InternalChoose => {
                    if slots[idx].status == Status::Unk || slots[idx].status == Status::Red {
                        slots[idx].status = Status::Tod;
                    }
                }
                EventKind::Send | EventKind::Claim => {
                    slots[idx].status = Status::Oke;
                }
            }
        }
        i -= 1;
    }
}

/// Replays every `Send` event not currently `Red` into a fresh knowledge
/// set (ignoring trace order; a single cumulative pass), then checks every
/// currently-`Oke` receive's message against it. Returns the earliest such
/// index still missing, or `None` if all are still derivable.
fn rebuild_and_check(
    ctx: &SearchContext,
    slots: &[Slot],
) -> EngineResult<Option<usize>> {
    let mut fresh = Knowledge::new();
    for t in ctx.model.initial_knowledge.iter() {
        fresh.add(&ctx.bindings, &ctx.model.keys, t);
    }
    for slot in slots {
        if slot.kind == EventKind::Send && slot.status != Status::Red {
            fresh.add(&ctx.bindings, &ctx.model.keys, &slot.message);
        }
    }
    for (idx, slot) in slots.iter().enumerate() {
        if slot.kind == EventKind::Recv && slot.status == Status::Oke {
            if !fresh.contains(&ctx.bindings, &ctx.model.keys, &slot.message) {
                return Ok(Some(idx));
            }
        }
    }
    Ok(None)
}

/// Minimises the attack ending at `violated_claim_index` (inclusive) in
/// `ctx`'s current trace. Returns the indices of the trace steps that
/// survive — the minimised attack is the sub-sequence at those indices.
pub fn minimise(ctx: &SearchContext, violated_claim_index: usize) -> EngineResult<Vec<usize>> {
    let steps = &ctx.trace.steps()[..=violated_claim_index];
    let mut slots = Vec::with_capacity(steps.len());
    for ts in steps {
        let run = ctx.runs.get(ts.run)?;
        let ev = run
            .events
            .get(ts.event_index)
            .ok_or(crate::error::EngineError::InvalidRunId(ts.run))?;
        slots.push(Slot {
            run: ts.run,
            kind: ev.kind,
            message: ev.message.clone(),
            status: Status::Unk,
        });
    }

    markback(&mut slots, violated_claim_index);

    loop {
        let mut cunk = slots.iter().filter(|s| s.status == Status::Unk).count();
        let mut ctod = slots.iter().filter(|s| s.status == Status::Tod).count();
        if cunk + ctod == 0 {
            break;
        }

        while ctod > 0 {
            let i = slots
                .iter()
                .position(|s| s.status == Status::Tod)
                .expect("ctod > 0");
            let message = slots[i].message.clone();
            let mut j = i as isize;
            while j >= 0 {
                let snapshot = &ctx
                    .trace
                    .steps()
                    .get(j as usize)
                    .map(|ts| &ts.knowledge_snapshot);
                let known = match snapshot {
                    Some(k) => k.contains(&ctx.bindings, &ctx.model.keys, &message),
                    None => false,
                };
                if !known {
                    break;
                }
                j -= 1;
            }
            slots[i].status = Status::Oke;
            ctod -= 1;
            if j >= 0 {
                markback(&mut slots, j as usize);
                cunk = slots.iter().filter(|s| s.status == Status::Unk).count();
                ctod = slots.iter().filter(|s| s.status == Status::Tod).count();
            }
        }

        while ctod == 0 && cunk > 0 {
            let i = slots
                .iter()
                .rposition(|s| s.status == Status::Unk)
                .expect("cunk > 0");
            slots[i].status = Status::Red;
            cunk -= 1;

            if rebuild_and_check(ctx, &slots)?.is_some() {
                markback(&mut slots, i);
                ctod = slots.iter().filter(|s| s.status == Status::Tod).count();
                cunk = slots.iter().filter(|s| s.status == Status::Unk).count();
            }
        }
    }

    Ok(slots
        .iter()
        .enumerate()
        .filter(|(_, s)| s.status == Status::Oke)
        .map(|(i, _)| i)
        .collect())
}

