//! Host-side protocol description loader.
//!
//! `doyac-model`'s builder API (§4.E) expects *something* to populate a
//! [`Model`] from source text; a term-rewriting parser for the language
//! `original_source/gui/Protocols/*` uses is out of scope here (see crate
//! docs). This module plays that role with a small serde-based TOML
//! dialect instead, so the rest of the stack can be driven end to end
//! from a file on disk without a bespoke lexer.

use doyac_base::{Interner, Result, SpannedError, Symbol};
use doyac_model::{ClaimInfo, ClaimKind, Event, Model, Protocol, Role};
use doyac_term::{Leaf, Term, GLOBAL_RUN};
use serde::Deserialize;
use std::collections::HashMap;
use std::rc::Rc;

/// The loaded model plus the interner that resolved its names, so a
/// renderer can turn symbols back into the names the source used.
pub struct Loaded {
    pub model: Model,
    pub interner: Interner,
}

#[derive(Deserialize)]
struct TomlModel {
    #[serde(default)]
    agents: Vec<TomlAgent>,
    #[serde(default)]
    keys: Vec<TomlKeyPair>,
    #[serde(default)]
    functions: Vec<TomlFunction>,
    #[serde(default)]
    protocols: Vec<TomlProtocol>,
}

#[derive(Deserialize)]
struct TomlAgent {
    name: String,
    #[serde(default = "default_true")]
    trusted: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Deserialize)]
struct TomlKeyPair {
    a: String,
    b: String,
}

#[derive(Deserialize)]
struct TomlFunction {
    name: String,
    #[serde(default)]
    public: bool,
}

#[derive(Deserialize)]
struct TomlProtocol {
    name: String,
    #[serde(default)]
    constants: Vec<String>,
    #[serde(default)]
    roles: Vec<TomlRole>,
}

#[derive(Deserialize)]
struct TomlRole {
    name: String,
    #[serde(default)]
    variables: Vec<String>,
    #[serde(default)]
    locals: Vec<String>,
    #[serde(default)]
    events: Vec<TomlEvent>,
}

#[derive(Deserialize)]
struct TomlEvent {
    kind: String,
    label: String,
    #[serde(default)]
    from: Option<String>,
    #[serde(default)]
    to: Option<String>,
    #[serde(default)]
    message: Option<TomlTerm>,
    #[serde(default)]
    owner: Option<String>,
    #[serde(default)]
    claim: Option<String>,
    #[serde(default)]
    secret: Option<TomlTerm>,
    #[serde(default)]
    preceding_labels: Vec<String>,
}

#[derive(Deserialize, Clone)]
#[serde(untagged)]
enum TomlTerm {
    Name(String),
    Tuple { tuple: Vec<TomlTerm> },
    Encrypt { enc: Box<TomlTerm>, key: Box<TomlTerm> },
}

/// A name environment: what each identifier resolves to at the point it
/// is declared (agents and keys are global, role variables/locals shadow
/// them within that role).
type Env = HashMap<String, Term>;

/// Parses `source` as the TOML protocol dialect and builds a [`Model`]
/// from it.
pub fn load(source: &str) -> Result<Loaded> {
    let parsed: TomlModel =
        toml::from_str(source).map_err(|e| SpannedError::unspanned(format!("protocol description: {e}")))?;

    let mut interner = Interner::new();
    let mut model = Model::new();
    let mut globals: Env = HashMap::new();

    for agent in &parsed.agents {
        let sym = interner.intern(&agent.name);
        let term = Term::Const(Leaf::new(sym, GLOBAL_RUN));
        globals.insert(agent.name.clone(), term.clone());
        model.initial_knowledge.push(term);
        if !agent.trusted {
            model.mark_untrusted(sym);
        }
    }

    for pair in &parsed.keys {
        let a_sym = interner.intern(&pair.a);
        let b_sym = interner.intern(&pair.b);
        let a_leaf = Leaf::new(a_sym, GLOBAL_RUN);
        let b_leaf = Leaf::new(b_sym, GLOBAL_RUN);
        model.keys.add_pair(a_leaf, b_leaf);
        globals.entry(pair.a.clone()).or_insert(Term::Const(a_leaf));
        globals.entry(pair.b.clone()).or_insert(Term::Const(b_leaf));
    }

    for func in &parsed.functions {
        let sym = interner.intern(&func.name);
        if func.public {
            model.keys.mark_public_function(sym);
        }
        globals
            .entry(func.name.clone())
            .or_insert(Term::Const(Leaf::new(sym, GLOBAL_RUN)));
    }

    for tp in &parsed.protocols {
        let proto_sym = interner.intern(&tp.name);
        let mut protocol = Protocol::new(proto_sym);
        let mut proto_env = globals.clone();

        for name in &tp.constants {
            let sym = interner.intern(name);
            let term = Term::Const(Leaf::new(sym, GLOBAL_RUN));
            proto_env.insert(name.clone(), term.clone());
            protocol.constants.push(term.clone());
            model.initial_knowledge.push(term);
        }

        for tr in &tp.roles {
            let role_sym = interner.intern(&tr.name);
            let mut role = Role::new(role_sym);
            let mut env = proto_env.clone();

            for vname in &tr.variables {
                let sym = interner.intern(vname);
                let var = model.bindings.fresh_var(sym, GLOBAL_RUN, Vec::new());
                role.variables.push(var.clone());
                env.insert(vname.clone(), var);
            }
            for lname in &tr.locals {
                let sym = interner.intern(lname);
                let local = Term::Local(Leaf::new(sym, GLOBAL_RUN));
                role.locals.push(local.clone());
                env.insert(lname.clone(), local);
            }

            for te in &tr.events {
                let label = interner.intern(&te.label);
                let event = build_event(&mut interner, &env, te, label)?;
                role.push_event(event);
            }

            protocol.add_role(role);
        }
        model.add_protocol(protocol);
    }

    Ok(Loaded { model, interner })
}

fn lookup(env: &Env, name: &str) -> Result<Term> {
    env.get(name)
        .cloned()
        .ok_or_else(|| SpannedError::unspanned(format!("undeclared name '{name}'")))
}

fn resolve_term(env: &Env, t: &TomlTerm) -> Result<Term> {
    match t {
        TomlTerm::Name(name) => lookup(env, name),
        TomlTerm::Tuple { tuple } => {
            let mut terms = tuple.iter().map(|t| resolve_term(env, t));
            let first = terms
                .next()
                .ok_or_else(|| SpannedError::unspanned("empty tuple in protocol description"))??;
            terms.try_fold(first, |acc, next| Ok(Term::Tuple(Rc::new(acc), Rc::new(next?))))
        }
        TomlTerm::Encrypt { enc, key } => Ok(Term::Encrypt(
            Rc::new(resolve_term(env, enc)?),
            Rc::new(resolve_term(env, key)?),
        )),
    }
}

fn parse_claim_kind(s: &str) -> Result<ClaimKind> {
    match s {
        "secret" => Ok(ClaimKind::Secret),
        "alive" => Ok(ClaimKind::Alive),
        "weakagree" => Ok(ClaimKind::WeakAgree),
        "ni-synch" => Ok(ClaimKind::NiSynch),
        "ni-agree" => Ok(ClaimKind::NiAgree),
        "commit" => Ok(ClaimKind::Commit),
        "running" => Ok(ClaimKind::Running),
        other => Err(SpannedError::unspanned(format!("unknown claim kind '{other}'"))),
    }
}

fn build_event(interner: &mut Interner, env: &Env, te: &TomlEvent, label: Symbol) -> Result<Event> {
    match te.kind.as_str() {
        "send" => {
            let from = lookup(env, field(&te.from, "from")?)?;
            let to = lookup(env, field(&te.to, "to")?)?;
            let message = resolve_term(env, field_term(&te.message, "message")?)?;
            Ok(Event::send(label, from, to, message))
        }
        "recv" => {
            let from = lookup(env, field(&te.from, "from")?)?;
            let to = lookup(env, field(&te.to, "to")?)?;
            let message = resolve_term(env, field_term(&te.message, "message")?)?;
            Ok(Event::recv(label, from, to, message))
        }
        "claim" => {
            let owner = lookup(env, field(&te.owner, "owner")?)?;
            let kind = parse_claim_kind(field(&te.claim, "claim")?)?;
            let info = match kind {
                ClaimKind::Secret => {
                    let secret = resolve_term(env, field_term(&te.secret, "secret")?)?;
                    ClaimInfo::secrecy(secret)
                }
                _ => {
                    let labels = te.preceding_labels.iter().map(|l| interner.intern(l)).collect();
                    ClaimInfo::synchronisation(kind, labels)
                }
            };
            Ok(Event::claim(label, owner, info))
        }
        other => Err(SpannedError::unspanned(format!("unknown event kind '{other}'"))),
    }
}

fn field<'a>(opt: &'a Option<String>, name: &str) -> Result<&'a str> {
    opt.as_deref()
        .ok_or_else(|| SpannedError::unspanned(format!("event missing '{name}'")))
}

fn field_term<'a>(opt: &'a Option<TomlTerm>, name: &str) -> Result<&'a TomlTerm> {
    opt.as_ref()
        .ok_or_else(|| SpannedError::unspanned(format!("event missing '{name}'")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRIVIAL: &str = r#"
        [[agents]]
        name = "Alice"

        [[protocols]]
        name = "p"

        [[protocols.roles]]
        name = "A"

        [[protocols.roles.events]]
        kind = "send"
        label = "l1"
        from = "Alice"
        to = "Alice"
        message = "Alice"

        [[protocols.roles.events]]
        kind = "claim"
        label = "l2"
        owner = "Alice"
        claim = "secret"
        secret = "Alice"
    "#;

    #[test]
    fn loads_a_single_role_protocol() {
        let loaded = load(TRIVIAL).unwrap();
        assert_eq!(loaded.model.protocols.len(), 1);
        assert_eq!(loaded.model.protocols[0].roles.len(), 1);
        assert_eq!(loaded.model.protocols[0].roles[0].events.len(), 2);
    }

    #[test]
    fn undeclared_name_is_an_error() {
        let bad = r#"
            [[protocols]]
            name = "p"

            [[protocols.roles]]
            name = "A"

            [[protocols.roles.events]]
            kind = "send"
            label = "l1"
            from = "Ghost"
            to = "Ghost"
            message = "Ghost"
        "#;
        assert!(load(bad).is_err());
    }

    #[test]
    fn tuple_and_encryption_terms_resolve() {
        let src = r#"
            [[agents]]
            name = "I"
            [[agents]]
            name = "R"
            [[keys]]
            a = "pk(R)"
            b = "sk(R)"

            [[protocols]]
            name = "p"

            [[protocols.roles]]
            name = "I"
            locals = ["Ni"]

            [[protocols.roles.events]]
            kind = "send"
            label = "l1"
            from = "I"
            to = "R"
            message = { enc = { tuple = ["Ni", "I"] }, key = "pk(R)" }
        "#;
        let loaded = load(src).unwrap();
        let event = &loaded.model.protocols[0].roles[0].events[0];
        assert!(matches!(event.message, Term::Encrypt(..)));
    }
}
