//! Command-line surface (§6): a flat switch table rather than a
//! subcommand tree, mirroring `original_source/src/main.c`'s own
//! `argtable2`-based parser more closely than the teacher's `largo`
//! subcommands do — there is exactly one thing this tool does (verify a
//! model), so every switch configures that one run.

use clap::{Parser, ValueEnum};
use doyac_engine::{BackwardOptions, ForwardOptions, Traversal};
use doyac_term::MatchMode;

/// Verifies a protocol model against its claims and reports the first
/// (or every, under `--prune-level 0`) violation found.
///
/// # Examples
///
/// ```bash
/// doyac protocol.toml
/// doyac --traversal backward --match-mode basic -o trace.txt protocol.toml
/// doyac --max-runs 3 --prune-level 0 protocol.toml
/// ```
#[derive(Parser)]
#[command(name = "doyac")]
#[command(about = "Symbolic Dolev-Yao protocol verifier", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Protocol description to verify, or `-` to read from standard input.
    pub input: String,

    /// Where to write the rendered trace; standard output if omitted.
    #[arg(short, long)]
    pub output: Option<String>,

    /// Which search strategy explores the model.
    #[arg(short = 'T', long, value_enum, default_value_t = TraversalArg::Forward)]
    pub traversal: TraversalArg,

    /// Unifier strictness: `typed` respects declared leaf types, `basic`
    /// ignores types but still forbids binding a variable to a compound
    /// term, `untyped` allows both.
    #[arg(short, long, value_enum, default_value_t = MatchModeArg::Typed)]
    pub match_mode: MatchModeArg,

    /// 0 keeps searching after a violation, 1 stops at the first one, 2
    /// additionally shrinks the trace-length bound to the attack's own
    /// length once found.
    #[arg(short, long, default_value_t = 1, value_parser = clap::value_parser!(u8).range(0..=2))]
    pub prune_level: u8,

    /// Hard cap on trace steps explored by the forward engine.
    #[arg(long, default_value_t = 20)]
    pub max_trace_length: usize,

    /// Hard cap on run instantiations.
    #[arg(long, default_value_t = 5)]
    pub max_runs: usize,

    /// Re-run with the run cap raised by one, from 1 up to `--max-runs`,
    /// stopping as soon as an attack is found or the cap is reached.
    #[arg(long)]
    pub incremental_runs: bool,

    /// Forward engine only: re-run with the trace-length bound raised
    /// from a small minimum up to `--max-trace-length`.
    #[arg(long)]
    pub incremental_traces: bool,

    /// Accepted for compatibility with `original_source`'s switch table;
    /// rendering is plain text only, this flag is logged as unimplemented.
    #[arg(long)]
    pub latex: bool,

    /// Suppress per-violation trace rendering (still reports the exit
    /// code and summary counts).
    #[arg(long)]
    pub disable_report: bool,

    /// Suppress periodic progress lines.
    #[arg(long)]
    pub no_progress: bool,

    /// Accepted for compatibility with `original_source`'s switch table;
    /// the state graph is never built, this flag is logged as
    /// unimplemented.
    #[arg(long)]
    pub state_space: bool,

    /// Always prefix a run's events with an internal-choose, even when
    /// every agent parameter is already fixed.
    #[arg(long)]
    pub force_choose: bool,

    /// Forward engine only: order candidate knowledge terms canonically
    /// before trying them against a receive.
    #[arg(long)]
    pub read_symm: bool,

    /// Forward engine only: disable the reduction that defers
    /// instantiating a second fully-open run of a role already pending.
    #[arg(long)]
    pub no_agent_symm: bool,

    /// Forward engine only: impose a canonical firing order among runs
    /// that are each other's symmetry predecessor.
    #[arg(long)]
    pub symm_order: bool,

    /// Forward engine only: disable dropping a run's trailing receives
    /// (and, for untrusted runs, claims) once nothing further they do can
    /// add new knowledge or flip a claim.
    #[arg(long)]
    pub no_endgame_trim: bool,

    /// Increase log verbosity (repeatable); overridden by `RUST_LOG` if set.
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, ValueEnum)]
pub enum TraversalArg {
    Forward,
    Backward,
}

impl std::fmt::Display for TraversalArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TraversalArg::Forward => write!(f, "forward"),
            TraversalArg::Backward => write!(f, "backward"),
        }
    }
}

impl From<TraversalArg> for Traversal {
    fn from(t: TraversalArg) -> Self {
        match t {
            TraversalArg::Forward => Traversal::Forward,
            TraversalArg::Backward => Traversal::Backward,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, ValueEnum)]
pub enum MatchModeArg {
    Typed,
    Basic,
    Untyped,
}

impl std::fmt::Display for MatchModeArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchModeArg::Typed => write!(f, "typed"),
            MatchModeArg::Basic => write!(f, "basic"),
            MatchModeArg::Untyped => write!(f, "untyped"),
        }
    }
}

impl From<MatchModeArg> for MatchMode {
    fn from(m: MatchModeArg) -> Self {
        match m {
            MatchModeArg::Typed => MatchMode::Typed,
            MatchModeArg::Basic => MatchMode::Basic,
            MatchModeArg::Untyped => MatchMode::Untyped,
        }
    }
}

impl Cli {
    pub fn forward_options(&self) -> ForwardOptions {
        ForwardOptions {
            match_mode: self.match_mode.into(),
            max_runs: self.max_runs,
            max_trace_length: self.max_trace_length,
            prune_level: self.prune_level,
            agent_symmetry: !self.no_agent_symm,
            read_symmetry: self.read_symm,
            order_symmetry: self.symm_order,
            endgame_trimming: !self.no_endgame_trim,
            prune_no_more_claims: true,
            report_progress: !self.no_progress,
            force_choose: self.force_choose,
        }
    }

    pub fn backward_options(&self) -> BackwardOptions {
        BackwardOptions {
            match_mode: self.match_mode.into(),
            max_runs: self.max_runs,
            ..BackwardOptions::default()
        }
    }
}
