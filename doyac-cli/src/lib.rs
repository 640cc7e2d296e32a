//! # doyac-cli
//!
//! The command-line driver (§6): reads a protocol description, builds a
//! [`doyac_model::Model`] from it, runs the selected search engine, and
//! renders the resulting verdict. Everything here is glue — the actual
//! term algebra, model and search live in `doyac-term`/`doyac-model`/
//! `doyac-engine`.
//!
//! | Stage | Module |
//! |---|---|
//! | CLI switches (§6's table) | [`config`] |
//! | protocol description → `Model` | [`loader`] |
//! | `Model` → verdict | `doyac_engine::verify` |
//! | verdict → text | [`render`] |

pub mod config;
pub mod loader;
pub mod render;

use clap::Parser;
use config::Cli;
use doyac_base::{Result, SpannedError};
use doyac_engine::{BackwardOptions, ForwardOptions, Traversal, Verdict};
use log::{info, warn};
use std::fs;
use std::io::{self, Read, Write};

/// Exit codes exactly as §6: 0 no attack (claims present), 1
/// internal/config error, 2 no claims to check, 3 attack found.
pub const EXIT_NO_ATTACK: i32 = 0;
pub const EXIT_ERROR: i32 = 1;
pub const EXIT_NO_CLAIMS: i32 = 2;
pub const EXIT_ATTACK_FOUND: i32 = 3;

/// Parses arguments, runs the verifier, writes the report, and returns
/// the process exit code. `main` only has to forward the result.
pub fn run_cli() -> Result<i32> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if cli.latex {
        warn!("--latex was passed but LaTeX rendering is not implemented; emitting plain text instead");
    }
    if cli.state_space {
        warn!("--state-space was passed but Graphviz state-graph export is not implemented");
    }

    let source = read_input(&cli.input)?;
    let loaded = loader::load(&source)?;

    let verdict = if cli.incremental_runs {
        run_incremental_runs(&cli, &loaded.model)?
    } else {
        verify_once(&cli, &loaded.model, cli.max_runs, cli.max_trace_length)?
    };

    let code = match &verdict {
        Verdict::NoAttack => EXIT_NO_ATTACK,
        Verdict::NoClaims => EXIT_NO_CLAIMS,
        Verdict::Attack(_) => EXIT_ATTACK_FOUND,
    };

    if let Verdict::Attack(attack) = &verdict {
        if !cli.disable_report {
            let text = render::render_attack(&loaded.interner, attack);
            write_output(cli.output.as_deref(), &text)?;
        }
    }

    info!("verdict: {}", verdict_name(&verdict));
    Ok(code)
}

fn verdict_name(v: &Verdict) -> &'static str {
    match v {
        Verdict::NoAttack => "no attack",
        Verdict::NoClaims => "no claims",
        Verdict::Attack(_) => "attack found",
    }
}

/// Re-runs the verifier with the run cap raised by one each time, from 1
/// up to `--max-runs`, stopping as soon as an attack is found. Under
/// `--incremental-traces` (forward engine only) the trace-length bound is
/// raised the same way, nested inside the run-cap loop.
fn run_incremental_runs(cli: &Cli, model: &doyac_model::Model) -> Result<Verdict> {
    for runs in 1..=cli.max_runs {
        let trace_len = if cli.incremental_traces {
            let min_len = 2.min(cli.max_trace_length);
            let mut last = Verdict::NoClaims;
            for len in min_len..=cli.max_trace_length {
                last = verify_once(cli, model, runs, len)?;
                if !matches!(last, Verdict::NoAttack) {
                    break;
                }
            }
            return Ok(last);
        } else {
            cli.max_trace_length
        };
        let verdict = verify_once(cli, model, runs, trace_len)?;
        if !matches!(verdict, Verdict::NoAttack) {
            return Ok(verdict);
        }
    }
    Ok(Verdict::NoAttack)
}

fn verify_once(
    cli: &Cli,
    model: &doyac_model::Model,
    max_runs: usize,
    max_trace_length: usize,
) -> Result<Verdict> {
    let forward_opts = ForwardOptions {
        max_runs,
        max_trace_length,
        ..cli.forward_options()
    };
    let backward_opts = BackwardOptions {
        max_runs,
        ..cli.backward_options()
    };
    let traversal: Traversal = cli.traversal.into();
    doyac_engine::verify(model, traversal, forward_opts, backward_opts)
        .map_err(|e| SpannedError::unspanned(format!("internal engine error: {e}")))
}

fn read_input(path: &str) -> Result<String> {
    if path == "-" {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .map_err(|e| SpannedError::unspanned(format!("reading standard input: {e}")))?;
        Ok(buf)
    } else {
        fs::read_to_string(path).map_err(|e| SpannedError::unspanned(format!("reading '{path}': {e}")))
    }
}

fn write_output(path: Option<&str>, text: &str) -> Result<()> {
    match path {
        None | Some("-") => {
            print!("{text}");
            Ok(())
        }
        Some(path) => {
            let mut file =
                fs::File::create(path).map_err(|e| SpannedError::unspanned(format!("writing '{path}': {e}")))?;
            file.write_all(text.as_bytes())
                .map_err(|e| SpannedError::unspanned(format!("writing '{path}': {e}")))
        }
    }
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn read_input_reads_a_file_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("protocol.toml");
        fs::write(&path, "hello").unwrap();

        let contents = read_input(path.to_str().unwrap()).unwrap();
        assert_eq!(contents, "hello");
    }

    #[test]
    fn read_input_reports_a_missing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing.toml");

        assert!(read_input(path.to_str().unwrap()).is_err());
    }

    #[test]
    fn write_output_writes_to_a_file_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("trace.txt");

        write_output(Some(path.to_str().unwrap()), "witness\n").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "witness\n");
    }
}
