// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2025 Tobias Sarnowski <tobias@sarnowski.cloud>
//
// main.rs - micro-eval

//! Entry point: wires up logging, parses the CLI, then runs every named
//! file followed by standard input through the same read-eval-print loop.

use std::fs;
use std::io::{self, BufRead, Write as _};
use std::process::ExitCode;

use clap::Parser as _;
use tracing::warn;

use micro_eval::error::Error;
use micro_eval::interpreter::{Config, Interpreter};
use micro_eval::reader::parser::Parser;
use micro_eval::value::Value;
use micro_eval::{eval, printer};

/// A register-trampoline Scheme-like interpreter core with a tagged-pointer
/// heap and a non-recursive mark-sweep collector.
#[derive(clap::Parser, Debug)]
#[command(name = "micro-eval", about = "A minimal Scheme-like interpreter")]
struct Cli {
    /// Source files to evaluate, in order, before reading from stdin.
    files: Vec<String>,

    /// Number of cons cells in the heap's cons arena.
    #[arg(long, default_value_t = 16 * 1024)]
    cons_capacity: usize,

    /// Number of machine words in the heap's storage arena.
    #[arg(long, default_value_t = 16 * 1024)]
    storage_words: u32,

    /// Depth of the evaluator's value stack.
    #[arg(long, default_value_t = 4096)]
    value_stack_depth: usize,

    /// Depth of the evaluator's label stack.
    #[arg(long, default_value_t = 4096)]
    label_stack_depth: usize,

    /// Whether primitive calls are arity/type-checked before dispatch.
    #[arg(long, default_value_t = true)]
    syntaxcheck: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let config = Config {
        cons_capacity: cli.cons_capacity,
        storage_words: cli.storage_words,
        value_stack_depth: cli.value_stack_depth,
        label_stack_depth: cli.label_stack_depth,
        syntaxcheck: cli.syntaxcheck,
    };

    let mut interp = match Interpreter::new(config) {
        Ok(interp) => interp,
        Err(e) => {
            println!("STARTUP-ERROR: {e}");
            return ExitCode::FAILURE;
        }
    };

    for path in &cli.files {
        match fs::read_to_string(path) {
            Err(_) => println!("STARTUP-ERROR: couldn't open file \"{path}\"."),
            Ok(src) => {
                println!("Reading from file \"{path}\".");
                run_source(&mut interp, &src, false);
                println!("End for file \"{path}\".");
            }
        }
    }

    println!("Reading from stdin.");
    let stdin = io::stdin();
    let mut lines = String::new();
    for line in stdin.lock().lines() {
        match line {
            Ok(line) => {
                lines.push_str(&line);
                lines.push('\n');
            }
            Err(_) => break,
        }
    }
    run_source(&mut interp, &lines, true);
    println!("Morituri te salutant.");

    ExitCode::SUCCESS
}

/// Runs every top-level expression in `src` through the read-eval-print
/// loop. `interactive` only affects the prompt/echo texture; both files and
/// stdin share the same recovery-point behavior on a recoverable error.
fn run_source(interp: &mut Interpreter, src: &str, interactive: bool) {
    let mut parser = Parser::new(src);
    loop {
        if interactive {
            print!("Micro-eval => ");
            let _ = io::stdout().flush();
        }

        match parser.read_one(interp) {
            Ok(None) => break,
            Ok(Some(exp)) => {
                let env = interp.global_env;
                match eval::eval(interp, exp, env) {
                    Ok(val) => {
                        println!("{}", printer::write_to_string(&interp.heap, &interp.reserved, val));
                        bind_last_result(interp, val);
                    }
                    Err(e) => {
                        let fatal = !e.is_recoverable();
                        report_error(interp, &e);
                        if fatal {
                            break;
                        }
                    }
                }
            }
            Err(e) => {
                let is_parse_error = matches!(e, Error::Parse(_));
                report_error(interp, &e);
                if !e.is_recoverable() {
                    break;
                }
                if is_parse_error {
                    parser.synchronize();
                }
            }
        }
    }
}

/// Binds `!!` to the most recent top-level result, as the original REPL
/// does, swallowing any failure from the bind itself (it can only fail with
/// an allocation error, already reported by the eval that produced `val`).
fn bind_last_result(interp: &mut Interpreter, val: Value) {
    if let Ok(sym) = interp.make_symbol("!!") {
        let _ = interp.define_global(sym, val);
    }
}

fn report_error(interp: &mut Interpreter, e: &Error) {
    println!("{e}");
    if e.is_recoverable() {
        warn!("Resetting interpreter.");
        println!("Resetting interpreter.");
        interp.reset_after_error();
    } else {
        println!("Bailing out.");
    }
}
