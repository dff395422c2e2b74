//! `monkey` — REPL and file runner.
//!
//! Usage:
//!
//! ```text
//! monkey [FILE] [-v|--verbose] [--no-history]
//! ```
//!
//! With no `FILE`, starts an interactive session that persists the symbol
//! table, constant pool and globals array across lines. With one `FILE`,
//! runs its contents once and exits non-zero on any stage error.

mod config;

use std::path::PathBuf;
use std::process::ExitCode;
use std::rc::Rc;

use clap::Parser as ClapParser;
use monkey_compiler::{Compiler, Parser as MonkeyParser, SymbolTable};
use monkey_core::Object;
use monkey_vm::Vm;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing_subscriber::EnvFilter;

use config::ReplConfig;

#[derive(ClapParser)]
#[command(name = "monkey")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "The Monkey programming language", long_about = None)]
struct Args {
    /// Source file to execute. Omit to start an interactive session.
    file: Option<PathBuf>,

    /// Raise the tracing filter to debug.
    #[arg(short, long)]
    verbose: bool,

    /// Disable REPL history persistence for this session.
    #[arg(long)]
    no_history: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.verbose);

    match &args.file {
        Some(path) => run_file(path),
        None => {
            run_repl(args.no_history);
            ExitCode::SUCCESS
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn run_file(path: &PathBuf) -> ExitCode {
    let source = match std::fs::read_to_string(path) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("monkey: could not read {}: {e}", path.display());
            return ExitCode::FAILURE;
        }
    };

    let mut compiler = Compiler::new();
    match eval(&source, &mut compiler, vec![None; GLOBALS_SIZE]) {
        Ok((value, _globals)) => {
            tracing::debug!(?value, "file run completed");
            ExitCode::SUCCESS
        }
        Err(message) => {
            eprintln!("{message}");
            ExitCode::FAILURE
        }
    }
}

const GLOBALS_SIZE: usize = 65536;

/// Lex, parse, compile and run `source` against the given (possibly
/// accumulated) compiler state and globals array, returning the last
/// popped value and the updated globals for the next line.
fn eval(
    source: &str,
    compiler: &mut Compiler,
    globals: Vec<Option<Rc<Object>>>,
) -> Result<(Option<Rc<Object>>, Vec<Option<Rc<Object>>>), String> {
    tracing::debug!("lexing and parsing");
    let mut parser = MonkeyParser::new(source);
    let (program, errors) = parser.parse_program();
    if !errors.is_empty() {
        tracing::warn!(%errors, "parse failed");
        return Err(errors.to_string());
    }

    tracing::debug!("compiling");
    let bytecode = compiler.compile_program(&program).map_err(|e| {
        tracing::warn!(error = %e, "compile failed");
        e.to_string()
    })?;

    tracing::debug!("running");
    let mut vm = Vm::new_with_globals(bytecode, globals);
    vm.run().map_err(|e| {
        tracing::error!(error = %e, "runtime error");
        e.to_string()
    })?;

    let value = vm.last_popped().cloned();
    Ok((value, vm.into_globals()))
}

fn run_repl(no_history: bool) {
    let config = ReplConfig::load();
    println!("Monkey {}", env!("CARGO_PKG_VERSION"));

    let mut editor = DefaultEditor::new().expect("failed to initialize line editor");
    if !no_history {
        if let Some(history_file) = &config.history_file {
            let _ = editor.load_history(history_file);
        }
    }

    let mut symbol_table = SymbolTable::new();
    for (i, name) in monkey_compiler::BUILTIN_NAMES.iter().enumerate() {
        symbol_table.define_builtin(i, name);
    }
    let mut constants = Vec::new();
    let mut globals = vec![None; GLOBALS_SIZE];

    loop {
        match editor.readline(&config.prompt) {
            Ok(line) => {
                if line.trim().is_empty() {
                    continue;
                }
                let _ = editor.add_history_entry(&line);

                let mut compiler = Compiler::new_with_state(
                    std::mem::take(&mut constants),
                    std::mem::take(&mut symbol_table),
                );
                match eval(&line, &mut compiler, std::mem::take(&mut globals)) {
                    Ok((value, updated_globals)) => {
                        globals = updated_globals;
                        if let Some(value) = value {
                            println!("{value}");
                        }
                    }
                    Err(message) => eprintln!("{message}"),
                }
                (constants, symbol_table) = compiler.into_state();
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("monkey: readline error: {e}");
                break;
            }
        }
    }

    if !no_history {
        if let Some(history_file) = &config.history_file {
            if let Some(parent) = history_file.parent() {
                let _ = std::fs::create_dir_all(parent);
            }
            let _ = editor.save_history(history_file);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eval_persists_globals_across_calls() {
        let mut compiler = Compiler::new();
        let (value, globals) = eval("let x = 5;", &mut compiler, vec![None; GLOBALS_SIZE]).unwrap();
        assert!(value.is_none());

        let (constants, symbol_table) = compiler.into_state();
        let mut compiler = Compiler::new_with_state(constants, symbol_table);
        let (value, _) = eval("x + 1;", &mut compiler, globals).unwrap();
        assert_eq!(*value.unwrap(), Object::Integer(6));
    }

    #[test]
    fn eval_reports_parse_errors_without_running() {
        let mut compiler = Compiler::new();
        let err = eval("let x = ;", &mut compiler, vec![None; GLOBALS_SIZE]).unwrap_err();
        assert!(err.contains("no prefix parse function"));
    }
}
