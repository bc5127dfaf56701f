//! Command-line runner and line-wise REPL for fen.
//!
//! `fen FILE` evaluates a file and prints its result; with no arguments an
//! interactive prompt reads one statement list per line.

use std::{
    io::{self, BufRead, Write},
    process::ExitCode,
};

use fen::{Interpreter, Object};

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    if args.len() > 1 {
        return run_file(&args[1]);
    }
    repl()
}

fn run_file(path: &str) -> ExitCode {
    let source = match std::fs::read_to_string(path) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("error: cannot read {path}: {err}");
            return ExitCode::FAILURE;
        }
    };
    let mut interp = Interpreter::new();
    interp.set_const_folding(true);
    match interp.eval_with(&source, |value| println!("{value}")) {
        Ok(result) => {
            if result != Object::Void {
                println!("{result}");
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn repl() -> ExitCode {
    let mut interp = Interpreter::new();
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        print!("fen> ");
        if io::stdout().flush().is_err() {
            return ExitCode::FAILURE;
        }
        let Some(Ok(line)) = lines.next() else {
            println!();
            return ExitCode::SUCCESS;
        };
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match trimmed {
            ".quit" => return ExitCode::SUCCESS,
            ".heap" => {
                let stats = interp.heap_stats();
                println!(
                    "heap: {} live, {} free, {} total",
                    stats.live_slots, stats.free_slots, stats.total_slots
                );
                continue;
            }
            ".dm" => {
                print!("{}", interp.disassemble_main());
                continue;
            }
            ".help" => {
                println!("commands: .help  .dm  .heap  .quit");
                continue;
            }
            _ => {}
        }
        match interp.eval(trimmed) {
            Ok(value) => {
                if value != Object::Void {
                    println!("{value}");
                }
            }
            Err(err) => eprintln!("{err}"),
        }
    }
}
