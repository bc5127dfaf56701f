//! File-based fixtures: each `test_scripts/*.fen` declares its expected
//! outcome in a leading comment.
//!
//! - `// expect: <value>` — the script's result, in `Object` display form
//! - `// error: <substring>` — evaluation must fail and the rendered error
//!   must contain the substring
//!
//! Lines starting `// print:` assert the values handed to the invoke
//! callback, in order.

use std::{error::Error, path::Path};

use fen::Interpreter;

fn run_script_case(path: &Path) -> Result<(), Box<dyn Error>> {
    let source = std::fs::read_to_string(path)?;

    let mut expect: Option<String> = None;
    let mut expect_error: Option<String> = None;
    let mut expect_prints: Vec<String> = Vec::new();
    for line in source.lines() {
        let Some(directive) = line.strip_prefix("// ") else { break };
        if let Some(value) = directive.strip_prefix("expect: ") {
            expect = Some(value.trim().to_owned());
        } else if let Some(value) = directive.strip_prefix("error: ") {
            expect_error = Some(value.trim().to_owned());
        } else if let Some(value) = directive.strip_prefix("print: ") {
            expect_prints.push(value.trim().to_owned());
        }
    }

    let mut interp = Interpreter::new();
    let mut printed = Vec::new();
    let result = interp.eval_with(&source, |value| printed.push(value.to_string()));

    match (result, expect_error) {
        (Ok(value), None) => {
            if let Some(expected) = expect {
                let got = value.to_string();
                if got != expected {
                    return Err(format!("{}: expected {expected}, got {got}", path.display()).into());
                }
            }
            if printed != expect_prints {
                return Err(format!(
                    "{}: expected prints {expect_prints:?}, got {printed:?}",
                    path.display()
                )
                .into());
            }
            Ok(())
        }
        (Ok(value), Some(expected)) => {
            Err(format!("{}: expected error containing {expected:?}, got value {value}", path.display()).into())
        }
        (Err(err), Some(expected)) => {
            let rendered = err.to_string();
            if rendered.contains(&expected) {
                Ok(())
            } else {
                Err(format!(
                    "{}: expected error containing {expected:?}, got: {rendered}",
                    path.display()
                )
                .into())
            }
        }
        (Err(err), None) => Err(format!("{}: unexpected error: {err}", path.display()).into()),
    }
}

datatest_stable::harness!(run_script_case, "test_scripts", r"^.*\.fen$");
