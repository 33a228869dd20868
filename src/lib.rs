//! jqawk: an AWK-inspired language for processing JSON values from files
//! or standard input.

pub mod ast;
pub mod builtins;
pub mod error;
pub mod evaluator;
pub mod json;
pub mod lexer;
pub mod parser;
pub mod value;

pub use error::{JqawkError, JqawkResult};
pub use evaluator::{EvalOptions, Input};
pub use parser::{parse_program, parse_selector};

use std::io::Write;

/// Parses `source` and runs it against `options.inputs`, writing `print`
/// and `printf` output to `output`. `cancelled` is polled between
/// expression evaluations so a long-running program (e.g. in the `-i`
/// REPL or an embedding that wants a timeout) can be interrupted
/// cleanly rather than killed.
pub fn run(
    source: &str,
    options: EvalOptions<'_>,
    output: &mut dyn Write,
    cancelled: &dyn Fn() -> bool,
) -> JqawkResult<()> {
    run_capturing_roots(source, options, output, cancelled).map(|_| ())
}

/// Like [`run`], but also returns the decoded top-level JSON value(s)
/// read off the input stream(s), in read order. Used by the `-o` CLI
/// flag to serialise "the root value" back out after evaluation.
pub fn run_capturing_roots(
    source: &str,
    options: EvalOptions<'_>,
    output: &mut dyn Write,
    cancelled: &dyn Fn() -> bool,
) -> JqawkResult<Vec<value::Cell>> {
    let program = parse_program(source)?;
    evaluator::run_program(&program, options, source, output, cancelled)
}
