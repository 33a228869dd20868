//! # jqawk
//!
//! The command-line front end for jqawk. Parses flags, decides where the
//! program source and input records come from, and hands everything off
//! to the `jqawk` library. Everything spec.md calls out as an "external
//! collaborator" (flag parsing, the REPL loop, file opening, `-profile`,
//! `-dbg-ast`/`-dbg-lex` dumping) lives here; the library itself knows
//! nothing about argv or the filesystem beyond the input paths it's given.

use std::io::{IsTerminal, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser as ClapParser;
use log::{error, info};

use jqawk::evaluator::{EvalOptions, Evaluator, Frame, Input};
use jqawk::{lexer::Lexer, parse_program, parse_selector, value, JqawkError};

#[derive(ClapParser, Debug)]
#[command(author, about, disable_version_flag = true)]
struct Cli {
    /// Load program source from PATH instead of the positional program
    /// argument.
    #[arg(short = 'f', long = "file")]
    program_file: Option<PathBuf>,

    /// Root selector expression; may repeat. Each selector is evaluated
    /// against every decoded JSON value and its result becomes `$` for
    /// that record.
    #[arg(short = 'r', long = "root")]
    root: Vec<String>,

    /// After evaluation, serialise the root value as pretty JSON to
    /// PATH ('-' for standard output). Requires at most one input file.
    #[arg(short = 'o', long = "output")]
    output: Option<String>,

    /// Launch an interactive REPL instead of processing input records.
    #[arg(short = 'i', long = "interactive")]
    interactive: bool,

    /// Print the parsed AST to standard output and exit.
    #[arg(long = "dbg-ast")]
    dbg_ast: bool,

    /// Print the token stream to standard output and exit.
    #[arg(long = "dbg-lex")]
    dbg_lex: bool,

    /// Time the run and write elapsed wall-clock time to ./jqawk.profile.
    #[arg(long = "profile")]
    profile: bool,

    /// Print the version and exit.
    #[arg(long = "version")]
    show_version: bool,

    /// Raise the log level to `info` (default is `error`).
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,

    /// Program source text (omit when `-f` is given), followed by input
    /// files. With no files, standard input is read unless it's a
    /// terminal.
    rest: Vec<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    simple_logger::init_with_level(if cli.verbose { log::Level::Info } else { log::Level::Error })
        .expect("logger already initialized");

    if cli.show_version {
        println!("jqawk {}", env!("CARGO_PKG_VERSION"));
        return ExitCode::SUCCESS;
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("{message}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), String> {
    let source = load_source(&cli)?;

    if cli.dbg_lex {
        let tokens = Lexer::new(&source).lex_all().map_err(|e| e.message)?;
        println!("{tokens:#?}");
        return Ok(());
    }

    let program = parse_program(&source).map_err(|e| e.to_string())?;
    if cli.dbg_ast {
        println!("{program:#?}");
        return Ok(());
    }

    let selectors = cli
        .root
        .iter()
        .map(|expr_src| parse_selector(expr_src))
        .collect::<Result<Vec<_>, JqawkError>>()
        .map_err(|e| e.to_string())?;
    let selector_refs: Vec<&jqawk::ast::Expression> = selectors.iter().collect();

    if cli.interactive {
        if !cli.rest.is_empty() && cli.program_file.is_none() {
            return Err("'-i' does not take a positional program argument".into());
        }
        return run_repl(&program, &selector_refs);
    }

    let files: Vec<String> = if cli.program_file.is_some() {
        cli.rest.clone()
    } else {
        cli.rest.iter().skip(1).cloned().collect()
    };

    if cli.output.is_some() && files.len() > 1 {
        return Err("'-o' requires at most one input file".into());
    }

    let inputs = resolve_inputs(&files);

    let start = std::time::Instant::now();
    let mut stdout = std::io::stdout();
    let options = EvalOptions { inputs, root_selectors: selector_refs };
    let roots = jqawk::run_capturing_roots(&source, options, &mut stdout, &|| false)
        .map_err(|e| e.to_string())?;

    if cli.profile {
        let elapsed = start.elapsed();
        info!("run took {:?}", elapsed);
        if let Err(e) = std::fs::write("jqawk.profile", format!("{:?}\n", elapsed)) {
            error!("failed to write profile output: {e}");
        }
    }

    if let Some(path) = &cli.output {
        write_root(&roots, path)?;
    }

    Ok(())
}

fn load_source(cli: &Cli) -> Result<String, String> {
    if let Some(path) = &cli.program_file {
        return std::fs::read_to_string(path)
            .map_err(|e| format!("could not read '{}': {e}", path.display()));
    }
    cli.rest
        .first()
        .cloned()
        .ok_or_else(|| "no program given (pass it as an argument or with '-f')".to_string())
}

/// Files given on the command line, or standard input when none were
/// given and it isn't a terminal, or nothing at all when it is.
fn resolve_inputs(files: &[String]) -> Vec<Input> {
    if !files.is_empty() {
        return files.iter().cloned().map(Input::File).collect();
    }
    if std::io::stdin().is_terminal() {
        vec![]
    } else {
        vec![Input::Stdin]
    }
}

fn write_root(roots: &[value::Cell], path: &str) -> Result<(), String> {
    let [root] = roots else {
        return Err("'-o' requires the input to decode to exactly one JSON value".into());
    };
    let json = value::encode_json(root).map_err(|_| "error creating JSON: circular reference".to_string())?;
    if path == "-" {
        println!("{json}");
        Ok(())
    } else {
        std::fs::write(path, json).map_err(|e| format!("could not write '{path}': {e}"))
    }
}

/// A minimal line-at-a-time REPL: each line is wrapped in a `BEGIN`
/// block and executed against one evaluator/frame pair kept alive for
/// the whole session, so plain (non-`let`) assignments persist across
/// lines the way top-level `BEGIN` variables persist across rules.
fn run_repl(program: &jqawk::ast::Program, _selectors: &[&jqawk::ast::Expression]) -> Result<(), String> {
    for func in &program.functions {
        info!("note: top-level function '{}' is not available in '-i' mode", func.name);
    }

    let globals = Frame::root();
    let mut stdout = std::io::stdout();

    print!("jqawk> ");
    stdout.flush().ok();
    let mut line = String::new();
    while std::io::stdin().read_line(&mut line).unwrap_or(0) > 0 {
        let trimmed = line.trim_end();
        if !trimmed.is_empty() {
            let wrapped = format!("BEGIN {{ {trimmed} }}");
            match parse_program(&wrapped) {
                Ok(parsed) => {
                    // A fresh evaluator per line (so error positions are
                    // resolved against that line's own source), but the
                    // same `globals` frame, so implicit-global
                    // assignments persist the way they would across
                    // `BEGIN` rules in a real program.
                    let mut evaluator = Evaluator::new(&wrapped, &mut stdout, &|| false);
                    for rule in &parsed.rules {
                        if let Err(e) = evaluator.exec_block(&globals, &rule.body) {
                            eprintln!("{e}");
                        }
                    }
                }
                Err(e) => eprintln!("{e}"),
            }
        }
        line.clear();
        print!("jqawk> ");
        stdout.flush().ok();
    }
    println!();
    Ok(())
}
