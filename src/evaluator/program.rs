//! Rule dispatch: partitions a parsed program into its `BEGIN` /
//! `BEGINFILE` / main / `ENDFILE` / `END` rules and drives them over a
//! streaming sequence of JSON records read from one or more inputs.

use std::rc::Rc;

use log::info;

use crate::ast::{Expression, Program, RuleKind};
use crate::error::JqawkError;
use crate::evaluator::{Evaluator, Frame, FrameRef, Signal};
use crate::json::{from_json, JsonReader};
use crate::value::{new_cell, Cell, FunctionValue, Value};

/// One input source: a real file path, or standard input (named `"-"`
/// for diagnostics, matching the convention `cat`/`jq` use).
pub enum Input {
    Stdin,
    File(String),
}

pub struct EvalOptions<'p> {
    pub inputs: Vec<Input>,
    /// Parsed `-r` selector expressions, applied in order against each
    /// top-level decoded value to find the sub-value(s) iterated as
    /// records. Empty means: iterate the decoded value itself.
    pub root_selectors: Vec<&'p Expression>,
}

/// Runs a whole program and returns the decoded top-level JSON value(s),
/// one per value read off the input stream(s), in read order. The `-o`
/// CLI flag serialises this back out as "the root value" — callers that
/// don't need it (library embedders running `run` for side effects only)
/// can simply ignore the result.
pub fn run_program(
    program: &Program,
    options: EvalOptions,
    source: &str,
    output: &mut dyn std::io::Write,
    cancelled: &dyn Fn() -> bool,
) -> Result<Vec<Cell>, JqawkError> {
    let mut begin = vec![];
    let mut begin_file = vec![];
    let mut main = vec![];
    let mut end_file = vec![];
    let mut end = vec![];
    for rule in &program.rules {
        match rule.kind {
            RuleKind::Begin => begin.push(rule),
            RuleKind::BeginFile => begin_file.push(rule),
            RuleKind::Main => main.push(rule),
            RuleKind::EndFile => end_file.push(rule),
            RuleKind::End => end.push(rule),
        }
    }

    let mut evaluator = Evaluator::new(source, output, cancelled);
    for func in &program.functions {
        let value = Rc::new(FunctionValue {
            name: Some(func.name.clone()),
            params: func.params.clone(),
            body: func.body.clone(),
            captured: evaluator.globals().clone(),
        });
        evaluator.define_function(func.name.clone(), value);
    }

    let globals = evaluator.globals().clone();
    let mut exiting = false;
    let mut roots: Vec<Cell> = Vec::new();

    info!("running {} BEGIN rule(s)", begin.len());
    for rule in &begin {
        if run_rule_body(&mut evaluator, &globals, rule)? {
            exiting = true;
            break;
        }
    }

    if !exiting {
        'inputs: for input in &options.inputs {
            let file_name = match input {
                Input::Stdin => "-".to_string(),
                Input::File(path) => path.clone(),
            };
            info!("switching to input '{file_name}'");
            globals
                .borrow_mut()
                .declare("$file", new_cell(Value::Str(file_name.clone())));

            let values = read_input(input, &file_name)?;
            for value in values {
                let record = from_json(value);
                roots.push(record.clone());
                if dispatch_record(
                    &mut evaluator,
                    &globals,
                    &begin_file,
                    &main,
                    &end_file,
                    &record,
                    &options.root_selectors,
                )? {
                    exiting = true;
                    break 'inputs;
                }
            }
        }
    }

    info!("running {} END rule(s)", end.len());
    for rule in &end {
        if run_rule_body(&mut evaluator, &globals, rule)? {
            break;
        }
    }

    Ok(roots)
}

fn read_input(input: &Input, file_name: &str) -> Result<Vec<serde_json::Value>, JqawkError> {
    match input {
        Input::Stdin => JsonReader::new(file_name, std::io::stdin()).read_all(),
        Input::File(path) => {
            let file = std::fs::File::open(path)
                .map_err(|e| JqawkError::json(e.to_string(), file_name.to_string()))?;
            JsonReader::new(file_name, file).read_all()
        }
    }
}

/// Expands one decoded top-level value into the sub-roots `BEGINFILE`/
/// main/`ENDFILE` run against: the value itself, or (with `-r`
/// selectors) each selector's result in turn, evaluated against the
/// value with `$` bound to it.
fn dispatch_record(
    evaluator: &mut Evaluator,
    globals: &FrameRef,
    begin_file: &[&crate::ast::Rule],
    main: &[&crate::ast::Rule],
    end_file: &[&crate::ast::Rule],
    record: &Cell,
    root_selectors: &[&Expression],
) -> Result<bool, JqawkError> {
    if root_selectors.is_empty() {
        return dispatch_sub_root(evaluator, globals, begin_file, main, end_file, record);
    }
    for selector in root_selectors {
        globals.borrow_mut().declare("$", record.clone());
        let sub_root = evaluator.eval_expr(globals, selector)?;
        if dispatch_sub_root(evaluator, globals, begin_file, main, end_file, &sub_root)? {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Runs one sub-root's full `BEGINFILE` / pattern-rule / `ENDFILE`
/// sequence: `$` is bound to the sub-root before `BEGINFILE`, iterated
/// over its items/entries for the pattern rules, then reset to the
/// sub-root (which the pattern bodies may have rewritten in place)
/// before `ENDFILE`.
fn dispatch_sub_root(
    evaluator: &mut Evaluator,
    globals: &FrameRef,
    begin_file: &[&crate::ast::Rule],
    main: &[&crate::ast::Rule],
    end_file: &[&crate::ast::Rule],
    sub_root: &Cell,
) -> Result<bool, JqawkError> {
    globals.borrow_mut().declare("$", sub_root.clone());
    for rule in begin_file {
        if run_rule_body(evaluator, globals, rule)? {
            return Ok(true);
        }
    }

    if dispatch_root(evaluator, globals, main, sub_root)? {
        return Ok(true);
    }

    globals.borrow_mut().declare("$", sub_root.clone());
    for rule in end_file {
        if run_rule_body(evaluator, globals, rule)? {
            return Ok(true);
        }
    }
    Ok(false)
}

fn dispatch_root(
    evaluator: &mut Evaluator,
    globals: &FrameRef,
    main: &[&crate::ast::Rule],
    root: &Cell,
) -> Result<bool, JqawkError> {
    let entries: Vec<(Option<Value>, Cell)> = {
        let value = root.borrow();
        match &*value {
            Value::Array(items) => items
                .iter()
                .enumerate()
                .map(|(idx, item)| (Some(Value::Num(idx as f64)), item.clone()))
                .collect(),
            Value::Object(object) => object
                .iter()
                .map(|(key, value)| (Some(Value::Str(key.clone())), value.clone()))
                .collect(),
            _ => vec![(None, root.clone())],
        }
    };

    for (index_or_key, record) in entries {
        globals.borrow_mut().declare("$", record);
        match index_or_key {
            Some(Value::Num(n)) => globals.borrow_mut().declare("$index", new_cell(Value::Num(n))),
            Some(Value::Str(s)) => globals.borrow_mut().declare("$key", new_cell(Value::Str(s))),
            _ => {}
        }
        for rule in main {
            if run_rule_body(evaluator, globals, rule)? {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

/// Runs one rule's pattern check (if any) and body. Returns `true` if
/// the body raised `exit`, signalling the whole run should wind down to
/// its `END` rules.
fn run_rule_body(
    evaluator: &mut Evaluator,
    frame: &FrameRef,
    rule: &crate::ast::Rule,
) -> Result<bool, JqawkError> {
    if let Some(pattern) = &rule.pattern {
        let cond = evaluator.eval_expr(frame, pattern)?;
        if !cond.borrow().is_truthy() {
            return Ok(false);
        }
    }
    let child = Frame::child(frame);
    match evaluator.exec_block(&child, &rule.body)? {
        Signal::Exit => Ok(true),
        Signal::Next => Ok(false),
        _ => Ok(false),
    }
}
