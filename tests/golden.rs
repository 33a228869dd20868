//! End-to-end scenarios, each run through the whole pipeline: source text
//! parsed into a program, evaluated against literal JSON input files, with
//! output captured and asserted verbatim.

use std::sync::atomic::{AtomicU64, Ordering};

use jqawk::evaluator::{EvalOptions, Input};

static COUNTER: AtomicU64 = AtomicU64::new(0);

/// Writes `contents` to a fresh temp file and returns its path. Real files
/// rather than an in-memory stream because `Input` only knows how to read
/// standard input or a path on disk.
fn tmp_json(contents: &str) -> std::path::PathBuf {
    let id = COUNTER.fetch_add(1, Ordering::Relaxed);
    let path = std::env::temp_dir().join(format!("jqawk-golden-{}-{id}.json", std::process::id()));
    std::fs::write(&path, contents).expect("write temp fixture");
    path
}

fn run_ok(source: &str, inputs: &[&str]) -> String {
    let files: Vec<_> = inputs.iter().map(|s| tmp_json(s)).collect();
    let inputs = files.iter().map(|p| Input::File(p.display().to_string())).collect();
    let options = EvalOptions { inputs, root_selectors: vec![] };
    let mut out = Vec::new();
    jqawk::run(source, options, &mut out, &|| false).expect("program should succeed");
    for path in &files {
        std::fs::remove_file(path).ok();
    }
    String::from_utf8(out).expect("output should be utf8")
}

fn run_err(source: &str, inputs: &[&str]) -> String {
    let files: Vec<_> = inputs.iter().map(|s| tmp_json(s)).collect();
    let inputs = files.iter().map(|p| Input::File(p.display().to_string())).collect();
    let options = EvalOptions { inputs, root_selectors: vec![] };
    let mut out = Vec::new();
    let err = jqawk::run(source, options, &mut out, &|| false).expect_err("program should fail");
    for path in &files {
        std::fs::remove_file(path).ok();
    }
    err.to_string()
}

#[test]
fn counts_array_elements() {
    let out = run_ok("{ count++ } END { print count }", &["[1,2,3,4,5]"]);
    assert_eq!(out, "5\n");
}

#[test]
fn filters_records_by_field() {
    let employees = r#"[
        {"name": "Mark", "hours": 38},
        {"name": "Anna", "hours": 12},
        {"name": "Mary", "hours": 40},
        {"name": "Tom", "hours": 8},
        {"name": "Susie", "hours": 22},
        {"name": "Dave", "hours": 5}
    ]"#;
    let out = run_ok("$.hours > 15 { print $.name }", &[employees]);
    assert_eq!(out, "Mark\nMary\nSusie\n");
}

#[test]
fn self_referential_object_prints_as_circular_reference() {
    let out = run_ok("BEGIN { a.a = a; print a }", &[]);
    assert_eq!(out, "{\"a\": <circular reference>}\n");
}

#[test]
fn self_referential_object_fails_to_encode_as_json() {
    let message = run_err("BEGIN { a.a = a; print json(a) }", &[]);
    assert!(
        message.contains("error creating JSON: circular reference"),
        "unexpected error message: {message}"
    );
}

#[test]
fn match_expression_destructures_array_patterns() {
    let source = "{ print match ($) { [1, x] => x*2, [2, x] => x+10 } }";
    let out = run_ok(source, &["[[1,1],[1,2],[2,1]]"]);
    assert_eq!(out, "2\n4\n11\n");
}

#[test]
fn string_prototype_methods_upper_and_split() {
    let out = run_ok("BEGIN { print \"aBc\".upper() }", &[]);
    assert_eq!(out, "ABC\n");

    let out = run_ok("BEGIN { print \"aBCd\".split(/BC/) }", &[]);
    assert_eq!(out, "[\"a\", \"d\"]\n");
}

#[test]
fn multi_file_run_shares_begin_and_end_across_files() {
    let source = "BEGIN { print 'hi' } { print $.a } END { print 'bye' }";
    let out = run_ok(source, &[r#"[{"a":1}]"#, r#"[{"a":2}]"#]);
    assert_eq!(out, "hi\n1\n2\nbye\n");
}

#[test]
fn begin_file_and_end_file_run_per_value_not_per_file() {
    // One file, two whitespace-separated top-level JSON values: BEGINFILE/
    // ENDFILE must fire once per value (with `$` bound to that value),
    // not once for the whole file.
    let source = "BEGINFILE { print 'begin', $ } { print 'main', $ } ENDFILE { print 'end', $ }";
    let out = run_ok(source, &["1 2"]);
    assert_eq!(out, "begin 1\nmain 1\nend 1\nbegin 2\nmain 2\nend 2\n");
}

#[test]
fn printf_width_specifiers_pad_output_end_to_end() {
    let out = run_ok("BEGIN { print printf('[%-5s][%05f]', 'x', 3.5) }", &[]);
    assert_eq!(out, "[x    ][003.5]\n");
}

#[test]
fn file_global_names_the_current_input_file() {
    let files: Vec<_> = [r#"[{"a":1}]"#, r#"[{"a":2}]"#].iter().map(|s| tmp_json(s)).collect();
    let inputs = files.iter().map(|p| Input::File(p.display().to_string())).collect();
    let options = EvalOptions { inputs, root_selectors: vec![] };
    let mut out = Vec::new();
    jqawk::run("{ print $file, $.a }", options, &mut out, &|| false).expect("program should succeed");
    for path in &files {
        std::fs::remove_file(path).ok();
    }
    let out = String::from_utf8(out).expect("output should be utf8");
    let expected = format!(
        "{} 1\n{} 2\n",
        files[0].display(),
        files[1].display()
    );
    assert_eq!(out, expected);
}
