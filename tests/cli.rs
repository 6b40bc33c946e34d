use std::path::{Path, PathBuf};
use std::process::Command;

use lona_logic::compiler::ast::{
    Declaration, Expression, FunctionCallArgument, Literal, Program, Root, Statement,
    TopLevelNode, TypeAnnotation,
};

fn run_logic(dir: &Path, args: &[&str]) -> (String, String, bool) {
    let output = Command::new(env!("CARGO_BIN_EXE_logic"))
        .args(args)
        .current_dir(dir)
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to execute logic");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();

    (stdout, stderr, success)
}

fn assert_success(dir: &Path, args: &[&str]) -> String {
    let (stdout, stderr, success) = run_logic(dir, args);
    assert!(success, "command should succeed, stderr:\n{}", stderr);
    stdout
}

fn assert_failure(dir: &Path, args: &[&str]) -> String {
    let (_, stderr, success) = run_logic(dir, args);
    assert!(!success, "command should fail");
    stderr
}

fn write_program(dir: &Path, name: &str, block: Vec<Statement>) -> PathBuf {
    let path = dir.join(name);
    let document = TopLevelNode::Root(Root::Program(Program::new(block)));
    std::fs::write(&path, serde_json::to_string_pretty(&document).unwrap()).unwrap();
    path
}

fn call(path: &[&str], arguments: Vec<(&str, Expression)>) -> Expression {
    Expression::call(
        Expression::path(path),
        arguments
            .into_iter()
            .map(|(label, expression)| FunctionCallArgument::labeled(label, expression))
            .collect(),
    )
}

/// Two colors in a namespace and a boolean at the top level.
fn tokens_program() -> Vec<Statement> {
    vec![
        Statement::declaration(Declaration::namespace(
            "Colors",
            vec![
                Declaration::variable(
                    "primary",
                    Some(TypeAnnotation::named("Color", vec![])),
                    Some(Expression::literal(Literal::color("#FF0000"))),
                ),
                Declaration::variable(
                    "secondary",
                    Some(TypeAnnotation::named("Color", vec![])),
                    Some(call(
                        &["Color", "setHue"],
                        vec![
                            ("color", Expression::identifier("primary")),
                            ("hue", Expression::literal(Literal::number(240.0))),
                        ],
                    )),
                ),
            ],
        )),
        Statement::declaration(Declaration::variable(
            "enabled",
            Some(TypeAnnotation::named("Boolean", vec![])),
            Some(call(
                &["Boolean", "and"],
                vec![
                    ("a", Expression::literal(Literal::boolean(true))),
                    ("b", Expression::literal(Literal::boolean(false))),
                ],
            )),
        )),
    ]
}

#[test]
fn test_check() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_program(dir.path(), "tokens.logic", tokens_program());
    let stdout = assert_success(dir.path(), &["check", path.to_str().unwrap()]);
    assert_eq!(stdout, "Type check passed.\n");
}

#[test]
fn test_check_type_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_program(
        dir.path(),
        "broken.logic",
        vec![Statement::declaration(Declaration::variable(
            "size",
            Some(TypeAnnotation::named("Number", vec![])),
            Some(Expression::literal(Literal::string("large"))),
        ))],
    );
    let stderr = assert_failure(dir.path(), &["check", path.to_str().unwrap()]);
    assert!(stderr.contains("type error"), "stderr:\n{}", stderr);
}

#[test]
fn test_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let stderr = assert_failure(dir.path(), &["check", "missing.logic"]);
    assert!(stderr.contains("failed to read"), "stderr:\n{}", stderr);
}

#[test]
fn test_no_files_outside_project() {
    let dir = tempfile::tempdir().unwrap();
    let stderr = assert_failure(dir.path(), &["check"]);
    assert!(stderr.contains("no file specified"), "stderr:\n{}", stderr);
}

#[test]
fn test_eval() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_program(dir.path(), "tokens.logic", tokens_program());
    let stdout = assert_success(dir.path(), &["eval", path.to_str().unwrap()]);
    assert_eq!(
        stdout,
        "Colors.primary = #FF0000\nColors.secondary = #0000FF\nenabled = false\n"
    );
}

#[test]
fn test_eval_single_node() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_program(dir.path(), "tokens.logic", tokens_program());
    let stdout = assert_success(
        dir.path(),
        &["eval", path.to_str().unwrap(), "--node", "Colors.secondary"],
    );
    assert_eq!(stdout, "Colors.secondary = #0000FF\n");

    let stdout = assert_success(
        dir.path(),
        &["eval", path.to_str().unwrap(), "--node", "Colors.tertiary"],
    );
    assert_eq!(stdout, "Colors.tertiary = <unknown>\n");
}

#[test]
fn test_eval_json() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_program(dir.path(), "tokens.logic", tokens_program());
    let stdout = assert_success(
        dir.path(),
        &["eval", path.to_str().unwrap(), "--format", "json"],
    );
    let json: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(json["enabled"]["memory"]["type"], "bool");
    assert_eq!(json["enabled"]["memory"]["value"], false);
    assert_eq!(json["Colors.primary"]["memory"]["type"], "record");
    assert_eq!(
        json["Colors.secondary"]["memory"]["value"]["value"]["memory"]["value"],
        "#0000FF"
    );
}

#[test]
fn test_eval_dumps_to_stderr() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_program(dir.path(), "tokens.logic", tokens_program());
    let (stdout, stderr, success) = run_logic(
        dir.path(),
        &["eval", path.to_str().unwrap(), "--dump-ast", "--dump-types"],
    );
    assert!(success, "stderr:\n{}", stderr);
    assert!(stderr.contains("== AST =="));
    assert!(stderr.contains("== Types =="));
    assert!(stderr.contains("enabled: Boolean"), "stderr:\n{}", stderr);
    assert!(!stdout.contains("== AST =="));
}

#[test]
fn test_deps() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_program(dir.path(), "tokens.logic", tokens_program());
    let stdout = assert_success(dir.path(), &["deps", path.to_str().unwrap()]);
    assert_eq!(stdout, "Boolean\nColor\n");
}

#[test]
fn test_deps_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_program(dir.path(), "tokens.logic", tokens_program());
    let stderr = assert_failure(
        dir.path(),
        &["deps", path.to_str().unwrap(), "missing.logic"],
    );
    assert!(stderr.contains("failed to read"), "stderr:\n{}", stderr);
}

#[test]
fn test_init_then_eval_project() {
    let dir = tempfile::tempdir().unwrap();
    let stdout = assert_success(dir.path(), &["init", "tokens"]);
    assert!(stdout.contains("Created new logic project 'tokens'"));
    assert!(dir.path().join("logic.toml").exists());

    let stdout = assert_success(dir.path(), &["check"]);
    assert_eq!(stdout, "Type check passed.\n");

    let stdout = assert_success(dir.path(), &["eval"]);
    assert_eq!(stdout, "Colors.primary = #3366FF\n");

    assert_failure(dir.path(), &["init"]);
}

#[test]
fn test_libraries_directory() {
    let dir = tempfile::tempdir().unwrap();
    let libraries = dir.path().join("libraries");
    std::fs::create_dir(&libraries).unwrap();
    write_program(
        &libraries,
        "Prelude.logic",
        vec![Statement::declaration(Declaration::record("Number", &[], vec![]))],
    );
    let path = write_program(
        dir.path(),
        "size.logic",
        vec![Statement::declaration(Declaration::variable(
            "size",
            Some(TypeAnnotation::named("Number", vec![])),
            Some(Expression::literal(Literal::number(12.0))),
        ))],
    );

    let stdout = assert_success(
        dir.path(),
        &["eval", path.to_str().unwrap(), "--libraries", libraries.to_str().unwrap()],
    );
    assert_eq!(stdout, "size = 12\n");
}
