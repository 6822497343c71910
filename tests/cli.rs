use std::{
    io::Write,
    process::{Command, Output, Stdio},
};

use pretty_assertions::assert_eq;
use serde_json::Value;

fn xdrgen(args: &[&str], input: &str) -> Output {
    let mut child = Command::new(env!("CARGO_BIN_EXE_xdrgen"))
        .args(args)
        .env_remove("RUST_LOG")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();

    child.stdin.take().unwrap().write_all(input.as_bytes()).unwrap();
    child.wait_with_output().unwrap()
}

fn stdout(output: &Output) -> String {
    String::from_utf8(output.stdout.clone()).unwrap()
}

#[test]
fn generates_from_stdin() {
    let output = xdrgen(&[], "struct pair { int a; int b; };");

    assert!(output.status.success());
    assert!(stdout(&output).contains("pub struct pair {"));
}

#[test]
fn dumps_tokens() {
    let output = xdrgen(&["--mode", "lex", "-"], "const A = 1;");
    let lines: Vec<_> = stdout(&output).lines().map(str::to_owned).collect();

    assert!(output.status.success());
    assert_eq!(lines.len(), 5);
    assert_eq!(lines[0], "<stdin>:[1:1-1:5]\tkeyword `const`");
    assert_eq!(lines[3], "<stdin>:1:11\tliteral `1`");
}

#[test]
fn dumps_declarations_as_json() {
    let output = xdrgen(&["-m", "parse", "-D", "EXTRA=7"], "const A = EXTRA;");
    let dump: Value = serde_json::from_slice(&output.stdout).unwrap();

    assert!(output.status.success());
    assert_eq!(dump["constants"]["A"], "EXTRA");
    assert_eq!(dump["constants"]["EXTRA"], "7");
    assert_eq!(dump["declarations"].as_array().map(Vec::len), Some(1));
}

#[test]
fn dumps_bundles_as_json() {
    let output = xdrgen(&["-m", "ir"], "enum e { X = 1 };");
    let dump: Value = serde_json::from_slice(&output.stdout).unwrap();

    assert!(output.status.success());
    assert_eq!(dump["id2val"]["X"], "e::X");
}

#[test]
fn reports_errors_on_stderr() {
    let output = xdrgen(&[], "struct { int a; };");
    let stderr = String::from_utf8(output.stderr).unwrap();

    assert_eq!(output.status.code(), Some(1));
    assert!(output.stdout.is_empty());
    assert!(stderr.contains(" --> <stdin>:1:8"));
    assert!(stderr.ends_with("Compilation failed with 1 error\n"));
}

#[test]
fn writes_to_files() {
    let path = std::env::temp_dir().join(format!("xdrgen-cli-{}.rs", std::process::id()));
    let path_text = path.to_str().unwrap();

    let output = xdrgen(
        &["--standalone", "--no-structural", "-o", path_text],
        "typedef int count;",
    );

    assert!(output.status.success());
    assert!(output.stdout.is_empty());

    let code = std::fs::read_to_string(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    assert!(code.starts_with("// @generated by xdrgen\n#![allow("));
    assert!(code.contains("pub struct count(pub i32);"));
    assert!(!code.contains("Structural"));
}

#[test]
fn rejects_bad_defines() {
    let output = xdrgen(&["-D", "9x=1"], "");
    let stderr = String::from_utf8(output.stderr).unwrap();

    assert!(!output.status.success());
    assert!(stderr.contains("Bad define: 9x=1"));
}

#[test]
fn reports_the_package_version() {
    let output = xdrgen(&["--version"], "");

    assert!(output.status.success());
    assert_eq!(stdout(&output), format!("xdrgen {}\n", env!("CARGO_PKG_VERSION")));
}
