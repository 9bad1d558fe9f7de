//! End-to-end runs of the `opalc` binary over JSON AST dumps.

use std::process::Command;

use tempfile::TempDir;

const VALID_PROGRAM: &str = r#"{
    "classes": [{
        "name": "Main",
        "parent": "IO",
        "filename": "main.op",
        "line": 1,
        "features": [{
            "kind": "method",
            "name": "main",
            "return_type": "Int",
            "line": 2,
            "body": {
                "op": "arith", "operator": "+", "line": 2,
                "lhs": {"op": "int", "value": "1", "line": 2},
                "rhs": {"op": "int", "value": "2", "line": 2}
            }
        }]
    }]
}"#;

const NO_MAIN_PROGRAM: &str = r#"{
    "classes": [{
        "name": "Lonely",
        "filename": "lonely.op",
        "line": 1,
        "features": []
    }]
}"#;

#[test]
fn compiles_valid_program_to_asm_file() {
    let temp = TempDir::new().unwrap();
    let input = temp.path().join("main.ast.json");
    let output = temp.path().join("main.s");
    std::fs::write(&input, VALID_PROGRAM).unwrap();

    let status = Command::new(env!("CARGO_BIN_EXE_opalc"))
        .arg(&input)
        .arg("-o")
        .arg(&output)
        .status()
        .unwrap();
    assert!(status.success());

    let asm = std::fs::read_to_string(&output).unwrap();
    assert!(asm.contains("# start of generated code"));
    assert!(asm.contains("Main.main:"));
}

#[test]
fn emits_tac_to_stdout() {
    let temp = TempDir::new().unwrap();
    let input = temp.path().join("main.ast.json");
    std::fs::write(&input, VALID_PROGRAM).unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_opalc"))
        .arg(&input)
        .arg("--emit")
        .arg("tac")
        .output()
        .unwrap();
    assert!(output.status.success());
    let text = String::from_utf8(output.stdout).unwrap();
    assert!(text.contains("# class tables"));
    assert!(text.contains("Main.main [temps=1 args=0]:"));
}

#[test]
fn gc_flag_reaches_the_output() {
    let temp = TempDir::new().unwrap();
    let input = temp.path().join("main.ast.json");
    std::fs::write(&input, VALID_PROGRAM).unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_opalc"))
        .arg(&input)
        .arg("--gc")
        .arg("gen")
        .output()
        .unwrap();
    assert!(output.status.success());
    let text = String::from_utf8(output.stdout).unwrap();
    assert!(text.contains("_GenGC_Init"));
}

#[test]
fn semantic_failure_reports_and_exits_nonzero() {
    let temp = TempDir::new().unwrap();
    let input = temp.path().join("lonely.ast.json");
    std::fs::write(&input, NO_MAIN_PROGRAM).unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_opalc"))
        .arg(&input)
        .output()
        .unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("Class Main is not defined."));
    assert!(stderr.contains("static semantic error"));
}

#[test]
fn missing_input_file_fails_cleanly() {
    let output = Command::new(env!("CARGO_BIN_EXE_opalc"))
        .arg("/nonexistent/path.json")
        .output()
        .unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("failed to read"));
}
