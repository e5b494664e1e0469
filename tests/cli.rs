use std::{fs, path::PathBuf};

use assert_cmd::Command;
use midend::{
    Program,
    ast::{
        Callee, Node, SymbolId,
        primitive::{Immediate, PrimitiveOp},
    },
    index::Index,
    middle::{PassKind, verify},
};

fn midend() -> Command {
    Command::cargo_bin("midend").expect("binary is built")
}

/// A program whose `main` entry stores a complex literal into a local and
/// keeps one class-typed global
fn sample_program() -> Program {
    let mut program = Program::new();
    let module = program.add_module("sample");
    let block = program.module_block(module).unwrap();
    let class = program.add_class(module, "Node", &[]).unwrap();
    program.add_variable(block, "global", class).unwrap();

    let main = program.add_function(block, "main", &[], None).unwrap();
    let body = program.function(main).unwrap().body;
    let complex = program.builtins.complex64;
    let z = program.add_variable(body, "z", complex).unwrap();
    let literal = program.constant(Immediate::Complex { re: 1.0, im: 2.0 }, complex);
    let args = vec![program.use_of(z), program.use_of(literal)];
    let assign = program.primitive_call(PrimitiveOp::Move, args);
    program.push_statement(body, assign).unwrap();
    program.set_entry(main).unwrap();

    program
}

fn write_program(dir: &tempfile::TempDir, name: &str, program: &Program) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, program.to_json().expect("serialize")).expect("write program");

    path
}

#[test]
fn missing_source_files_are_rejected() {
    midend().assert().failure();
}

#[test]
fn nonexistent_source_file_is_rejected() {
    let td = tempfile::tempdir().expect("tempdir");

    let output = midend().arg(td.path().join("nope.json")).output().expect("run");

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("does not exist"));
}

#[test]
fn emits_the_lowered_program_as_json() {
    let td = tempfile::tempdir().expect("tempdir");
    let path = write_program(&td, "sample.json", &sample_program());

    let output = midend()
        .args(["--emit", "json", "--copy-collect"])
        .arg(&path)
        .output()
        .expect("run");

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let lowered = Program::from_json(&String::from_utf8_lossy(&output.stdout)).expect("valid json");

    assert!(lowered.applied_passes.contains(&PassKind::ComplexToRecord));
    assert!(lowered.applied_passes.contains(&PassKind::CopyCollection));
    assert_eq!(verify::verify_program(&lowered), Ok(()));

    let null_roots = lowered
        .nodes
        .enumerate()
        .filter(|(id, parented)| {
            lowered.is_attached(*id)
                && matches!(
                    parented.node,
                    Node::Call { callee: Callee::Primitive(PrimitiveOp::GcAddNullRoot), .. }
                )
        })
        .count();
    assert_eq!(null_roots, 1);
}

#[test]
fn pretty_output_names_the_records() {
    let td = tempfile::tempdir().expect("tempdir");
    let path = write_program(&td, "sample.json", &sample_program());

    let output = midend().arg(&path).output().expect("run");

    assert!(output.status.success());
    let listing = strip_ansi_escapes::strip_str(String::from_utf8_lossy(&output.stdout));
    assert!(listing.contains("record _complex64 {"));
    assert!(listing.contains("var z: _complex64"));
    assert!(!listing.contains("gc_cc_init"));
}

#[test]
fn collector_region_is_configurable() {
    let td = tempfile::tempdir().expect("tempdir");
    let path = write_program(&td, "sample.json", &sample_program());

    let output = midend()
        .args(["--copy-collect", "--collector-region", "4096"])
        .arg(&path)
        .output()
        .expect("run");

    assert!(output.status.success());
    let listing = strip_ansi_escapes::strip_str(String::from_utf8_lossy(&output.stdout));
    assert!(listing.contains("gc_cc_init(4096)"));
    assert!(listing.contains("gc_add_null_root(global)"));
}

#[test]
fn internal_errors_exit_with_failure() {
    let td = tempfile::tempdir().expect("tempdir");
    let mut program = sample_program();
    program.entry = None;
    let path = write_program(&td, "no_entry.json", &program);

    let output = midend().arg("--copy-collect").arg(&path).output().expect("run");

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("designated entry function"));
}

#[test]
fn dangling_ids_are_rejected_without_panicking() {
    let td = tempfile::tempdir().expect("tempdir");
    let mut program = sample_program();
    program.new_node(Node::Use {
        symbol: SymbolId::new(99_999),
        ty: None,
    });
    let path = write_program(&td, "dangling.json", &program);

    let output = midend().arg(&path).output().expect("run");

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("is not a resolved program"));
    assert!(stderr.contains("refers to symbol 99999 which does not exist"));
    assert!(!stderr.contains("panicked"));
}
