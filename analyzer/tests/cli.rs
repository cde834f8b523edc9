// CLI tests: exit codes, output modes and run-to-run reproducibility of the
// `sbbal` binary.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

fn sbbal_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_sbbal"))
}

fn program(name: &str) -> String {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("programs")
        .join(name)
        .to_str()
        .unwrap()
        .to_string()
}

fn run_sbbal(args: &[&str]) -> Output {
    Command::new(sbbal_binary())
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run sbbal")
}

fn stdout_of(output: &Output) -> String {
    String::from_utf8(output.stdout.clone()).expect("non-UTF8 output")
}

fn stderr_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

fn temp_source(tag: &str, source: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("sbbal_cli_{}_{}.sbg", tag, std::process::id()));
    std::fs::write(&path, source).unwrap();
    path
}

// ── Exit codes ──────────────────────────────────────────────────────────────

#[test]
fn report_on_clean_program_exits_zero() {
    let out = run_sbbal(&[&program("diamond.sbg")]);
    assert_eq!(out.status.code(), Some(0), "stderr: {}", stderr_of(&out));
    let text = stdout_of(&out);
    assert!(text.contains("SB_WAIT at block 3 `exit`, inst 0: possibly balanced"));
    assert!(text.contains("incoming: {[0, 0], [8, 0]}"));
}

#[test]
fn not_balanced_is_still_success() {
    let out = run_sbbal(&[&program("simple1.sbg")]);
    assert_eq!(out.status.code(), Some(0), "stderr: {}", stderr_of(&out));
    assert!(stdout_of(&out).contains("not balanced"));
}

#[test]
fn missing_file_exits_two() {
    let out = run_sbbal(&["/nonexistent/sbbal/missing.sbg"]);
    assert_eq!(out.status.code(), Some(2));
    assert!(stderr_of(&out).contains("error"));
}

#[test]
fn parse_error_exits_one() {
    let path = temp_source("parse", "fn main {\nentry:\n  call SB_WAIT(\n}\n");
    let out = run_sbbal(&[path.to_str().unwrap()]);
    let _ = std::fs::remove_file(&path);
    assert_eq!(out.status.code(), Some(1));
    assert!(stderr_of(&out).contains("E0001"));
    assert!(stdout_of(&out).is_empty());
}

#[test]
fn missing_function_exits_one() {
    let out = run_sbbal(&["--function", "nope", &program("diamond.sbg")]);
    assert_eq!(out.status.code(), Some(1));
    assert!(stderr_of(&out).contains("E0104"));
}

#[test]
fn out_of_range_port_reports_and_exits_one() {
    let out = run_sbbal(&["--ports", "2", &program("simple1.sbg")]);
    assert_eq!(out.status.code(), Some(1));
    assert!(stderr_of(&out).contains("E0201"));
    assert!(stdout_of(&out).contains("analysis completed with errors"));
}

#[test]
fn non_termination_exits_one() {
    let out = run_sbbal(&["--max-iterations", "200", &program("full1.sbg")]);
    assert_eq!(out.status.code(), Some(1));
    assert!(stderr_of(&out).contains("200"));
    assert!(stdout_of(&out).is_empty());
}

// ── Output modes ────────────────────────────────────────────────────────────

#[test]
fn json_report_parses() {
    let out = run_sbbal(&["--emit", "json", &program("diamond.sbg")]);
    assert_eq!(out.status.code(), Some(0), "stderr: {}", stderr_of(&out));
    let value: serde_json::Value = serde_json::from_str(&stdout_of(&out)).expect("json");
    assert_eq!(value["function"], "main");
    assert_eq!(value["config"]["ports"], 2);
    assert_eq!(value["verdicts"][0]["block_name"], "exit");
    assert_eq!(value["verdicts"][0]["possibly_balanced"], true);
    assert_eq!(value["source_hash"].as_str().map(str::len), Some(64));
}

#[test]
fn distill_lists_primitives() {
    let out = run_sbbal(&["--emit", "distill", &program("simple1.sbg")]);
    assert_eq!(out.status.code(), Some(0), "stderr: {}", stderr_of(&out));
    let text = stdout_of(&out);
    assert!(text.starts_with("0,0,SB_CONFIG\n0,1,SB_MEM_PORT_STREAM,1,8,8,100\n"));
    assert!(text.ends_with("0,9,control,\n"));
}

#[test]
fn distill_skips_the_fixpoint() {
    // full1 never converges, but listing its primitives needs no fixpoint.
    let out = run_sbbal(&["--emit", "distill", &program("full1.sbg")]);
    assert_eq!(out.status.code(), Some(0), "stderr: {}", stderr_of(&out));
    assert!(stdout_of(&out).contains("SB_WAIT"));
}

#[test]
fn dot_mode_draws_the_labeled_graph() {
    let out = run_sbbal(&["--emit", "dot", &program("full1.sbg")]);
    assert_eq!(out.status.code(), Some(0), "stderr: {}", stderr_of(&out));
    let text = stdout_of(&out);
    assert!(text.starts_with("digraph main {\n"));
    assert!(text.contains("bb0 -> bb1;"));
}

#[test]
fn states_mode_shows_incoming_sets() {
    let out = run_sbbal(&["--emit", "states", &program("diamond.sbg")]);
    assert_eq!(out.status.code(), Some(0), "stderr: {}", stderr_of(&out));
    let text = stdout_of(&out);
    assert!(text.starts_with("block 0 `entry`:\n"));
    assert!(text.contains("      in:  {[0, 0], [8, 0]}\n"));
}

#[test]
fn output_flag_writes_file() {
    let path = std::env::temp_dir().join(format!("sbbal_cli_out_{}.txt", std::process::id()));
    let out = run_sbbal(&["-o", path.to_str().unwrap(), &program("diamond.sbg")]);
    assert_eq!(out.status.code(), Some(0), "stderr: {}", stderr_of(&out));
    assert!(out.stdout.is_empty());
    let written = std::fs::read_to_string(&path).expect("output file");
    let _ = std::fs::remove_file(&path);
    assert!(written.contains("1 wait site(s), 1 possibly balanced"));
}

#[test]
fn overrides_reach_the_analysis() {
    let out = run_sbbal(&["--word-size", "4", &program("diamond.sbg")]);
    assert_eq!(out.status.code(), Some(0), "stderr: {}", stderr_of(&out));
    let text = stdout_of(&out);
    assert!(text.contains("word size 4"));
    assert!(text.contains("incoming: {[0, 0], [16, 0]}"));
}

// ── Reproducibility ─────────────────────────────────────────────────────────

/// The same source produces byte-identical output in every mode.
#[test]
fn repeated_runs_are_byte_identical() {
    for mode in ["report", "json", "states", "distill", "dot"] {
        let first = run_sbbal(&["--emit", mode, &program("diamond.sbg")]);
        let second = run_sbbal(&["--emit", mode, &program("diamond.sbg")]);
        assert_eq!(first.status.code(), Some(0), "{mode}");
        assert_eq!(first.stdout, second.stdout, "{mode} output should be stable");
    }
}

#[test]
fn source_hash_tracks_content() {
    let a = temp_source(
        "hash_a",
        "fn main {\nentry:\n  call SB_CONFIG()\n  call SB_WAIT()\n  ret\n}\n",
    );
    let b = temp_source(
        "hash_b",
        "fn main {\nentry:\n  call SB_CONFIG()\n  call SB_WAIT()\n\n  ret\n}\n",
    );
    let hash = |path: &Path| -> String {
        let out = run_sbbal(&["--emit", "json", path.to_str().unwrap()]);
        let value: serde_json::Value = serde_json::from_str(&stdout_of(&out)).expect("json");
        value["source_hash"].as_str().expect("hash").to_string()
    };
    let (ha, ha2, hb) = (hash(&a), hash(&a), hash(&b));
    let _ = std::fs::remove_file(&a);
    let _ = std::fs::remove_file(&b);
    assert_eq!(ha, ha2);
    assert_ne!(ha, hb);
}
