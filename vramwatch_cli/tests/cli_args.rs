//! CLI tests for the vramwatch driver. GPU access is disabled through the
//! environment so the output does not depend on the machine running the tests.
use assert_cmd::prelude::*;
use std::process::Command;

fn run(args: &[&str]) -> (bool, String, String) {
    let out = Command::cargo_bin("vramwatch")
        .expect("binary exists")
        .env("VRAMWATCH_GPU", "0")
        .env("RUST_LOG", "off")
        .args(args)
        .output()
        .expect("run vramwatch");
    (
        out.status.success(),
        String::from_utf8_lossy(&out.stdout).into_owned(),
        String::from_utf8_lossy(&out.stderr).into_owned(),
    )
}

#[test]
fn help_mentions_short_and_long_flags() {
    let (ok, stdout, stderr) = run(&["--help"]);
    assert!(ok);
    let text = format!("{stdout}{stderr}");
    assert!(text.contains("Usage:"), "{text}");
    for flag in ["--interval", "-i", "--history", "-n", "--threshold", "-w", "--clean"] {
        assert!(text.contains(flag), "help text missing {flag}\n{text}");
    }
}

#[test]
fn unknown_argument_is_reported() {
    let (_, _, stderr) = run(&["--bogus"]);
    assert!(stderr.contains("Unexpected argument '--bogus'"), "{stderr}");
}

#[test]
fn bad_values_are_reported() {
    let (_, _, stderr) = run(&["--interval", "soon"]);
    assert!(stderr.contains("invalid value for --interval: 'soon'"), "{stderr}");
    let (_, _, stderr) = run(&["--clean=nuclear"]);
    assert!(stderr.contains("unknown clear mode 'nuclear'"), "{stderr}");
}

#[test]
fn list_nodes_prints_descriptors() {
    let (ok, stdout, _) = run(&["--list-nodes"]);
    assert!(ok);
    let nodes: serde_json::Value = serde_json::from_str(&stdout).expect("json output");
    let names: Vec<_> = nodes
        .as_array()
        .expect("array")
        .iter()
        .map(|n| n["class_name"].as_str().unwrap_or_default().to_string())
        .collect();
    assert_eq!(names, ["VramwatchVramOptimizer", "VramwatchGpuMonitor"]);
}

#[test]
fn monitor_without_gpu() {
    let (ok, stdout, _) = run(&["--ticks", "1", "-i", "0.1"]);
    assert!(ok);
    assert!(stdout.contains("Cannot get GPU information"), "{stdout}");

    let (ok, stdout, _) = run(&["--ticks=2", "--interval=0.1", "--json"]);
    assert!(ok);
    let lines: Vec<_> = stdout.lines().collect();
    assert_eq!(lines.len(), 2, "{stdout}");
    let first: serde_json::Value = serde_json::from_str(lines[0]).expect("json line");
    assert_eq!(first["gpu_name"], "Error");
    assert_eq!(first["usage_percent"], 0.0);
}

#[test]
fn clean_without_gpu() {
    let (ok, stdout, _) = run(&["--clean", "standard"]);
    assert!(ok);
    assert!(stdout.contains("[Execution#1]"), "{stdout}");
    assert!(stdout.contains("GPU not found"), "{stdout}");
}
