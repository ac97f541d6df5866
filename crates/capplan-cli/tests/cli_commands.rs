//! CLI integration tests
//!
//! Each test drives the compiled `capplan` binary against the JSON fixtures
//! and asserts on exit codes, stdout and the files it writes.

use std::path::PathBuf;
use std::process::{Command, Output};

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name)
}

fn capplan(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_capplan"))
        .args(args)
        .output()
        .expect("failed to execute capplan")
}

fn stdout_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

// =============================================================================
// check
// =============================================================================

#[test]
fn check_valid_calendar_exits_zero() {
    let output = capplan(&["check", fixture("calendar.json").to_str().unwrap()]);
    assert!(output.status.success());

    let stdout = stdout_of(&output);
    assert!(stdout.contains("Monday"));
    assert!(stdout.contains("09:00-17:00"));
    assert!(stdout.contains("(8.0h)"));
    // Friday is a split shift: 3h + 4h
    assert!(stdout.contains("(7.0h)"));
    assert!(stdout.contains("Saturday"));
    assert!(stdout.contains("closed"));
    assert!(stdout.contains("Exceptions: 1"));
}

#[test]
fn check_inverted_window_exits_nonzero() {
    let output = capplan(&["check", fixture("bad_calendar.json").to_str().unwrap()]);
    assert!(!output.status.success());

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("end_next_day"));
}

#[test]
fn check_missing_file_exits_nonzero() {
    let output = capplan(&["check", "no-such-calendar.json"]);
    assert!(!output.status.success());
}

// =============================================================================
// schedule
// =============================================================================

#[test]
fn schedule_writes_the_change_set() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("patches.json");

    let output = capplan(&[
        "schedule",
        "--tasks",
        fixture("tasks.json").to_str().unwrap(),
        "--calendar",
        fixture("calendar.json").to_str().unwrap(),
        "--start",
        "2026-02-02T08:00",
        "--output",
        out.to_str().unwrap(),
    ]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let stdout = stdout_of(&output);
    assert!(stdout.contains("Placed 2 task(s)"));
    // The 08:00 start snaps to the 09:00 window open
    assert!(stdout.contains("2026-02-02 09:00"));

    let body = std::fs::read_to_string(&out).unwrap();
    let update: serde_json::Value = serde_json::from_str(&body).unwrap();
    let items = update["items"].as_array().unwrap();

    // Only the two in-plan tasks changed
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["key"], "TI-101");
    assert_eq!(items[0]["in_plan"], true);
    assert!(items[0]["planned_start_ms"].is_i64());
    assert!(items.iter().all(|item| item["key"] != "TI-103"));
}

#[test]
fn schedule_without_calendar_runs_back_to_back() {
    let output = capplan(&[
        "schedule",
        "--tasks",
        fixture("tasks.json").to_str().unwrap(),
        "--start",
        "2026-02-02T08:00",
    ]);
    assert!(output.status.success());

    let stdout = stdout_of(&output);
    // 6h from 08:00, then 4h immediately after
    assert!(stdout.contains("2026-02-02 08:00 -> 2026-02-02 14:00"));
    assert!(stdout.contains("2026-02-02 14:00 -> 2026-02-02 18:00"));
}

#[test]
fn schedule_by_finish_time_reranks() {
    let output = capplan(&[
        "schedule",
        "--tasks",
        fixture("tasks.json").to_str().unwrap(),
        "--start",
        "2026-02-02T08:00",
        "--criterion",
        "finish-time",
    ]);
    assert!(output.status.success());

    let stdout = stdout_of(&output);
    // TI-101 has a finish time, TI-102 has none and sorts last with rank 2
    let first = stdout.find("TI-101").unwrap();
    let second = stdout.find("TI-102").unwrap();
    assert!(first < second);
    assert!(stdout.contains("  2  TI-102"));
}

#[test]
fn schedule_rejects_a_bad_start_instant() {
    let output = capplan(&[
        "schedule",
        "--tasks",
        fixture("tasks.json").to_str().unwrap(),
        "--start",
        "early tomorrow",
    ]);
    assert!(!output.status.success());

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("invalid start instant"));
}

#[test]
fn schedule_rejects_an_unknown_criterion() {
    let output = capplan(&[
        "schedule",
        "--tasks",
        fixture("tasks.json").to_str().unwrap(),
        "--start",
        "2026-02-02T08:00",
        "--criterion",
        "alphabetical",
    ]);
    assert!(!output.status.success());
}

// =============================================================================
// gantt
// =============================================================================

#[test]
fn gantt_writes_a_standalone_page() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("plan.html");

    let output = capplan(&[
        "gantt",
        "--tasks",
        fixture("tasks.json").to_str().unwrap(),
        "--calendar",
        fixture("calendar.json").to_str().unwrap(),
        "--period",
        "week",
        "--date",
        "2026-02-02",
        "--title",
        "CNC-07 plan",
        "--output",
        out.to_str().unwrap(),
    ]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let html = std::fs::read_to_string(&out).unwrap();
    assert!(html.contains("<!DOCTYPE html>"));
    assert!(html.contains("CNC-07 plan"));
    assert!(html.contains("gantt-chart-container week-view"));
    // Unplanned tasks are not rendered
    assert!(!html.contains("TI-103"));
}

#[test]
fn gantt_rejects_an_unknown_period() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("plan.html");

    let output = capplan(&[
        "gantt",
        "--tasks",
        fixture("tasks.json").to_str().unwrap(),
        "--period",
        "quarter",
        "--date",
        "2026-02-02",
        "--output",
        out.to_str().unwrap(),
    ]);
    assert!(!output.status.success());

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unknown period"));
}
