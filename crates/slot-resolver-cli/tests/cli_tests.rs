//! Integration tests for the `freebusy` CLI binary.
//!
//! These tests use `assert_cmd` and `predicates` to run the slots and conflicts
//! subcommands through the actual binary, covering stdin and file input,
//! config overrides, output formats and error reporting.

// `Command::cargo_bin` was deprecated in assert_cmd 2.1.2 in favor of
// `cargo::cargo_bin_cmd!`. Allow it until we migrate.
#![allow(deprecated)]

use assert_cmd::Command;
use predicates::prelude::*;

fn fixture(name: &str) -> String {
    format!("{}/tests/fixtures/{}", env!("CARGO_MANIFEST_DIR"), name)
}

fn freebusy() -> Command {
    Command::cargo_bin("freebusy").unwrap()
}

fn stdout_json(cmd: &mut Command) -> serde_json::Value {
    let output = cmd.output().expect("freebusy must run");
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    serde_json::from_slice(&output.stdout).expect("stdout must be JSON")
}

// ─────────────────────────────────────────────────────────────────────────────
// slots subcommand
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn slots_from_file_as_text() {
    freebusy()
        .args(["slots", "-i", &fixture("meeting.json")])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "2026-03-16T10:30:00+00:00  2026-03-16T12:00:00+00:00  (90 min)",
        ))
        .stdout(predicate::str::contains(
            "2026-03-16T13:00:00+00:00  2026-03-16T17:00:00+00:00  (240 min)",
        ));
}

#[test]
fn slots_from_stdin() {
    let scenario = std::fs::read_to_string(fixture("meeting.json")).unwrap();

    freebusy()
        .arg("slots")
        .write_stdin(scenario)
        .assert()
        .success()
        .stdout(predicate::str::contains("(90 min)"));
}

#[test]
fn slots_as_json_include_conflicts() {
    let value = stdout_json(freebusy().args([
        "slots",
        "-i",
        &fixture("meeting.json"),
        "--format",
        "json",
    ]));

    let slots = value["slots"].as_array().unwrap();
    assert_eq!(slots.len(), 2);
    assert_eq!(slots[0]["start"], "2026-03-16T10:30:00Z");
    assert_eq!(slots[0]["end"], "2026-03-16T12:00:00Z");
    assert_eq!(slots[1]["start"], "2026-03-16T13:00:00Z");
    // Only the chair is busy at 09:00; carol is optional.
    assert_eq!(value["conflicts"], 1);
}

#[test]
fn optional_attendee_does_not_block_slots() {
    // carol is busy all afternoon but the afternoon stays free.
    freebusy()
        .args(["slots", "-i", &fixture("meeting.json")])
        .assert()
        .success()
        .stdout(predicate::str::contains("13:00:00+00:00  2026-03-16T17:00:00"));
}

#[test]
fn slots_skip_disallowed_weekend() {
    let value = stdout_json(freebusy().args([
        "slots",
        "-i",
        &fixture("weekend.json"),
        "--format",
        "json",
    ]));

    let slots = value["slots"].as_array().unwrap();
    assert_eq!(slots.len(), 2);
    assert_eq!(slots[0]["start"], "2026-03-20T09:00:00Z");
    assert_eq!(slots[0]["end"], "2026-03-21T00:00:00Z");
    assert_eq!(slots[1]["start"], "2026-03-23T00:00:00Z");
    assert_eq!(slots[1]["end"], "2026-03-23T12:00:00Z");
}

// ─────────────────────────────────────────────────────────────────────────────
// Failed lookups and config
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn failed_attendee_is_free_by_default() {
    freebusy()
        .args(["slots", "-i", &fixture("failing.json")])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "2026-03-16T10:00:00+00:00  2026-03-16T17:00:00+00:00  (420 min)",
        ));
}

#[test]
fn pessimistic_config_blocks_failed_attendee() {
    freebusy()
        .args([
            "slots",
            "-i",
            &fixture("failing.json"),
            "-c",
            &fixture("pessimistic.toml"),
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("No free slots"));
}

#[test]
fn missing_config_file_fails() {
    freebusy()
        .args([
            "slots",
            "-i",
            &fixture("meeting.json"),
            "-c",
            "/nonexistent/resolver.toml",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load config"));
}

// ─────────────────────────────────────────────────────────────────────────────
// conflicts subcommand
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn conflicts_as_text() {
    freebusy()
        .args(["conflicts", "-i", &fixture("meeting.json")])
        .assert()
        .success()
        .stdout("1\n");
}

#[test]
fn conflicts_count_failed_attendee_when_pessimistic() {
    let value = stdout_json(freebusy().args([
        "conflicts",
        "-i",
        &fixture("failing.json"),
        "-c",
        &fixture("pessimistic.toml"),
        "--format",
        "json",
    ]));

    assert_eq!(value["conflicts"], 2);
}

// ─────────────────────────────────────────────────────────────────────────────
// Errors and help
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn invalid_scenario_json_fails() {
    freebusy()
        .arg("slots")
        .write_stdin("{ not json")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to parse scenario JSON"));
}

#[test]
fn missing_input_file_fails() {
    freebusy()
        .args(["slots", "-i", "/nonexistent/scenario.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read file"));
}

#[test]
fn zero_duration_is_rejected() {
    let scenario = r#"{
        "timeframe": { "start": "2026-03-16T09:00:00Z", "end": "2026-03-16T17:00:00Z" },
        "duration_minutes": 0
    }"#;

    freebusy()
        .arg("slots")
        .write_stdin(scenario)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid scenario policy"));
}

#[test]
fn oversized_duration_finds_no_slots() {
    let scenario = r#"{
        "timeframe": { "start": "2026-03-16T09:00:00Z", "end": "2026-03-16T17:00:00Z" },
        "duration_minutes": 600000000000,
        "attendees": [{ "id": "alice" }]
    }"#;

    freebusy()
        .arg("slots")
        .write_stdin(scenario)
        .assert()
        .success()
        .stdout(predicate::str::contains("No free slots"));
}

#[test]
fn reversed_timeframe_is_rejected() {
    let scenario = r#"{
        "timeframe": { "start": "2026-03-16T17:00:00Z", "end": "2026-03-16T09:00:00Z" },
        "duration_minutes": 30
    }"#;

    freebusy()
        .arg("slots")
        .write_stdin(scenario)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to parse scenario JSON"));
}

#[test]
fn empty_attendee_list_leaves_whole_timeframe_free() {
    let scenario = r#"{
        "timeframe": { "start": "2026-03-16T09:00:00Z", "end": "2026-03-16T17:00:00Z" },
        "duration_minutes": 30
    }"#;

    freebusy()
        .arg("slots")
        .write_stdin(scenario)
        .assert()
        .success()
        .stdout(predicate::str::contains("(480 min)"));
}

#[test]
fn help_lists_subcommands() {
    freebusy()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("slots"))
        .stdout(predicate::str::contains("conflicts"));
}
