//! CLI integration tests for the `adopet` binary.
//!
//! Every test runs in its own temporary directory with its own state file,
//! and silences logging so stderr carries only the error report.

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

const T0: &str = "2026-05-01T10:00:00Z";
const T0_PLUS_1H: &str = "2026-05-01T11:00:00Z";
const T0_PLUS_49H: &str = "2026-05-03T11:00:00Z";

/// Helper: create a Command for the `adopet` binary, rooted at `dir`.
fn adopet(dir: &TempDir) -> Command {
    let mut cmd = cargo_bin_cmd!("adopet");
    cmd.current_dir(dir.path())
        .env("RUST_LOG", "off")
        .arg("--state")
        .arg(dir.path().join("state.json"));
    cmd
}

fn run_ok(dir: &TempDir, args: &[&str]) -> String {
    let output = adopet(dir).args(args).output().unwrap();
    assert!(
        output.status.success(),
        "{args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout).unwrap()
}

fn show_json(dir: &TempDir, pet_id: &str) -> serde_json::Value {
    let stdout = run_ok(dir, &["--output", "json", "show", pet_id]);
    serde_json::from_str(&stdout).unwrap()
}

/// Listed by tutor-1, nominated for adopter-1 at T0, self-confirmed at T0+1h.
fn awaiting(dir: &TempDir, pet_id: &str) {
    run_ok(dir, &["--now", T0, "list-pet", pet_id, "--owner", "tutor-1", "--name", "Mel"]);
    run_ok(
        dir,
        &["--now", T0, "nominate", pet_id, "--tutor", "tutor-1", "--adopter", "adopter-1"],
    );
    run_ok(
        dir,
        &["--now", T0_PLUS_1H, "adopter-confirm", pet_id, "--adopter", "adopter-1"],
    );
}

// ──────────────────────────────────────────────
// 1. Help and configuration
// ──────────────────────────────────────────────

#[test]
fn help_exits_0_with_description() {
    let dir = TempDir::new().unwrap();
    adopet(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Adopet adoption lifecycle administration",
        ));
}

#[test]
fn config_prints_effective_defaults() {
    let dir = TempDir::new().unwrap();
    adopet(&dir)
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("confirmation_window_secs = 172800"))
        .stdout(predicate::str::contains("interval_secs = 3600"));
}

#[test]
fn invalid_config_exits_1() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("adopet.toml");
    fs::write(&config, "[lifecycle]\nconfirmation_window_secs = 0\n").unwrap();
    adopet(&dir)
        .arg("--config")
        .arg(&config)
        .arg("feed")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("confirmation_window_secs"));
}

#[test]
fn explicit_missing_config_exits_1() {
    let dir = TempDir::new().unwrap();
    adopet(&dir)
        .args(["--config", "nope.toml", "feed"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("could not read"));
}

#[test]
fn corrupt_state_file_exits_1() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("state.json"), "[1, 2").unwrap();
    adopet(&dir)
        .arg("feed")
        .assert()
        .failure()
        .stderr(predicate::str::contains("corrupt"));
}

// ──────────────────────────────────────────────
// 2. Actor operations
// ──────────────────────────────────────────────

#[test]
fn manual_lifecycle_persists_between_invocations() {
    let dir = TempDir::new().unwrap();
    awaiting(&dir, "pet-1");
    assert_eq!(show_json(&dir, "pet-1")["state"], "AWAITING_FINALIZATION");

    adopet(&dir)
        .args(["--now", T0_PLUS_1H, "register", "pet-1"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "pet-1: AWAITING_FINALIZATION -> FINALIZED (applied)",
        ));

    let view = show_json(&dir, "pet-1");
    assert_eq!(view["state"], "FINALIZED");
    assert_eq!(view["adoption"]["adopter_id"], "adopter-1");
    assert_eq!(view["adoption"]["adopted_at"], T0_PLUS_1H);
    assert!(view["pending_adopter_id"].is_null());
}

#[test]
fn confirm_twice_is_a_no_op() {
    let dir = TempDir::new().unwrap();
    awaiting(&dir, "pet-1");
    run_ok(&dir, &["register", "pet-1", "--adopter", "adopter-2"]);

    adopet(&dir)
        .args(["confirm", "pet-1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("(applied)"));
    adopet(&dir)
        .args(["confirm", "pet-1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("(no-op)"));
}

#[test]
fn feed_lists_only_available_pets() {
    let dir = TempDir::new().unwrap();
    awaiting(&dir, "pet-1");
    run_ok(&dir, &["list-pet", "pet-2", "--owner", "tutor-2", "--name", "Zeca"]);

    let feed: serde_json::Value =
        serde_json::from_str(&run_ok(&dir, &["--output", "json", "feed"])).unwrap();
    let ids: Vec<&str> = feed
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v["pet_id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["pet-2"]);
}

#[test]
fn reject_nomination_then_admin_override() {
    let dir = TempDir::new().unwrap();
    awaiting(&dir, "pet-1");
    run_ok(&dir, &["reject-nomination", "pet-1", "--reason", "no contact"]);

    let view = show_json(&dir, "pet-1");
    assert_eq!(view["state"], "REJECTED");
    assert_eq!(view["status"], "ADOPTED");
    assert_eq!(view["rejection_reason"], "no contact");

    adopet(&dir)
        .args(["register", "pet-1", "--adopter", "adopter-7"])
        .assert()
        .success()
        .stdout(predicate::str::contains("REJECTED -> FINALIZED"));
}

#[test]
fn interest_is_recorded_then_cleared_by_registration() {
    let dir = TempDir::new().unwrap();
    run_ok(&dir, &["list-pet", "pet-1", "--owner", "tutor-1", "--name", "Mel"]);
    adopet(&dir)
        .args(["interest", "pet-1", "--user", "fan-1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("pet-1: 1 interested"));

    run_ok(&dir, &["register", "pet-1", "--adopter", "fan-1"]);
    let state = fs::read_to_string(dir.path().join("state.json")).unwrap();
    let state: serde_json::Value = serde_json::from_str(&state).unwrap();
    assert!(state["interests"].get("pet-1").is_none());
}

// ──────────────────────────────────────────────
// 3. Failures
// ──────────────────────────────────────────────

#[test]
fn self_adoption_exits_1_with_kind() {
    let dir = TempDir::new().unwrap();
    run_ok(&dir, &["list-pet", "pet-1", "--owner", "tutor-1", "--name", "Mel"]);

    let output = adopet(&dir)
        .args(["--output", "json", "register", "pet-1", "--adopter", "tutor-1"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    let err: serde_json::Value = serde_json::from_slice(&output.stderr).unwrap();
    assert_eq!(err["kind"], "invalid_transition");
    assert!(err["error"].as_str().unwrap().contains("cannot adopt"));

    assert!(show_json(&dir, "pet-1")["adoption"].is_null());
}

#[test]
fn missing_adopter_exits_1() {
    let dir = TempDir::new().unwrap();
    run_ok(&dir, &["list-pet", "pet-1", "--owner", "tutor-1", "--name", "Mel"]);
    adopet(&dir)
        .args(["register", "pet-1"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("no explicit adopter"));
}

#[test]
fn unknown_pet_exits_1() {
    let dir = TempDir::new().unwrap();
    adopet(&dir)
        .args(["confirm", "ghost"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("pet not found: ghost"));
}

#[test]
fn bad_now_is_a_usage_error() {
    let dir = TempDir::new().unwrap();
    adopet(&dir)
        .args(["--now", "yesterday", "feed"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("RFC 3339"));
}

#[test]
fn run_refuses_pinned_clock() {
    let dir = TempDir::new().unwrap();
    adopet(&dir)
        .args(["--now", T0, "run", "--interval-secs", "1"])
        .timeout(std::time::Duration::from_secs(10))
        .assert()
        .failure()
        .stderr(predicate::str::contains("--now"));
    assert!(!dir.path().join("state.json").exists());
}

#[test]
fn oversized_window_in_config_is_refused() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("adopet.toml"),
        "[lifecycle]\nconfirmation_window_secs = 9000000000000000000\n",
    )
    .unwrap();
    adopet(&dir)
        .args(["--now", T0, "reconcile"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("confirmation_window_secs"));
}

// ──────────────────────────────────────────────
// 4. Escalation
// ──────────────────────────────────────────────

#[test]
fn reconcile_finalizes_stalled_nomination() {
    let dir = TempDir::new().unwrap();
    awaiting(&dir, "pet-1");

    adopet(&dir)
        .args(["--now", T0_PLUS_1H, "reconcile"])
        .assert()
        .success()
        .stdout(predicate::str::contains("advanced=0"));

    adopet(&dir)
        .args(["--now", T0_PLUS_49H, "reconcile"])
        .assert()
        .success()
        .stdout(predicate::str::contains("finalized=1"));

    let view = show_json(&dir, "pet-1");
    assert_eq!(view["state"], "FINALIZED");
    assert_eq!(view["platform_confirmed_at"], T0_PLUS_49H);
    assert_eq!(view["adoption"]["adopted_at"], T0_PLUS_49H);
}

#[test]
fn configured_window_drives_reconcile() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("adopet.toml"),
        "[lifecycle]\nconfirmation_window_secs = 3600\n",
    )
    .unwrap();
    awaiting(&dir, "pet-1");

    adopet(&dir)
        .args(["--now", T0_PLUS_1H, "--output", "json", "reconcile"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"finalized\": 1"));
}
