//! Integration tests for the `fleetsync` CLI binary.
//!
//! Argument parsing, help output, completions, config profiles, and the
//! command paths against an unreachable channel and a mocked REST fallback.
#![allow(clippy::unwrap_used)]

use std::net::TcpListener;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a [`Command`] for the `fleetsync` binary with env isolation.
///
/// Clears all `FLEETSYNC_*` env vars and points config directories at
/// `home` so tests never touch the user's real configuration.
fn fleetsync_cmd_in(home: &std::path::Path) -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("fleetsync");
    cmd.env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join(".config"))
        .env_remove("RUST_LOG")
        .env_remove("FLEETSYNC_PROFILE")
        .env_remove("FLEETSYNC_URL")
        .env_remove("FLEETSYNC_REST_URL")
        .env_remove("FLEETSYNC_TOKEN")
        .env_remove("FLEETSYNC_TIMEOUT")
        .env_remove("FLEETSYNC_INSECURE")
        .env_remove("FLEETSYNC_OUTPUT");
    cmd
}

fn fleetsync_cmd() -> assert_cmd::Command {
    fleetsync_cmd_in(std::path::Path::new("/tmp/fleetsync-cli-test-nonexistent"))
}

/// A loopback URL nothing listens on.
fn dead_channel_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("ws://127.0.0.1:{port}/")
}

/// Concatenate stdout + stderr from a command output for flexible matching.
fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let output = fleetsync_cmd().output().unwrap();
    assert_eq!(output.status.code(), Some(2), "Expected exit code 2");
    let text = combined_output(&output);
    assert!(text.contains("Usage"), "Expected 'Usage' in output:\n{text}");
}

#[test]
fn test_help_flag() {
    fleetsync_cmd().arg("--help").assert().success().stdout(
        predicate::str::contains("watch")
            .and(predicate::str::contains("move"))
            .and(predicate::str::contains("estop"))
            .and(predicate::str::contains("status")),
    );
}

#[test]
fn test_version_flag() {
    fleetsync_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("fleetsync"));
}

#[test]
fn test_completions_zsh() {
    fleetsync_cmd()
        .args(["completions", "zsh"])
        .assert()
        .success()
        .stdout(predicate::str::contains("#compdef"));
}

#[test]
fn test_completions_bash() {
    fleetsync_cmd()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty().not());
}

// ── Argument errors ─────────────────────────────────────────────────

#[test]
fn test_invalid_direction() {
    let output = fleetsync_cmd()
        .args(["move", "r1", "sideways"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    let text = combined_output(&output);
    assert!(text.contains("sideways"), "Expected the bad value echoed:\n{text}");
}

#[test]
fn test_non_websocket_url_is_usage_error() {
    fleetsync_cmd()
        .args(["--url", "http://127.0.0.1:8765/", "stop", "r1"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("ws://"));
}

#[test]
fn test_unknown_profile() {
    fleetsync_cmd()
        .args(["--profile", "lab", "stop", "r1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Profile 'lab' not found"));
}

// ── Channel down, no fallback ───────────────────────────────────────

#[test]
fn test_stop_without_server_is_unavailable() {
    fleetsync_cmd()
        .args(["--url", &dead_channel_url(), "stop", "r1"])
        .assert()
        .code(7)
        .stderr(predicate::str::contains("unavailable"));
}

// ── REST fallback ───────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn test_move_falls_back_to_rest() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/robots/r1/commands"))
        .and(body_partial_json(json!({
            "command_type": "move",
            "params": { "direction": "forward", "duration_ms": 1500 }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "result": { "accepted": true }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let args = vec![
        "--url".to_owned(),
        dead_channel_url(),
        "--rest-url".to_owned(),
        server.uri(),
        "--output".to_owned(),
        "json-compact".to_owned(),
        "move".to_owned(),
        "r1".to_owned(),
        "forward".to_owned(),
        "--duration".to_owned(),
        "1500ms".to_owned(),
    ];
    let output = tokio::task::spawn_blocking(move || fleetsync_cmd().args(args).output().unwrap())
        .await
        .unwrap();

    assert!(output.status.success(), "{}", combined_output(&output));
    assert_eq!(
        String::from_utf8_lossy(&output.stdout).trim(),
        r#"{"accepted":true}"#
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_rejected_command_exit_code() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/robots/r1/commands"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({ "detail": "robot busy" })))
        .mount(&server)
        .await;

    let args = vec![
        "--url".to_owned(),
        dead_channel_url(),
        "--rest-url".to_owned(),
        server.uri(),
        "mode".to_owned(),
        "r1".to_owned(),
        "docking".to_owned(),
    ];
    let output = tokio::task::spawn_blocking(move || fleetsync_cmd().args(args).output().unwrap())
        .await
        .unwrap();

    assert_eq!(output.status.code(), Some(6));
    assert!(combined_output(&output).contains("robot busy"));
}

// ── Config profiles ─────────────────────────────────────────────────

#[test]
fn test_config_show_no_config() {
    fleetsync_cmd().args(["config", "show"]).assert().success();
}

#[test]
fn test_config_add_then_list() {
    let home = tempfile::tempdir().unwrap();

    fleetsync_cmd_in(home.path())
        .args([
            "config",
            "add",
            "lab",
            "--channel-url",
            "ws://10.0.0.5:8765/",
            "--fallback-url",
            "http://10.0.0.5:8085",
        ])
        .assert()
        .success();

    fleetsync_cmd_in(home.path())
        .args(["config", "profiles"])
        .assert()
        .success()
        .stdout(predicate::str::contains("* lab  ws://10.0.0.5:8765/"));

    fleetsync_cmd_in(home.path())
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("default_profile = \"lab\"")
                .and(predicate::str::contains("rest_url = \"http://10.0.0.5:8085\"")),
        );
}

#[test]
fn test_config_add_rejects_bad_url() {
    let home = tempfile::tempdir().unwrap();
    fleetsync_cmd_in(home.path())
        .args(["config", "add", "lab", "--channel-url", "not a url"])
        .assert()
        .code(2);
}
