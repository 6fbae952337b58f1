use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::path::Path;
use std::thread;

const RECORD: &str = concat!(
    r#"{"id":"doc-1","name":"spec.pdf","uri":"https://example.com/spec.pdf","size":2048,"#,
    r#""dateAdded":"2024-05-01T10:15:30","isFavorite":true,"type":"url"}"#
);

/// The binary with settings isolated to `data_dir` and no env overrides.
fn pdfshelf(data_dir: &Path) -> Command {
    let mut cmd = cargo_bin_cmd!("pdfshelf");
    cmd.env("PDFSHELF_DATA_DIR", data_dir)
        .env_remove("PDFSHELF_BACKEND_URL")
        .env_remove("PDFSHELF_TIMEOUT_MS")
        .env_remove("PDFSHELF_MAX_ATTEMPTS")
        .env_remove("PDFSHELF_STRATEGIES");
    cmd
}

fn json_lines(stdout: &[u8]) -> Vec<Value> {
    String::from_utf8_lossy(stdout)
        .lines()
        .map(|line| serde_json::from_str(line).expect("every line should be json"))
        .collect()
}

/// Answers a single request with `body` and returns the base URL.
fn serve_once(body: String) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback");
    let base = format!("http://{}", listener.local_addr().expect("local addr"));

    thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("accept");
        let mut buf = [0u8; 4096];
        let _ = stream.read(&mut buf);
        let reply = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\n\
             Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        let _ = stream.write_all(reply.as_bytes());
    });

    base
}

fn unused_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback");
    listener.local_addr().expect("local addr").port()
}

#[test]
fn version_prints_package_version() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    pdfshelf(temp.path())
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn simulate_falls_back_and_reports_each_status() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let output = pdfshelf(temp.path())
        .args(["simulate", "--outcomes", "fail:embed blocked,loaded"])
        .args(["--strategies", "direct-embed,proxy-viewer", "--max-attempts", "2"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let statuses = json_lines(&output);
    assert_eq!(statuses[0]["state"], "loading");
    assert_eq!(statuses[0]["strategy"], "direct-embed");
    assert_eq!(statuses[1]["strategy"], "proxy-viewer");
    assert_eq!(statuses[1]["attempt"], 1);

    let last = statuses.last().expect("at least one status");
    assert_eq!(last["state"], "ready");
    assert_eq!(last["strategy"], "proxy-viewer");
}

#[test]
fn simulate_silence_fails_with_timeout() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let output = pdfshelf(temp.path())
        .args(["simulate", "--outcomes", "silent", "--timeout-ms", "50", "--stats"])
        .args(["--strategies", "direct-embed,proxy-viewer", "--max-attempts", "3"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let lines = json_lines(&output);
    let (stats, statuses) = lines.split_last().expect("stats line");
    let last = statuses.last().expect("at least one status");
    assert_eq!(last["state"], "failed");
    assert_eq!(last["last_error"], "timeout");
    assert_eq!(stats["timeouts"], 2);
}

#[test]
fn simulate_partial_content_settles_degraded() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    pdfshelf(temp.path())
        .args(["simulate", "--outcomes", "partial@20", "--strategies", "client-renderer"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#"{"state":"degraded","strategy":"client-renderer"}"#));
}

#[test]
fn simulate_rejects_unknown_outcome() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    pdfshelf(temp.path())
        .args(["simulate", "--outcomes", "exploded"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid script step 'exploded'"));
}

#[test]
fn settings_set_persists_until_reset() {
    let temp = tempfile::tempdir().expect("temp dir should be created");

    pdfshelf(temp.path()).args(["settings", "set", "max_attempts", "5"]).assert().success();
    pdfshelf(temp.path())
        .args(["settings", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""max_attempts": 5"#));

    pdfshelf(temp.path()).args(["settings", "reset"]).assert().success();
    pdfshelf(temp.path())
        .args(["settings", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""max_attempts": 2"#));
}

#[test]
fn settings_show_includes_env_overrides() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    pdfshelf(temp.path())
        .env("PDFSHELF_TIMEOUT_MS", "1234")
        .args(["settings", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""timeout_per_attempt_ms": 1234"#));
}

#[test]
fn settings_set_rejects_unknown_key() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    pdfshelf(temp.path())
        .args(["settings", "set", "colour", "red"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown setting 'colour'"));
}

#[test]
fn list_json_prints_backend_records() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let base = serve_once(format!("[{RECORD}]"));

    pdfshelf(temp.path())
        .args(["list", "--json", "--backend", &base])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""name": "spec.pdf""#));
}

#[test]
fn plan_resolves_every_configured_strategy() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let base = serve_once(RECORD.to_owned());

    let output = pdfshelf(temp.path())
        .args(["plan", "doc-1", "--backend", &base])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let plan: Value = serde_json::from_slice(&output).expect("plan should be json");
    let entries = plan.as_array().expect("plan is an array");
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0]["source"], "https://example.com/spec.pdf");
    let proxied = entries[1]["source"].as_str().unwrap_or_default();
    assert!(proxied.contains("/viewerng/viewer?embedded=true&url="), "{proxied}");
}

#[test]
fn show_fails_when_backend_is_unreachable() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let backend = format!("http://127.0.0.1:{}", unused_port());

    pdfshelf(temp.path())
        .args(["show", "doc-1", "--backend", &backend])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to fetch doc-1"))
        .stderr(predicate::str::contains("network error"));
}
