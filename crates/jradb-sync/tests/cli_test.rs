//! End-to-end tests for the `jradb-sync` binary
//!
//! - exit status on fatal startup errors
//! - the abort message reaches the log file before the process ends
//! - a rejected storage root stops the run before the provider is asked

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Binary with a clean environment, logging to files under `dir/logs`
fn jradb_sync(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("jradb-sync").unwrap();
    cmd.env_clear()
        .current_dir(dir)
        .env("LOG_OUTPUT", "file")
        .env("LOG_DIR", dir.join("logs"));
    cmd
}

fn read_logs(dir: &Path) -> String {
    let mut text = String::new();
    for entry in std::fs::read_dir(dir.join("logs")).unwrap() {
        text.push_str(&std::fs::read_to_string(entry.unwrap().path()).unwrap());
    }
    text
}

#[test]
fn test_missing_credentials_exit_with_failure_and_flush_logs() {
    let dir = TempDir::new().unwrap();

    jradb_sync(dir.path())
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("JRADB_USER"));

    let logs = read_logs(dir.path());
    assert!(logs.contains("Sync aborted"), "{logs}");
}

#[tokio::test]
async fn test_rejected_drive_root_exits_before_listing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/drive/v3/files/root-id"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    let dir = TempDir::new().unwrap();

    jradb_sync(dir.path())
        .env("JRADB_USER", "member")
        .env("JRADB_PASS", "secret")
        .env("JRADB_LIST_URL", format!("{}/jradb/listDownload.do", server.uri()))
        .env("JRADB_WORK_DIR", dir.path().join("work"))
        .env("DRIVE_FOLDER_ID", "root-id")
        .env("GOOGLE_ACCESS_TOKEN", "expired")
        .env("GOOGLE_DRIVE_API_URL", format!("{}/drive/v3", server.uri()))
        .assert()
        .failure()
        .code(1);

    let requests = server.received_requests().await.unwrap();
    assert!(requests
        .iter()
        .all(|r| !r.url.path().starts_with("/jradb")));
    assert!(!dir.path().join("work").exists());
    assert!(read_logs(dir.path()).contains("Sync aborted"));
}
