//! Shared fixtures for jradb-sync integration tests
//!
//! - [`MockProvider`]: a wiremock server standing in for JRA-DB (listing
//!   endpoint plus archive downloads)
//! - [`zip_bytes`] / [`lzh_bytes`]: archives built in memory (re-exported)
//! - [`test_config`]: a `SyncConfig` pointed at the mock with fast retries

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use jradb_sync::config::SyncConfig;
use std::collections::HashMap;
use std::path::Path;
use wiremock::matchers::{basic_auth, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub use jradb_sync::fetch::fixtures::{lzh_bytes, zip_bytes};

pub const USER: &str = "member";
pub const PASS: &str = "secret";
pub const LIST_PATH: &str = "/jradb/listDownload.do";

pub struct MockProvider {
    pub server: MockServer,
}

impl MockProvider {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    pub fn list_url(&self) -> String {
        format!("{}{}", self.server.uri(), LIST_PATH)
    }

    /// Absolute URL of a file served under `/data/`
    pub fn file_url(&self, name: &str) -> String {
        format!("{}/data/{}", self.server.uri(), name)
    }

    /// Serve a listing document for `feed` when asked with `fromtime = since`
    pub async fn listing(&self, feed: &str, since: &str, body: String) {
        Mock::given(method("GET"))
            .and(path(LIST_PATH))
            .and(query_param("data", feed))
            .and(query_param("fromtime", since))
            .and(basic_auth(USER, PASS))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&self.server)
            .await;
    }

    /// Serve a raw response for `feed`, whatever the watermark
    pub async fn listing_status(&self, feed: &str, status: u16, body: &str) {
        Mock::given(method("GET"))
            .and(path(LIST_PATH))
            .and(query_param("data", feed))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .mount(&self.server)
            .await;
    }

    /// Serve an archive, expecting exactly `times` downloads
    pub async fn file(&self, name: &str, bytes: Vec<u8>, times: u64) {
        Mock::given(method("GET"))
            .and(path(format!("/data/{name}")))
            .and(basic_auth(USER, PASS))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(bytes))
            .expect(times)
            .mount(&self.server)
            .await;
    }

    /// Fail downloads of `name` with `status`
    pub async fn file_status(&self, name: &str, status: u16) {
        Mock::given(method("GET"))
            .and(path(format!("/data/{name}")))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.server)
            .await;
    }

    /// Number of requests that reached `/data/<name>`
    pub async fn downloads_of(&self, name: &str) -> usize {
        let wanted = format!("/data/{name}");
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|r| r.url.path() == wanted)
            .count()
    }
}

/// Listing document with the provider's default namespace
pub fn listing_xml(next: Option<&str>, urls: &[(&str, String)]) -> String {
    let mut xml = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<downloadlist xmlns=\"http://jradb.jp/schema/list\">\n",
    );
    if let Some(next) = next {
        xml.push_str(&format!("  <nextexectime>{next}</nextexectime>\n"));
    }
    xml.push_str("  <urllist>\n");
    for (category, url) in urls {
        xml.push_str(&format!("    <url category=\"{category}\">{url}</url>\n"));
    }
    xml.push_str("  </urllist>\n</downloadlist>\n");
    xml
}

pub fn test_config(provider: &MockProvider, work_dir: &Path, extra: &[(&str, &str)]) -> SyncConfig {
    let mut vars: HashMap<String, String> = [
        ("JRADB_USER", USER),
        ("JRADB_PASS", PASS),
        ("DRIVE_FOLDER_ID", "root"),
        ("GOOGLE_ACCESS_TOKEN", "unused"),
        ("JRADB_MAX_RETRIES", "1"),
        ("JRADB_RETRY_DELAY_SECS", "0"),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    vars.insert("JRADB_LIST_URL".to_string(), provider.list_url());
    vars.insert("JRADB_WORK_DIR".to_string(), work_dir.display().to_string());
    for (k, v) in extra {
        vars.insert(k.to_string(), v.to_string());
    }

    SyncConfig::from_lookup(move |key| vars.get(key).cloned()).unwrap()
}

/// True when `dir` has no entries left
pub fn is_empty_dir(dir: &Path) -> bool {
    std::fs::read_dir(dir).map(|mut d| d.next().is_none()).unwrap_or(true)
}
