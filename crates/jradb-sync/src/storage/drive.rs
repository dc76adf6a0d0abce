//! Google Drive v3 backend
//!
//! Talks to the REST API directly. The bearer token is either a fixed
//! access token or minted from a service-account key with the `drive`
//! scope; `gcp_auth` caches minted tokens and refreshes them before expiry.
//! Every call passes `supportsAllDrives` so shared drives work the same as
//! "My Drive".

use async_trait::async_trait;
use gcp_auth::{CustomServiceAccount, TokenProvider};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument};

use super::config::{DriveAuth, DriveConfig};
use super::{quote_literal, status_error, Content, NodeId, NodeKind, RemoteNode, RemoteStore};
use crate::config::{HttpConfig, Secret};
use crate::error::{Result, SyncError};

pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";
pub const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive";

const NODE_FIELDS: &str = "id,name,mimeType";
const MULTIPART_BOUNDARY: &str = "jradb_sync_boundary_7f3a";

#[derive(Debug, Deserialize)]
struct DriveFile {
    id: String,
    name: String,
    #[serde(rename = "mimeType")]
    mime_type: String,
}

impl DriveFile {
    fn into_node(self) -> RemoteNode {
        let kind = if self.mime_type == FOLDER_MIME_TYPE {
            NodeKind::Folder
        } else {
            NodeKind::File
        };
        RemoteNode {
            id: NodeId::new(self.id),
            name: self.name,
            kind,
        }
    }
}

#[derive(Debug, Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
}

enum Credentials {
    Fixed(Secret),
    ServiceAccount(CustomServiceAccount),
}

impl Credentials {
    fn load(auth: &DriveAuth) -> Result<Self> {
        let account = match auth {
            DriveAuth::AccessToken(token) => return Ok(Credentials::Fixed(token.clone())),
            DriveAuth::ServiceAccountJson(key) => CustomServiceAccount::from_json(key.expose())
                .map_err(|e| {
                    SyncError::StorageAuth(format!("invalid GOOGLE_SERVICE_ACCOUNT_KEY: {e}"))
                })?,
            DriveAuth::ServiceAccountKeyFile(path) => CustomServiceAccount::from_file(path)
                .map_err(|e| {
                    SyncError::StorageAuth(format!(
                        "cannot load service account key {}: {e}",
                        path.display()
                    ))
                })?,
        };
        Ok(Credentials::ServiceAccount(account))
    }
}

pub struct DriveStore {
    client: Client,
    config: DriveConfig,
    credentials: Credentials,
}

impl DriveStore {
    pub fn new(config: DriveConfig, http: &HttpConfig) -> Result<Self> {
        let credentials = Credentials::load(&config.auth)?;
        Ok(Self {
            client: http.build_client()?,
            config,
            credentials,
        })
    }

    /// Bearer token for the next request
    async fn token(&self) -> Result<String> {
        match &self.credentials {
            Credentials::Fixed(token) => Ok(token.expose().to_string()),
            Credentials::ServiceAccount(account) => {
                let token = account.token(&[DRIVE_SCOPE]).await.map_err(|e| {
                    SyncError::StorageAuth(format!("service account token request failed: {e}"))
                })?;
                Ok(token.as_str().to_string())
            },
        }
    }

    fn files_url(&self) -> String {
        format!("{}/files", self.config.api_base_url)
    }

    fn file_url(&self, id: &NodeId) -> String {
        format!("{}/files/{}", self.config.api_base_url, id)
    }

    async fn checked(response: Response, context: &str) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(status_error(context, status, &body))
    }
}

/// Search expression matching children of `parent` by exact name and kind
fn children_query(parent: &NodeId, name: &str, kind: NodeKind) -> String {
    let kind_clause = match kind {
        NodeKind::Folder => format!("mimeType = '{FOLDER_MIME_TYPE}'"),
        NodeKind::File => format!("mimeType != '{FOLDER_MIME_TYPE}'"),
    };
    format!(
        "name = '{}' and '{}' in parents and {} and trashed = false",
        quote_literal(name),
        quote_literal(parent.as_str()),
        kind_clause
    )
}

/// `multipart/related` body carrying file metadata followed by the content
fn multipart_body(metadata: &serde_json::Value, mime_type: &str, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(data.len() + 512);
    body.extend_from_slice(
        format!(
            "--{MULTIPART_BOUNDARY}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{metadata}\r\n--{MULTIPART_BOUNDARY}\r\nContent-Type: {mime_type}\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{MULTIPART_BOUNDARY}--\r\n").as_bytes());
    body
}

#[async_trait]
impl RemoteStore for DriveStore {
    fn backend(&self) -> &'static str {
        "drive"
    }

    fn root(&self) -> NodeId {
        NodeId::new(&self.config.root_folder_id)
    }

    #[instrument(skip(self))]
    async fn verify_root(&self) -> Result<()> {
        let token = self.token().await?;
        let response = self
            .client
            .get(self.file_url(&self.root()))
            .bearer_auth(token)
            .query(&[("fields", NODE_FIELDS), ("supportsAllDrives", "true")])
            .send()
            .await
            .map_err(|e| SyncError::StorageAuth(format!("cannot reach Drive: {e}")))?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(SyncError::StorageAuth(format!(
                    "Drive rejected the access token (HTTP {})",
                    response.status()
                )));
            },
            StatusCode::NOT_FOUND => {
                return Err(SyncError::StorageAuth(format!(
                    "root folder {} not found or not shared",
                    self.config.root_folder_id
                )));
            },
            status if !status.is_success() => {
                return Err(SyncError::StorageAuth(format!(
                    "root folder check failed with HTTP {status}"
                )));
            },
            _ => {},
        }

        let root: DriveFile = response
            .json()
            .await
            .map_err(|e| SyncError::StorageAuth(format!("unexpected Drive response: {e}")))?;
        if root.mime_type != FOLDER_MIME_TYPE {
            return Err(SyncError::Config(format!(
                "root id {} is not a folder ({})",
                root.id, root.mime_type
            )));
        }

        debug!(name = %root.name, "Drive root folder verified");
        Ok(())
    }

    async fn find_children(
        &self,
        parent: &NodeId,
        name: &str,
        kind: NodeKind,
    ) -> Result<Vec<RemoteNode>> {
        let query = children_query(parent, name, kind);
        let response = self
            .client
            .get(self.files_url())
            .bearer_auth(self.token().await?)
            .query(&[
                ("q", query.as_str()),
                ("fields", "files(id,name,mimeType)"),
                ("spaces", "drive"),
                ("orderBy", "createdTime"),
                ("supportsAllDrives", "true"),
                ("includeItemsFromAllDrives", "true"),
                ("pageSize", "100"),
            ])
            .send()
            .await?;
        let list: FileList = Self::checked(response, &format!("search {name}"))
            .await?
            .json()
            .await?;

        Ok(list.files.into_iter().map(DriveFile::into_node).collect())
    }

    #[instrument(skip(self))]
    async fn create_folder(&self, parent: &NodeId, name: &str) -> Result<RemoteNode> {
        let metadata = json!({
            "name": name,
            "mimeType": FOLDER_MIME_TYPE,
            "parents": [parent.as_str()],
        });
        let response = self
            .client
            .post(self.files_url())
            .bearer_auth(self.token().await?)
            .query(&[("fields", NODE_FIELDS), ("supportsAllDrives", "true")])
            .json(&metadata)
            .send()
            .await?;
        let folder: DriveFile = Self::checked(response, &format!("create folder {name}"))
            .await?
            .json()
            .await?;

        Ok(folder.into_node())
    }

    #[instrument(skip(self, content))]
    async fn create_file(
        &self,
        parent: &NodeId,
        name: &str,
        content: &Content,
    ) -> Result<RemoteNode> {
        let data = content.to_bytes().await?;
        let metadata = json!({
            "name": name,
            "parents": [parent.as_str()],
        });
        let body = multipart_body(&metadata, content.mime_type(), &data);

        let response = self
            .client
            .post(format!("{}/files", self.config.upload_base_url))
            .bearer_auth(self.token().await?)
            .query(&[
                ("uploadType", "multipart"),
                ("fields", NODE_FIELDS),
                ("supportsAllDrives", "true"),
            ])
            .header(
                reqwest::header::CONTENT_TYPE,
                format!("multipart/related; boundary={MULTIPART_BOUNDARY}"),
            )
            .body(body)
            .send()
            .await?;
        let file: DriveFile = Self::checked(response, &format!("create file {name}"))
            .await?
            .json()
            .await?;

        debug!(name, id = %file.id, bytes = data.len(), "Uploaded new file");
        Ok(file.into_node())
    }

    #[instrument(skip(self, content))]
    async fn update_file(&self, file: &NodeId, content: &Content) -> Result<()> {
        let data = content.to_bytes().await?;
        let size = data.len();
        let response = self
            .client
            .patch(format!("{}/files/{}", self.config.upload_base_url, file))
            .bearer_auth(self.token().await?)
            .query(&[("uploadType", "media"), ("supportsAllDrives", "true")])
            .header(reqwest::header::CONTENT_TYPE, content.mime_type())
            .body(data)
            .send()
            .await?;
        Self::checked(response, &format!("update file {file}")).await?;

        debug!(id = %file, bytes = size, "Replaced file content");
        Ok(())
    }

    async fn read_text(&self, file: &NodeId) -> Result<String> {
        let response = self
            .client
            .get(self.file_url(file))
            .bearer_auth(self.token().await?)
            .query(&[("alt", "media"), ("supportsAllDrives", "true")])
            .send()
            .await?;
        let bytes = Self::checked(response, &format!("read file {file}"))
            .await?
            .bytes()
            .await?;

        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn store_for(server: &MockServer) -> DriveStore {
        let auth = DriveAuth::AccessToken(Secret::new("test-token"));
        let config = DriveConfig::new("root-id", auth).with_base_url(&server.uri());
        DriveStore::new(config, &HttpConfig::default()).unwrap()
    }

    #[test]
    fn test_missing_service_account_key_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let auth = DriveAuth::ServiceAccountKeyFile(dir.path().join("service_account.json"));
        let config = DriveConfig::new("root-id", auth);

        let err = DriveStore::new(config, &HttpConfig::default()).err().unwrap();
        assert!(matches!(err, SyncError::StorageAuth(ref m) if m.contains("service_account.json")));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_malformed_inline_key_is_fatal() {
        let auth = DriveAuth::ServiceAccountJson(Secret::new("{not json"));
        let config = DriveConfig::new("root-id", auth);

        let err = DriveStore::new(config, &HttpConfig::default()).err().unwrap();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_children_query() {
        let q = children_query(&NodeId::new("abc"), "it's.dat", NodeKind::File);
        assert_eq!(
            q,
            "name = 'it\\'s.dat' and 'abc' in parents and mimeType != 'application/vnd.google-apps.folder' and trashed = false"
        );
    }

    #[test]
    fn test_multipart_body_layout() {
        let body = multipart_body(&json!({"name": "a"}), "text/plain", b"hello");
        let text = String::from_utf8(body).unwrap();
        assert!(text.starts_with(&format!("--{MULTIPART_BOUNDARY}\r\n")));
        assert!(text.contains("{\"name\":\"a\"}"));
        assert!(text.contains("Content-Type: text/plain\r\n\r\nhello\r\n"));
        assert!(text.ends_with(&format!("--{MULTIPART_BOUNDARY}--\r\n")));
    }

    #[tokio::test]
    async fn test_verify_root_unauthorized_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/drive/v3/files/root-id"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = store_for(&server).verify_root().await.unwrap_err();
        assert!(matches!(err, SyncError::StorageAuth(_)));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_verify_root_ok() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/drive/v3/files/root-id"))
            .and(header("authorization", "Bearer test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "root-id",
                "name": "JRA-DB",
                "mimeType": FOLDER_MIME_TYPE,
            })))
            .mount(&server)
            .await;

        store_for(&server).verify_root().await.unwrap();
    }

    #[tokio::test]
    async fn test_find_children_maps_kinds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/drive/v3/files"))
            .and(query_param("supportsAllDrives", "true"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "files": [
                    {"id": "f1", "name": "extracted", "mimeType": FOLDER_MIME_TYPE}
                ]
            })))
            .mount(&server)
            .await;

        let nodes = store_for(&server)
            .find_children(&NodeId::new("root-id"), "extracted", NodeKind::Folder)
            .await
            .unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].id.as_str(), "f1");
        assert_eq!(nodes[0].kind, NodeKind::Folder);
    }

    #[tokio::test]
    async fn test_create_file_uses_multipart_upload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/upload/drive/v3/files"))
            .and(query_param("uploadType", "multipart"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "new-file",
                "name": "last_update.txt",
                "mimeType": "text/plain",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let node = store_for(&server)
            .create_file(
                &NodeId::new("root-id"),
                "last_update.txt",
                &Content::Text("20240601000000".into()),
            )
            .await
            .unwrap();
        assert_eq!(node.id.as_str(), "new-file");
        assert_eq!(node.kind, NodeKind::File);
    }

    #[tokio::test]
    async fn test_server_error_is_storage_error() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .respond_with(ResponseTemplate::new(503).set_body_string("backend unavailable"))
            .mount(&server)
            .await;

        let err = store_for(&server)
            .update_file(&NodeId::new("f1"), &Content::Text("x".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Storage(ref m) if m.contains("backend unavailable")));
        assert!(!err.is_fatal());
    }
}
