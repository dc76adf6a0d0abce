//! S3-compatible backend
//!
//! Folders are key prefixes ending in `/`, materialized by an empty marker
//! object so that an empty folder still "exists". A file's id is its full key.

use async_trait::async_trait;
use aws_sdk_s3::{
    config::{Credentials, Region},
    primitives::ByteStream,
    Client,
};
use tracing::{debug, info, instrument};

use super::config::S3Config;
use super::{Content, NodeId, NodeKind, RemoteNode, RemoteStore};
use crate::error::{Result, SyncError};

#[derive(Clone)]
pub struct S3Store {
    client: Client,
    bucket: String,
    root_prefix: String,
}

impl S3Store {
    pub async fn new(config: S3Config) -> Result<Self> {
        debug!(bucket = %config.bucket, endpoint = ?config.endpoint, "Initializing S3 storage");

        let mut s3_config_builder = match (&config.access_key, &config.secret_key) {
            (Some(access_key), Some(secret_key)) => {
                let credentials =
                    Credentials::new(access_key, secret_key.expose(), None, None, "jradb-sync");
                aws_sdk_s3::Config::builder()
                    .behavior_version(aws_sdk_s3::config::BehaviorVersion::latest())
                    .credentials_provider(credentials)
            },
            _ => {
                let shared = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
                aws_sdk_s3::config::Builder::from(&shared)
            },
        };

        s3_config_builder = s3_config_builder
            .region(Region::new(config.region.clone()))
            .force_path_style(config.path_style);
        if let Some(endpoint) = &config.endpoint {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint);
        }

        let client = Client::from_conf(s3_config_builder.build());
        info!("S3 storage initialized for bucket: {}", config.bucket);

        Ok(Self {
            client,
            bucket: config.bucket,
            root_prefix: folder_key(&config.root_prefix),
        })
    }

    async fn put(&self, key: &str, content: &Content) -> Result<()> {
        let body = match content {
            Content::LocalFile(path) => ByteStream::from_path(path)
                .await
                .map_err(|e| SyncError::storage(&format!("read {}", path.display()), e))?,
            Content::Text(text) => ByteStream::from(text.clone().into_bytes()),
        };

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content.mime_type())
            .body(body)
            .send()
            .await
            .map_err(|e| SyncError::storage(&format!("put s3://{}/{}", self.bucket, key), e))?;

        debug!("Uploaded s3://{}/{}", self.bucket, key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(err) => {
                let service = err.into_service_error();
                if service.is_not_found() {
                    Ok(false)
                } else {
                    Err(SyncError::storage(&format!("head s3://{}/{}", self.bucket, key), service))
                }
            },
        }
    }

    async fn prefix_exists(&self, prefix: &str) -> Result<bool> {
        let output = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix)
            .max_keys(1)
            .send()
            .await
            .map_err(|e| SyncError::storage(&format!("list s3://{}/{}", self.bucket, prefix), e))?;

        Ok(output.key_count().unwrap_or(0) > 0)
    }
}

/// Normalize a prefix so it is empty or ends in exactly one `/`
fn folder_key(prefix: &str) -> String {
    let trimmed = prefix.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{trimmed}/")
    }
}

fn child_key(parent: &NodeId, name: &str, kind: NodeKind) -> String {
    match kind {
        NodeKind::Folder => format!("{}{}/", parent.as_str(), name),
        NodeKind::File => format!("{}{}", parent.as_str(), name),
    }
}

#[async_trait]
impl RemoteStore for S3Store {
    fn backend(&self) -> &'static str {
        "s3"
    }

    fn root(&self) -> NodeId {
        NodeId::new(&self.root_prefix)
    }

    #[instrument(skip(self))]
    async fn verify_root(&self) -> Result<()> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| {
                SyncError::StorageAuth(format!("cannot access bucket {}: {}", self.bucket, e))
            })?;
        Ok(())
    }

    async fn find_children(
        &self,
        parent: &NodeId,
        name: &str,
        kind: NodeKind,
    ) -> Result<Vec<RemoteNode>> {
        let key = child_key(parent, name, kind);
        let found = match kind {
            NodeKind::Folder => self.prefix_exists(&key).await?,
            NodeKind::File => self.exists(&key).await?,
        };

        Ok(if found {
            vec![RemoteNode {
                id: NodeId::new(key),
                name: name.to_string(),
                kind,
            }]
        } else {
            Vec::new()
        })
    }

    async fn create_folder(&self, parent: &NodeId, name: &str) -> Result<RemoteNode> {
        let key = child_key(parent, name, NodeKind::Folder);
        self.put(&key, &Content::Text(String::new())).await?;
        Ok(RemoteNode {
            id: NodeId::new(key),
            name: name.to_string(),
            kind: NodeKind::Folder,
        })
    }

    async fn create_file(
        &self,
        parent: &NodeId,
        name: &str,
        content: &Content,
    ) -> Result<RemoteNode> {
        let key = child_key(parent, name, NodeKind::File);
        self.put(&key, content).await?;
        Ok(RemoteNode {
            id: NodeId::new(key),
            name: name.to_string(),
            kind: NodeKind::File,
        })
    }

    async fn update_file(&self, file: &NodeId, content: &Content) -> Result<()> {
        self.put(file.as_str(), content).await
    }

    async fn read_text(&self, file: &NodeId) -> Result<String> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(file.as_str())
            .send()
            .await
            .map_err(|e| SyncError::storage(&format!("get s3://{}/{}", self.bucket, file), e))?;

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| SyncError::storage("read S3 response body", e))?
            .into_bytes();

        Ok(String::from_utf8_lossy(&data).into_owned())
    }
}
