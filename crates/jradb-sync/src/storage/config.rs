use std::path::PathBuf;

use crate::config::{parse_or, required, Secret};
use crate::error::{Result, SyncError};

pub const DEFAULT_DRIVE_API_URL: &str = "https://www.googleapis.com/drive/v3";
pub const DEFAULT_DRIVE_UPLOAD_URL: &str = "https://www.googleapis.com/upload/drive/v3";
pub const DEFAULT_SERVICE_ACCOUNT_KEY_PATH: &str = "service_account.json";

/// Selected storage backend and its settings
#[derive(Debug, Clone)]
pub enum StorageConfig {
    Drive(DriveConfig),
    S3(S3Config),
}

#[derive(Debug, Clone)]
pub struct DriveConfig {
    /// Id of the folder everything is published under
    pub root_folder_id: String,
    pub auth: DriveAuth,
    pub api_base_url: String,
    pub upload_base_url: String,
}

/// How the Drive backend obtains its bearer token
#[derive(Debug, Clone)]
pub enum DriveAuth {
    /// Pre-minted OAuth token, used as-is (`GOOGLE_ACCESS_TOKEN`)
    AccessToken(Secret),
    /// Service-account key given inline (`GOOGLE_SERVICE_ACCOUNT_KEY`)
    ServiceAccountJson(Secret),
    /// Service-account key file
    ServiceAccountKeyFile(PathBuf),
}

impl DriveAuth {
    /// Pick the credential source; an explicit token wins, then an inline
    /// key, then a key file (`GCP_SA_KEY_PATH`, `GOOGLE_APPLICATION_CREDENTIALS`,
    /// else `service_account.json` in the working directory).
    fn from_lookup<F>(get: &F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = get("GOOGLE_ACCESS_TOKEN") {
            return DriveAuth::AccessToken(Secret::new(token));
        }
        if let Some(key) = get("GOOGLE_SERVICE_ACCOUNT_KEY") {
            return DriveAuth::ServiceAccountJson(Secret::new(key));
        }
        let path = get("GCP_SA_KEY_PATH")
            .or_else(|| get("GOOGLE_APPLICATION_CREDENTIALS"))
            .unwrap_or_else(|| DEFAULT_SERVICE_ACCOUNT_KEY_PATH.to_string());
        DriveAuth::ServiceAccountKeyFile(PathBuf::from(path))
    }
}

impl DriveConfig {
    pub fn new(root_folder_id: impl Into<String>, auth: DriveAuth) -> Self {
        Self {
            root_folder_id: root_folder_id.into(),
            auth,
            api_base_url: DEFAULT_DRIVE_API_URL.to_string(),
            upload_base_url: DEFAULT_DRIVE_UPLOAD_URL.to_string(),
        }
    }

    /// Point both API bases at one server, e.g. a mock
    pub fn with_base_url(mut self, base: &str) -> Self {
        let base = base.trim_end_matches('/');
        self.api_base_url = format!("{base}/drive/v3");
        self.upload_base_url = format!("{base}/upload/drive/v3");
        self
    }
}

#[derive(Debug, Clone)]
pub struct S3Config {
    pub endpoint: Option<String>,
    pub region: String,
    pub bucket: String,
    /// Static credentials; the default AWS provider chain is used when absent
    pub access_key: Option<String>,
    pub secret_key: Option<Secret>,
    pub path_style: bool,
    /// Key prefix acting as the root folder
    pub root_prefix: String,
}

impl StorageConfig {
    /// Read the storage section from a key lookup (blank values already filtered)
    pub fn from_lookup<F>(get: &F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let root = get("STORAGE_ROOT_ID")
            .or_else(|| get("DRIVE_FOLDER_ID"))
            .ok_or_else(|| {
                SyncError::Config("STORAGE_ROOT_ID or DRIVE_FOLDER_ID must be set".to_string())
            })?;

        let backend = get("STORAGE_BACKEND").unwrap_or_else(|| "drive".to_string());
        match backend.trim().to_ascii_lowercase().as_str() {
            "drive" => {
                let mut drive = DriveConfig::new(root, DriveAuth::from_lookup(get));
                if let Some(url) = get("GOOGLE_DRIVE_API_URL") {
                    drive.api_base_url = url.trim_end_matches('/').to_string();
                }
                if let Some(url) = get("GOOGLE_DRIVE_UPLOAD_URL") {
                    drive.upload_base_url = url.trim_end_matches('/').to_string();
                }
                Ok(StorageConfig::Drive(drive))
            },
            "s3" => Ok(StorageConfig::S3(S3Config {
                endpoint: get("S3_ENDPOINT"),
                region: get("S3_REGION").unwrap_or_else(|| "us-east-1".to_string()),
                bucket: required(get, "S3_BUCKET")?,
                access_key: get("S3_ACCESS_KEY").or_else(|| get("AWS_ACCESS_KEY_ID")),
                secret_key: get("S3_SECRET_KEY")
                    .or_else(|| get("AWS_SECRET_ACCESS_KEY"))
                    .map(Secret::new),
                path_style: parse_or(get, "S3_PATH_STYLE", false)?,
                root_prefix: root,
            })),
            other => Err(SyncError::Config(format!(
                "STORAGE_BACKEND must be 'drive' or 's3', got '{other}'"
            ))),
        }
    }

    pub fn backend(&self) -> &'static str {
        match self {
            StorageConfig::Drive(_) => "drive",
            StorageConfig::S3(_) => "s3",
        }
    }
}
