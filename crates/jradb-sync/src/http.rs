//! Authenticated HTTP access to the provider
//!
//! Both the listing call and archive downloads go through [`ProviderClient`],
//! which adds basic auth and retries transient failures with a linear
//! backoff (`retry_delay * attempt`).

use reqwest::{Client, Response, StatusCode};
use std::future::Future;
use tracing::{info, warn};

use crate::config::{HttpConfig, ProviderConfig};
use crate::error::{Result, SyncError};

#[derive(Debug, Clone)]
pub struct ProviderClient {
    client: Client,
    username: String,
    password: crate::config::Secret,
    http: HttpConfig,
}

impl ProviderClient {
    pub fn new(provider: &ProviderConfig, http: &HttpConfig) -> Result<Self> {
        Ok(Self {
            client: http.build_client()?,
            username: provider.username.clone(),
            password: provider.password.clone(),
            http: http.clone(),
        })
    }

    /// Single authenticated GET; non-2xx statuses become [`SyncError::Status`]
    pub async fn get(&self, url: &str, query: &[(&str, &str)]) -> Result<Response> {
        let response = self
            .client
            .get(url)
            .basic_auth(&self.username, Some(self.password.expose()))
            .query(query)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::Status {
                status,
                url: response.url().to_string(),
            });
        }
        Ok(response)
    }

    /// Run `op` up to `max_retries` times.
    ///
    /// Only transient errors are retried; anything else is returned at once.
    pub async fn with_retry<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max = self.http.max_retries.max(1);
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < max && is_transient(&e) => {
                    warn!("{} attempt {}/{} failed: {}", what, attempt, max, e);
                    let delay = self.http.retry_delay * attempt;
                    if !delay.is_zero() {
                        info!("Retrying in {} seconds...", delay.as_secs());
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                },
                Err(e) => return Err(e),
            }
        }
    }
}

/// Network errors, timeouts, 5xx and 429 are worth another attempt
pub fn is_transient(err: &SyncError) -> bool {
    match err {
        SyncError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request() || e.is_body(),
        SyncError::Status { status, .. } => {
            status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
        },
        SyncError::Io(_) => true,
        _ => false,
    }
}
