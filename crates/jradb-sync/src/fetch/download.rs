//! Streaming archive download

use futures::StreamExt;
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::{Result, SyncError};
use crate::http::ProviderClient;

/// Download `url` into `dest`, returning the number of bytes written.
///
/// The file is truncated at the start of every attempt so a retried
/// download never appends to a partial one.
pub async fn download_to(http: &ProviderClient, url: &str, dest: &Path) -> Result<u64> {
    info!("Downloading {}", url);

    let size = http
        .with_retry(&format!("Download {url}"), move || async move {
            let response = http.get(url, &[]).await?;
            let mut file = tokio::fs::File::create(dest).await?;
            let mut written = 0u64;
            let mut stream = response.bytes_stream();

            while let Some(chunk) = stream.next().await {
                let chunk = chunk?;
                file.write_all(&chunk).await?;
                written += chunk.len() as u64;
            }
            file.flush().await?;

            Ok(written)
        })
        .await
        .map_err(|e| SyncError::Download(format!("{url}: {e}")))?;

    debug!("Downloaded {} bytes to {}", size, dest.display());
    Ok(size)
}
