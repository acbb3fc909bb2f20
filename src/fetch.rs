//! HTTP fetch helpers.
//!
//! Upstream endpoints are trusted but not reliable: every operation runs
//! under a bounded retry loop with exponential backoff, and each attempt is
//! bounded by client timeouts. Only the final failure surfaces to the
//! pipeline's error taxonomy.

use crate::error::{ProvisionError, Result};
use futures_util::StreamExt;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

const MAX_RETRIES: u32 = 3;
const CONNECT_TIMEOUT_SECS: u64 = 10;
const REQUEST_TIMEOUT_SECS: u64 = 300;

/// HTTP client for upstream metadata queries and artifact downloads.
pub struct Fetcher {
    client: reqwest::Client,
}

impl Fetcher {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("nodeprep/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self { client })
    }

    /// GET a URL and return the response body as text.
    pub async fn get_text(&self, url: &str) -> Result<String> {
        let response = self.get_with_retry(url).await?;
        Ok(response.text().await?)
    }

    /// GET a URL and parse the response body as JSON.
    pub async fn get_json(&self, url: &str) -> Result<serde_json::Value> {
        let response = self.get_with_retry(url).await?;
        Ok(response.json().await?)
    }

    /// Download a URL to `dest`, streaming the body. Partial files from a
    /// failed attempt are removed before the next attempt.
    pub async fn download(&self, url: &str, dest: &Path) -> Result<()> {
        let mut last_error = None;

        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                backoff(url, attempt).await;
                let _ = tokio::fs::remove_file(dest).await;
            }

            match self.try_download(url, dest).await {
                Ok(()) => return Ok(()),
                Err(e) => last_error = Some(e),
            }
        }

        Err(last_error.unwrap_or_else(|| {
            ProvisionError::Io(std::io::Error::other("download retries exhausted"))
        }))
    }

    async fn try_download(&self, url: &str, dest: &Path) -> Result<()> {
        let response = self.client.get(url).send().await?.error_for_status()?;

        let mut file = tokio::fs::File::create(dest).await?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            file.write_all(&chunk?).await?;
        }
        file.flush().await?;
        Ok(())
    }

    async fn get_with_retry(&self, url: &str) -> Result<reqwest::Response> {
        let mut last_error = None;

        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                backoff(url, attempt).await;
            }

            match self.client.get(url).send().await.and_then(|r| r.error_for_status()) {
                Ok(response) => return Ok(response),
                Err(e) => last_error = Some(ProvisionError::Http(e)),
            }
        }

        Err(last_error.unwrap_or_else(|| {
            ProvisionError::Io(std::io::Error::other("request retries exhausted"))
        }))
    }
}

async fn backoff(url: &str, attempt: u32) {
    let delay_ms = 1000 * (1u64 << (attempt - 1)); // 1s, 2s, 4s
    tracing::warn!(
        "[Fetcher] Retrying {} (attempt {}/{}, waiting {}ms)",
        url,
        attempt + 1,
        MAX_RETRIES + 1,
        delay_ms
    );
    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
}
