//! HTTP retrieval of the update manifest and packages.
//!
//! The network is never trusted: everything fetched here goes through the
//! signature checks before any of it takes effect. This module only moves
//! bytes, under a bounded timeout.

use std::time::Duration;

use futures_util::StreamExt;
use thiserror::Error;
use tracing::debug;

use crate::config::TrustConfig;
use crate::updater::manifest::UpdateManifest;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Request timed out")]
    Timeout,
    #[error("Network error: {0}")]
    Network(String),
    #[error("Unexpected HTTP status {0}")]
    Status(u16),
    #[error("Malformed manifest: {0}")]
    MalformedManifest(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else {
            Self::Network(e.to_string())
        }
    }
}

pub struct Fetcher {
    client: reqwest::Client,
}

impl Fetcher {
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(concat!("webtrust/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self { client }
    }

    /// Fetch and parse the update manifest, reporting who is asking: the
    /// installation id, current version, and platform tags go along as query
    /// parameters.
    pub async fn fetch_manifest(&self, config: &TrustConfig) -> Result<UpdateManifest, FetchError> {
        let response = self
            .client
            .get(&config.manifest_url)
            .query(&[
                ("uuid", config.installation_id.to_string()),
                ("version", config.current_version.to_string()),
                ("platform", config.platform.clone()),
                ("os", config.os.clone()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(FetchError::Status(response.status().as_u16()));
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| FetchError::MalformedManifest(e.to_string()))
    }

    /// Download a package as opaque bytes.
    pub async fn fetch_package(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(FetchError::Status(response.status().as_u16()));
        }

        let mut package = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            package.extend_from_slice(&chunk?);
        }
        debug!(bytes = package.len(), url, "Downloaded update package");
        Ok(package)
    }
}
