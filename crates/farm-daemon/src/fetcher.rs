//! Desired-state fetcher
//!
//! Pulls the terminal list from the control plane. Failures come back as a
//! typed [`FetchError`] so the poll loop can tell "zero terminals" apart from
//! "could not ask".

use crate::config::ControlPlaneConfig;
use crate::error::{FetchError, FetchResult};
use async_trait::async_trait;
use farm_types::DesiredRecord;
use reqwest::Client;

/// Path of the desired-state endpoint on the control plane
pub const CONFIG_PATH: &str = "/api/v1/orchestrator/config";

/// Header carrying the shared secret
pub const SECRET_HEADER: &str = "x-orchestrator-secret";

/// Source of desired-state records
#[async_trait]
pub trait ConfigFetcher: Send + Sync {
    /// Fetch the current desired state
    async fn fetch(&self) -> FetchResult<Vec<DesiredRecord>>;
}

/// Fetches desired state over HTTP
pub struct HttpConfigFetcher {
    client: Client,
    url: String,
    secret: String,
}

impl HttpConfigFetcher {
    /// Create a fetcher for the configured control plane
    pub fn new(config: &ControlPlaneConfig) -> FetchResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            url: format!("{}{}", config.endpoint.trim_end_matches('/'), CONFIG_PATH),
            secret: config.secret.clone(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ConfigFetcher for HttpConfigFetcher {
    async fn fetch(&self) -> FetchResult<Vec<DesiredRecord>> {
        let response = self
            .client
            .get(&self.url)
            .header(SECRET_HEADER, &self.secret)
            .send()
            .await?
            .error_for_status()?;

        let body = response.bytes().await?;
        let records =
            DesiredRecord::parse_list(&body).map_err(|e| FetchError::Decode(e.to_string()))?;

        for (id, status) in DesiredRecord::nonstandard_statuses(&body) {
            tracing::warn!(id = %id, status = %status, "Unrecognized status, treating as RUNNING");
        }

        tracing::debug!(count = records.len(), "Fetched desired state");

        Ok(records)
    }
}
