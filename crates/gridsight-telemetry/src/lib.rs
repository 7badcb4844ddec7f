//! ---
//! ems_section: "05-networking-external-interfaces"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Telemetry channel client and feed decoding."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
//! Best-effort HTTP client for the upstream telemetry channel.
//!
//! Both operations swallow every failure mode (connection errors, non-2xx
//! responses, undecodable bodies) and log them at `warn` level; the caller
//! only ever sees `None` or an empty history. Each call re-fetches, there is
//! no caching layer.

pub mod feed;

use gridsight_common::config::TelemetryConfig;
use thiserror::Error;
use tracing::warn;
use url::Url;

pub use feed::{Feed, FeedPage};

/// Errors raised while constructing a [`TelemetryClient`]. Fetch operations
/// never surface errors.
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("invalid telemetry base url: {0}")]
    InvalidBaseUrl(#[from] url::ParseError),
}

#[derive(Debug, Error)]
enum FetchError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("endpoint returned {0}")]
    Status(reqwest::StatusCode),
}

/// Client for the channel's `last.json` and `feeds.json` endpoints.
#[derive(Debug, Clone)]
pub struct TelemetryClient {
    http: reqwest::Client,
    last_url: Url,
    history_url: Url,
    read_key: String,
}

impl TelemetryClient {
    pub fn new(config: &TelemetryConfig) -> Result<Self, TelemetryError> {
        let base = Url::parse(&config.base_url)?;
        let last_url = base.join(&format!("channels/{}/feeds/last.json", config.channel_id))?;
        let history_url = base.join(&format!("channels/{}/feeds.json", config.channel_id))?;
        Ok(Self {
            http: reqwest::Client::new(),
            last_url,
            history_url,
            read_key: config.read_key.clone(),
        })
    }

    /// Fetch the single most recent sample. `None` on any failure, including
    /// a body without `created_at` (the channel's "no data" marker).
    pub async fn fetch_last(&self) -> Option<Feed> {
        let mut url = self.last_url.clone();
        url.query_pairs_mut()
            .append_pair("api_key", &self.read_key);
        match self.get_json::<Feed>(url).await {
            Ok(feed) => Some(feed),
            Err(err) => {
                warn!(error = %err, "latest telemetry feed unavailable");
                None
            }
        }
    }

    /// Fetch up to `count` recent samples in provider (chronological) order.
    /// Empty on any failure.
    pub async fn fetch_history(&self, count: u32) -> Vec<Feed> {
        let mut url = self.history_url.clone();
        url.query_pairs_mut()
            .append_pair("results", &count.to_string())
            .append_pair("api_key", &self.read_key);
        match self.get_json::<FeedPage>(url).await {
            Ok(page) => page.feeds,
            Err(err) => {
                warn!(error = %err, "telemetry history unavailable");
                Vec::new()
            }
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: Url) -> Result<T, FetchError> {
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }
        Ok(response.json::<T>().await?)
    }
}
