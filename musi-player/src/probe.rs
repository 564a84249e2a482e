//! Stream URL freshness probe
//!
//! Platform stream URLs expire. Before a track is handed to the sink the
//! controller issues a header-only request; any 4xx/5xx answer or transport
//! failure marks the URL stale and triggers a catalog reload.

use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// Probe verdict for one stream URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    Stale(String),
}

impl Freshness {
    pub fn is_stale(&self) -> bool {
        matches!(self, Freshness::Stale(_))
    }

    /// Classify an HTTP status code
    pub fn from_status(status: u16) -> Self {
        if status >= 400 {
            Freshness::Stale(format!("HTTP {}", status))
        } else {
            Freshness::Fresh
        }
    }
}

/// Freshness check seam; the controller never talks HTTP directly
#[async_trait]
pub trait FreshnessProbe: Send + Sync {
    async fn check(&self, stream_url: &str) -> Freshness;
}

/// HEAD-request probe with a bounded timeout
pub struct HttpProbe {
    client: reqwest::Client,
}

impl HttpProbe {
    pub fn new(timeout: Duration) -> crate::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| crate::Error::Probe(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl FreshnessProbe for HttpProbe {
    async fn check(&self, stream_url: &str) -> Freshness {
        // Redirects are followed by the default client policy
        match self.client.head(stream_url).send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                debug!(status, "Freshness probe answered");
                Freshness::from_status(status)
            }
            Err(e) if e.is_timeout() => Freshness::Stale("probe timed out".to_string()),
            Err(e) => Freshness::Stale(format!("probe failed: {}", e)),
        }
    }
}
