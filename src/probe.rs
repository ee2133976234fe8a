//! # Existence Probe
//!
//! Checks whether an object exists at a URL without downloading it.
//!
//! A probe never fails: network-level trouble (DNS, TLS, timeout, refused
//! connection) is reported as status `0`, distinct from a real 4xx/5xx.
//! There are no retries at this level.

use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Status reported when no HTTP response was received at all.
pub const NETWORK_FAILURE: u16 = 0;

/// Outcome of a single probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeOutcome {
    pub url: String,
    pub http_status: u16,
}

impl ProbeOutcome {
    /// Only a plain 200 counts as "exists".
    pub fn is_found(&self) -> bool {
        self.http_status == 200
    }
}

/// Lightweight existence check against a candidate URL.
#[async_trait]
pub trait ExistenceProbe: Send + Sync {
    async fn probe(&self, url: &str) -> ProbeOutcome;
}

/// HEAD-request probe over a shared `reqwest` client.
///
/// At most `max_concurrent` HEAD requests are in flight across all clones of
/// the probe, however many resolutions run at once.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
    permits: Arc<Semaphore>,
}

impl HttpProbe {
    /// # Errors
    ///
    /// Fails only if the TLS backend cannot be initialized.
    pub fn new(timeout: Duration, max_concurrent: usize) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, max_concurrent))
    }

    pub fn with_client(client: reqwest::Client, max_concurrent: usize) -> Self {
        Self {
            client,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }
}

#[async_trait]
impl ExistenceProbe for HttpProbe {
    async fn probe(&self, url: &str) -> ProbeOutcome {
        // never closed
        let _permit = self.permits.acquire().await.ok();

        let http_status = match self.client.head(url).send().await {
            Ok(response) => response.status().as_u16(),
            Err(e) => {
                debug!("HEAD {url} failed before a response: {e}");
                NETWORK_FAILURE
            }
        };

        debug!("HEAD {url} -> {http_status}");
        ProbeOutcome {
            url: url.to_string(),
            http_status,
        }
    }
}
