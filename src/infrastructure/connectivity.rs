//! Connectivity probes used by the resilience layer

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::application::errors::SyncError;

/// Best-effort reachability check, interpreted only as online/offline
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    async fn is_reachable(&self) -> bool;
}

/// Probe issuing a `HEAD` request against a stable endpoint.
///
/// Any HTTP response counts as reachable; only transport failures and
/// timeouts count as offline.
pub struct HttpConnectivityProbe {
    client: Client,
    url: String,
}

impl HttpConnectivityProbe {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, SyncError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl ConnectivityProbe for HttpConnectivityProbe {
    async fn is_reachable(&self) -> bool {
        match self.client.head(&self.url).send().await {
            Ok(_) => true,
            Err(e) => {
                debug!(url = %self.url, error = %e, "Connectivity probe failed");
                false
            }
        }
    }
}

/// Probe that always reports the network as reachable
pub struct AssumeOnline;

#[async_trait]
impl ConnectivityProbe for AssumeOnline {
    async fn is_reachable(&self) -> bool {
        true
    }
}
