use std::time::Duration;

use anyhow::Context;
use reqwest::redirect::Policy;

use crate::shutdown::Shutdown;

/// Result of waiting for the pot provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    ShutdownRequested,
}

/// Liveness check against the bgutil pot provider server.
///
/// Runs once at startup so the first downloader run doesn't race the provider
/// coming up. After that the provider is trusted to stay healthy.
pub struct PotProviderClient {
    client: reqwest::Client,
    ping_url: String,
    retry_interval: Duration,
}

impl PotProviderClient {
    pub fn new(ping_url: String, timeout: Duration, retry_interval: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(Policy::limited(10))
            .build()
            .context("failed to initialize HTTP client")?;
        Ok(Self {
            client,
            ping_url,
            retry_interval,
        })
    }

    /// One HEAD request; any non-error HTTP status counts as alive.
    pub async fn ping(&self) -> anyhow::Result<()> {
        self.client
            .head(&self.ping_url)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// Block until a ping succeeds. Retries forever unless shutdown is requested.
    pub async fn wait_until_ready(&self, shutdown: &Shutdown) -> Readiness {
        loop {
            if shutdown.is_requested() {
                return Readiness::ShutdownRequested;
            }
            let outcome = tokio::select! {
                res = self.ping() => res,
                _ = shutdown.requested() => return Readiness::ShutdownRequested,
            };
            match outcome {
                Ok(()) => {
                    tracing::info!(url = %self.ping_url, "Pot provider server is up");
                    return Readiness::Ready;
                }
                Err(e) => {
                    tracing::info!(error = %e, "Waiting for pot provider server");
                    if !crate::native::time::sleep_or_shutdown(self.retry_interval, shutdown).await {
                        return Readiness::ShutdownRequested;
                    }
                }
            }
        }
    }
}
