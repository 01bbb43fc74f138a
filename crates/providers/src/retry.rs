//! Opt-in retry wrapper with exponential backoff.
//!
//! Nothing retries unless a `RetryProvider` is constructed explicitly.
//! Only transient failures (rate limits, timeouts, network, 5xx) are retried.

use async_trait::async_trait;
use resguard_core::error::ProviderError;
use resguard_core::provider::*;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub struct RetryProvider {
    name: String,
    inner: Arc<dyn Provider>,
    max_retries: u32,
    base_delay: Duration,
}

impl RetryProvider {
    pub fn new(inner: Arc<dyn Provider>, max_retries: u32) -> Self {
        Self {
            name: format!("{}+retry", inner.name()),
            inner,
            max_retries,
            base_delay: Duration::from_millis(500),
        }
    }

    /// Override the first backoff delay. Later attempts double it.
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }
}

#[async_trait]
impl Provider for RetryProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let mut attempt = 0;
        loop {
            match self.inner.complete(request.clone()).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        provider = %self.inner.name(),
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retry: transient failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    if attempt > 0 {
                        info!(provider = %self.inner.name(), attempts = attempt + 1, "Retry: giving up");
                    }
                    return Err(e);
                }
            }
        }
    }

    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        self.inner.health_check().await
    }
}
