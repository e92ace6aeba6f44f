//! HTTP fetching with a timeout and bounded retries.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, StatusCode};

use crate::error::{AcquisitionError, AcquisitionResult};

/// Retry and timeout settings for [`HttpFetcher`].
#[derive(Debug, Clone)]
pub struct HttpFetcherConfig {
    /// Per-request timeout
    pub timeout: Duration,

    /// Total attempts, including the first one
    pub max_attempts: u32,

    /// Delay before the second attempt; later attempts wait proportionally longer
    pub backoff: Duration,

    pub user_agent: String,
}

impl Default for HttpFetcherConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            max_attempts: 3,
            backoff: Duration::from_secs(2),
            user_agent: concat!("catalog-sync/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl HttpFetcherConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }
}

/// Fetches upstream documents as text.
///
/// Transport failures and 5xx responses are retried. A 4xx response fails
/// immediately since repeating the same request will not change it.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    config: HttpFetcherConfig,
}

impl HttpFetcher {
    pub fn new(config: HttpFetcherConfig) -> AcquisitionResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| AcquisitionError::Source(Box::new(e)))?;

        Ok(Self { client, config })
    }

    /// GET `url` and return the body.
    pub async fn get(&self, url: &str) -> AcquisitionResult<String> {
        self.send_with_retries(url, || self.client.get(url)).await
    }

    /// POST `params` form-encoded to `url` and return the body.
    pub async fn post_form(
        &self,
        url: &str,
        params: &[(&str, &str)],
    ) -> AcquisitionResult<String> {
        self.send_with_retries(url, || self.client.post(url).form(params))
            .await
    }

    async fn send_with_retries<F>(&self, url: &str, build: F) -> AcquisitionResult<String>
    where
        F: Fn() -> RequestBuilder,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;

            let err = match self.send_once(url, build()).await {
                Ok(body) => return Ok(body),
                Err(err) if !is_transient(&err) => return Err(err),
                Err(err) => err,
            };

            if attempt >= max_attempts {
                return Err(AcquisitionError::RetriesExhausted {
                    url: url.to_string(),
                    attempts: attempt,
                    last_error: err.to_string(),
                });
            }

            let delay = self.config.backoff * attempt;
            tracing::warn!(
                url = %url,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Request failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn send_once(&self, url: &str, request: RequestBuilder) -> AcquisitionResult<String> {
        let response = request.send().await.map_err(|source| AcquisitionError::Request {
            url: url.to_string(),
            source,
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AcquisitionError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|source| AcquisitionError::Request {
                url: url.to_string(),
                source,
            })?;

        tracing::debug!(url = %url, bytes = body.len(), "Fetched document");
        Ok(body)
    }
}

fn is_transient(err: &AcquisitionError) -> bool {
    match err {
        AcquisitionError::Request { .. } => true,
        AcquisitionError::Status { status, .. } => StatusCode::from_u16(*status)
            .map(|s| s.is_server_error() || s == StatusCode::TOO_MANY_REQUESTS)
            .unwrap_or(false),
        _ => false,
    }
}
