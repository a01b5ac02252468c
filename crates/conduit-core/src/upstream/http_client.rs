use reqwest::{Client, ClientBuilder};
use std::{sync::Arc, time::Duration};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::{config::HttpConfig, upstream::ProviderError};

const MAX_ERROR_BODY_CHARS: usize = 256;

/// Shared HTTP client with semaphore-based concurrency control.
///
/// One instance is shared by every provider transport so `concurrent_limit`
/// bounds the total number of in-flight HTTP requests for the process.
pub struct HttpClient {
    client: Client,
    concurrent_limit: Arc<Semaphore>,
    permit_timeout: Duration,
}

/// Keeps the semaphore permit alive for the duration of one request, retries included.
struct PermitGuard {
    _permit: OwnedSemaphorePermit,
    semaphore: Arc<Semaphore>,
}

impl Drop for PermitGuard {
    fn drop(&mut self) {
        tracing::trace!(
            available_permits = self.semaphore.available_permits(),
            "permit guard dropped"
        );
    }
}

impl HttpClient {
    /// Creates a client from the `[http]` configuration section.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::ConnectionFailed`] if the underlying reqwest client fails to build.
    pub fn new(config: &HttpConfig) -> Result<Self, ProviderError> {
        let client = ClientBuilder::new()
            .pool_idle_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(32)
            .connect_timeout(Duration::from_secs(5))
            .use_rustls_tls()
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(concat!("conduit/", env!("CARGO_PKG_VERSION")))
            .tcp_nodelay(true)
            .build()
            .map_err(|e| {
                tracing::error!(error = %e, "failed to build http client");
                ProviderError::ConnectionFailed(format!("HTTP client build failed: {e}"))
            })?;

        Ok(Self {
            client,
            concurrent_limit: Arc::new(Semaphore::new(config.concurrent_limit)),
            permit_timeout: Duration::from_millis(config.permit_timeout_ms),
        })
    }

    fn sanitize_network_error(error: &reqwest::Error) -> String {
        if error.is_connect() {
            "connection refused or unreachable".to_string()
        } else if error.is_body() {
            "response body error".to_string()
        } else if error.is_decode() {
            "response decode error".to_string()
        } else if error.is_request() {
            "request failed".to_string()
        } else {
            "network error".to_string()
        }
    }

    fn truncate_body(raw: String) -> String {
        if raw.chars().count() > MAX_ERROR_BODY_CHARS {
            let head: String = raw.chars().take(MAX_ERROR_BODY_CHARS).collect();
            format!("{head}... (truncated)")
        } else {
            raw
        }
    }

    /// Sends a JSON POST, retrying 5xx and connection failures with exponential backoff.
    ///
    /// Attempt `n` (zero-based) that fails retryably sleeps `100ms * 2^n` before the next one.
    /// 4xx responses are never retried; 429 maps to [`ProviderError::RateLimited`].
    ///
    /// # Errors
    ///
    /// - [`ProviderError::Timeout`] if permit acquisition or the last attempt times out
    /// - [`ProviderError::HttpError`] for non-success HTTP status codes
    /// - [`ProviderError::RateLimited`] for HTTP 429
    /// - [`ProviderError::ConnectionFailed`] for network failures
    pub async fn send_request(
        &self,
        url: &str,
        body: bytes::Bytes,
        timeout: Duration,
        max_retries: u32,
    ) -> Result<bytes::Bytes, ProviderError> {
        let permit = tokio::time::timeout(
            self.permit_timeout,
            Arc::clone(&self.concurrent_limit).acquire_owned(),
        )
        .await
        .map_err(|_| {
            tracing::warn!(
                url = url,
                available_permits = self.concurrent_limit.available_permits(),
                "http client semaphore acquisition timeout"
            );
            ProviderError::Timeout
        })?
        .map_err(|_| ProviderError::ConnectionFailed("http client closed".to_string()))?;

        let _guard = PermitGuard { _permit: permit, semaphore: Arc::clone(&self.concurrent_limit) };

        let mut attempt = 0;
        loop {
            let result = self
                .client
                .post(url)
                .header("content-type", "application/json")
                .body(body.clone())
                .timeout(timeout)
                .send()
                .await;

            let retryable_error = match result {
                Ok(response) if response.status().is_success() => {
                    return response.bytes().await.map_err(|e| {
                        ProviderError::ConnectionFailed(Self::sanitize_network_error(&e))
                    });
                }
                Ok(response) => {
                    let status = response.status().as_u16();
                    let text = Self::truncate_body(response.text().await.unwrap_or_default());
                    if status == 429 {
                        return Err(ProviderError::RateLimited(text));
                    }
                    let error = ProviderError::HttpError(status, text);
                    if !(500..=599).contains(&status) {
                        return Err(error);
                    }
                    error
                }
                Err(e) if e.is_timeout() => ProviderError::Timeout,
                Err(e) => ProviderError::ConnectionFailed(Self::sanitize_network_error(&e)),
            };

            if attempt >= max_retries {
                return Err(retryable_error);
            }

            let backoff = Duration::from_millis(100 * (1 << attempt));
            tracing::debug!(
                url = url,
                attempt = attempt + 1,
                backoff_ms = backoff.as_millis() as u64,
                error = %retryable_error,
                "retrying http request"
            );
            tokio::time::sleep(backoff).await;
            attempt += 1;
        }
    }

    #[cfg(test)]
    #[must_use]
    pub fn available_permits(&self) -> usize {
        self.concurrent_limit.available_permits()
    }
}
