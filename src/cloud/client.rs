//! DigitalOcean REST API client.
//!
//! This module provides the HTTP transport shared by every REST-backed
//! resource kind: authentication, status mapping and retries.

use reqwest::{Client, Method, RequestBuilder, StatusCode, header};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, trace};

use crate::error::{CloudError, CloudResult};
use crate::resource::{ErrorClass, classify};

use super::types::ApiErrorBody;

/// DigitalOcean API base URL.
pub const DEFAULT_API_URL: &str = "https://api.digitalocean.com";

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Maximum number of attempts for idempotent requests.
const MAX_RETRIES: u32 = 3;

/// Delay between retries in milliseconds.
const RETRY_DELAY_MS: u64 = 1000;

/// DigitalOcean API client.
#[derive(Debug, Clone)]
pub struct DigitalOceanClient {
    /// HTTP client.
    client: Client,
    /// API token.
    token: String,
    /// Base URL without trailing slash.
    base_url: String,
    /// Delay unit between retries.
    retry_delay: Duration,
}

impl DigitalOceanClient {
    /// Creates a client against a custom endpoint with a custom timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn with_base_url(token: &str, base_url: &str, timeout_secs: u64) -> CloudResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(concat!("reefline/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CloudError::network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            token: token.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            retry_delay: Duration::from_millis(RETRY_DELAY_MS),
        })
    }

    /// Overrides the delay unit between retries.
    #[must_use]
    pub const fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{path}", self.base_url))
            .header(header::AUTHORIZATION, format!("Bearer {}", self.token))
            .header(header::ACCEPT, "application/json")
    }

    /// Sends a GET and decodes the JSON body.
    pub(crate) async fn get_json<T: DeserializeOwned>(&self, path: &str) -> CloudResult<T> {
        let response = self.send_idempotent(Method::GET, path).await?;
        response
            .json()
            .await
            .map_err(|e| CloudError::InvalidResponse {
                message: format!("Failed to parse response: {e}"),
            })
    }

    /// Sends a GET and returns the raw body.
    pub(crate) async fn get_text(&self, path: &str) -> CloudResult<String> {
        let response = self.send_idempotent(Method::GET, path).await?;
        response
            .text()
            .await
            .map_err(|e| CloudError::InvalidResponse {
                message: format!("Failed to read response: {e}"),
            })
    }

    /// Sends a DELETE.
    pub(crate) async fn delete_path(&self, path: &str) -> CloudResult<()> {
        self.send_idempotent(Method::DELETE, path).await?;
        Ok(())
    }

    /// Sends a POST with a JSON body and decodes the JSON response.
    ///
    /// Never retried: a lost response may still have created the object.
    pub(crate) async fn post_json<B, T>(&self, path: &str, body: &B) -> CloudResult<T>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        trace!("POST {path}");
        let response = Self::check(
            self.request(Method::POST, path)
                .json(body)
                .send()
                .await
                .map_err(|e| CloudError::network(format!("Request failed: {e}")))?,
        )
        .await?;

        response
            .json()
            .await
            .map_err(|e| CloudError::InvalidResponse {
                message: format!("Failed to parse response: {e}"),
            })
    }

    async fn send_idempotent(&self, method: Method, path: &str) -> CloudResult<reqwest::Response> {
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                debug!("Retry attempt {attempt} of {MAX_RETRIES} for {method} {path}");
                tokio::time::sleep(self.retry_delay * attempt).await;
            }

            trace!("{method} {path}");
            let result = match self.request(method.clone(), path).send().await {
                Ok(response) => Self::check(response).await,
                Err(e) => Err(CloudError::network(format!("Request failed: {e}"))),
            };

            match result {
                Ok(response) => return Ok(response),
                Err(e) if classify(&e) == ErrorClass::Transient && !is_rate_limit(&e) => {
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| CloudError::network("Max retries exceeded")))
    }

    async fn check(response: reqwest::Response) -> CloudResult<reqwest::Response> {
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok())
                .unwrap_or_default();
            let retry_after = if retry_after == 0 { 60 } else { retry_after };

            return Err(CloudError::RateLimited {
                retry_after_secs: retry_after,
            });
        }

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(CloudError::AuthenticationFailed {
                message: String::from("Invalid API token"),
            });
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorBody>(&body)
                .ok()
                .map(|b| b.message)
                .filter(|m| !m.is_empty())
                .unwrap_or(body);
            return Err(CloudError::api(status.as_u16(), message));
        }

        Ok(response)
    }
}

const fn is_rate_limit(error: &CloudError) -> bool {
    matches!(error, CloudError::RateLimited { .. })
}
