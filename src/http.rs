//! JSON-over-HTTP client shared by the remote embedding and chat providers.
//!
//! Retry strategy (only when `max_retries > 0`):
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)
//!
//! With the default `max_retries = 0` every failure surfaces to the caller
//! on the first attempt.

use std::time::Duration;

use crate::error::{Error, Result};

#[derive(Clone)]
pub struct JsonClient {
    client: reqwest::Client,
    max_retries: u32,
    /// Provider name used in error messages, e.g. `"OpenAI"`.
    label: &'static str,
}

impl JsonClient {
    pub fn new(label: &'static str, timeout_secs: u64, max_retries: u32) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| Error::provider(format!("{} client setup failed: {}", label, e)))?;
        Ok(Self {
            client,
            max_retries,
            label,
        })
    }

    /// POST `body` to `url` and decode the JSON response.
    pub async fn post_json(
        &self,
        url: &str,
        bearer: Option<&str>,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value> {
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tracing::warn!(
                    provider = self.label,
                    attempt,
                    delay_secs = delay.as_secs(),
                    "retrying request"
                );
                tokio::time::sleep(delay).await;
            }

            let mut request = self
                .client
                .post(url)
                .header("Content-Type", "application/json")
                .json(body);
            if let Some(key) = bearer {
                request = request.header("Authorization", format!("Bearer {}", key));
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return response.json().await.map_err(|e| {
                            Error::provider(format!("{} returned invalid JSON: {}", self.label, e))
                        });
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    let err = Error::provider(format!(
                        "{} API error {}: {}",
                        self.label, status, body_text
                    ));
                    if status.as_u16() == 429 || status.is_server_error() {
                        last_err = Some(err);
                        continue;
                    }
                    return Err(err);
                }
                Err(e) => {
                    last_err = Some(Error::provider(format!(
                        "{} connection error ({}): {}",
                        self.label, url, e
                    )));
                    continue;
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| Error::provider(format!("{} request failed", self.label))))
    }
}

/// Read an API key from the named environment variable.
pub fn api_key_from_env(var: &str) -> Result<String> {
    match std::env::var(var) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(Error::Config(format!(
            "{} environment variable not set",
            var
        ))),
    }
}

/// Join a base URL and a path without doubling the slash.
pub fn endpoint(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
