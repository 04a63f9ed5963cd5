use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use tokio::time::sleep;
use tracing::debug;

use super::LlmSettings;

const INITIAL_BACKOFF: Duration = Duration::from_millis(200);
const MAX_BACKOFF: Duration = Duration::from_secs(5);

/// HTTP plumbing shared by the standalone provider clients.
#[derive(Debug, Clone)]
pub(crate) struct ProviderHttp {
    client: Client,
    provider: &'static str,
    max_retries: u32,
}

impl ProviderHttp {
    pub(crate) fn new(provider: &'static str, settings: &LlmSettings) -> Result<Self> {
        if settings.api_key.trim().is_empty() {
            bail!("{provider} API key must be provided via SPOTFINDER_LLM_API_KEY");
        }
        let client = Client::builder()
            .user_agent("spotfinder/0.6")
            .timeout(settings.timeout())
            .build()
            .with_context(|| format!("failed to build {provider} HTTP client"))?;
        Ok(Self {
            client,
            provider,
            max_retries: settings.max_retries,
        })
    }

    /// Send the request built by `build` and decode a JSON body.
    ///
    /// Transport errors and non-2xx statuses are retried up to `max_retries`
    /// times with doubling backoff capped at five seconds.
    pub(crate) async fn send_json<R, F>(&self, build: F) -> Result<R>
    where
        R: DeserializeOwned,
        F: Fn(&Client) -> RequestBuilder,
    {
        let mut attempt = 0u32;
        let mut backoff = INITIAL_BACKOFF;
        loop {
            let exhausted = attempt >= self.max_retries;
            match build(&self.client).send().await {
                Ok(response) if response.status().is_success() => {
                    return response
                        .json::<R>()
                        .await
                        .with_context(|| format!("failed to parse {} response", self.provider));
                }
                Ok(response) if exhausted => {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    bail!(
                        "{} API error ({}): {}",
                        self.provider,
                        status,
                        super::truncate(&body, 300)
                    );
                }
                Err(err) if exhausted => {
                    return Err(err).with_context(|| format!("failed to call {} API", self.provider));
                }
                Ok(response) => {
                    debug!(provider = self.provider, attempt, status = %response.status(), "retrying");
                }
                Err(err) => {
                    debug!(provider = self.provider, attempt, error = %err, "retrying");
                }
            }
            sleep(backoff).await;
            backoff = (backoff * 2).min(MAX_BACKOFF);
            attempt += 1;
        }
    }
}
