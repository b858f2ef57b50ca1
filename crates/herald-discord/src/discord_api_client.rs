use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::retry_helpers::{
    is_retryable_status, is_retryable_transport_error, parse_retry_after, retry_delay,
    truncate_for_error, RetryPolicy,
};

pub const DEFAULT_DISCORD_API_BASE: &str = "https://discord.com/api/v10";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscordApiConfig {
    pub api_base: String,
    pub application_id: String,
    pub bot_token: String,
    pub request_timeout_ms: u64,
    pub retry_max_attempts: usize,
    pub retry_base_delay_ms: u64,
}

impl DiscordApiConfig {
    pub fn new(application_id: impl Into<String>, bot_token: impl Into<String>) -> Self {
        Self {
            api_base: DEFAULT_DISCORD_API_BASE.to_string(),
            application_id: application_id.into(),
            bot_token: bot_token.into(),
            request_timeout_ms: 10_000,
            retry_max_attempts: 4,
            retry_base_delay_ms: 500,
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }
}

/// Thin REST client with retry on rate limits, server errors, and transport failures.
#[derive(Clone)]
pub struct DiscordApiClient {
    http: reqwest::Client,
    api_base: String,
    application_id: String,
    bot_token: String,
    retry_max_attempts: usize,
    retry_base_delay_ms: u64,
}

impl DiscordApiClient {
    pub fn new(config: DiscordApiConfig) -> Result<Self> {
        let application_id = config.application_id.trim().to_string();
        if application_id.is_empty() {
            bail!("discord application id cannot be empty");
        }
        let bot_token = config.bot_token.trim().to_string();
        if bot_token.is_empty() {
            bail!("discord bot token cannot be empty");
        }

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static("DiscordBot (herald, 0.1)"),
        );
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/json"),
        );
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(config.request_timeout_ms.max(1)))
            .build()
            .context("failed to create discord api client")?;

        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            application_id,
            bot_token,
            retry_max_attempts: config.retry_max_attempts.max(1),
            retry_base_delay_ms: config.retry_base_delay_ms.max(1),
        })
    }

    pub fn application_id(&self) -> &str {
        &self.application_id
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_base, path.trim_start_matches('/'))
    }

    /// Authenticated request carrying a pre-serialized JSON body.
    pub(crate) fn authed(&self, method: reqwest::Method, path: &str, body: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, self.url(path))
            .header(reqwest::header::AUTHORIZATION, format!("Bot {}", self.bot_token))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body.to_string())
    }

    /// Interaction callbacks and webhook edits are authorized by the interaction token in the path.
    pub(crate) fn token_scoped(
        &self,
        method: reqwest::Method,
        path: &str,
        body: &str,
    ) -> reqwest::RequestBuilder {
        self.http
            .request(method, self.url(path))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body.to_string())
    }

    /// Sends a request, retrying failures that `policy` allows, and returns the response body.
    pub(crate) async fn send_with_retry<F>(
        &self,
        operation: &str,
        policy: RetryPolicy,
        mut builder: F,
    ) -> Result<String>
    where
        F: FnMut() -> reqwest::RequestBuilder,
    {
        let mut attempt = 0_usize;
        loop {
            attempt = attempt.saturating_add(1);
            let response = builder()
                .header("x-herald-retry-attempt", attempt.saturating_sub(1).to_string())
                .send()
                .await;
            match response {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return response
                            .text()
                            .await
                            .with_context(|| format!("failed to read discord {operation} response"));
                    }

                    let retry_after = parse_retry_after(response.headers());
                    let body = response.text().await.unwrap_or_default();
                    if attempt < self.retry_max_attempts && is_retryable_status(status.as_u16(), policy) {
                        let delay = retry_delay(self.retry_base_delay_ms, attempt, retry_after);
                        tracing::debug!(
                            operation,
                            status = status.as_u16(),
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            "retrying discord request"
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }

                    bail!(
                        "discord api {operation} failed with status {}: {}",
                        status.as_u16(),
                        truncate_for_error(&body, 800)
                    );
                }
                Err(error) => {
                    if attempt < self.retry_max_attempts && is_retryable_transport_error(&error, policy) {
                        tokio::time::sleep(retry_delay(self.retry_base_delay_ms, attempt, None))
                            .await;
                        continue;
                    }
                    return Err(error)
                        .with_context(|| format!("discord api {operation} request failed"));
                }
            }
        }
    }
}
