//! HTTP client for the Anthropic Messages API

use super::{ApiError, ApiResponse, MessagesApi, MessagesRequest};
use crate::cache::Credential;
use crate::config::Config;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;

/// Opt-in header for `1h` cache retention
pub const EXTENDED_TTL_BETA: &str = "extended-cache-ttl-2025-04-11";

const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// Forwards planned requests to `{base_url}/v1/messages`
pub struct UpstreamClient {
    client: Client,
    base_url: String,
    credential: Credential,
    anthropic_version: String,
}

impl UpstreamClient {
    pub fn new(
        base_url: impl Into<String>,
        credential: Credential,
        anthropic_version: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            credential,
            anthropic_version: anthropic_version.into(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, ApiError> {
        let api_key = config
            .require_api_key()
            .map_err(|e| ApiError::Auth(e.to_string()))?;
        Self::new(
            config.upstream.base_url.clone(),
            Credential::new(api_key),
            config.upstream.anthropic_version.clone(),
            Duration::from_secs(config.upstream.timeout_secs),
        )
    }

    pub fn url(&self) -> String {
        messages_url(&self.base_url)
    }
}

/// `base_url` with or without a trailing `/v1` both resolve to the messages endpoint
pub fn messages_url(base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');
    if base.ends_with("/v1") {
        format!("{}/messages", base)
    } else {
        format!("{}/v1/messages", base)
    }
}

/// Beta header value required by the request, if any
pub fn beta_header(request: &MessagesRequest) -> Option<&'static str> {
    request.uses_long_retention().then_some(EXTENDED_TTL_BETA)
}

/// Map a non-success status and body to an error
pub fn error_for_status(status: StatusCode, retry_after: Option<u64>, body: &str) -> ApiError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.to_string());

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ApiError::Auth(message),
        StatusCode::TOO_MANY_REQUESTS => ApiError::RateLimited {
            retry_after_secs: retry_after.unwrap_or(DEFAULT_RETRY_AFTER_SECS),
        },
        _ => ApiError::Provider(format!("{}: {}", status, message)),
    }
}

#[async_trait]
impl MessagesApi for UpstreamClient {
    async fn create_message(&self, request: &MessagesRequest) -> Result<ApiResponse, ApiError> {
        let mut builder = self
            .client
            .post(self.url())
            .header("Content-Type", "application/json")
            .header("x-api-key", self.credential.expose())
            .header("anthropic-version", &self.anthropic_version)
            .json(request);

        if let Some(beta) = beta_header(request) {
            builder = builder.header("anthropic-beta", beta);
        }

        tracing::debug!(
            "POST {} ({} breakpoint(s))",
            self.url(),
            request.breakpoint_count()
        );
        let response = builder.send().await?;
        let status = response.status();

        if status.is_success() {
            let json: Value = response.json().await?;
            Ok(ApiResponse::from_value(json)?)
        } else {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok());
            let error_text = response.text().await.unwrap_or_default();
            Err(error_for_status(status, retry_after, &error_text))
        }
    }
}
