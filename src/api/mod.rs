//! Messages API types and the upstream forwarding seam

mod client;
mod request;
mod response;

pub use client::{beta_header, error_for_status, messages_url, UpstreamClient, EXTENDED_TTL_BETA};
pub use request::{ContentBlock, Message, MessageContent, MessagesRequest, Role, SystemPrompt};
pub use response::{ApiResponse, CacheCreation, ResponseBlock, StopReason, TokenUsage};

use crate::cache::{CachePlanner, PlanError, PlanMetadata};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Rate limited: retry after {retry_after_secs} seconds")]
    RateLimited { retry_after_secs: u64 },

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Plan(#[from] PlanError),
}

/// Anything that can answer a Messages API request
#[async_trait]
pub trait MessagesApi: Send + Sync {
    async fn create_message(&self, request: &MessagesRequest) -> Result<ApiResponse, ApiError>;
}

/// Plan breakpoints for `request`, then forward it.
///
/// Planning failures are returned before anything is sent.
pub async fn plan_and_send<A>(
    planner: &CachePlanner,
    api: &A,
    mut request: MessagesRequest,
) -> Result<(ApiResponse, PlanMetadata), ApiError>
where
    A: MessagesApi + ?Sized,
{
    let metadata = planner.plan(&mut request)?;
    let response = api.create_message(&request).await?;

    let usage = &response.usage;
    tracing::info!(
        "upstream usage: {} input, {} cache write, {} cache read, {} output",
        usage.input_tokens,
        usage.cache_creation_input_tokens.unwrap_or(0),
        usage.cache_read_input_tokens.unwrap_or(0),
        usage.output_tokens
    );

    Ok((response, metadata))
}
