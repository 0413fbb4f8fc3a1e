//! autocache - Automatic prompt-cache breakpoints for Anthropic Messages API requests
//!
//! Inspects an outgoing request, estimates the size and stability of each
//! system and message segment, and places up to four `cache_control`
//! breakpoints with a retention tier (`5m` or `1h`) on the segments most
//! worth caching.
//!
//! ## Key Features
//!
//! - **Classification**: Token estimates plus stability signals decide which segments qualify
//! - **Strategies**: Conservative, moderate and aggressive selection profiles
//! - **TTL Normalization**: Earlier breakpoints never expire before later ones
//! - **Plan Metadata**: Breakpoints, token totals, response headers and ROI estimates
//! - **Forwarding**: Optional upstream client that sends the annotated request

pub mod api;
pub mod cache;
pub mod config;
pub mod logging;

pub use api::{plan_and_send, ApiError, ApiResponse, MessagesApi, MessagesRequest, UpstreamClient};
pub use cache::{
    Breakpoint, CachePlanner, Credential, PlanError, PlanMetadata, Position, RetentionTier,
    Strategy,
};
pub use config::{Config, ConfigBuilder, ConfigError};
pub use logging::{NullLogger, PlanLogger, TracingLogger};
