//! # API Toolkit
//!
//! Exposes the endpoints of a remote HTTP API as callable tools and executes
//! each call reliably against it.
//!
//! ## Features
//!
//! - **Rate Limiting**: Per-minute, per-hour and per-day token buckets shared by every call to an API
//! - **Retries**: Deterministic exponential backoff on configurable status codes and network errors
//! - **Pagination**: Link header, cursor, offset/limit and page-number pagination with result merging
//! - **Authentication**: API keys, HTTP bearer, HTTP basic and OAuth2 bearer tokens
//! - **Tool System**: Every endpoint is a [`Tool`] with a JSON schema for its arguments
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use api_toolkit::prelude::*;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let token = std::env::var("API_TOKEN")?;
//!
//!     let config = ApiConfig::new("Example", "https://api.example.com")
//!         .with_auth(AuthConfig::bearer(token))
//!         .with_operation(OperationSpec::new(
//!             "GET /users/{user_id}",
//!             "Fetch a user",
//!             json!({
//!                 "operationId": "getUser",
//!                 "parameters": [{"name": "user_id", "in": "path", "required": true}]
//!             }),
//!         ));
//!
//!     let catalog = ToolCatalog::new(config)?;
//!     let user = catalog.execute("getUser", &json!({"user_id": 42})).await?;
//!     println!("{}", user);
//!
//!     Ok(())
//! }
//! ```
//!

pub mod auth;
pub mod catalog;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod executor;
pub mod http;
pub mod pagination;
pub mod ratelimit;
pub mod retry;
pub mod tool;

// Re-exports for convenient usage
pub use auth::{AuthBinder, AuthConfig, SecretString};
pub use catalog::{ApiTool, ToolCatalog};
pub use config::{
    ApiConfig, ConfigError, OperationSpec, PaginationConfig, PaginationMechanism, RateLimitConfig,
    RetryConfig, SecuritySchemeSpec,
};
pub use endpoint::{EndpointDescriptor, EndpointError, ParameterDescriptor, ParameterLocation};
pub use error::ToolkitError;
pub use executor::{ApiCallExecutor, CallError};
pub use http::{
    HttpMethod, HttpRequest, HttpResponse, HttpTransport, ReqwestTransport, TransportError,
};
pub use pagination::{PaginationError, PaginationStrategy};
pub use ratelimit::RateLimiter;
pub use retry::RetryPolicy;
pub use tool::{DynTool, Tool, ToolDefinition, ToolError, ToolRegistry, ToolResult};

/// Prelude module with commonly used types.
pub mod prelude {
    pub use crate::auth::AuthConfig;
    pub use crate::catalog::ToolCatalog;
    pub use crate::config::{
        ApiConfig, OperationSpec, PaginationConfig, RateLimitConfig, RetryConfig,
    };
    pub use crate::error::ToolkitError;
    pub use crate::tool::{Tool, ToolDefinition, ToolResult};
}
