//! Error types for the api-toolkit library.

use serde_json::{json, Value};
use thiserror::Error;

/// Unified error type for the toolkit.
#[derive(Debug, Error)]
pub enum ToolkitError {
    /// Invalid or incomplete configuration
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// A call that failed after reaching the executor
    #[error("Call error: {0}")]
    Call(#[from] crate::executor::CallError),

    /// Tool-related error
    #[error("Tool error: {0}")]
    Tool(#[from] crate::tool::ToolError),

    /// HTTP client setup error
    #[error("Transport error: {0}")]
    Transport(#[from] crate::http::TransportError),

    /// Operation that cannot be turned into an endpoint
    #[error("Endpoint error: {0}")]
    Endpoint(#[from] crate::endpoint::EndpointError),
}

impl ToolkitError {
    /// The `{"status": "error", "message": ...}` value returned to callers.
    pub fn error_payload(&self) -> Value {
        json!({"status": "error", "message": self.to_string()})
    }
}
