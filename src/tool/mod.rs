//! The tool surface: each configured API operation is exposed as a [`Tool`]
//! that takes a JSON argument object and yields a JSON result.

pub mod registry;

pub use registry::ToolRegistry;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

/// Name, description and input schema of one tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema of the argument object.
    pub input_schema: Value,
}

/// Outcome of a tool call. Failures carry the error payload in `output`.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    pub output: Value,
    pub error: Option<String>,
}

impl ToolResult {
    pub fn ok(output: Value) -> Self {
        Self { output, error: None }
    }

    /// A failed result whose output is `{"status": "error", "message": ...}`.
    pub fn error(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            output: json!({"status": "error", "message": message}),
            error: Some(message),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Invalid arguments for {tool}: {reason}")]
    InvalidArguments { tool: String, reason: String },
    #[error("Tool not found: {0}")]
    NotFound(String),
}

impl ToolError {
    /// Rejects arguments that are neither a JSON object nor null.
    pub fn check_arguments(tool: &str, args: &Value) -> Result<(), ToolError> {
        match args {
            Value::Object(_) | Value::Null => Ok(()),
            other => Err(ToolError::InvalidArguments {
                tool: tool.to_string(),
                reason: format!("expected a JSON object, got {}", json_kind(other)),
            }),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// A named, schema-described operation callable with JSON arguments.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn parameters_schema(&self) -> Value;

    async fn execute(&self, args: Value) -> Result<ToolResult, ToolError>;

    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.parameters_schema(),
        }
    }
}

pub type DynTool = Arc<dyn Tool>;
