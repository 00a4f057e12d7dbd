//! Maps tool names to endpoints of one API and runs them through a shared executor.

use async_trait::async_trait;
use futures::future::join_all;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::auth::{validate_security, AuthBinder};
use crate::config::ApiConfig;
use crate::endpoint::{EndpointDescriptor, EndpointError};
use crate::error::ToolkitError;
use crate::executor::{ApiCallExecutor, CallError};
use crate::http::{HttpTransport, ReqwestTransport};
use crate::pagination::PaginationStrategy;
use crate::ratelimit::RateLimiter;
use crate::retry::RetryPolicy;
use crate::tool::{DynTool, Tool, ToolDefinition, ToolError, ToolRegistry, ToolResult};

/// One endpoint exposed as a [`Tool`].
#[derive(Debug, Clone)]
pub struct ApiTool {
    endpoint: Arc<EndpointDescriptor>,
    executor: Arc<ApiCallExecutor>,
}

impl ApiTool {
    pub fn new(endpoint: Arc<EndpointDescriptor>, executor: Arc<ApiCallExecutor>) -> Self {
        Self { endpoint, executor }
    }

    pub fn endpoint(&self) -> &EndpointDescriptor {
        &self.endpoint
    }

    pub async fn call(&self, args: &Value, cancel: &CancellationToken) -> Result<Value, CallError> {
        self.executor.execute_with_cancel(&self.endpoint, args, cancel).await
    }
}

#[async_trait]
impl Tool for ApiTool {
    fn name(&self) -> &str {
        &self.endpoint.operation_id
    }

    fn description(&self) -> &str {
        &self.endpoint.description
    }

    fn parameters_schema(&self) -> Value {
        self.endpoint.parameter_schema()
    }

    /// Only malformed arguments are an `Err`; call failures are reported in
    /// the result.
    async fn execute(&self, args: Value) -> Result<ToolResult, ToolError> {
        ToolError::check_arguments(self.name(), &args)?;
        match self.call(&args, &CancellationToken::new()).await {
            Ok(output) => Ok(ToolResult::ok(output)),
            Err(error) => Ok(ToolResult::error(error.to_string())),
        }
    }
}

/// The tools of one API, sharing one rate limiter and credential binding.
#[derive(Debug)]
pub struct ToolCatalog {
    name: String,
    executor: Arc<ApiCallExecutor>,
    endpoints: HashMap<String, Arc<EndpointDescriptor>>,
    registry: ToolRegistry,
}

impl ToolCatalog {
    /// Builds a catalog that talks to the API over HTTP.
    pub fn new(config: ApiConfig) -> Result<Self, ToolkitError> {
        let transport = ReqwestTransport::new(config.request_timeout())?;
        Self::with_transport(config, Arc::new(transport))
    }

    /// Builds a catalog over a custom transport.
    ///
    /// Fails when any config section is invalid or when the authentication
    /// does not satisfy the API's declared security requirement.
    pub fn with_transport(
        config: ApiConfig,
        transport: Arc<dyn HttpTransport>,
    ) -> Result<Self, ToolkitError> {
        config.validate()?;
        validate_security(
            config.authentication.as_ref(),
            &config.security_schemes,
            &config.security,
        )?;
        let auth = match &config.authentication {
            Some(auth) => AuthBinder::new(auth)?,
            None => AuthBinder::none(),
        };

        let executor = Arc::new(ApiCallExecutor::new(
            config.normalized_base_url(),
            transport,
            auth,
            Arc::new(RateLimiter::new(&config.rate_limits)),
            RetryPolicy::new(config.retry.clone()),
            PaginationStrategy::new(config.pagination.clone()),
        ));

        let mut endpoints = HashMap::new();
        let mut registry = ToolRegistry::new();
        for operation in &config.operations {
            let endpoint = match EndpointDescriptor::from_operation(
                &operation.name,
                &operation.description,
                &operation.spec,
            ) {
                Ok(endpoint) => Arc::new(endpoint),
                Err(EndpointError::UnsupportedMethod(method)) => {
                    debug!(
                        operation = %operation.name,
                        method = %method,
                        "Skipping unsupported method"
                    );
                    continue;
                }
                Err(error) => return Err(error.into()),
            };
            if endpoints.contains_key(&endpoint.operation_id) {
                warn!(tool = %endpoint.operation_id, "Duplicate operation id, keeping the first");
                continue;
            }

            let tool: DynTool =
                Arc::new(ApiTool::new(Arc::clone(&endpoint), Arc::clone(&executor)));
            registry.register(tool);
            endpoints.insert(endpoint.operation_id.clone(), endpoint);
        }

        if registry.is_empty() {
            warn!(api = %config.name, "API exposes no callable operations");
        }
        info!(api = %config.name, tools = registry.len(), "Registered API");
        Ok(Self {
            name: config.name,
            executor,
            endpoints,
            registry,
        })
    }

    /// The API's display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn endpoint(&self, tool_name: &str) -> Option<&EndpointDescriptor> {
        self.endpoints.get(tool_name).map(Arc::as_ref)
    }

    /// Calls a tool by name.
    pub async fn execute(&self, tool_name: &str, args: &Value) -> Result<Value, ToolkitError> {
        self.execute_with_cancel(tool_name, args, &CancellationToken::new()).await
    }

    pub async fn execute_with_cancel(
        &self,
        tool_name: &str,
        args: &Value,
        cancel: &CancellationToken,
    ) -> Result<Value, ToolkitError> {
        let endpoint = self
            .endpoints
            .get(tool_name)
            .ok_or_else(|| ToolError::NotFound(tool_name.to_string()))?;
        ToolError::check_arguments(tool_name, args)?;
        Ok(self.executor.execute_with_cancel(endpoint, args, cancel).await?)
    }

    /// Runs several calls concurrently. Each result is either the decoded
    /// response or its error payload, in input order.
    pub async fn execute_all(&self, calls: Vec<(String, Value)>) -> Vec<Value> {
        let futures = calls.iter().map(|(tool_name, args)| async move {
            match self.execute(tool_name, args).await {
                Ok(output) => output,
                Err(error) => error.error_payload(),
            }
        });
        join_all(futures).await
    }

    /// Name, description and argument schema of a tool.
    pub fn describe(&self, tool_name: &str) -> Result<ToolDefinition, ToolError> {
        self.registry
            .get(tool_name)
            .map(|tool| tool.to_definition())
            .ok_or_else(|| ToolError::NotFound(tool_name.to_string()))
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.registry.to_tool_definitions()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.registry.names()
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// The limiter shared by every tool of this API.
    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        self.executor.rate_limiter()
    }
}
