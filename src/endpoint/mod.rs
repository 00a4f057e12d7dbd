//! Static descriptions of callable HTTP operations.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashSet;
use tracing::debug;

use crate::http::HttpMethod;

/// Where an argument is placed in the outgoing request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterLocation {
    Path,
    Query,
    Header,
    Body,
}

impl ParameterLocation {
    pub fn parse(location: &str) -> Option<Self> {
        match location.to_ascii_lowercase().as_str() {
            "path" => Some(Self::Path),
            "query" => Some(Self::Query),
            "header" => Some(Self::Header),
            "body" => Some(Self::Body),
            _ => None,
        }
    }
}

/// A declared parameter of an endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDescriptor {
    pub name: String,
    pub location: ParameterLocation,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub description: String,
    /// JSON-schema fragment (type, enum, ...)
    #[serde(default)]
    pub schema: Value,
}

impl ParameterDescriptor {
    pub fn new(name: impl Into<String>, location: ParameterLocation) -> Self {
        Self {
            name: name.into(),
            location,
            required: false,
            description: String::new(),
            schema: json!({"type": "string"}),
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_schema(mut self, schema: Value) -> Self {
        self.schema = schema;
        self
    }

    fn property_schema(&self) -> Value {
        if self.location == ParameterLocation::Body {
            let mut schema = match &self.schema {
                Value::Object(map) => map.clone(),
                _ => Map::new(),
            };
            if !self.description.is_empty() {
                schema
                    .entry("description")
                    .or_insert_with(|| Value::String(self.description.clone()));
            }
            return Value::Object(schema);
        }

        let mut property = Map::new();
        property.insert(
            "type".to_string(),
            self.schema.get("type").cloned().unwrap_or_else(|| json!("string")),
        );
        property.insert("description".to_string(), Value::String(self.description.clone()));
        if let Some(values) = self.schema.get("enum") {
            property.insert("enum".to_string(), values.clone());
        }
        Value::Object(property)
    }
}

/// Errors building an endpoint from an operation fragment.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EndpointError {
    #[error("Unsupported HTTP method: {0}")]
    UnsupportedMethod(String),
    #[error("Malformed operation name: {0:?}")]
    MalformedName(String),
    #[error("Invalid parameter in {operation}: {reason}")]
    InvalidParameter { operation: String, reason: String },
}

/// One callable HTTP operation. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointDescriptor {
    /// Unique tool name
    pub operation_id: String,
    pub method: HttpMethod,
    /// Path template with `{name}` placeholders
    pub path: String,
    pub description: String,
    pub parameters: Vec<ParameterDescriptor>,
    /// Raw `requestBody` object, if any
    pub request_body: Option<Value>,
}

impl EndpointDescriptor {
    pub fn new(
        operation_id: impl Into<String>,
        method: HttpMethod,
        path: impl Into<String>,
    ) -> Self {
        Self {
            operation_id: operation_id.into(),
            method,
            path: path.into(),
            description: String::new(),
            parameters: Vec::new(),
            request_body: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Adds a parameter unless one with the same name already exists.
    pub fn with_parameter(mut self, parameter: ParameterDescriptor) -> Self {
        if self.parameter(&parameter.name).is_none() {
            self.parameters.push(parameter);
        }
        self
    }

    /// Builds an endpoint from an `("GET /path", description, operation)` tuple.
    pub fn from_operation(
        name: &str,
        description: &str,
        operation: &Value,
    ) -> Result<Self, EndpointError> {
        let (method, path) = name
            .trim()
            .split_once(' ')
            .ok_or_else(|| EndpointError::MalformedName(name.to_string()))?;
        let path = path.trim();
        let method = HttpMethod::parse(method)
            .ok_or_else(|| EndpointError::UnsupportedMethod(method.to_string()))?;

        let operation_id = operation
            .get("operationId")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| {
                format!(
                    "{}_{}",
                    method.as_str().to_ascii_lowercase(),
                    path.replace('/', "_").replace(['{', '}'], "")
                )
            });

        let description = if description.is_empty() {
            operation.get("summary").and_then(Value::as_str).unwrap_or_default()
        } else {
            description
        };

        let mut endpoint = Self::new(operation_id, method, path).with_description(description);
        let mut seen = HashSet::new();

        for raw in operation
            .get("parameters")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
        {
            let param_name = raw.get("name").and_then(Value::as_str).ok_or_else(|| {
                EndpointError::InvalidParameter {
                    operation: endpoint.operation_id.clone(),
                    reason: "parameter without a name".to_string(),
                }
            })?;
            let raw_location = raw.get("in").and_then(Value::as_str).unwrap_or_default();
            let Some(location) = ParameterLocation::parse(raw_location) else {
                debug!(
                    operation = %endpoint.operation_id,
                    parameter = param_name,
                    location = raw_location,
                    "Skipping parameter with unsupported location"
                );
                continue;
            };
            if !seen.insert(param_name.to_string()) {
                debug!(
                    operation = %endpoint.operation_id,
                    parameter = param_name,
                    "Skipping duplicate parameter name"
                );
                continue;
            }

            endpoint.parameters.push(ParameterDescriptor {
                name: param_name.to_string(),
                location,
                required: raw.get("required").and_then(Value::as_bool).unwrap_or(false),
                description: raw
                    .get("description")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                schema: raw.get("schema").cloned().unwrap_or_else(|| json!({})),
            });
        }

        if let Some(body) = operation.get("requestBody") {
            for parameter in body_parameters(body) {
                if seen.insert(parameter.name.clone()) {
                    endpoint.parameters.push(parameter);
                }
            }
            endpoint.request_body = Some(body.clone());
        }

        Ok(endpoint)
    }

    pub fn parameter(&self, name: &str) -> Option<&ParameterDescriptor> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// JSON schema of the tool's arguments.
    pub fn parameter_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for parameter in &self.parameters {
            properties.insert(parameter.name.clone(), parameter.property_schema());
            if parameter.required {
                required.push(Value::String(parameter.name.clone()));
            }
        }
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

/// Top-level properties of a JSON request body, as body parameters.
fn body_parameters(request_body: &Value) -> Vec<ParameterDescriptor> {
    let Some(content) = request_body.get("content").and_then(Value::as_object) else {
        return Vec::new();
    };
    let Some(schema) = content
        .iter()
        .find(|(content_type, _)| content_type.contains("application/json"))
        .and_then(|(_, media)| media.get("schema"))
    else {
        return Vec::new();
    };

    let required: HashSet<&str> = schema
        .get("required")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .collect();

    schema
        .get("properties")
        .and_then(Value::as_object)
        .into_iter()
        .flatten()
        .map(|(name, property)| ParameterDescriptor {
            name: name.clone(),
            location: ParameterLocation::Body,
            required: required.contains(name.as_str()),
            description: property
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            schema: property.clone(),
        })
        .collect()
}
