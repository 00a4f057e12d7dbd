#![allow(dead_code)]

use api_toolkit::{
    ApiConfig, HttpRequest, HttpResponse, HttpTransport, OperationSpec, RateLimitConfig,
    RetryConfig, TransportError,
};
use async_trait::async_trait;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Replays queued responses in order and records every request it sees.
/// Once the queue is empty every request gets `404 script exhausted`.
#[derive(Default)]
pub struct ScriptedTransport {
    responses: Mutex<VecDeque<Result<HttpResponse, TransportError>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, response: HttpResponse) -> &Self {
        self.responses.lock().unwrap().push_back(Ok(response));
        self
    }

    pub fn push_json(&self, status: u16, body: serde_json::Value) -> &Self {
        self.push(HttpResponse::new(status, body.to_string()))
    }

    pub fn push_error(&self, error: TransportError) -> &Self {
        self.responses.lock().unwrap().push_back(Err(error));
        self
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Values of one query parameter across all recorded requests.
    pub fn query_values(&self, name: &str) -> Vec<Option<String>> {
        self.requests().iter().map(|request| request.query_value(name)).collect()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(HttpResponse::new(404, "script exhausted")))
    }
}

/// A config with one `listItems` GET operation taking the usual paging
/// query parameters, no rate limit and fast retries.
pub fn list_items_config() -> ApiConfig {
    ApiConfig::new("Items", "https://api.example.com")
        .with_rate_limits(RateLimitConfig::disabled())
        .with_retry(RetryConfig {
            backoff_factor: 0.0,
            ..RetryConfig::default()
        })
        .with_operation(OperationSpec::new(
            "GET /items",
            "List items",
            json!({
                "operationId": "listItems",
                "parameters": [
                    {"name": "cursor", "in": "query"},
                    {"name": "offset", "in": "query"},
                    {"name": "limit", "in": "query"},
                    {"name": "page", "in": "query"},
                    {"name": "status", "in": "query"}
                ]
            }),
        ))
}
