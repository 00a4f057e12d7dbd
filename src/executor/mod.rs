//! The request lifecycle for one API call.
//!
//! `execute` builds the request from the endpoint and arguments, binds
//! credentials, then runs two nested state machines: the pagination loop
//! (one iteration per page, strictly sequential) and, inside it, the retry
//! loop (one iteration per attempt). Every page passes the rate limiter
//! before its first attempt.

use regex::Regex;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};
use url::Url;
use uuid::Uuid;

use crate::auth::AuthBinder;
use crate::endpoint::{EndpointDescriptor, ParameterLocation};
use crate::http::{HttpMethod, HttpRequest, HttpResponse, HttpTransport, TransportError};
use crate::pagination::{NextPage, PaginationError, PaginationStrategy};
use crate::ratelimit::RateLimiter;
use crate::retry::{millis, RetryPolicy};

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{[^{}/]+\}").unwrap_or_else(|e| unreachable!("placeholder pattern: {e}"))
});

/// Failures surfaced to the caller of `execute`.
#[derive(Debug, thiserror::Error)]
pub enum CallError {
    /// Non-2xx status that is not retried
    #[error("Remote API returned status {status}: {body}")]
    Remote { status: u16, body: String },
    /// Retry budget exhausted; carries the last status (if any) and body or error
    #[error("Request failed after {attempts} attempts: {message}")]
    ExhaustedRetries {
        attempts: u32,
        status: Option<u16>,
        message: String,
    },
    /// Network failure with retries disabled
    #[error("Network error: {0}")]
    Network(TransportError),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Pagination error: {0}")]
    Pagination(#[from] PaginationError),
    #[error("Call cancelled")]
    Cancelled,
}

impl CallError {
    /// The HTTP status behind this failure, when there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Remote { status, .. } => Some(*status),
            Self::ExhaustedRetries { status, .. } => *status,
            _ => None,
        }
    }
}

/// Arguments partitioned by where they go in the request.
#[derive(Debug, Default, Clone, PartialEq)]
struct RequestParts {
    path: String,
    query: BTreeMap<String, String>,
    headers: BTreeMap<String, String>,
    body: Map<String, Value>,
}

/// Where the current page is fetched from.
#[derive(Debug, Clone)]
enum PageTarget {
    /// Endpoint path plus these query parameters
    Query(BTreeMap<String, String>),
    /// A `Link: rel="next"` URL
    Url(Url),
}

#[derive(Debug)]
enum PageState {
    Fetching { index: u32, target: PageTarget },
    Done,
}

#[derive(Debug)]
enum AttemptState {
    Send { attempt: u32 },
    Backoff { attempt: u32, delay: Duration },
}

/// Query and path values are sent as text.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Decodes a response body: JSON when it parses, `{"text": ...}` otherwise,
/// and a status object for an empty body.
pub fn decode_response(response: &HttpResponse) -> Value {
    if response.body.is_empty() {
        return json!({"status": "Success", "status_code": response.status});
    }
    serde_json::from_str(&response.body).unwrap_or_else(|_| json!({"text": response.body}))
}

async fn cancellable<F: Future>(
    token: &CancellationToken,
    future: F,
) -> Result<F::Output, CallError> {
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(CallError::Cancelled),
        output = future => Ok(output),
    }
}

/// Executes endpoint calls for one API.
pub struct ApiCallExecutor {
    base_url: String,
    transport: Arc<dyn HttpTransport>,
    auth: AuthBinder,
    rate_limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
    pagination: PaginationStrategy,
}

impl std::fmt::Debug for ApiCallExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiCallExecutor")
            .field("base_url", &self.base_url)
            .field("retry", &self.retry)
            .field("pagination", &self.pagination)
            .finish()
    }
}

impl ApiCallExecutor {
    pub fn new(
        base_url: impl Into<String>,
        transport: Arc<dyn HttpTransport>,
        auth: AuthBinder,
        rate_limiter: Arc<RateLimiter>,
        retry: RetryPolicy,
        pagination: PaginationStrategy,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            transport,
            auth,
            rate_limiter,
            retry,
            pagination,
        }
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }

    /// Runs one logical call to completion.
    pub async fn execute(
        &self,
        endpoint: &EndpointDescriptor,
        args: &Value,
    ) -> Result<Value, CallError> {
        self.execute_with_cancel(endpoint, args, &CancellationToken::new()).await
    }

    /// Like [`execute`](Self::execute), aborting as soon as `cancel` fires.
    /// Pages fetched before cancellation are discarded.
    pub async fn execute_with_cancel(
        &self,
        endpoint: &EndpointDescriptor,
        args: &Value,
        cancel: &CancellationToken,
    ) -> Result<Value, CallError> {
        let span = tracing::info_span!(
            "api_call",
            call_id = %Uuid::new_v4(),
            operation = %endpoint.operation_id,
        );
        async move {
            let result = self.run(endpoint, args, cancel).await;
            match &result {
                Ok(_) => info!("API call completed"),
                Err(error) => warn!(error = %error, "API call failed"),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn run(
        &self,
        endpoint: &EndpointDescriptor,
        args: &Value,
        cancel: &CancellationToken,
    ) -> Result<Value, CallError> {
        let mut parts = Self::partition(endpoint, args)?;
        self.auth.apply(&mut parts.headers, &mut parts.query);

        let body = match endpoint.method {
            HttpMethod::Post if !parts.body.is_empty() => Some(Value::Object(parts.body.clone())),
            _ => None,
        };

        let max_pages = self.pagination.max_pages();
        let mut pages = Vec::new();
        let mut state = PageState::Fetching {
            index: 0,
            target: PageTarget::Query(parts.query.clone()),
        };

        while let PageState::Fetching { index, target } = state {
            let (url, query) = match target {
                PageTarget::Query(query) => (self.build_url(&parts.path, &query)?, query),
                PageTarget::Url(url) => {
                    let query: BTreeMap<String, String> = url.query_pairs().into_owned().collect();
                    (url, query)
                }
            };
            let request = HttpRequest {
                method: endpoint.method,
                url,
                headers: parts.headers.clone(),
                body: body.clone(),
            };

            cancellable(cancel, self.rate_limiter.consume_or_wait()).await?;
            let response = self.send_with_retry(&request, cancel).await?;
            let decoded = decode_response(&response);
            debug!(page = index + 1, status = response.status, "Fetched page");

            let next = if index + 1 < max_pages {
                self.pagination
                    .compute_next(&query, &decoded, response.header("link"))?
            } else {
                None
            };
            pages.push(decoded);

            state = match next {
                Some(NextPage::Url(next)) => PageState::Fetching {
                    index: index + 1,
                    target: PageTarget::Url(self.resolve_link(&request.url, &next)?),
                },
                Some(NextPage::Query(query)) => PageState::Fetching {
                    index: index + 1,
                    target: PageTarget::Query(query),
                },
                None => PageState::Done,
            };
        }

        if pages.len() > 1 {
            debug!(pages = pages.len(), "Merging paginated results");
        }
        Ok(self.pagination.merge(pages))
    }

    /// Sends one request, retrying transient failures per the retry policy.
    async fn send_with_retry(
        &self,
        request: &HttpRequest,
        cancel: &CancellationToken,
    ) -> Result<HttpResponse, CallError> {
        let mut state = AttemptState::Send { attempt: 0 };
        loop {
            state = match state {
                AttemptState::Send { attempt } => {
                    match cancellable(cancel, self.transport.send(request.clone())).await? {
                        Ok(response) if response.is_success() => return Ok(response),
                        Ok(response) if self.retry.should_retry(response.status, attempt) => {
                            let delay = self.retry.backoff_delay(attempt);
                            warn!(
                                status = response.status,
                                attempt,
                                delay_ms = millis(delay),
                                "Retryable status, backing off"
                            );
                            AttemptState::Backoff { attempt, delay }
                        }
                        Ok(response) => return Err(self.response_failure(response, attempt)),
                        Err(error) if self.retries_network_error(&error, attempt) => {
                            let delay = self.retry.backoff_delay(attempt);
                            warn!(
                                error = %error,
                                attempt,
                                delay_ms = millis(delay),
                                "Network error, backing off"
                            );
                            AttemptState::Backoff { attempt, delay }
                        }
                        Err(error) => return Err(self.transport_failure(error, attempt)),
                    }
                }
                AttemptState::Backoff { attempt, delay } => {
                    cancellable(cancel, tokio::time::sleep(delay)).await?;
                    AttemptState::Send { attempt: attempt + 1 }
                }
            };
        }
    }

    fn retries_network_error(&self, error: &TransportError, attempt: u32) -> bool {
        error.is_retryable() && self.retry.should_retry_network_error(attempt)
    }

    fn response_failure(&self, response: HttpResponse, attempt: u32) -> CallError {
        if self.retry.is_enabled() && self.retry.is_retryable_status(response.status) {
            CallError::ExhaustedRetries {
                attempts: attempt + 1,
                status: Some(response.status),
                message: response.body,
            }
        } else {
            CallError::Remote {
                status: response.status,
                body: response.body,
            }
        }
    }

    fn transport_failure(&self, error: TransportError, attempt: u32) -> CallError {
        match error {
            TransportError::InvalidRequest(message) => CallError::InvalidRequest(message),
            error if self.retry.is_enabled() => CallError::ExhaustedRetries {
                attempts: attempt + 1,
                status: None,
                message: error.to_string(),
            },
            error => CallError::Network(error),
        }
    }

    /// Splits arguments by declared location and fills in the path template.
    /// Undeclared arguments are ignored; missing required ones are left for
    /// the remote API to reject.
    fn partition(endpoint: &EndpointDescriptor, args: &Value) -> Result<RequestParts, CallError> {
        let empty = Map::new();
        let args = match args {
            Value::Object(map) => map,
            Value::Null => &empty,
            _ => {
                return Err(CallError::InvalidRequest(
                    "tool arguments must be a JSON object".to_string(),
                ));
            }
        };

        let mut parts = RequestParts {
            path: endpoint.path.clone(),
            ..RequestParts::default()
        };
        for parameter in &endpoint.parameters {
            let Some(value) = args.get(&parameter.name) else {
                continue;
            };
            match parameter.location {
                ParameterLocation::Path => {
                    parts.path = parts
                        .path
                        .replace(&format!("{{{}}}", parameter.name), &stringify(value));
                }
                ParameterLocation::Query => {
                    parts.query.insert(parameter.name.clone(), stringify(value));
                }
                ParameterLocation::Header => {
                    parts.headers.insert(parameter.name.clone(), stringify(value));
                }
                ParameterLocation::Body => {
                    parts.body.insert(parameter.name.clone(), value.clone());
                }
            }
        }

        if PLACEHOLDER.is_match(&parts.path) {
            debug!(path = %parts.path, "Path has unresolved placeholders");
        }
        Ok(parts)
    }

    fn build_url(&self, path: &str, query: &BTreeMap<String, String>) -> Result<Url, CallError> {
        let separator = if path.starts_with('/') { "" } else { "/" };
        let raw = format!("{}{}{}", self.base_url, separator, path);
        let mut url =
            Url::parse(&raw).map_err(|e| CallError::InvalidRequest(format!("{}: {}", raw, e)))?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    /// Resolves a `next` link against the current URL, keeping a query-string
    /// credential the link does not carry itself.
    fn resolve_link(&self, current: &Url, next: &str) -> Result<Url, CallError> {
        let mut url = current
            .join(next)
            .map_err(|e| CallError::InvalidRequest(format!("next link {}: {}", next, e)))?;
        if let Some((name, value)) = self.auth.query_param() {
            if !url.query_pairs().any(|(key, _)| key == name) {
                url.query_pairs_mut().append_pair(name, value);
            }
        }
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthConfig;
    use crate::config::{PaginationConfig, RateLimitConfig, RetryConfig};
    use crate::endpoint::ParameterDescriptor;
    use crate::http::MockHttpTransport;
    use mockall::Sequence;
    use tokio_test::{assert_err, assert_ok};

    fn executor(transport: MockHttpTransport, retry: RetryConfig) -> ApiCallExecutor {
        ApiCallExecutor::new(
            "https://api.example.com/v1/",
            Arc::new(transport),
            AuthBinder::none(),
            Arc::new(RateLimiter::new(&RateLimitConfig::disabled())),
            RetryPolicy::new(retry),
            PaginationStrategy::new(PaginationConfig::disabled()),
        )
    }

    fn get_item() -> EndpointDescriptor {
        EndpointDescriptor::new("getItem", HttpMethod::Get, "/items/{item_id}")
            .with_parameter(ParameterDescriptor::new("item_id", ParameterLocation::Path).required())
            .with_parameter(ParameterDescriptor::new("fields", ParameterLocation::Query))
            .with_parameter(ParameterDescriptor::new("X-Trace", ParameterLocation::Header))
    }

    #[test]
    fn test_partition_places_each_argument_once() {
        let endpoint =
            get_item().with_parameter(ParameterDescriptor::new("note", ParameterLocation::Body));
        let args = json!({
            "item_id": 42,
            "fields": "name",
            "X-Trace": "t-1",
            "note": {"a": 1},
            "unknown": true
        });
        let parts = ApiCallExecutor::partition(&endpoint, &args).unwrap();

        assert_eq!(parts.path, "/items/42");
        assert_eq!(parts.query, BTreeMap::from([("fields".to_string(), "name".to_string())]));
        assert_eq!(parts.headers, BTreeMap::from([("X-Trace".to_string(), "t-1".to_string())]));
        assert_eq!(parts.body.get("note"), Some(&json!({"a": 1})));
        assert_eq!(parts.body.len(), 1);
    }

    #[test]
    fn test_partition_leaves_unresolved_placeholders() {
        let parts = ApiCallExecutor::partition(&get_item(), &json!({})).unwrap();
        assert_eq!(parts.path, "/items/{item_id}");
        assert!(ApiCallExecutor::partition(&get_item(), &json!([1])).is_err());
    }

    #[test]
    fn test_decode_response_variants() {
        assert_eq!(decode_response(&HttpResponse::new(200, r#"{"a":1}"#)), json!({"a": 1}));
        assert_eq!(decode_response(&HttpResponse::new(200, "plain")), json!({"text": "plain"}));
        assert_eq!(
            decode_response(&HttpResponse::new(204, "")),
            json!({"status": "Success", "status_code": 204})
        );
    }

    #[tokio::test]
    async fn test_builds_url_and_headers() {
        let mut transport = MockHttpTransport::new();
        transport
            .expect_send()
            .withf(|request| {
                request.url.as_str() == "https://api.example.com/v1/items/7?fields=id"
                    && request.header("x-trace") == Some("abc")
                    && request.body.is_none()
            })
            .times(1)
            .returning(|_| Ok(HttpResponse::new(200, r#"{"id": 7}"#)));

        let result = executor(transport, RetryConfig::default())
            .execute(&get_item(), &json!({"item_id": 7, "fields": "id", "X-Trace": "abc"}))
            .await;
        assert_eq!(assert_ok!(result), json!({"id": 7}));
    }

    #[tokio::test]
    async fn test_remote_error_is_not_retried() {
        let mut transport = MockHttpTransport::new();
        transport
            .expect_send()
            .times(1)
            .returning(|_| Ok(HttpResponse::new(404, "not found")));

        let error = assert_err!(
            executor(transport, RetryConfig::default())
                .execute(&get_item(), &json!({"item_id": 1}))
                .await
        );
        assert!(matches!(
            error,
            CallError::Remote { status: 404, ref body } if body == "not found"
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_then_succeeds() {
        let mut transport = MockHttpTransport::new();
        let mut seq = Sequence::new();
        transport
            .expect_send()
            .times(2)
            .in_sequence(&mut seq)
            .returning(|_| Ok(HttpResponse::new(503, "busy")));
        transport
            .expect_send()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(HttpResponse::new(200, r#"{"ok": true}"#)));

        let start = tokio::time::Instant::now();
        let result = executor(transport, RetryConfig::default())
            .execute(&get_item(), &json!({"item_id": 1}))
            .await;
        assert_eq!(assert_ok!(result), json!({"ok": true}));
        assert_eq!(start.elapsed(), Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_carry_last_status() {
        let mut transport = MockHttpTransport::new();
        transport
            .expect_send()
            .times(4)
            .returning(|_| Ok(HttpResponse::new(500, "boom")));

        let error = assert_err!(
            executor(transport, RetryConfig::default())
                .execute(&get_item(), &json!({"item_id": 1}))
                .await
        );
        match error {
            CallError::ExhaustedRetries { attempts, status, message } => {
                assert_eq!(attempts, 4);
                assert_eq!(status, Some(500));
                assert_eq!(message, "boom");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_network_errors_are_retried() {
        let mut transport = MockHttpTransport::new();
        let mut seq = Sequence::new();
        transport
            .expect_send()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(TransportError::Network("connection refused".to_string())));
        transport
            .expect_send()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(HttpResponse::new(200, "")));

        let result = executor(transport, RetryConfig::default())
            .execute(&get_item(), &json!({"item_id": 1}))
            .await;
        assert_eq!(assert_ok!(result), json!({"status": "Success", "status_code": 200}));
    }

    #[tokio::test]
    async fn test_network_error_without_retries() {
        let mut transport = MockHttpTransport::new();
        transport
            .expect_send()
            .times(1)
            .returning(|_| Err(TransportError::Timeout("30s".to_string())));

        let error = assert_err!(
            executor(transport, RetryConfig::disabled())
                .execute(&get_item(), &json!({"item_id": 1}))
                .await
        );
        assert!(matches!(error, CallError::Network(TransportError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_retryable_status_with_retries_disabled_is_remote_error() {
        let mut transport = MockHttpTransport::new();
        transport
            .expect_send()
            .times(1)
            .returning(|_| Ok(HttpResponse::new(503, "busy")));

        let error = assert_err!(
            executor(transport, RetryConfig::disabled())
                .execute(&get_item(), &json!({"item_id": 1}))
                .await
        );
        assert_eq!(error.status(), Some(503));
        assert!(matches!(error, CallError::Remote { .. }));
    }

    #[tokio::test]
    async fn test_post_sends_body_bucket() {
        let endpoint = EndpointDescriptor::new("createItem", HttpMethod::Post, "/items")
            .with_parameter(ParameterDescriptor::new("name", ParameterLocation::Body))
            .with_parameter(ParameterDescriptor::new("dry_run", ParameterLocation::Query));

        let mut transport = MockHttpTransport::new();
        transport
            .expect_send()
            .withf(|request| {
                request.method == HttpMethod::Post
                    && request.body == Some(json!({"name": "widget"}))
                    && request.query_value("dry_run").as_deref() == Some("true")
            })
            .times(1)
            .returning(|_| Ok(HttpResponse::new(201, r#"{"id": 1}"#)));

        let result = executor(transport, RetryConfig::default())
            .execute(&endpoint, &json!({"name": "widget", "dry_run": true}))
            .await;
        assert_eq!(assert_ok!(result), json!({"id": 1}));
    }

    #[tokio::test]
    async fn test_link_resolution_keeps_query_credential() {
        let executor = ApiCallExecutor::new(
            "https://api.example.com",
            Arc::new(MockHttpTransport::new()),
            assert_ok!(AuthBinder::new(&AuthConfig::api_key_query("api_key", "k"))),
            Arc::new(RateLimiter::disabled()),
            RetryPolicy::default(),
            PaginationStrategy::disabled(),
        );
        let current = Url::parse("https://api.example.com/items?api_key=k").unwrap();

        let relative = executor.resolve_link(&current, "/items?page=2").unwrap();
        assert_eq!(relative.as_str(), "https://api.example.com/items?page=2&api_key=k");

        let absolute = executor
            .resolve_link(&current, "https://api.example.com/items?page=3&api_key=k")
            .unwrap();
        assert_eq!(absolute.as_str(), "https://api.example.com/items?page=3&api_key=k");
    }

    #[tokio::test]
    async fn test_cancelled_before_send() {
        let mut transport = MockHttpTransport::new();
        transport.expect_send().times(0);

        let cancel = CancellationToken::new();
        cancel.cancel();
        let error = assert_err!(
            executor(transport, RetryConfig::default())
                .execute_with_cancel(&get_item(), &json!({"item_id": 1}), &cancel)
                .await
        );
        assert!(matches!(error, CallError::Cancelled));
    }
}
