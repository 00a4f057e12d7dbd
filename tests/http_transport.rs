use api_toolkit::{
    ApiConfig, AuthConfig, HttpMethod, HttpRequest, HttpTransport, OperationSpec, PaginationConfig,
    ReqwestTransport, RetryConfig, ToolCatalog, TransportError,
};
use serde_json::json;
use std::collections::BTreeMap;
use std::time::Duration;
use url::Url;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn items_config(base_url: &str) -> ApiConfig {
    ApiConfig::new("Items", base_url)
        .with_auth(AuthConfig::basic("u", "p"))
        .with_retry(RetryConfig {
            backoff_factor: 0.0,
            ..RetryConfig::default()
        })
        .with_pagination(PaginationConfig {
            results_field: Some("items".to_string()),
            ..PaginationConfig::default()
        })
        .with_operation(OperationSpec::new(
            "GET /items",
            "List items",
            json!({"operationId": "listItems", "parameters": [{"name": "status", "in": "query"}]}),
        ))
        .with_operation(OperationSpec::new(
            "POST /items",
            "Create an item",
            json!({
                "operationId": "createItem",
                "requestBody": {
                    "content": {
                        "application/json": {
                            "schema": {"type": "object", "properties": {"name": {"type": "string"}}}
                        }
                    }
                }
            }),
        ))
}

#[tokio::test]
async fn follows_link_header_over_http() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/items"))
        .and(query_param("page", "2"))
        .and(header("Authorization", "Basic dTpw"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": ["c"]})))
        .expect(1)
        .mount(&server)
        .await;

    let next = format!("<{}/items?page=2&status=open>; rel=\"next\"", server.uri());
    Mock::given(method("GET"))
        .and(path("/items"))
        .and(query_param("status", "open"))
        .and(header("Authorization", "Basic dTpw"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"items": ["a", "b"], "total": 3}))
                .insert_header("Link", next.as_str()),
        )
        .with_priority(10)
        .expect(1)
        .mount(&server)
        .await;

    let catalog = ToolCatalog::new(items_config(&server.uri())).unwrap();
    let result = catalog
        .execute("listItems", &json!({"status": "open"}))
        .await
        .unwrap();

    assert_eq!(result, json!({"items": ["a", "b", "c"], "total": 3}));
}

#[tokio::test]
async fn posts_json_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/items"))
        .and(body_json(json!({"name": "widget"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 1})))
        .expect(1)
        .mount(&server)
        .await;

    let catalog = ToolCatalog::new(items_config(&server.uri())).unwrap();
    let result = catalog.execute("createItem", &json!({"name": "widget"})).await.unwrap();
    assert_eq!(result, json!({"id": 1}));
}

#[tokio::test]
async fn retries_server_errors_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/items"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .with_priority(1)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/items"))
        .respond_with(ResponseTemplate::new(200).set_body_string("done"))
        .expect(1)
        .mount(&server)
        .await;

    let catalog = ToolCatalog::new(items_config(&server.uri())).unwrap();
    let result = catalog.execute("listItems", &json!({})).await.unwrap();
    assert_eq!(result, json!({"text": "done"}));
}

#[tokio::test]
async fn slow_response_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .mount(&server)
        .await;

    let transport = ReqwestTransport::new(Duration::from_millis(100)).unwrap();
    let request = HttpRequest {
        method: HttpMethod::Get,
        url: Url::parse(&format!("{}/slow", server.uri())).unwrap(),
        headers: BTreeMap::new(),
        body: None,
    };

    let error = transport.send(request).await.unwrap_err();
    assert!(matches!(error, TransportError::Timeout(_)));
    assert!(error.is_retryable());
}

#[tokio::test]
async fn response_headers_are_lowercased() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).insert_header("X-RateLimit-Remaining", "41"))
        .mount(&server)
        .await;

    let transport = ReqwestTransport::new(Duration::from_secs(5)).unwrap();
    let request = HttpRequest {
        method: HttpMethod::Get,
        url: Url::parse(&server.uri()).unwrap(),
        headers: BTreeMap::from([("Accept".to_string(), "application/json".to_string())]),
        body: None,
    };

    let response = transport.send(request).await.unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(response.headers.get("x-ratelimit-remaining").map(String::as_str), Some("41"));
    assert_eq!(response.body, "");
}

#[tokio::test]
async fn invalid_header_is_not_sent() {
    let transport = ReqwestTransport::new(Duration::from_secs(5)).unwrap();
    let request = HttpRequest {
        method: HttpMethod::Get,
        url: Url::parse("http://localhost/").unwrap(),
        headers: BTreeMap::from([("Bad Header".to_string(), "x".to_string())]),
        body: None,
    };

    let error = transport.send(request).await.unwrap_err();
    assert!(matches!(error, TransportError::InvalidRequest(_)));
    assert!(!error.is_retryable());
}
