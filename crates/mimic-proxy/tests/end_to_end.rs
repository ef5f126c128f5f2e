//! End-to-end tests over real sockets.
//!
//! Each test starts its own in-process server on an ephemeral port and talks
//! to it with `reqwest`.

use mimic_proxy::config::{Config, Mode};
use mimic_proxy::logging::{LeveledLogger, LogLevel};
use mimic_proxy::Mimic;
use reqwest::{Client, StatusCode};
use serde_json::json;
use std::error::Error;
use std::io::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Leveled logger with every severity enabled, so the event log receives
/// messages even without a tracing subscriber installed.
struct AlwaysOn;

impl LeveledLogger for AlwaysOn {
    fn is_enabled(&self, _level: LogLevel) -> bool {
        true
    }

    fn info(&self, message: &str) {
        tracing::info!("{message}");
    }

    fn error(&self, message: &str, cause: Option<&(dyn Error + 'static)>) {
        tracing::error!(cause = ?cause.map(|c| c.to_string()), "{message}");
    }
}

struct Running {
    addr: SocketAddr,
    _shutdown: broadcast::Sender<()>,
}

impl Running {
    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

/// Direct client, ignoring any proxy configured in the environment.
fn client() -> Client {
    Client::builder().no_proxy().build().unwrap()
}

async fn start(config: Config) -> Running {
    let mimic = Mimic::from_config(&config, Arc::new(AlwaysOn)).unwrap();
    let (shutdown, rx) = broadcast::channel(1);
    let (addr, _handle) = mimic
        .spawn("127.0.0.1:0".parse().unwrap(), rx)
        .await
        .unwrap();
    Running {
        addr,
        _shutdown: shutdown,
    }
}

async fn start_mock() -> Running {
    start(Config::default()).await
}

async fn start_proxy() -> Running {
    start(Config {
        mode: Mode::Proxy,
        ..Config::default()
    })
    .await
}

async fn create_expectation(client: &Client, server: &Running, expectation: serde_json::Value) {
    let response = client
        .put(server.url("/expectation"))
        .json(&expectation)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn test_expectation_is_served_and_verified() {
    let server = start_mock().await;
    let client = client();

    create_expectation(
        &client,
        &server,
        json!({
            "httpRequest": {"method": "GET", "path": "/greeting"},
            "httpResponse": {
                "statusCode": 200,
                "headers": {"Content-Type": "text/plain"},
                "body": "hello"
            },
            "times": {"remainingTimes": 1, "unlimited": false}
        }),
    )
    .await;

    let response = client.get(server.url("/greeting")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "hello");

    // The expectation was used up
    let response = client.get(server.url("/greeting")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let verify = client
        .put(server.url("/verify"))
        .json(&json!({
            "httpRequest": {"path": "/greeting"},
            "times": {"atLeast": 2, "atMost": 2}
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(verify.status(), StatusCode::ACCEPTED);

    let verify = client
        .put(server.url("/verify"))
        .json(&json!({"httpRequest": {"path": "/never"}}))
        .send()
        .await
        .unwrap();
    assert_eq!(verify.status(), StatusCode::NOT_ACCEPTABLE);
}

#[tokio::test]
async fn test_retrieve_logs_and_reset() {
    let server = start_mock().await;
    let client = client();

    client.get(server.url("/unknown")).send().await.unwrap();

    let logs: serde_json::Value = client
        .put(server.url("/retrieve?type=logs"))
        .json(&json!({"path": "/unknown"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let logs = logs.as_array().unwrap();
    assert_eq!(logs.len(), 1);
    assert!(logs[0]["message"]
        .as_str()
        .unwrap()
        .starts_with("no expectation for request"));

    let reset = client.put(server.url("/reset")).send().await.unwrap();
    assert_eq!(reset.status(), StatusCode::OK);

    let requests: serde_json::Value = client
        .put(server.url("/retrieve"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(requests, json!([]));
}

#[tokio::test]
async fn test_status_reports_bound_port() {
    let server = start_mock().await;
    let status: serde_json::Value = client()
        .put(server.url("/status"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status, json!({"ports": [server.addr.port()]}));
}

#[tokio::test]
async fn test_forward_expectation_relays_upstream() {
    let upstream = start_mock().await;
    let server = start_mock().await;
    let client = client();

    create_expectation(
        &client,
        &upstream,
        json!({
            "httpRequest": {"path": "/data"},
            "httpResponse": {"statusCode": 203, "body": "from upstream"}
        }),
    )
    .await;
    create_expectation(
        &client,
        &server,
        json!({
            "httpRequest": {"path": "/data"},
            "httpForward": {"host": "127.0.0.1", "port": upstream.addr.port()}
        }),
    )
    .await;

    let response = client.get(server.url("/data")).send().await.unwrap();
    assert_eq!(response.status().as_u16(), 203);
    assert_eq!(response.text().await.unwrap(), "from upstream");

    let recorded: serde_json::Value = client
        .put(server.url("/retrieve?type=recorded_expectations"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(recorded[0]["httpResponse"]["statusCode"], 203);
}

#[tokio::test]
async fn test_forward_proxy_mode() {
    let upstream = start_mock().await;
    let proxy = start_proxy().await;
    let client = client();

    create_expectation(
        &client,
        &upstream,
        json!({
            "httpRequest": {"path": "/proxied"},
            "httpResponse": {"statusCode": 200, "body": "through the proxy"}
        }),
    )
    .await;

    let proxied = Client::builder()
        .proxy(reqwest::Proxy::http(proxy.url("")).unwrap())
        .build()
        .unwrap();
    let response = proxied.get(upstream.url("/proxied")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "through the proxy");

    let verify = client
        .put(proxy.url("/verify"))
        .json(&json!({"httpRequest": {"path": "/proxied"}}))
        .send()
        .await
        .unwrap();
    assert_eq!(verify.status(), StatusCode::ACCEPTED);
}

#[tokio::test]
async fn test_forward_to_self_is_refused() {
    let server = start_mock().await;
    let client = client();

    create_expectation(
        &client,
        &server,
        json!({
            "httpRequest": {"path": "/loop"},
            "httpForward": {"host": "localhost", "port": server.addr.port()}
        }),
    )
    .await;

    let response = client.get(server.url("/loop")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Only the original request was received: nothing recursed
    let requests: serde_json::Value = client
        .put(server.url("/retrieve"))
        .json(&json!({"path": "/loop"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(requests.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_proxy_mode_request_to_itself_is_refused() {
    let proxy = start_proxy().await;
    let response = client().get(proxy.url("/self")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_drop_connection() {
    let server = start_mock().await;
    let client = client();

    create_expectation(
        &client,
        &server,
        json!({
            "httpRequest": {"path": "/drop"},
            "httpError": {"dropConnection": true}
        }),
    )
    .await;

    assert!(client.get(server.url("/drop")).send().await.is_err());
}

#[tokio::test]
async fn test_expectation_endpoint_hidden_in_proxy_mode() {
    let upstream = start_mock().await;
    let proxy = start_proxy().await;

    // Through the proxy, PUT /expectation is data-plane traffic and reaches the upstream
    let proxied = Client::builder()
        .proxy(reqwest::Proxy::http(proxy.url("")).unwrap())
        .build()
        .unwrap();
    let response = proxied
        .put(upstream.url("/expectation"))
        .json(&json!({
            "httpRequest": {"path": "/x"},
            "httpResponse": {"statusCode": 200}
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let active: serde_json::Value = client()
        .put(proxy.url("/retrieve?type=active_expectations"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(active, json!([]));
}

#[tokio::test]
async fn test_server_from_config_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(
        br#"
listen:
  host: 127.0.0.1
  port: 1080
expectations:
  - httpRequest:
      path: /configured
    httpResponse:
      statusCode: 200
      body: preloaded
"#,
    )
    .unwrap();

    let config = Config::from_file(file.path()).unwrap();
    let server = start(config).await;

    let response = client()
        .get(server.url("/configured"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.text().await.unwrap(), "preloaded");
}
