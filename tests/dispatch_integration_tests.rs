//! End-to-end dispatch tests against real HTTP upstreams (wiremock).

use parking_lot::Mutex;
use serde_json::json;
use service_dispatch::core::config::StaticInstanceConfig;
use service_dispatch::demo::{run_all, standard_runners};
use service_dispatch::dispatch::{BannerLogObserver, DispatchObserver};
use service_dispatch::{DispatchConfig, DispatchError, DispatchResult, DispatchStack, LogicalRequest, ServiceInstance};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_string, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Upstream answering `GET /greetings` with `{"greetings": <name>}`
async fn upstream(name: &str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/greetings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "greetings": name })))
        .mount(&server)
        .await;
    server
}

fn config_for(service: &str, servers: &[&MockServer]) -> DispatchConfig {
    let mut config = DispatchConfig::default();
    config.client.request_timeout = Duration::from_secs(5);
    config.discovery.services.insert(
        service.to_string(),
        servers.iter().map(|server| StaticInstanceConfig::new(server.uri())).collect(),
    );
    config
}

fn stack(config: &DispatchConfig) -> DispatchStack {
    DispatchStack::from_config(config, Arc::new(BannerLogObserver)).unwrap()
}

async fn greeting_of(stack: &DispatchStack, url: &str) -> Result<String, DispatchError> {
    let value: serde_json::Value = stack.client.get(url).json().await?;
    Ok(value["greetings"].as_str().unwrap_or_default().to_string())
}

async fn received(server: &MockServer) -> usize {
    server.received_requests().await.map(|r| r.len()).unwrap_or(0)
}

#[derive(Default)]
struct CollectingObserver {
    seen: Mutex<Vec<(String, String)>>,
}

impl DispatchObserver for CollectingObserver {
    fn observe(&self, source: &str, message: &str) {
        self.seen.lock().push((source.to_string(), message.to_string()));
    }
}

#[tokio::test]
async fn test_logical_requests_rotate_across_instances() {
    let one = upstream("one").await;
    let two = upstream("two").await;
    let stack = stack(&config_for("api", &[&one, &two]));

    let mut answers = Vec::new();
    for _ in 0..3 {
        answers.push(greeting_of(&stack, "http://api/greetings").await.unwrap());
    }

    assert_eq!(answers, vec!["one", "two", "one"]);
    assert_eq!(received(&one).await, 2);
    assert_eq!(received(&two).await, 1);
}

#[tokio::test]
async fn test_literal_address_bypasses_resolution() {
    let direct = upstream("direct").await;
    let stack = stack(&DispatchConfig::default());

    let url = format!("{}/greetings", direct.uri());
    assert_eq!(greeting_of(&stack, &url).await.unwrap(), "direct");
}

#[tokio::test]
async fn test_empty_registry_fails_before_any_send() {
    let untouched = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&untouched)
        .await;

    let stack = stack(&DispatchConfig::default());
    stack.registry.set_instances("api", Vec::new());

    let err = stack.client.get("http://api/greetings").send().await.unwrap_err();

    assert!(matches!(err, DispatchError::NoInstancesAvailable { ref service } if service == "api"));
    assert_eq!(received(&untouched).await, 0);
}

#[tokio::test]
async fn test_unknown_service_name_is_not_passed_through() {
    let stack = stack(&DispatchConfig::default());
    let err = stack.client.get("http://billing/invoices").send().await.unwrap_err();
    assert_eq!(err.error_type(), "no_instances_available");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_are_balanced() {
    let servers = vec![upstream("a").await, upstream("b").await, upstream("c").await];
    let refs: Vec<&MockServer> = servers.iter().collect();
    let stack = Arc::new(stack(&config_for("api", &refs)));

    const REQUESTS: usize = 30;
    let handles: Vec<_> = (0..REQUESTS)
        .map(|_| {
            let stack = Arc::clone(&stack);
            tokio::spawn(async move { greeting_of(&stack, "http://api/greetings").await })
        })
        .collect();

    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let ceiling = (REQUESTS + servers.len() - 1) / servers.len();
    let mut total = 0;
    for server in &servers {
        let count = received(server).await;
        assert!(count <= ceiling, "instance received {} > {}", count, ceiling);
        total += count;
    }
    assert_eq!(total, REQUESTS);
}

#[tokio::test]
async fn test_cancelled_request_still_consumes_its_turn() {
    let slow = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/greetings"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "greetings": "slow" }))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&slow)
        .await;
    let fast = upstream("fast").await;
    let stack = stack(&config_for("api", &[&slow, &fast]));

    let cancelled = tokio::time::timeout(
        Duration::from_millis(100),
        greeting_of(&stack, "http://api/greetings"),
    )
    .await;
    assert!(cancelled.is_err());

    assert_eq!(greeting_of(&stack, "http://api/greetings").await.unwrap(), "fast");
}

#[tokio::test]
async fn test_transport_failure_is_reported_and_not_rolled_back() {
    // Reserve a port, then close it so connections are refused.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let dead_port = listener.local_addr().unwrap().port();
    drop(listener);

    let alive = upstream("alive").await;
    let stack = stack(&DispatchConfig::default());
    let alive_port = alive.address().port();
    stack.registry.set_instances(
        "api",
        vec![
            ServiceInstance::new("api", "127.0.0.1", dead_port),
            ServiceInstance::new("api", "127.0.0.1", alive_port),
        ],
    );

    let err = greeting_of(&stack, "http://api/greetings").await.unwrap_err();
    assert_eq!(err.error_type(), "transport_error");

    assert_eq!(greeting_of(&stack, "http://api/greetings").await.unwrap(), "alive");
}

#[tokio::test]
async fn test_manual_and_filter_paths_share_one_cursor() {
    let one = upstream("one").await;
    let two = upstream("two").await;
    let stack = stack(&config_for("api", &[&one, &two]));

    let manual_body = {
        use futures::TryStreamExt;
        let chunks: Vec<bytes::Bytes> = stack
            .manual
            .dispatch_once("api", "/greetings")
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        chunks.concat()
    };
    let manual: serde_json::Value = serde_json::from_slice(&manual_body).unwrap();

    assert_eq!(manual["greetings"], "one");
    assert_eq!(greeting_of(&stack, "http://api/greetings").await.unwrap(), "two");
}

#[tokio::test]
async fn test_manual_dispatch_fails_on_error_status() {
    let broken = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&broken)
        .await;
    let stack = stack(&config_for("api", &[&broken]));

    let err = match stack.manual.dispatch_once("api", "/greetings").await {
        Ok(_) => panic!("expected an upstream status error"),
        Err(e) => e,
    };

    assert!(matches!(err, DispatchError::UpstreamStatus { status: 500, .. }));
}

#[tokio::test]
async fn test_registry_changes_apply_to_next_resolution() {
    let one = upstream("one").await;
    let two = upstream("two").await;
    let stack = stack(&config_for("api", &[&one, &two]));

    assert_eq!(greeting_of(&stack, "http://api/greetings").await.unwrap(), "one");

    stack
        .registry
        .replace_from_config(&config_for("api", &[&two]).discovery)
        .unwrap();

    for _ in 0..3 {
        assert_eq!(greeting_of(&stack, "http://api/greetings").await.unwrap(), "two");
    }
}

#[tokio::test]
async fn test_demo_runners_walk_the_rotation() {
    let one = upstream("one").await;
    let two = upstream("two").await;
    let config = config_for("api", &[&one, &two]);
    let observer = Arc::new(CollectingObserver::default());
    let stack = DispatchStack::from_config(&config, observer.clone()).unwrap();

    let runners = standard_runners(&stack, &config);
    let outcomes = run_all(&runners, observer.as_ref()).await;

    let bodies: Vec<String> = outcomes
        .into_iter()
        .map(|(_, result)| {
            let value: serde_json::Value = serde_json::from_str(&result.unwrap()).unwrap();
            value["greetings"].as_str().unwrap().to_string()
        })
        .collect();
    assert_eq!(bodies, vec!["one", "two", "one"]);

    let seen = observer.seen.lock();
    let sources: Vec<&str> = seen.iter().map(|(source, _)| source.as_str()).collect();
    assert_eq!(
        sources,
        vec!["ConfiguredClientRunner", "FilterRunner", "ManualDispatcher", "ManualRunner"]
    );
    assert_eq!(seen[2].1, format!("{}/greetings", one.uri()));
}

#[tokio::test]
async fn test_streamed_request_body_reaches_instance_intact() {
    let echo = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/echo"))
        .and(header("x-trace", "abc"))
        .and(body_string("hello world"))
        .respond_with(ResponseTemplate::new(200).set_body_string("received"))
        .expect(1)
        .mount(&echo)
        .await;
    let stack = stack(&config_for("api", &[&echo]));

    let chunks: Vec<DispatchResult<bytes::Bytes>> = vec![
        Ok(bytes::Bytes::from_static(b"hello ")),
        Ok(bytes::Bytes::from_static(b"world")),
    ];
    let request = LogicalRequest::new(http::Method::POST, "http://api/echo".parse().unwrap())
        .unwrap()
        .with_header(
            http::HeaderName::from_static("x-trace"),
            http::HeaderValue::from_static("abc"),
        )
        .with_body_stream(futures::stream::iter(chunks));

    let body = stack.client.request(request).text().await.unwrap();

    assert_eq!(body, "received");
    assert_eq!(received(&echo).await, 1);
}

#[tokio::test]
async fn test_redirects_are_returned_not_followed() {
    let elsewhere = upstream("elsewhere").await;
    let location = format!("{}/greetings", elsewhere.uri());
    let redirecting = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/greetings"))
        .respond_with(ResponseTemplate::new(302).insert_header("location", location.as_str()))
        .mount(&redirecting)
        .await;
    let stack = stack(&config_for("api", &[&redirecting]));

    let response = stack.client.get("http://api/greetings").send().await.unwrap();

    assert_eq!(response.status(), http::StatusCode::FOUND);
    assert_eq!(received(&redirecting).await, 1);
    assert_eq!(received(&elsewhere).await, 0);
}
