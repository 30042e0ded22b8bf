//! Telemetry export to a mock collector.

mod common;

use std::time::Duration;

use axum::routing::get;
use common::{free_port, http_client, server_config, wait_for_port, Collector};
use runway::config::Config;
use runway::error::BoxError;
use runway::http::RouteRegistry;
use runway::lifecycle::Runner;
use runway::telemetry::{self, LogBridge};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

const PARENT: &str = "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01";

fn telemetry_config(port: u16, endpoint: &str) -> Config {
    let mut config = server_config(port, 5);
    for (key, value) in [
        ("telemetry.enabled", "true"),
        ("telemetry.service_name", "runway-test"),
        ("telemetry.traces.enabled", "true"),
        ("telemetry.metrics.enabled", "true"),
        ("telemetry.logs.enabled", "false"),
        ("telemetry.exporter.enabled", "true"),
        ("telemetry.exporter.endpoint", endpoint),
        ("telemetry.exporter.headers", "x-api-key=secret"),
        ("telemetry.exporter.timeout", "2s"),
    ] {
        config.set(key, value);
    }
    config
}

fn records(batches: &[common::Captured]) -> Vec<Value> {
    batches
        .iter()
        .flat_map(|c| c.body["records"].as_array().cloned().unwrap_or_default())
        .collect()
}

#[tokio::test]
async fn test_request_spans_and_metrics_reach_collector() {
    let (collector, endpoint) = Collector::start().await;
    let port = free_port();
    let config = telemetry_config(port, &endpoint);

    let root = CancellationToken::new();
    let mut telemetry = telemetry::setup(&root, &config, LogBridge::new()).await.unwrap();
    assert_eq!(telemetry.teardown.pending(), vec!["traces", "metrics"]);

    let runner = Runner::new(config).with_telemetry(telemetry.handles.clone());
    let server = tokio::spawn(runner.run(
        root.clone(),
        |_: &Config, routes: &mut RouteRegistry| -> Result<(), BoxError> {
            routes.route("/hello", get(|| async { "hi" }))?;
            Ok(())
        },
    ));
    wait_for_port(port).await;

    let resp = http_client()
        .get(format!("http://127.0.0.1:{}/hello", port))
        .header("traceparent", PARENT)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    root.cancel();
    server.await.unwrap().unwrap();

    let deadline = CancellationToken::new();
    telemetry.teardown.run(deadline).await.unwrap();

    // Traces
    let traces = collector.for_signal("traces");
    assert!(!traces.is_empty(), "no trace batches received");
    assert_eq!(traces[0].headers["x-api-key"], "secret");
    assert_eq!(traces[0].body["resource"]["service.name"], "runway-test");

    let spans = records(&traces);
    let span = spans
        .iter()
        .find(|s| s["name"] == "GET /hello")
        .expect("request span exported");
    assert_eq!(span["trace_id"], "4bf92f3577b34da6a3ce929d0e0e4736");
    assert_eq!(span["parent_span_id"], "00f067aa0ba902b7");
    assert_eq!(span["attributes"]["http.response.status_code"], 200);
    assert_eq!(span["attributes"]["http.route"], "/hello");

    // Metrics: at least the final collection on teardown.
    let metrics = collector.for_signal("metrics");
    assert!(!metrics.is_empty(), "no metric batches received");
    let exposition = records(&metrics)
        .last()
        .and_then(|r| r["exposition"].as_str().map(str::to_string))
        .unwrap_or_default();
    assert!(exposition.contains("http_server_requests_total"), "{}", exposition);
    assert!(exposition.contains("/hello"), "{}", exposition);
}

#[tokio::test]
async fn test_disabled_signal_sends_nothing() {
    let (collector, endpoint) = Collector::start().await;
    let mut config = telemetry_config(free_port(), &endpoint);
    config.set("telemetry.traces.enabled", "false");
    config.set("telemetry.metrics.enabled", "false");

    let mut telemetry = telemetry::setup(&CancellationToken::new(), &config, LogBridge::new())
        .await
        .unwrap();
    assert!(telemetry.handles.is_empty());
    assert!(telemetry.teardown.is_empty());

    telemetry.teardown.run(CancellationToken::new()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(collector.received().is_empty());
}

#[tokio::test]
async fn test_per_signal_endpoint_overrides_global() {
    let (global, global_endpoint) = Collector::start().await;
    let (dedicated, dedicated_endpoint) = Collector::start().await;

    let mut config = telemetry_config(free_port(), &global_endpoint);
    config.set("telemetry.metrics.enabled", "false");
    config.set("telemetry.traces.endpoint", dedicated_endpoint);
    config.set("telemetry.traces.headers", "x-tenant=blue");

    let mut telemetry = telemetry::setup(&CancellationToken::new(), &config, LogBridge::new())
        .await
        .unwrap();
    let tracer = telemetry.handles.tracer.clone().expect("tracer");
    tracer.start("background-job").end();

    telemetry.teardown.run(CancellationToken::new()).await.unwrap();

    assert!(global.received().is_empty());
    let traces = dedicated.for_signal("traces");
    assert_eq!(traces.len(), 1);
    assert_eq!(traces[0].headers["x-tenant"], "blue");
    assert!(traces[0].headers.get("x-api-key").is_none());
    assert_eq!(records(&traces)[0]["name"], "background-job");
}
