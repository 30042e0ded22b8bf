//! Telemetry instrumentation for requests.
//!
//! Starts a span per request (continuing an incoming `traceparent`) and records
//! request count and latency. Does nothing when telemetry is off.

use std::time::Instant;

use axum::extract::{MatchedPath, Request, State};
use axum::middleware::Next;
use axum::response::Response;

use crate::telemetry::traces::{SpanContext, TRACEPARENT};
use crate::telemetry::TelemetryHandles;

const UNMATCHED_ROUTE: &str = "unmatched";

pub async fn instrument(State(telemetry): State<TelemetryHandles>, mut req: Request, next: Next) -> Response {
    if telemetry.tracer.is_none() && telemetry.meter.is_none() {
        return next.run(req).await;
    }

    let started = Instant::now();
    let method = req.method().to_string();
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| UNMATCHED_ROUTE.to_string());

    let mut span = telemetry.tracer.as_ref().map(|tracer| {
        let parent = req
            .headers()
            .get(TRACEPARENT)
            .and_then(|v| v.to_str().ok())
            .and_then(SpanContext::from_traceparent);

        let mut span = tracer.start_with_parent(format!("{} {}", method, route), parent.as_ref());
        span.set_attribute("http.request.method", method.clone());
        span.set_attribute("http.route", route.clone());
        span.set_attribute("url.path", req.uri().path());
        span
    });
    if let Some(span) = &span {
        req.extensions_mut().insert(*span.context());
    }

    let response = next.run(req).await;
    let status = response.status();

    if let Some(meter) = &telemetry.meter {
        meter.record_request(&method, &route, status.as_u16(), started.elapsed());
    }
    if let Some(mut span) = span.take() {
        span.set_attribute("http.response.status_code", status.as_u16());
        if status.is_server_error() {
            span.record_error(status.to_string());
        }
        span.end();
    }

    response
}
