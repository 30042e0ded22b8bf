//! Spans and W3C trace context.
//!
//! # Responsibilities
//! - Generate trace and span identifiers
//! - Parse and format the `traceparent` header
//! - Hand finished spans to the traces pipeline
//!
//! # Design Decisions
//! - Parent-based sampling: a span follows its remote parent's sampled flag,
//!   root spans are always sampled
//! - A span dropped without `end` is still ended (once)

use std::collections::BTreeMap;
use std::fmt;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use serde_json::Value;

use crate::telemetry::pipeline::RecordSender;

pub const TRACEPARENT: &str = "traceparent";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TraceId([u8; 16]);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpanId([u8; 8]);

impl TraceId {
    pub fn random() -> Self {
        loop {
            let bytes: [u8; 16] = rand::random();
            if bytes != [0; 16] {
                return Self(bytes);
            }
        }
    }
}

impl SpanId {
    pub fn random() -> Self {
        loop {
            let bytes: [u8; 8] = rand::random();
            if bytes != [0; 8] {
                return Self(bytes);
            }
        }
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&to_hex(&self.0))
    }
}

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&to_hex(&self.0))
    }
}

/// Identity of a span as propagated between services.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpanContext {
    pub trace_id: TraceId,
    pub span_id: SpanId,
    pub sampled: bool,
}

impl SpanContext {
    pub fn new_root() -> Self {
        Self {
            trace_id: TraceId::random(),
            span_id: SpanId::random(),
            sampled: true,
        }
    }

    /// A new span in the same trace.
    pub fn child(&self) -> Self {
        Self {
            trace_id: self.trace_id,
            span_id: SpanId::random(),
            sampled: self.sampled,
        }
    }

    /// Parse `00-<trace id>-<span id>-<flags>`. Returns `None` for anything
    /// malformed, the forbidden `ff` version, or all-zero identifiers.
    pub fn from_traceparent(header: &str) -> Option<Self> {
        let mut parts = header.trim().split('-');
        let version = parts.next()?;
        let trace_id = parts.next()?;
        let span_id = parts.next()?;
        let flags = parts.next()?;

        let version: [u8; 1] = from_hex(version)?;
        if version[0] == 0xff || (version[0] == 0 && parts.next().is_some()) {
            return None;
        }

        let trace_id: [u8; 16] = from_hex(trace_id)?;
        let span_id: [u8; 8] = from_hex(span_id)?;
        let flags: [u8; 1] = from_hex(flags)?;
        if trace_id == [0; 16] || span_id == [0; 8] {
            return None;
        }

        Some(Self {
            trace_id: TraceId(trace_id),
            span_id: SpanId(span_id),
            sampled: flags[0] & 0x01 == 0x01,
        })
    }

    pub fn to_traceparent(&self) -> String {
        format!(
            "00-{}-{}-{:02x}",
            self.trace_id,
            self.span_id,
            u8::from(self.sampled)
        )
    }
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn from_hex<const N: usize>(s: &str) -> Option<[u8; N]> {
    if s.len() != N * 2 || !s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b)) {
        return None;
    }
    let mut out = [0u8; N];
    for (i, byte) in out.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16).ok()?;
    }
    Some(out)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "code", content = "message", rename_all = "snake_case")]
pub enum SpanStatus {
    Unset,
    Ok,
    Error(String),
}

/// Creates spans that are exported through the traces pipeline.
#[derive(Debug, Clone)]
pub struct Tracer {
    sender: RecordSender,
}

impl Tracer {
    pub fn new(sender: RecordSender) -> Self {
        Self { sender }
    }

    /// Start a root span.
    pub fn start(&self, name: impl Into<String>) -> Span {
        self.start_with_parent(name, None)
    }

    /// Start a span under `parent`, or a root span when there is none.
    pub fn start_with_parent(&self, name: impl Into<String>, parent: Option<&SpanContext>) -> Span {
        let (context, parent_span_id) = match parent {
            Some(parent) => (parent.child(), Some(parent.span_id)),
            None => (SpanContext::new_root(), None),
        };

        Span {
            sender: self.sender.clone(),
            name: name.into(),
            context,
            parent_span_id,
            start_time: SystemTime::now(),
            started: Instant::now(),
            attributes: BTreeMap::new(),
            status: SpanStatus::Unset,
            ended: false,
        }
    }
}

/// A timed operation. Exported when ended or dropped.
#[derive(Debug)]
pub struct Span {
    sender: RecordSender,
    name: String,
    context: SpanContext,
    parent_span_id: Option<SpanId>,
    start_time: SystemTime,
    started: Instant,
    attributes: BTreeMap<String, Value>,
    status: SpanStatus,
    ended: bool,
}

#[derive(Serialize)]
struct SpanRecord<'a> {
    trace_id: String,
    span_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    parent_span_id: Option<String>,
    name: &'a str,
    start_time_unix_nano: u64,
    end_time_unix_nano: u64,
    attributes: &'a BTreeMap<String, Value>,
    status: &'a SpanStatus,
}

impl Span {
    pub fn context(&self) -> &SpanContext {
        &self.context
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.attributes.insert(key.into(), value.into());
    }

    pub fn set_status(&mut self, status: SpanStatus) {
        self.status = status;
    }

    pub fn record_error(&mut self, message: impl Into<String>) {
        self.status = SpanStatus::Error(message.into());
    }

    pub fn end(mut self) {
        self.finish();
    }

    fn finish(&mut self) {
        if self.ended {
            return;
        }
        self.ended = true;
        if !self.context.sampled {
            return;
        }

        let start = unix_nanos(self.start_time);
        let record = SpanRecord {
            trace_id: self.context.trace_id.to_string(),
            span_id: self.context.span_id.to_string(),
            parent_span_id: self.parent_span_id.map(|id| id.to_string()),
            name: &self.name,
            start_time_unix_nano: start,
            end_time_unix_nano: start + self.started.elapsed().as_nanos() as u64,
            attributes: &self.attributes,
            status: &self.status,
        };

        match serde_json::to_value(&record) {
            Ok(value) => {
                self.sender.offer(value);
            }
            Err(e) => tracing::debug!(error = %e, span = %self.name, "Span could not be encoded"),
        }
    }
}

impl Drop for Span {
    fn drop(&mut self) {
        self.finish();
    }
}

fn unix_nanos(at: SystemTime) -> u64 {
    at.duration_since(UNIX_EPOCH).unwrap_or_default().as_nanos() as u64
}
