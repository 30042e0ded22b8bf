//! Bridge from `tracing` events to the logs pipeline.
//!
//! The layer is installed with the subscriber at startup, before any pipeline
//! exists. Until a pipeline attaches its sender, events pass through untouched.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use arc_swap::ArcSwapOption;
use serde_json::{json, Value};
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

use crate::telemetry::pipeline::RecordSender;

// Events from these targets are never forwarded; exporting them would feed
// the pipeline its own output.
const SKIPPED_TARGETS: &[&str] = &["runway::telemetry", "reqwest", "hyper", "h2"];

/// `tracing` layer that forwards events to the logs pipeline once attached.
#[derive(Clone, Default)]
pub struct LogBridge {
    sink: Arc<ArcSwapOption<RecordSender>>,
}

impl fmt::Debug for LogBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogBridge")
            .field("attached", &self.is_attached())
            .finish()
    }
}

impl LogBridge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, sender: RecordSender) {
        self.sink.store(Some(Arc::new(sender)));
    }

    pub fn detach(&self) {
        self.sink.store(None);
    }

    pub fn is_attached(&self) -> bool {
        self.sink.load().is_some()
    }
}

impl<S: Subscriber> Layer<S> for LogBridge {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let guard = self.sink.load();
        let Some(sender) = Option::as_ref(&guard) else {
            return;
        };

        let meta = event.metadata();
        if SKIPPED_TARGETS.iter().any(|t| meta.target().starts_with(t)) {
            return;
        }

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as u64;

        sender.offer(json!({
            "time_unix_nano": timestamp,
            "severity": meta.level().as_str(),
            "target": meta.target(),
            "body": visitor.message.unwrap_or_default(),
            "attributes": visitor.fields,
        }));
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: Option<String>,
    fields: BTreeMap<String, Value>,
}

impl FieldVisitor {
    fn insert(&mut self, field: &Field, value: Value) {
        if field.name() == "message" {
            self.message = Some(match value {
                Value::String(s) => s,
                other => other.to_string(),
            });
        } else {
            self.fields.insert(field.name().to_string(), value);
        }
    }
}

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert(field, Value::from(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.insert(field, Value::from(value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.insert(field, Value::from(format!("{:?}", value)));
    }
}
