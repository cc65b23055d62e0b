//! Tracing layer that mirrors log events into an activity feed.
//!
//! Front-ends subscribe to the receiving end of the channel to render an
//! activity panel (agent sessions starting, scans running, processes exiting)
//! without scraping log files.

use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;

/// One log event as shown in the activity feed.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ActivityEntry {
    /// Module path that emitted the event (e.g. "scribe_interaction::bridge")
    pub target: String,
    pub level: String,
    pub message: String,
    /// Structured fields recorded on the event
    pub fields: HashMap<String, Value>,
    pub timestamp: String,
}

/// Forwards events at or above `min_level` whose target starts with one of
/// the configured prefixes.
pub struct ActivityLogLayer {
    sender: mpsc::UnboundedSender<ActivityEntry>,
    min_level: Level,
    target_prefixes: Vec<String>,
}

impl ActivityLogLayer {
    pub fn new(sender: mpsc::UnboundedSender<ActivityEntry>) -> Self {
        Self {
            sender,
            min_level: Level::INFO,
            target_prefixes: vec!["scribe".to_string()],
        }
    }

    /// Creates the layer together with its receiving end.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ActivityEntry>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn with_min_level(mut self, level: Level) -> Self {
        self.min_level = level;
        self
    }

    pub fn with_targets<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.target_prefixes = prefixes.into_iter().map(Into::into).collect();
        self
    }

    fn accepts(&self, target: &str, level: &Level) -> bool {
        // Level ordering: TRACE > DEBUG > INFO > WARN > ERROR
        *level <= self.min_level && self.target_prefixes.iter().any(|p| target.starts_with(p.as_str()))
    }
}

impl<S> Layer<S> for ActivityLogLayer
where
    S: Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if !self.accepts(metadata.target(), metadata.level()) {
            return;
        }

        let mut fields = HashMap::new();
        event.record(&mut FieldVisitor(&mut fields));

        let message = fields
            .remove("message")
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();

        // Receiver gone means nobody is watching the feed.
        let _ = self.sender.send(ActivityEntry {
            target: metadata.target().to_string(),
            level: metadata.level().to_string(),
            message,
            fields,
            timestamp: chrono::Utc::now().to_rfc3339(),
        });
    }
}

struct FieldVisitor<'a>(&'a mut HashMap<String, Value>);

impl tracing::field::Visit for FieldVisitor<'_> {
    fn record_f64(&mut self, field: &tracing::field::Field, value: f64) {
        self.0.insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_i64(&mut self, field: &tracing::field::Field, value: i64) {
        self.0.insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        self.0.insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_bool(&mut self, field: &tracing::field::Field, value: bool) {
        self.0.insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.0.insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        self.0
            .insert(field.name().to_string(), serde_json::json!(format!("{:?}", value)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::layer::SubscriberExt;

    #[test]
    fn test_forwards_matching_events_with_fields() {
        let (layer, mut rx) = ActivityLogLayer::channel();
        let subscriber = tracing_subscriber::registry().with(layer);

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(target: "scribe_execution::supervisor", pid = 42u64, "[Supervisor] spawned");
            tracing::debug!(target: "scribe_execution::supervisor", "too verbose");
            tracing::info!(target: "hyper::client", "not ours");
        });

        let entry = rx.try_recv().unwrap();
        assert_eq!(entry.message, "[Supervisor] spawned");
        assert_eq!(entry.level, "INFO");
        assert_eq!(entry.fields["pid"], 42);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_dropped_receiver_is_ignored() {
        let (layer, rx) = ActivityLogLayer::channel();
        drop(rx);
        let subscriber = tracing_subscriber::registry().with(layer);
        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(target: "scribe_core", "still fine");
        });
    }
}
