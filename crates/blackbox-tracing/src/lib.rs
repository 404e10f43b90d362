//! # blackbox-tracing
//!
//! A [`tracing_subscriber::Layer`] that forwards tracing events into a
//! blackbox [`LogDistributor`], so instrumented code shows up in bug-report
//! history without logging twice.
//!
//! The event's `message` field becomes the log text, every other field
//! becomes a string parameter, and `ERROR`-level events map to
//! [`LogKind::Error`]. Events emitted by the blackbox crates themselves are
//! skipped to prevent feedback loops.
//!
//! ## Example
//!
//! ```rust,ignore
//! use blackbox_core::default_distributor;
//! use blackbox_tracing::DistributorLayer;
//! use tracing_subscriber::layer::SubscriberExt;
//! use tracing_subscriber::util::SubscriberInitExt;
//!
//! tracing_subscriber::registry()
//!     .with(DistributorLayer::new(default_distributor()))
//!     .init();
//!
//! tracing::info!(user = "amy", "logged in");
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use blackbox_core::{LogDistributor, LogKind};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

/// Layer that turns tracing events into distributed log messages.
///
/// Messages go through the distributor's convenience path, so a configured
/// message factory applies to them like any other logged message.
pub struct DistributorLayer {
    distributor: Arc<LogDistributor>,
}

impl DistributorLayer {
    /// Forward events into `distributor`.
    pub fn new(distributor: Arc<LogDistributor>) -> Self {
        Self { distributor }
    }
}

impl<S> Layer<S> for DistributorLayer
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        // The facility's own diagnostics and console echoes must not come
        // back around through the distributor.
        if metadata.target().starts_with("blackbox") {
            return;
        }

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        let kind = if *metadata.level() == Level::ERROR {
            LogKind::Error
        } else {
            LogKind::Default
        };
        let mut parameters = visitor.parameters;
        parameters.insert("level".to_string(), metadata.level().to_string());
        parameters.insert("target".to_string(), metadata.target().to_string());

        self.distributor
            .log_detailed(visitor.text.unwrap_or_default(), None, kind, parameters);
    }
}

/// Collects an event's `message` field as text and the rest as parameters.
#[derive(Default)]
struct MessageVisitor {
    text: Option<String>,
    parameters: BTreeMap<String, String>,
}

impl MessageVisitor {
    fn record(&mut self, field: &Field, value: String) {
        if field.name() == "message" {
            self.text = Some(value);
        } else {
            self.parameters.insert(field.name().to_string(), value);
        }
    }
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.record(field, value.to_string());
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.record(field, value.to_string());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.record(field, value.to_string());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.record(field, value.to_string());
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.record(field, value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.record(field, format!("{:?}", value));
    }
}
