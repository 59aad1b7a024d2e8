//! Forwards tracing events to the supervisor as `{log, Level, Message}`

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

use super::outbound::Notifier;
use crate::protocol::{LogLevel, Notification};

/// Events from the port itself are never forwarded, they would loop
const PORT_TARGET: &str = "bacgate::port";

/// Layer that publishes log records once a [`Notifier`] is attached.
/// Until then, and after detaching, records only reach the other layers.
#[derive(Debug, Clone, Default)]
pub struct PortLogLayer {
    notifier: Arc<Mutex<Option<Notifier>>>,
}

impl PortLogLayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, notifier: Notifier) {
        *self.notifier.lock() = Some(notifier);
    }

    pub fn detach(&self) {
        self.notifier.lock().take();
    }
}

impl<S> Layer<S> for PortLogLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if metadata.target().starts_with(PORT_TARGET) {
            return;
        }

        let guard = self.notifier.lock();
        let Some(notifier) = guard.as_ref() else {
            return;
        };

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        notifier.notify(Notification::Log {
            level: LogLevel::from(metadata.level()),
            message: visitor.finish(),
        });
    }
}

/// Collects the message plus any extra fields as `key=value`
#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: String,
}

impl MessageVisitor {
    fn finish(self) -> String {
        if self.fields.is_empty() {
            self.message
        } else if self.message.is_empty() {
            self.fields
        } else {
            format!("{} {}", self.message, self.fields)
        }
    }
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            self.record_debug(field, &value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message.push_str(&format!("{:?}", value));
        } else {
            if !self.fields.is_empty() {
                self.fields.push(' ');
            }
            self.fields.push_str(&format!("{}={:?}", field.name(), value));
        }
    }
}
