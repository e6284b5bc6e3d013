//! Tracing layer that forwards log records to the event stream as debug lines

use cu_detect::EventSink;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

/// Crates that belong to this project (for filtering)
const PROJECT_CRATES: &[&str] = &["cu_flasher", "cu_protocol", "cu_detect", "cu_provision"];

/// Check whether a tracing target belongs to this project
fn is_project_target(target: &str) -> bool {
    PROJECT_CRATES
        .iter()
        .any(|crate_name| target.starts_with(crate_name))
}

/// Custom tracing layer that turns log records into `DebugLine` events
pub struct DebugLineLayer {
    events: EventSink,
    max_level: Level,
}

impl DebugLineLayer {
    /// Forward project records at `max_level` or more severe
    pub fn new(events: EventSink, max_level: Level) -> Self {
        Self { events, max_level }
    }
}

impl<S: Subscriber> Layer<S> for DebugLineLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        if !is_project_target(meta.target()) || *meta.level() > self.max_level {
            return;
        }

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        self.events.debug_line(format!(
            "{} {}: {}",
            meta.level(),
            simplify_target(meta.target()),
            visitor.message.unwrap_or_default()
        ));
    }
}

/// Visitor to extract the message from tracing fields
#[derive(Default)]
struct MessageVisitor {
    message: Option<String>,
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = Some(format!("{:?}", value));
        }
    }
}

/// Simplify a module path target to its last segment
/// e.g., "cu_detect::probe" -> "probe"
fn simplify_target(target: &str) -> &str {
    target.rsplit("::").next().unwrap_or(target)
}
