//! Unified event stream for discovery and provisioning
//!
//! Every component that reports to the operator receives an [`EventSink`]
//! explicitly. The presentation layer owns the receiving end and sees all
//! events (discovery results, run progress, debug lines) in one ordered
//! stream.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Events emitted towards the presentation layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlasherEvent {
    // -------------------------------------------------------------------------
    // Provisioning run events
    // -------------------------------------------------------------------------
    /// Overall run progress, 0..=100
    ProgressPercent(u8),

    /// Label of the phase about to start
    CurrentTaskLabel(String),

    /// Operator-facing result line
    ResultLine(String),

    /// All errors recorded during a run, emitted once at the end
    ErrorsAggregated(Vec<String>),

    /// The run is over (emitted exactly once per run)
    RunFinished,

    // -------------------------------------------------------------------------
    // Discovery events
    // -------------------------------------------------------------------------
    /// A probe finished for one port
    DeviceFound {
        /// Port address
        port: String,
        /// Whether the port hosts a target device
        is_target: bool,
    },

    /// Consolidated target list at the end of a detection cycle
    DeviceListFinalized(Vec<String>),

    // -------------------------------------------------------------------------
    // Diagnostics
    // -------------------------------------------------------------------------
    /// Free-form debug line (frame dumps, log records)
    DebugLine(String),
}

impl FlasherEvent {
    /// Check if this event comes from discovery
    pub fn is_discovery(&self) -> bool {
        matches!(
            self,
            FlasherEvent::DeviceFound { .. } | FlasherEvent::DeviceListFinalized(_)
        )
    }

    /// Check if this event belongs to a provisioning run
    pub fn is_run(&self) -> bool {
        matches!(
            self,
            FlasherEvent::ProgressPercent(_)
                | FlasherEvent::CurrentTaskLabel(_)
                | FlasherEvent::ResultLine(_)
                | FlasherEvent::ErrorsAggregated(_)
                | FlasherEvent::RunFinished
        )
    }
}

/// Sending half of the event stream
///
/// Cloning is cheap; all clones feed the same receiver. Events sent after the
/// receiver is gone are dropped.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<FlasherEvent>,
}

impl EventSink {
    /// Wrap an existing sender
    pub fn new(tx: mpsc::UnboundedSender<FlasherEvent>) -> Self {
        Self { tx }
    }

    /// Create a sink and the receiver that observes it
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<FlasherEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Emit an event
    pub fn emit(&self, event: FlasherEvent) {
        let _ = self.tx.send(event);
    }

    /// Emit run progress
    pub fn progress(&self, percent: u8) {
        self.emit(FlasherEvent::ProgressPercent(percent));
    }

    /// Emit the label of the phase about to start
    pub fn task_label(&self, label: impl Into<String>) {
        self.emit(FlasherEvent::CurrentTaskLabel(label.into()));
    }

    /// Emit an operator-facing result line
    pub fn result_line(&self, line: impl Into<String>) {
        self.emit(FlasherEvent::ResultLine(line.into()));
    }

    /// Emit a debug line
    pub fn debug_line(&self, line: impl Into<String>) {
        self.emit(FlasherEvent::DebugLine(line.into()));
    }

    /// Emit the aggregated error list
    pub fn errors_aggregated(&self, errors: Vec<String>) {
        self.emit(FlasherEvent::ErrorsAggregated(errors));
    }

    /// Emit a single probe outcome
    pub fn device_found(&self, port: &str, is_target: bool) {
        self.emit(FlasherEvent::DeviceFound {
            port: port.to_string(),
            is_target,
        });
    }

    /// Emit the consolidated device list of a cycle
    pub fn device_list_finalized(&self, ports: Vec<String>) {
        self.emit(FlasherEvent::DeviceListFinalized(ports));
    }

    /// Emit the end-of-run marker
    pub fn run_finished(&self) {
        self.emit(FlasherEvent::RunFinished);
    }
}

/// Collect every event currently queued on `rx`
pub fn drain(rx: &mut mpsc::UnboundedReceiver<FlasherEvent>) -> Vec<FlasherEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
