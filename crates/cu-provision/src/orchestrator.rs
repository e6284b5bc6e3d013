//! Provisioning run execution
//!
//! Devices are processed one at a time, in selection order. A failed command
//! is recorded and the run moves on; only a failed connection skips the rest
//! of that device. The step total is fixed when the run is created, so
//! skipped devices leave the final percentage short of 100.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use cu_detect::error::CommandError;
use cu_detect::events::EventSink;
use cu_detect::link::{DeviceLink, LinkConfig, PortConnector};
use cu_protocol::catalog::STATUS_ACCEPTED;
use cu_protocol::{to_hex, validate_response};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::assignment::SerialNumberAssignment;
use crate::error::OrchestratorError;
use crate::plan::{plan_steps, total_steps, Phase, TaskStep};
use crate::settings::ProvisioningSettings;

/// Label emitted once every device has been processed
pub const COMPLETED_LABEL: &str = "Current step: completed";

/// Errors of one run, readable by the session even if the worker dies
#[derive(Debug, Clone, Default)]
pub struct ErrorLog(Arc<Mutex<Vec<String>>>);

impl ErrorLog {
    fn entries(&self) -> MutexGuard<'_, Vec<String>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(&self, message: String) {
        self.entries().push(message);
    }

    /// Errors recorded so far, in order
    pub fn snapshot(&self) -> Vec<String> {
        self.entries().clone()
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

/// State of one provisioning run
#[derive(Debug)]
pub struct ProvisioningRun {
    devices: Vec<String>,
    settings: ProvisioningSettings,
    plan: Vec<TaskStep>,
    assignments: HashMap<String, SerialNumberAssignment>,
    completed_steps: usize,
    total_steps: usize,
    errors: ErrorLog,
    finished: bool,
}

impl ProvisioningRun {
    /// Create a run for `devices` in selection order
    ///
    /// With firmware activation enabled every device needs an assignment.
    pub fn new(
        devices: Vec<String>,
        settings: ProvisioningSettings,
        assignments: Vec<SerialNumberAssignment>,
    ) -> Result<Self, OrchestratorError> {
        let assignments: HashMap<_, _> = assignments
            .into_iter()
            .map(|a| (a.port.clone(), a))
            .collect();

        if settings.activate_firmware {
            if let Some(port) = devices.iter().find(|p| !assignments.contains_key(*p)) {
                return Err(OrchestratorError::MissingAssignment(port.clone()));
            }
        }

        Ok(Self {
            total_steps: total_steps(devices.len(), &settings),
            plan: plan_steps(&settings),
            devices,
            settings,
            assignments,
            completed_steps: 0,
            errors: ErrorLog::default(),
            finished: false,
        })
    }

    pub fn devices(&self) -> &[String] {
        &self.devices
    }

    pub fn settings(&self) -> &ProvisioningSettings {
        &self.settings
    }

    /// Steps executed for every device
    pub fn plan(&self) -> &[TaskStep] {
        &self.plan
    }

    pub fn assignment(&self, port: &str) -> Option<&SerialNumberAssignment> {
        self.assignments.get(port)
    }

    pub fn completed_steps(&self) -> usize {
        self.completed_steps
    }

    /// Denominator for progress, fixed at creation
    pub fn total_steps(&self) -> usize {
        self.total_steps
    }

    /// Errors recorded so far, in order
    pub fn errors(&self) -> Vec<String> {
        self.errors.snapshot()
    }

    /// Handle on the error list that outlives the run
    pub fn error_log(&self) -> ErrorLog {
        self.errors.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Progress as `floor(completed * 100 / total)`
    pub fn percent(&self) -> u8 {
        if self.total_steps == 0 {
            return 100;
        }
        let percent = self.completed_steps.min(self.total_steps) * 100 / self.total_steps;
        percent as u8
    }

    fn record_error(&mut self, events: &EventSink, message: String) {
        warn!("{}", message);
        events.result_line(message.clone());
        self.errors.push(message);
    }

    fn step_done(&mut self, events: &EventSink) {
        self.completed_steps += 1;
        events.progress(self.percent());
    }

    /// Mark the run finished
    ///
    /// Emits the completion label and, if anything failed, the aggregated
    /// error list. Returns `false` and emits nothing when already finished.
    pub fn finish(&mut self, events: &EventSink) -> bool {
        if self.finished {
            debug!("Run already finished, ignoring");
            return false;
        }
        self.finished = true;

        events.task_label(COMPLETED_LABEL);
        if !self.errors.is_empty() {
            events.errors_aggregated(self.errors.snapshot());
        }
        info!(
            "Run finished: {}/{} steps, {} error(s)",
            self.completed_steps,
            self.total_steps,
            self.errors.len()
        );
        true
    }
}

/// Summary of a finished run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub completed_steps: usize,
    pub total_steps: usize,
    pub errors: Vec<String>,
    pub assignments: Vec<SerialNumberAssignment>,
}

impl RunReport {
    pub fn from_run(run: &ProvisioningRun) -> Self {
        Self {
            completed_steps: run.completed_steps,
            total_steps: run.total_steps,
            errors: run.errors.snapshot(),
            assignments: run
                .devices
                .iter()
                .filter_map(|port| run.assignments.get(port).cloned())
                .collect(),
        }
    }

    /// Whether every step succeeded
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.completed_steps == self.total_steps
    }
}

/// Drives the command sequence of a run
pub struct Orchestrator<C> {
    connector: Arc<C>,
    link: LinkConfig,
    events: EventSink,
}

impl<C> Clone for Orchestrator<C> {
    fn clone(&self) -> Self {
        Self {
            connector: Arc::clone(&self.connector),
            link: self.link.clone(),
            events: self.events.clone(),
        }
    }
}

impl<C: PortConnector> Orchestrator<C> {
    pub fn new(connector: Arc<C>, link: LinkConfig, events: EventSink) -> Self {
        Self {
            connector,
            link,
            events,
        }
    }

    pub fn events(&self) -> &EventSink {
        &self.events
    }

    /// Execute every device's plan, then finish the run
    pub async fn execute(&self, mut run: ProvisioningRun) -> ProvisioningRun {
        info!(
            "Provisioning {} device(s), {} steps total ({})",
            run.devices.len(),
            run.total_steps,
            run.settings
        );

        let devices = run.devices.clone();
        for port in &devices {
            self.provision_device(&mut run, port).await;
        }

        run.finish(&self.events);
        run
    }

    async fn provision_device(&self, run: &mut ProvisioningRun, port: &str) {
        info!("Provisioning {}", port);
        let mut link = match DeviceLink::connect(self.connector.as_ref(), port, &self.link) {
            Ok(link) => link,
            Err(e) => {
                self.events.debug_line(format!("{} connection failed: {}", port, e.reason));
                run.record_error(&self.events, format!("{} connection failed: {}", port, e.reason));
                return;
            }
        };
        self.events.debug_line(format!("{} connected", port));

        let plan = run.plan.clone();
        let mut phase: Option<Phase> = None;
        for step in plan {
            if phase != Some(step.phase()) {
                phase = Some(step.phase());
                self.events.task_label(step.phase().label(port));
            }
            self.execute_step(run, &mut link, port, step).await;
            run.step_done(&self.events);
        }

        link.close();
    }

    async fn execute_step(
        &self,
        run: &mut ProvisioningRun,
        link: &mut DeviceLink<C::Io>,
        port: &str,
        step: TaskStep,
    ) {
        let frame: Vec<u8> = match step.fixed_frame() {
            Some(frame) => frame.to_vec(),
            None => match run.assignment(port) {
                Some(assignment) => assignment.frame.clone(),
                None => {
                    let e = OrchestratorError::MissingAssignment(port.to_string());
                    run.record_error(&self.events, format!("{} {} failed: {}", port, step.describe(), e));
                    return;
                }
            },
        };

        let outcome = match link.send_command(&frame).await {
            Ok(response) if response.is_empty() => Err(CommandError::NoResponse(port.to_string())),
            other => other,
        };

        match outcome {
            Ok(response) => {
                self.events.debug_line(format!(
                    "{} sent {}: {} reply: {}",
                    port,
                    step.describe(),
                    to_hex(&frame),
                    to_hex(&response)
                ));
                if step.is_status_read() {
                    self.report_status(port, step, &frame, &response);
                } else {
                    self.events
                        .result_line(format!("{} {} succeeded", port, step.describe()));
                }
            }
            Err(e) => {
                self.events.debug_line(format!(
                    "{} sent {}: {} failed: {}",
                    port,
                    step.describe(),
                    to_hex(&frame),
                    e
                ));
                run.record_error(&self.events, format!("{} {} failed: {}", port, step.describe(), e));
            }
        }
    }

    /// Status replies are judged but never counted as errors
    fn report_status(&self, port: &str, step: TaskStep, frame: &[u8], response: &[u8]) {
        let line = match validate_response(response, frame[2], frame[3], &STATUS_ACCEPTED) {
            Ok(status) => format!(
                "{} {} succeeded (status 0x{:04X}): {}",
                port,
                step.describe(),
                status,
                to_hex(response)
            ),
            Err(e) => format!(
                "{} {} returned an unexpected reply ({}): {}",
                port,
                step.describe(),
                e,
                to_hex(response)
            ),
        };
        self.events.result_line(line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Toggle;
    use cu_detect::events::{drain, FlasherEvent};

    fn settings() -> ProvisioningSettings {
        ProvisioningSettings {
            activate_firmware: true,
            low_freq: Toggle::On,
            ..Default::default()
        }
    }

    #[test]
    fn test_run_total_fixed_at_creation() {
        let devices = vec!["/dev/ttyACM0".to_string(), "/dev/ttyACM1".to_string()];
        let assignments = crate::assignment::assign_serial_numbers(&devices);
        let run = ProvisioningRun::new(devices, settings(), assignments).unwrap();

        assert_eq!(run.total_steps(), 10);
        assert_eq!(run.completed_steps(), 0);
        assert_eq!(run.percent(), 0);
        assert_eq!(run.plan().len(), 5);
    }

    #[test]
    fn test_missing_assignment_rejected() {
        let devices = vec!["/dev/ttyACM0".to_string()];
        assert_eq!(
            ProvisioningRun::new(devices.clone(), settings(), Vec::new()).err(),
            Some(OrchestratorError::MissingAssignment("/dev/ttyACM0".to_string()))
        );

        // Without activation no serial number is sent
        assert!(ProvisioningRun::new(devices, ProvisioningSettings::default(), Vec::new()).is_ok());
    }

    #[test]
    fn test_percent_floors() {
        let devices: Vec<String> = (0..3).map(|i| format!("/dev/ttyACM{}", i)).collect();
        let mut run = ProvisioningRun::new(devices, ProvisioningSettings::default(), Vec::new()).unwrap();
        let (sink, _rx) = EventSink::channel();

        assert_eq!(run.total_steps(), 6);
        run.step_done(&sink);
        assert_eq!(run.percent(), 16);
        run.step_done(&sink);
        assert_eq!(run.percent(), 33);
    }

    #[test]
    fn test_finish_is_idempotent() {
        let mut run =
            ProvisioningRun::new(vec!["/dev/ttyACM0".to_string()], ProvisioningSettings::default(), Vec::new())
                .unwrap();
        let (sink, mut rx) = EventSink::channel();
        run.record_error(&sink, "boom".to_string());
        drain(&mut rx);

        assert!(run.finish(&sink));
        assert_eq!(
            drain(&mut rx),
            vec![
                FlasherEvent::CurrentTaskLabel(COMPLETED_LABEL.to_string()),
                FlasherEvent::ErrorsAggregated(vec!["boom".to_string()]),
            ]
        );

        assert!(!run.finish(&sink));
        assert!(drain(&mut rx).is_empty());
        assert!(run.is_finished());
    }
    #[test]
    fn test_error_log_outlives_run() {
        let mut run =
            ProvisioningRun::new(vec!["/dev/ttyACM0".to_string()], ProvisioningSettings::default(), Vec::new())
                .unwrap();
        let log = run.error_log();
        let (sink, _rx) = EventSink::channel();

        run.record_error(&sink, "/dev/ttyACM0 connection failed: unplugged".to_string());
        drop(run);

        assert_eq!(log.snapshot(), vec!["/dev/ttyACM0 connection failed: unplugged"]);
        assert_eq!(log.len(), 1);
    }
}
