//! One operator-initiated provisioning run, start to finish
//!
//! A session checks the start gate, assigns serial numbers, takes the ports
//! away from discovery and runs the orchestrator on its own task. Whatever
//! happens after the ports are taken, discovery is resumed and `RunFinished`
//! is emitted exactly once.

use cu_detect::arbiter::PortArbiter;
use cu_detect::events::EventSink;
use cu_detect::link::PortConnector;
use tracing::{error, info, warn};

use crate::assignment::assign_serial_numbers;
use crate::error::{OrchestratorError, SessionError};
use crate::gate::StartGate;
use crate::orchestrator::{Orchestrator, ProvisioningRun, RunReport};
use crate::settings::ProvisioningSettings;

/// Warning shown before any command is sent
pub const DO_NOT_DISCONNECT: &str =
    "Do not close the program or disconnect any device until provisioning has finished";

/// Runs provisioning sessions against the shared ports
pub struct ProvisioningSession<C, G> {
    orchestrator: Orchestrator<C>,
    gate: G,
    arbiter: PortArbiter,
}

impl<C, G> ProvisioningSession<C, G>
where
    C: PortConnector,
    G: StartGate,
{
    pub fn new(orchestrator: Orchestrator<C>, gate: G, arbiter: PortArbiter) -> Self {
        Self {
            orchestrator,
            gate,
            arbiter,
        }
    }

    fn events(&self) -> &EventSink {
        self.orchestrator.events()
    }

    /// Run `devices` (in selection order) with `settings`
    pub async fn start(
        &self,
        devices: Vec<String>,
        settings: ProvisioningSettings,
    ) -> Result<RunReport, SessionError> {
        let events = self.events().clone();

        let verdict = self.gate.check_start_allowed();
        if !verdict.allowed {
            warn!("Start refused: {}", verdict.message);
            events.result_line(verdict.message.clone());
            return Err(SessionError::StartDenied(verdict.message));
        }

        if devices.is_empty() {
            warn!("Start requested with no devices selected");
            events.result_line(SessionError::NoDevicesSelected.to_string());
            return Err(SessionError::NoDevicesSelected);
        }

        info!("Starting run on {:?} ({})", devices, settings);
        let assignments = assign_serial_numbers(&devices);
        for assignment in &assignments {
            events.result_line(format!(
                "New serial number for {}: {}",
                assignment.port, assignment.serial_number
            ));
        }
        let run = ProvisioningRun::new(devices, settings, assignments)?;

        let access = self.arbiter.suspend().await;
        events.result_line(DO_NOT_DISCONNECT);
        events.progress(0);

        let orchestrator = self.orchestrator.clone();
        let error_log = run.error_log();
        let worker = tokio::spawn(async move { orchestrator.execute(run).await });

        let result = match worker.await {
            Ok(run) => Ok(RunReport::from_run(&run)),
            Err(e) => {
                let err = OrchestratorError::WorkerAborted(e.to_string());
                error!("{}", err);
                events.task_label(crate::orchestrator::COMPLETED_LABEL);
                events.result_line(err.to_string());
                let mut errors = error_log.snapshot();
                errors.push(err.to_string());
                events.errors_aggregated(errors);
                Err(SessionError::Orchestrator(err))
            }
        };

        events.run_finished();
        drop(access);
        result
    }
}
