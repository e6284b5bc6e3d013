//! Periodic device discovery
//!
//! Each cycle enumerates the visible ports, probes all of them concurrently
//! and reports every probe as it completes, followed by the cycle's target
//! list. Cycles repeat on a fixed delay and are skipped entirely while a
//! provisioning run holds the ports.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::arbiter::PortArbiter;
use crate::error::DetectError;
use crate::events::EventSink;
use crate::link::{LinkConfig, PortConnector};
use crate::probe::DeviceProber;
use crate::scanner::PortSource;

/// Delay between the end of one cycle and the start of the next
pub const DEFAULT_DISCOVERY_INTERVAL: Duration = Duration::from_secs(2);

/// Discovery settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryConfig {
    /// Idle delay between cycles
    pub interval: Duration,
    /// Link settings used by probes
    pub link: LinkConfig,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_DISCOVERY_INTERVAL,
            link: LinkConfig::default(),
        }
    }
}

/// Discovery loop state
pub struct DiscoveryScheduler<S, C> {
    source: Arc<S>,
    prober: Arc<DeviceProber<C>>,
    arbiter: PortArbiter,
    events: EventSink,
    interval: Duration,
    cycle: u64,
    last_seen: Vec<String>,
}

impl<S, C> DiscoveryScheduler<S, C>
where
    S: PortSource,
    C: PortConnector,
{
    pub fn new(
        source: Arc<S>,
        connector: Arc<C>,
        arbiter: PortArbiter,
        events: EventSink,
        config: DiscoveryConfig,
    ) -> Self {
        Self {
            source,
            prober: Arc::new(DeviceProber::new(connector, config.link)),
            arbiter,
            events,
            interval: config.interval,
            cycle: 0,
            last_seen: Vec::new(),
        }
    }

    /// Target devices found by the most recent cycle, sorted
    pub fn last_seen(&self) -> &[String] {
        &self.last_seen
    }

    /// Number of cycles run so far
    pub fn cycles(&self) -> u64 {
        self.cycle
    }

    /// Run one detection cycle
    ///
    /// All probes of the cycle are joined before the consolidated list is
    /// emitted, so nothing from this cycle can land in the next one.
    pub async fn run_cycle(&mut self) -> Result<Vec<String>, DetectError> {
        self.cycle += 1;
        let cycle = self.cycle;
        let ports = self.source.list_ports()?;
        debug!("Cycle {}: probing {} port(s)", cycle, ports.len());

        let mut probes = JoinSet::new();
        for port in ports {
            let prober = Arc::clone(&self.prober);
            probes.spawn(async move { prober.probe(&port).await });
        }

        let mut targets = Vec::new();
        while let Some(joined) = probes.join_next().await {
            match joined {
                Ok(result) => {
                    self.events.device_found(&result.port, result.is_target);
                    if result.is_target {
                        targets.push(result.port);
                    }
                }
                Err(e) => warn!("Cycle {}: probe task failed: {}", cycle, e),
            }
        }

        targets.sort();
        if targets != self.last_seen {
            info!("Cycle {}: {} device(s) found {:?}", cycle, targets.len(), targets);
        }
        self.events.device_list_finalized(targets.clone());
        self.last_seen = targets.clone();
        Ok(targets)
    }

    /// Run cycles until `shutdown` flips to true or its sender is dropped
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!("Discovery started (interval {:?})", self.interval);

        loop {
            if *shutdown.borrow() {
                break;
            }

            let permit = match self.arbiter.try_begin_cycle().await {
                Some(permit) => permit,
                None => {
                    debug!("Discovery suspended, waiting");
                    let stop = tokio::select! {
                        _ = self.arbiter.wait_resumed() => false,
                        changed = shutdown.changed() => changed.is_err(),
                    };
                    if stop {
                        break;
                    }
                    continue;
                }
            };

            if let Err(e) = self.run_cycle().await {
                warn!("Discovery cycle failed: {}", e);
            }
            drop(permit);

            // Suspension ends the idle delay early
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = self.arbiter.wait_suspended() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("Discovery stopped after {} cycle(s)", self.cycle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{drain, FlasherEvent};
    use crate::testing::{fast_config, ScriptedConnector};
    use std::sync::Mutex;

    const TARGET: [u8; 6] = [0x11, 0xEF, 0x03, 0xFB, 0x00, 0x00];

    #[derive(Default)]
    struct FixedPorts(Mutex<Vec<String>>);

    impl FixedPorts {
        fn new(ports: &[&str]) -> Self {
            Self(Mutex::new(ports.iter().map(|p| p.to_string()).collect()))
        }

        fn set(&self, ports: &[&str]) {
            *self.0.lock().unwrap() = ports.iter().map(|p| p.to_string()).collect();
        }
    }

    impl PortSource for FixedPorts {
        fn list_ports(&self) -> Result<Vec<String>, DetectError> {
            Ok(self.0.lock().unwrap().clone())
        }
    }

    fn config() -> DiscoveryConfig {
        DiscoveryConfig {
            interval: Duration::from_millis(10),
            link: fast_config(),
        }
    }

    fn connector() -> ScriptedConnector {
        ScriptedConnector::new()
            .reply("/dev/ttyACM1", &TARGET)
            .reply("/dev/ttyACM0", &TARGET)
            .reply("/dev/ttyUSB0", &[0x55, 0xAA, 0x00, 0x00, 0x00, 0x00])
    }

    #[tokio::test]
    async fn test_cycle_reports_each_probe_then_list() {
        let source = Arc::new(FixedPorts::new(&[
            "/dev/ttyACM1",
            "/dev/ttyUSB0",
            "/dev/ttyACM0",
            "/dev/ttyS9",
        ]));
        let (sink, mut rx) = EventSink::channel();
        let mut scheduler =
            DiscoveryScheduler::new(source, Arc::new(connector()), PortArbiter::new(), sink, config());

        let targets = scheduler.run_cycle().await.unwrap();
        assert_eq!(targets, vec!["/dev/ttyACM0", "/dev/ttyACM1"]);

        let events = drain(&mut rx);
        assert_eq!(events.len(), 5);
        let found: Vec<_> = events[..4]
            .iter()
            .filter(|e| matches!(e, FlasherEvent::DeviceFound { is_target: true, .. }))
            .collect();
        assert_eq!(found.len(), 2);
        assert_eq!(
            events[4],
            FlasherEvent::DeviceListFinalized(vec![
                "/dev/ttyACM0".to_string(),
                "/dev/ttyACM1".to_string()
            ])
        );
        assert_eq!(scheduler.last_seen(), ["/dev/ttyACM0", "/dev/ttyACM1"]);
    }

    #[tokio::test]
    async fn test_cycles_are_isolated() {
        let source = Arc::new(FixedPorts::new(&["/dev/ttyACM0", "/dev/ttyACM1"]));
        let (sink, mut rx) = EventSink::channel();
        let mut scheduler = DiscoveryScheduler::new(
            Arc::clone(&source),
            Arc::new(connector()),
            PortArbiter::new(),
            sink,
            config(),
        );

        scheduler.run_cycle().await.unwrap();
        drain(&mut rx);

        source.set(&["/dev/ttyACM1"]);
        let targets = scheduler.run_cycle().await.unwrap();
        assert_eq!(targets, vec!["/dev/ttyACM1"]);

        let events = drain(&mut rx);
        assert_eq!(
            events,
            vec![
                FlasherEvent::DeviceFound {
                    port: "/dev/ttyACM1".to_string(),
                    is_target: true
                },
                FlasherEvent::DeviceListFinalized(vec!["/dev/ttyACM1".to_string()]),
            ]
        );
        assert_eq!(scheduler.cycles(), 2);
    }

    #[tokio::test]
    async fn test_no_cycle_while_suspended() {
        let source = Arc::new(FixedPorts::new(&["/dev/ttyACM0"]));
        let connector = connector();
        let arbiter = PortArbiter::new();
        let (sink, mut rx) = EventSink::channel();
        let scheduler = DiscoveryScheduler::new(
            source,
            Arc::new(connector.clone()),
            arbiter.clone(),
            sink,
            config(),
        );

        let access = arbiter.suspend().await;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(scheduler.run(shutdown_rx));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(drain(&mut rx).is_empty());
        assert!(connector.opened().is_empty());

        drop(access);
        let event = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(event.is_discovery());

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_fresh_cycle_after_resume_skips_interval() {
        let source = Arc::new(FixedPorts::new(&["/dev/ttyACM0"]));
        let arbiter = PortArbiter::new();
        let (sink, mut rx) = EventSink::channel();
        let scheduler = DiscoveryScheduler::new(
            source,
            Arc::new(connector()),
            arbiter.clone(),
            sink,
            DiscoveryConfig {
                interval: Duration::from_secs(60),
                link: fast_config(),
            },
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(scheduler.run(shutdown_rx));

        async fn next_list(rx: &mut tokio::sync::mpsc::UnboundedReceiver<FlasherEvent>) {
            loop {
                let event = tokio::time::timeout(Duration::from_secs(1), rx.recv())
                    .await
                    .unwrap()
                    .unwrap();
                if matches!(event, FlasherEvent::DeviceListFinalized(_)) {
                    return;
                }
            }
        }

        // First cycle, then the scheduler idles on its long interval
        next_list(&mut rx).await;
        let access = arbiter.suspend().await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        drop(access);
        next_list(&mut rx).await;

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_run_repeats_cycles() {
        let source = Arc::new(FixedPorts::new(&["/dev/ttyACM0"]));
        let (sink, mut rx) = EventSink::channel();
        let scheduler =
            DiscoveryScheduler::new(source, Arc::new(connector()), PortArbiter::new(), sink, config());

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(scheduler.run(shutdown_rx));

        let mut lists = 0;
        while lists < 2 {
            let event = tokio::time::timeout(Duration::from_secs(1), rx.recv())
                .await
                .unwrap()
                .unwrap();
            if matches!(event, FlasherEvent::DeviceListFinalized(_)) {
                lists += 1;
            }
        }

        drop(shutdown_tx);
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
