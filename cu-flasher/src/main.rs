//! Chameleon Ultra Flasher
//!
//! A console application that detects Chameleon Ultra devices on the serial
//! ports and provisions the selected ones: firmware activation with a fresh
//! serial number, card and light cycling modes, and a final status read.

mod console;
mod debug_layer;
mod settings;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use console::{apply_setting, render_event, Command, ConsoleError, DeviceRoster, HELP};
use cu_detect::{
    DiscoveryScheduler, EventSink, FlasherEvent, PortArbiter, PortScanner, SerialConnector,
};
use cu_provision::{Orchestrator, ProvisioningSession, ProvisioningSettings, StartGate};
use debug_layer::DebugLineLayer;
use settings::FlasherConfig;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

type Session = ProvisioningSession<SerialConnector, Box<dyn StartGate>>;

/// State shared between the command loop and the event printer
#[derive(Debug, Default)]
struct ConsoleState {
    roster: DeviceRoster,
    settings: ProvisioningSettings,
    running: bool,
    run_id: u64,
    show_debug: bool,
}

impl ConsoleState {
    /// Lock the console for a new run and return its id
    fn begin_run(&mut self) -> u64 {
        self.run_id += 1;
        self.running = true;
        self.roster.set_locked(true);
        self.run_id
    }

    /// Unlock the console after run `run_id`
    ///
    /// Repeated calls, and calls for a run that is no longer current, are
    /// ignored.
    fn finish_run(&mut self, run_id: u64) -> bool {
        if !self.running || run_id != self.run_id {
            return false;
        }
        self.running = false;
        self.roster.set_locked(false);
        true
    }
}

fn lock(state: &Mutex<ConsoleState>) -> MutexGuard<'_, ConsoleState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

#[tokio::main]
async fn main() {
    let (events, event_rx) = EventSink::channel();

    // Initialize logging: stderr output filtered by RUST_LOG, plus debug
    // lines on the event stream for the console's debug view
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(
                    tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                        "cu_flasher=info,cu_protocol=info,cu_detect=info,cu_provision=info".into()
                    }),
                ),
        )
        .with(DebugLineLayer::new(events.clone(), Level::DEBUG))
        .init();

    let mut config = FlasherConfig::load();
    info!("Starting Chameleon Ultra Flasher");
    if let Some(path) = FlasherConfig::settings_path() {
        debug!("Config: {}", path.display());
    }

    let arbiter = PortArbiter::new();
    let connector = Arc::new(SerialConnector);
    let scanner = Arc::new(PortScanner::with_config(config.scanner_config()));

    let scheduler = DiscoveryScheduler::new(
        scanner,
        Arc::clone(&connector),
        arbiter.clone(),
        events.clone(),
        config.discovery_config(),
    );
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let discovery = tokio::spawn(scheduler.run(shutdown_rx));

    let orchestrator = Orchestrator::new(connector, config.link_config(), events);
    let session: Arc<Session> = Arc::new(ProvisioningSession::new(
        orchestrator,
        config.start_gate(),
        arbiter,
    ));

    let state = Arc::new(Mutex::new(ConsoleState {
        settings: config.provisioning,
        ..Default::default()
    }));
    let printer = tokio::spawn(print_events(event_rx, Arc::clone(&state)));

    println!("{}", HELP);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!("Failed to read input: {}", e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let result = match line.parse::<Command>() {
            Ok(Command::Quit) if lock(&state).running => Err(ConsoleError::Busy),
            Ok(Command::Quit) => break,
            Ok(command) => handle_command(command, &state, &mut config, &session),
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            println!("{}", e);
        }
    }

    info!("Shutting down");
    let _ = shutdown_tx.send(true);
    let _ = discovery.await;
    printer.abort();
}

fn handle_command(
    command: Command,
    state: &Arc<Mutex<ConsoleState>>,
    config: &mut FlasherConfig,
    session: &Arc<Session>,
) -> Result<(), ConsoleError> {
    let mut st = lock(state);
    match command {
        Command::Help => println!("{}", HELP),
        Command::List => {
            if st.roster.is_empty() {
                println!("No devices detected");
            }
            for (port, selected) in st.roster.entries() {
                println!("[{}] {}", if selected { "x" } else { " " }, port);
            }
        }
        Command::Select(port) => st.roster.select(&port, true)?,
        Command::Deselect(port) => st.roster.select(&port, false)?,
        Command::SelectAll => st.roster.select_all()?,
        Command::Set(name, value) => {
            if st.running {
                return Err(ConsoleError::Busy);
            }
            apply_setting(&mut st.settings, name, value);
            println!("{}", st.settings);
            config.provisioning = st.settings;
            if let Err(e) = config.save() {
                warn!("Failed to save settings: {}", e);
            }
        }
        Command::Settings => println!("{}", st.settings),
        Command::Debug(on) => st.show_debug = on,
        Command::Start => {
            if st.running {
                return Err(ConsoleError::Busy);
            }
            let devices = st.roster.selected();
            let settings = st.settings;
            let run_id = st.begin_run();

            let session = Arc::clone(session);
            let state = Arc::clone(state);
            tokio::spawn(async move {
                if let Err(e) = session.start(devices, settings).await {
                    debug!("Run did not complete: {}", e);
                }
                lock(&state).finish_run(run_id);
            });
        }
        Command::Quit => {}
    }
    Ok(())
}

/// Print events and keep the roster in sync with discovery
async fn print_events(mut rx: mpsc::UnboundedReceiver<FlasherEvent>, state: Arc<Mutex<ConsoleState>>) {
    while let Some(event) = rx.recv().await {
        let mut st = lock(&state);
        st.roster.apply(&event);
        if let Some(text) = render_event(&event, st.show_debug) {
            println!("{}", text);
        }
    }
}
