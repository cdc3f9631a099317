//! Main vehicle-side executable entry point.
//!
//! # Architecture
//!
//! `sub_exec` is the vehicle's supervisor. It owns the things that must
//! survive an actuation fault:
//!
//!     - The control channel, through which the surface enables, disables
//!       and probes the vehicle
//!     - The enable interlock, whose transitions start and stop the
//!       subordinate consumer process (`sub_ctl`)
//!     - The battery voltage beacon, which holds the board serial line
//!       whenever the consumer does not
//!     - The telemetry stream servers
//!
//! The consumer does all actuation; if it dies the supervisor notices,
//! drives the interlock back to disabled and resumes the beacon, so the
//! surface keeps seeing voltage and the vehicle ends up parked.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{
    eyre::{eyre, WrapErr},
    Report,
};
use log::{info, warn};
use serde::Deserialize;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

// Internal
use comms_if::net::beacon::BeaconSender;
use comms_if::net::{ctl::CtlServer, NetParams};
use comms_if::ctl::CtlMsg;
use sub_lib::beacon::VoltageBeacon;
use sub_lib::gate::SupervisorGate;
use sub_lib::interlock::Interlock;
use sub_lib::serial::{self, SerialParams, SerialVoltageSource, VoltageSource};
use sub_lib::supervisor::{ChildSpawner, Supervisor};
use sub_lib::tm_server::{
    self, SimExtPressureSource, SimImuSource, SimIntHealthSource, TmServerHandle,
};
use util::{
    logger::{logger_init, LevelFilter},
    session::Session,
};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Period of one supervisor loop cycle.
const CYCLE_PERIOD: Duration = Duration::from_millis(50);

/// IMU sampling period.
const IMU_PERIOD: Duration = Duration::from_secs(1);

/// External pressure sampling period.
const EXT_PRESSURE_PERIOD: Duration = Duration::from_millis(500);

/// Internal health sampling period.
const INT_HEALTH_PERIOD: Duration = Duration::from_millis(250);

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for the supervisor executable.
#[derive(Deserialize)]
struct SubExecParams {
    /// Path to the consumer binary spawned on enable.
    sub_ctl_program: String,
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {
    color_eyre::install()?;

    // ---- EARLY INITIALISATION ----

    let session = Session::new("sub_exec", "sessions").wrap_err("Failed to create the session")?;

    logger_init(LevelFilter::Debug, &session).wrap_err("Failed to initialise logging")?;

    info!("Vehicle Supervisor Executable\n");
    info!("Session directory: {:?}\n", session.session_root);

    // ---- LOAD PARAMETERS ----

    let net_params: NetParams =
        util::params::load("net.toml").wrap_err("Could not load net params")?;
    let exec_params: SubExecParams =
        util::params::load("sub_exec.toml").wrap_err("Could not load sub_exec params")?;
    let serial_params: SerialParams =
        util::params::load("serial.toml").wrap_err("Could not load serial params")?;

    info!("Exec parameters loaded");

    // ---- SHUTDOWN FLAG ----

    let run = Arc::new(AtomicBool::new(true));
    let run_in_handler = run.clone();

    ctrlc::set_handler(move || {
        run_in_handler.store(false, Ordering::SeqCst);
    })
    .wrap_err("Failed to set the shutdown handler")?;

    // ---- INITIALISE COMPONENTS ----

    let ctl_server =
        CtlServer::bind(&net_params.ctl_endpoint()).wrap_err("Failed to bind the control channel")?;

    info!("Control channel bound on {}", net_params.ctl_endpoint());

    let mut beacon = VoltageBeacon::new(
        &net_params.voltage_endpoint(),
        Box::new(move || {
            let port = serial::open(&serial_params)?;
            Ok(Box::new(SerialVoltageSource::new(port)) as Box<dyn VoltageSource>)
        }),
    );

    // Separate UDP sender for the gate's state-change notices, so they go
    // out whether or not the beacon thread is up
    let notice = BeaconSender::new(&net_params.voltage_endpoint())
        .wrap_err("Failed to create the notice sender")?;

    let mut supervisor = Supervisor::new(ChildSpawner::new(&exec_params.sub_ctl_program, &session));

    let interlock = Interlock::new();

    // Disabled at boot, so the beacon holds the serial line from the start
    beacon
        .start()
        .wrap_err("Failed to start the voltage beacon")?;

    let mut tm_handles = spawn_tm_servers(&net_params)?;

    // ---- MAIN LOOP ----

    info!("Initialisation complete, starting main loop");

    while run.load(Ordering::SeqCst) {
        let mut gate = SupervisorGate {
            supervisor: &mut supervisor,
            beacon: &mut beacon,
            notice: &notice,
        };

        // Control messages from the surface
        match ctl_server.recv_msg() {
            Ok(Some(CtlMsg::Enable)) => {
                if let Err(e) = interlock.enable(&mut gate) {
                    warn!("Enable failed: {}", e);
                }
            }
            Ok(Some(CtlMsg::Disable)) => {
                if let Err(e) = interlock.disable(&mut gate) {
                    warn!("Disable failed: {}", e);
                }
            }
            // Probes are acknowledged inside the channel
            Ok(Some(CtlMsg::Ping)) => (),
            Ok(None) => (),
            Err(e) => warn!("Control channel receive failed: {}", e),
        }

        // A consumer that died on its own drives the interlock back to
        // disabled, restarting the beacon
        match supervisor.check_liveness() {
            Ok(true) => {
                warn!("Consumer died, falling back to disabled");
                let mut gate = SupervisorGate {
                    supervisor: &mut supervisor,
                    beacon: &mut beacon,
                    notice: &notice,
                };
                if let Err(e) = interlock.disable(&mut gate) {
                    warn!("Fallback disable failed: {}", e);
                }
            }
            Ok(false) => (),
            Err(e) => warn!("Consumer liveness check failed: {}", e),
        }

        std::thread::sleep(CYCLE_PERIOD);
    }

    // ---- SHUTDOWN ----

    info!("Shutdown requested");

    let mut gate = SupervisorGate {
        supervisor: &mut supervisor,
        beacon: &mut beacon,
        notice: &notice,
    };
    if let Err(e) = interlock.disable(&mut gate) {
        warn!("Disable during shutdown failed: {}", e);
    }

    beacon.stop();
    for handle in tm_handles.iter_mut() {
        handle.stop();
    }

    info!("Shutdown complete");

    Ok(())
}

/// Spawn the three telemetry stream servers.
fn spawn_tm_servers(net_params: &NetParams) -> Result<Vec<TmServerHandle>, Report> {
    let imu = tm_server::spawn(
        "imu",
        &net_params.imu_endpoint(),
        IMU_PERIOD,
        Box::new(SimImuSource::new()),
    )
    .map_err(|e| eyre!("{}", e))?;

    let ext_pressure = tm_server::spawn(
        "ext_pressure",
        &net_params.ext_pressure_endpoint(),
        EXT_PRESSURE_PERIOD,
        Box::new(SimExtPressureSource::new()),
    )
    .map_err(|e| eyre!("{}", e))?;

    let int_health = tm_server::spawn(
        "int_health",
        &net_params.int_health_endpoint(),
        INT_HEALTH_PERIOD,
        Box::new(SimIntHealthSource),
    )
    .map_err(|e| eyre!("{}", e))?;

    Ok(vec![imu, ext_pressure, int_health])
}
