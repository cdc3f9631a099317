//! Actuation consumer executable entry point.
//!
//! # Architecture
//!
//! `sub_ctl` exists only while the supervisor's interlock is enabled. It
//! holds the board serial line, consumes the surface's event stream and
//! drives the actuators:
//!
//!     - Main loop:
//!         - Event stream reception and intent decoding
//!         - Local enable toggle handling (the actuation soft gate)
//!         - Actuation control processing and demand application
//!         - Battery voltage relay up the UDP beacon
//!         - Link liveness probing
//!
//! On any exit path (link loss, SIGTERM from the supervisor, stream close)
//! the actuators are parked before the process ends.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{eyre::WrapErr, Report};
use log::{info, warn};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

// Internal
use comms_if::net::beacon::BeaconSender;
use comms_if::net::event::{EventRecv, EventStreamClient};
use comms_if::net::{ChannelError, NetParams};
use sub_lib::act_ctrl::{ActCtrl, ButtonFunc, ControlIntent, InputData};
use sub_lib::actuator::{ActuatorSink, ParkOnDrop, SerialActuatorSink};
use sub_lib::gate::{DISABLE_NOTICE, ENABLE_NOTICE};
use sub_lib::interlock::{Interlock, InterlockObserver, InterlockState};
use sub_lib::serial::{self, SerialError, SerialParams, SerialVoltageSource, VoltageSource};
use util::{
    logger::{logger_init, LevelFilter},
    module::State,
    session::Session,
};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Interval between liveness probes up the event stream.
const PING_INTERVAL: Duration = Duration::from_secs(1);

/// How long to keep retrying the initial event stream connection.
const CONNECT_RETRY_PERIOD: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The actuation gate's entry actions: park the actuators on close and tell
/// the surface about both edges over the beacon.
struct ActuationGate<'a> {
    sink: &'a mut SerialActuatorSink,
    beacon: &'a BeaconSender,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl<'a> InterlockObserver for ActuationGate<'a> {
    type Error = SerialError;

    fn on_enable(&mut self) -> Result<(), SerialError> {
        if let Err(e) = self.beacon.send(ENABLE_NOTICE) {
            warn!("Could not send the enable notice: {}", e);
        }

        Ok(())
    }

    fn on_disable(&mut self) -> Result<(), SerialError> {
        // Park first, notify second
        self.sink.safe_idle()?;

        if let Err(e) = self.beacon.send(DISABLE_NOTICE) {
            warn!("Could not send the disable notice: {}", e);
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {
    color_eyre::install()?;

    // ---- EARLY INITIALISATION ----

    let session = Session::new("sub_ctl", "sessions").wrap_err("Failed to create the session")?;

    logger_init(LevelFilter::Debug, &session).wrap_err("Failed to initialise logging")?;

    info!("Actuation Consumer Executable\n");

    // ---- LOAD PARAMETERS ----

    let net_params: NetParams =
        util::params::load("net.toml").wrap_err("Could not load net params")?;
    let serial_params: SerialParams =
        util::params::load("serial.toml").wrap_err("Could not load serial params")?;

    // ---- SHUTDOWN FLAG ----

    // The termination feature routes the supervisor's SIGTERM through this
    // handler too, so the parking path below runs on a supervised stop
    let run = Arc::new(AtomicBool::new(true));
    let run_in_handler = run.clone();

    ctrlc::set_handler(move || {
        run_in_handler.store(false, Ordering::SeqCst);
    })
    .wrap_err("Failed to set the shutdown handler")?;

    // ---- INITIALISE COMPONENTS ----

    // One physical port, two handles: demands down, voltage up
    let port = serial::open(&serial_params).wrap_err("Failed to open the board serial line")?;
    let voltage_port = port
        .try_clone()
        .map_err(serial::SerialError::CloneError)
        .wrap_err("Failed to clone the serial handle")?;

    // The guard parks the actuators on every exit path, panics included
    let mut sink = ParkOnDrop::new(SerialActuatorSink::new(port));
    let mut voltage_source = SerialVoltageSource::new(voltage_port);

    let beacon = BeaconSender::new(&net_params.voltage_endpoint())
        .wrap_err("Failed to create the voltage beacon sender")?;

    let mut act_ctrl = ActCtrl::default();
    act_ctrl
        .init("act_ctrl.toml", &session)
        .wrap_err("Failed to initialise actuation control")?;

    let gate = Interlock::new();

    let mut event_client =
        connect_event_stream(&net_params, &run).wrap_err("Could not reach the event stream")?;

    // Known-safe baseline before the first intent
    sink.safe_idle()
        .wrap_err("Failed to park the actuators at startup")?;

    // ---- MAIN LOOP ----

    info!("Initialisation complete, consuming events");

    let mut last_ping = Instant::now();

    while run.load(Ordering::SeqCst) {
        // ---- EVENT RECEPTION ----

        let intent = match event_client.recv_event() {
            Ok(EventRecv::Event(ref event)) => act_ctrl.params().bindings.decode(event),
            Ok(EventRecv::Malformed(e)) => {
                warn!("Malformed event record skipped: {}", e);
                None
            }
            Ok(EventRecv::None) => None,
            Err(ChannelError::Disconnected) => {
                warn!("Event stream closed, deactivating");
                break;
            }
            Err(e) => {
                warn!("Event stream receive failed: {}", e);
                break;
            }
        };

        // ---- GATE AND ACTUATION ----

        match intent {
            Some(ControlIntent::Button(ButtonFunc::EnableToggle)) => {
                let mut gate_obs = ActuationGate {
                    sink: &mut sink,
                    beacon: &beacon,
                };
                if let Err(e) = gate.toggle(&mut gate_obs) {
                    warn!("Gate toggle failed: {}", e);
                }
            }
            intent => {
                let input = InputData {
                    intent,
                    enabled: gate.state() == InterlockState::Enabled,
                };

                match act_ctrl.proc(&input) {
                    Ok((output, _report)) => {
                        if let Err(e) = apply_output(&mut sink, &output) {
                            warn!("Demand application failed: {}", e);
                        }
                    }
                    Err(e) => warn!("Actuation control failed: {}", e),
                }
            }
        }

        // ---- VOLTAGE RELAY ----

        match voltage_source.read_voltage() {
            Ok(Some(voltage)) => {
                if let Err(e) = beacon.send(&format!("{:.2}", voltage)) {
                    warn!("Voltage relay send failed: {}", e);
                }
            }
            Ok(None) => (),
            Err(e) => warn!("Voltage read failed: {}", e),
        }

        // ---- LIVENESS ----

        if last_ping.elapsed() >= PING_INTERVAL {
            last_ping = Instant::now();

            if event_client.send_ping().is_err() {
                warn!("Liveness probe failed, deactivating");
                break;
            }
        }
    }

    // ---- SHUTDOWN ----

    info!("Deactivating");

    let mut gate_obs = ActuationGate {
        sink: &mut sink,
        beacon: &beacon,
    };
    if let Err(e) = gate.disable(&mut gate_obs) {
        warn!("Gate close during shutdown failed: {}", e);
    }

    // The gate close is a no-op if it was never opened, park explicitly too
    sink.safe_idle()
        .wrap_err("Failed to park the actuators during shutdown")?;

    info!("Shutdown complete");

    Ok(())
}

/// Connect to the surface's event stream, retrying briefly.
///
/// The supervisor spawns this process in response to an enable, so the
/// stream's server end should already be up; the retry covers it still
/// coming up.
fn connect_event_stream(
    net_params: &NetParams,
    run: &Arc<AtomicBool>,
) -> Result<EventStreamClient, ChannelError> {
    let deadline = Instant::now() + CONNECT_RETRY_PERIOD;

    loop {
        match EventStreamClient::connect(&net_params.event_endpoint()) {
            Ok(client) => return Ok(client),
            Err(e) => {
                if Instant::now() >= deadline || !run.load(Ordering::SeqCst) {
                    return Err(e);
                }

                warn!("Event stream not up yet ({}), retrying", e);
                std::thread::sleep(Duration::from_millis(500));
            }
        }
    }
}

/// Apply one actuation control output to the sink.
fn apply_output(sink: &mut SerialActuatorSink, output: &sub_lib::act_ctrl::OutputData) -> Result<(), SerialError> {
    if !output.thruster_dems.is_empty() {
        sink.set_thrusters(&output.thruster_dems)?;
    }

    if let Some(duty) = output.light_dem {
        sink.set_light(duty)?;
    }

    Ok(())
}
