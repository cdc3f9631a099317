//! Main control-station executable entry point.
//!
//! # Architecture
//!
//! `ctl_exec` is the surface side of the session link:
//!
//!     - An input thread pumps the operator's control device
//!     - The main loop owns the event stream server, forwarding input
//!       events to whichever vehicle consumer is connected
//!     - Monitor threads follow the telemetry streams and the voltage
//!       beacon, logging what the vehicle reports
//!
//! Enabling and disabling the vehicle is not done here: that is the operator
//! command `ctl_cmd`, or the enable button on the device itself which the
//! vehicle interprets.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod input;
mod tm_client;
mod voltage;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{eyre::WrapErr, Report};
use log::{info, trace, warn};
use serde::Deserialize;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;

// Internal
use comms_if::event::ControlEvent;
use comms_if::net::beacon::BeaconReceiver;
use comms_if::net::event::{EventStreamServer, EventStreamSession};
use comms_if::net::{ChannelError, NetParams};
use comms_if::tm::{ExtPressureTm, ImuTm, IntHealthTm};
use input::InputMapper;
use util::{
    logger::{logger_init, LevelFilter},
    session::Session,
};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// How long the main loop waits on the input channel per cycle.
const INPUT_POLL_TIMEOUT: Duration = Duration::from_millis(50);

/// Interval between status summary lines.
const STATUS_INTERVAL: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for the control-station executable.
#[derive(Deserialize)]
struct CtlExecParams {
    /// Name fragment used to pick the operator's control device.
    device_name: String,
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {
    color_eyre::install()?;

    // ---- EARLY INITIALISATION ----

    let session = Session::new("ctl_exec", "sessions").wrap_err("Failed to create the session")?;

    logger_init(LevelFilter::Debug, &session).wrap_err("Failed to initialise logging")?;

    info!("Control Station Executable\n");
    info!("Session directory: {:?}\n", session.session_root);

    // ---- LOAD PARAMETERS ----

    let net_params: NetParams =
        util::params::load("net.toml").wrap_err("Could not load net params")?;
    let exec_params: CtlExecParams =
        util::params::load("ctl_exec.toml").wrap_err("Could not load ctl_exec params")?;

    info!("Exec parameters loaded");

    // ---- SHUTDOWN FLAG ----

    let run = Arc::new(AtomicBool::new(true));
    let run_in_handler = run.clone();

    ctrlc::set_handler(move || {
        run_in_handler.store(false, Ordering::SeqCst);
    })
    .wrap_err("Failed to set the shutdown handler")?;

    // ---- INITIALISE COMPONENTS ----

    let event_server = EventStreamServer::bind(&net_params.event_endpoint())
        .wrap_err("Failed to bind the event stream")?;

    info!("Event stream bound on {}", net_params.event_endpoint());

    let beacon_receiver = BeaconReceiver::bind(&net_params.voltage_endpoint())
        .wrap_err("Failed to bind the voltage beacon")?;
    let mut voltage_monitor = voltage::spawn(beacon_receiver);

    let mut tm_monitors = vec![
        tm_client::spawn("imu", net_params.imu_endpoint(), ImuTm::SIZE, decode_imu),
        tm_client::spawn(
            "ext_pressure",
            net_params.ext_pressure_endpoint(),
            ExtPressureTm::SIZE,
            decode_ext_pressure,
        ),
        tm_client::spawn(
            "int_health",
            net_params.int_health_endpoint(),
            IntHealthTm::SIZE,
            decode_int_health,
        ),
    ];

    let mapper = InputMapper::open_or_prompt(&exec_params.device_name)
        .wrap_err("Failed to open the input device")?;

    let event_rx = spawn_input_pump(mapper, run.clone());

    // ---- MAIN LOOP ----

    info!("Initialisation complete, forwarding input events");

    let mut event_session: Option<EventStreamSession> = None;
    let mut last_status = std::time::Instant::now();

    while run.load(Ordering::SeqCst) {
        // Accept the vehicle's consumer if none is connected
        if event_session.is_none() {
            match event_server.accept() {
                Ok(Some(s)) => {
                    info!("Vehicle consumer connected from {}", s.peer());
                    event_session = Some(s);
                }
                Ok(None) => (),
                Err(e) => warn!("Event stream accept failed: {}", e),
            }
        }

        // Forward the next input event, if any
        match event_rx.recv_timeout(INPUT_POLL_TIMEOUT) {
            Ok(event) => {
                if let Some(ref mut s) = event_session {
                    match s.send_event(&event) {
                        Ok(true) => (),
                        Ok(false) => trace!("Consumer not keeping up, event dropped"),
                        Err(ChannelError::Disconnected) => {
                            warn!("Vehicle consumer disconnected");
                            event_session = None;
                        }
                        Err(e) => warn!("Event send failed: {}", e),
                    }
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => (),
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                warn!("Input device pump stopped, shutting down");
                break;
            }
        }

        // Use the stream's read side to notice a consumer that went away
        // quietly, and to discard its liveness probes
        if let Some(ref mut s) = event_session {
            if let Err(ChannelError::Disconnected) = s.drain_incoming() {
                warn!("Vehicle consumer closed the event stream");
                event_session = None;
            }
        }

        // Periodic status summary from the monitors' latest readings
        if last_status.elapsed() >= STATUS_INTERVAL {
            last_status = std::time::Instant::now();

            let voltage = match *voltage_monitor.latest.lock().unwrap() {
                Some(v) => format!("{:.2} V", v),
                None => "no reading".to_string(),
            };
            info!("Status: battery {}, consumer {}", voltage, match event_session {
                Some(_) => "connected",
                None => "absent",
            });

            for monitor in tm_monitors.iter() {
                if let Some(ref text) = *monitor.latest.lock().unwrap() {
                    info!("    latest: {}", text);
                }
            }
        }
    }

    // ---- SHUTDOWN ----

    info!("Shutdown requested");

    run.store(false, Ordering::SeqCst);
    voltage_monitor.stop();
    for monitor in tm_monitors.iter_mut() {
        monitor.stop();
    }

    info!("Shutdown complete");

    Ok(())
}

/// Spawn the input pump thread, returning the event channel.
///
/// The pump blocks in the device read, so it is not joined on shutdown; it
/// ends when the process does.
fn spawn_input_pump(mut mapper: InputMapper, run: Arc<AtomicBool>) -> mpsc::Receiver<ControlEvent> {
    let (tx, rx) = mpsc::channel();

    std::thread::spawn(move || {
        while run.load(Ordering::SeqCst) {
            match mapper.next_events() {
                Ok(events) => {
                    for event in events {
                        if tx.send(event).is_err() {
                            return;
                        }
                    }
                }
                Err(e) => {
                    warn!("Input device read failed: {}", e);
                    return;
                }
            }
        }
    });

    rx
}

/// Format one IMU record for the display.
fn decode_imu(record: &[u8]) -> String {
    match ImuTm::decode(record) {
        Ok(tm) => format!(
            "gyro [{:.2} {:.2} {:.2}] rad/s, accel [{:.2} {:.2} {:.2}] m/s^2",
            tm.gyro_x, tm.gyro_y, tm.gyro_z, tm.accel_x, tm.accel_y, tm.accel_z
        ),
        Err(e) => format!("undecodable record: {}", e),
    }
}

/// Format one external pressure record for the display.
fn decode_ext_pressure(record: &[u8]) -> String {
    match ExtPressureTm::decode(record) {
        Ok(tm) => format!(
            "depth {:.2} m, {:.1} mbar, {:.1} degC",
            tm.depth_m, tm.pressure_mbar, tm.temp_c
        ),
        Err(e) => format!("undecodable record: {}", e),
    }
}

/// Format one internal health record for the display.
fn decode_int_health(record: &[u8]) -> String {
    match IntHealthTm::decode(record) {
        Ok(tm) => format!(
            "{:.1} degC, {:.1} hPa, {:.1} %RH",
            tm.temp_c, tm.pressure_hpa, tm.humidity_pct
        ),
        Err(e) => format!("undecodable record: {}", e),
    }
}
