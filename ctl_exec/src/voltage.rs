//! # Voltage beacon monitor
//!
//! Listens for the vehicle's UDP beacon and logs what arrives: decimal
//! readings as the battery voltage, anything else as a vehicle notice (the
//! actuation gate's enable/disable edges come up this way).

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{info, warn};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

// Internal
use comms_if::net::beacon::BeaconReceiver;
use comms_if::net::ChannelError;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Handle on the running voltage monitor thread.
pub struct VoltageMonitorHandle {
    run: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,

    /// Latest voltage reading, in volts.
    pub latest: Arc<Mutex<Option<f32>>>,
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Spawn the voltage monitor thread on an already bound receiver.
pub fn spawn(receiver: BeaconReceiver) -> VoltageMonitorHandle {
    let run = Arc::new(AtomicBool::new(true));
    let latest: Arc<Mutex<Option<f32>>> = Arc::new(Mutex::new(None));

    let run_in_thread = run.clone();
    let latest_in_thread = latest.clone();

    let thread = std::thread::spawn(move || {
        while run_in_thread.load(Ordering::SeqCst) {
            match receiver.recv() {
                Ok(Some(text)) => match text.trim().parse::<f32>() {
                    Ok(voltage) => {
                        info!("Battery voltage: {:.2} V", voltage);
                        *latest_in_thread.lock().unwrap() = Some(voltage);
                    }
                    Err(_) => info!("Vehicle notice: {}", text.trim()),
                },
                Ok(None) => (),
                Err(ChannelError::NotUtf8) => warn!("Beacon datagram was not UTF-8, skipped"),
                Err(e) => warn!("Beacon receive failed: {}", e),
            }
        }
    });

    VoltageMonitorHandle {
        run,
        thread: Some(thread),
        latest,
    }
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl VoltageMonitorHandle {
    /// Stop the monitor thread, blocking until it has exited.
    pub fn stop(&mut self) {
        self.run.store(false, Ordering::SeqCst);

        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Voltage monitor thread panicked");
            }
        }
    }
}

impl Drop for VoltageMonitorHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
