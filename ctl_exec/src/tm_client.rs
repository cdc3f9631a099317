//! # Telemetry stream monitors
//!
//! One monitor thread per telemetry stream. Each thread connects to its
//! stream on the vehicle, keeps the latest decoded reading in a shared slot
//! for the display, and reconnects quietly whenever the stream drops.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{info, trace, warn};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

// Internal
use comms_if::net::tm::TmStreamClient;
use comms_if::net::ChannelError;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Delay between reconnection attempts.
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

// ---------------------------------------------------------------------------
// TYPES
// ---------------------------------------------------------------------------

/// Decoder turning one wire record into display text.
pub type RecordDecoder = fn(&[u8]) -> String;

/// Shared slot holding the latest decoded reading.
pub type LatestReading = Arc<Mutex<Option<String>>>;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Handle on one running telemetry monitor thread.
pub struct TmMonitorHandle {
    name: &'static str,
    run: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,

    /// Latest decoded reading from this stream.
    pub latest: LatestReading,
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Spawn a monitor thread for one telemetry stream.
pub fn spawn(
    name: &'static str,
    endpoint: String,
    record_size: usize,
    decode: RecordDecoder,
) -> TmMonitorHandle {
    let run = Arc::new(AtomicBool::new(true));
    let latest: LatestReading = Arc::new(Mutex::new(None));

    let run_in_thread = run.clone();
    let latest_in_thread = latest.clone();

    let thread = std::thread::spawn(move || {
        monitor_loop(name, &endpoint, record_size, decode, run_in_thread, latest_in_thread);
    });

    TmMonitorHandle {
        name,
        run,
        thread: Some(thread),
        latest,
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// Body of one monitor thread.
fn monitor_loop(
    name: &'static str,
    endpoint: &str,
    record_size: usize,
    decode: RecordDecoder,
    run: Arc<AtomicBool>,
    latest: LatestReading,
) {
    let mut client: Option<TmStreamClient> = None;

    while run.load(Ordering::SeqCst) {
        let c = match client.as_mut() {
            Some(c) => c,
            None => match TmStreamClient::connect(endpoint, record_size) {
                Ok(c) => {
                    info!("{} telemetry stream connected", name);
                    client = Some(c);
                    client.as_mut().unwrap()
                }
                Err(_) => {
                    // Vehicle not up yet, or mid restart
                    std::thread::sleep(RECONNECT_DELAY);
                    continue;
                }
            },
        };

        match c.recv_record() {
            Ok(Some(record)) => {
                let text = decode(&record);
                trace!("{}: {}", name, text);
                *latest.lock().unwrap() = Some(text);
            }
            Ok(None) => (),
            Err(ChannelError::Disconnected) => {
                warn!("{} telemetry stream dropped, reconnecting", name);
                client = None;
            }
            Err(e) => {
                warn!("{} telemetry receive failed: {}", name, e);
                client = None;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl TmMonitorHandle {
    /// Stop the monitor thread, blocking until it has exited.
    pub fn stop(&mut self) {
        self.run.store(false, Ordering::SeqCst);

        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("{} telemetry monitor thread panicked", self.name);
            }
        }
    }
}

impl Drop for TmMonitorHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
