//! # Battery voltage beacon
//!
//! While the vehicle is disabled nothing else is reading the board serial
//! line, so the supervisor runs this beacon: a thread holding the port,
//! relaying each voltage report to the surface as a UDP datagram. On enable
//! the beacon is stopped so the consumer can take the port; on disable it is
//! restarted after a short guard delay that lets the consumer's handle on
//! the port close.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{info, warn};
use thiserror::Error;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

// Internal
use crate::serial::{SerialError, VoltageSource};
use comms_if::net::beacon::BeaconSender;
use comms_if::net::ChannelError;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Delay between a restart request and the port reopen, covering the
/// consumer's release of the serial line.
const RESTART_GUARD: Duration = Duration::from_secs(1);

// ---------------------------------------------------------------------------
// TYPES
// ---------------------------------------------------------------------------

/// Factory producing a fresh voltage source each time the beacon starts.
///
/// A factory rather than a source because the serial port must be reopened
/// on every start, after the consumer has had it in between.
pub type SourceFactory =
    Box<dyn Fn() -> Result<Box<dyn VoltageSource>, SerialError> + Send + Sync>;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The voltage beacon.
pub struct VoltageBeacon {
    endpoint: String,
    source_factory: Arc<SourceFactory>,
    run: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum BeaconError {
    #[error("Could not create the beacon's UDP sender: {0}")]
    SenderError(ChannelError),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl VoltageBeacon {
    /// Create a stopped beacon targeting the given UDP endpoint.
    pub fn new(endpoint: &str, source_factory: SourceFactory) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            source_factory: Arc::new(source_factory),
            run: Arc::new(AtomicBool::new(false)),
            thread: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.thread.is_some()
    }

    /// Start the beacon thread. A no-op if already running.
    pub fn start(&mut self) -> Result<(), BeaconError> {
        if self.thread.is_some() {
            return Ok(());
        }

        let sender = BeaconSender::new(&self.endpoint).map_err(BeaconError::SenderError)?;
        let run = self.run.clone();
        let factory = self.source_factory.clone();

        run.store(true, Ordering::SeqCst);

        self.thread = Some(std::thread::spawn(move || {
            beacon_loop(sender, factory, run);
        }));

        info!("Voltage beacon started");

        Ok(())
    }

    /// Stop the beacon thread and release the serial port, blocking until
    /// the thread has exited.
    pub fn stop(&mut self) {
        self.run.store(false, Ordering::SeqCst);

        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Voltage beacon thread panicked");
            }
            info!("Voltage beacon stopped");
        }
    }

    /// Restart the beacon after the guard delay.
    pub fn restart_after_guard(&mut self) -> Result<(), BeaconError> {
        self.stop();
        std::thread::sleep(RESTART_GUARD);
        self.start()
    }
}

impl Drop for VoltageBeacon {
    fn drop(&mut self) {
        self.stop();
    }
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Body of the beacon thread: open the source, relay readings until asked
/// to stop.
fn beacon_loop(sender: BeaconSender, factory: Arc<SourceFactory>, run: Arc<AtomicBool>) {
    let mut source: Option<Box<dyn VoltageSource>> = None;

    while run.load(Ordering::SeqCst) {
        // Lazily (re)open the source, tolerating a port that is still held
        // by a consumer on its way out
        let src = match source.as_mut() {
            Some(s) => s,
            None => match (*factory)() {
                Ok(s) => {
                    source = Some(s);
                    source.as_mut().unwrap()
                }
                Err(e) => {
                    warn!("Voltage source unavailable: {}", e);
                    std::thread::sleep(Duration::from_secs(1));
                    continue;
                }
            },
        };

        match src.read_voltage() {
            Ok(Some(voltage)) => {
                // Plain decimal text, matching what the surface displays
                if let Err(e) = sender.send(&format!("{:.2}", voltage)) {
                    warn!("Voltage beacon send failed: {}", e);
                }
            }
            // Poll timed out without a full report, go round again
            Ok(None) => {}
            Err(e) => {
                warn!("Voltage read failed, reopening the port: {}", e);
                source = None;
                std::thread::sleep(Duration::from_secs(1));
            }
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use comms_if::net::beacon::BeaconReceiver;
    use std::sync::Mutex;

    /// Source yielding a fixed sequence of readings.
    struct ScriptedSource {
        readings: Vec<f32>,
    }

    impl VoltageSource for ScriptedSource {
        fn read_voltage(&mut self) -> Result<Option<f32>, SerialError> {
            match self.readings.pop() {
                Some(v) => Ok(Some(v)),
                None => {
                    std::thread::sleep(Duration::from_millis(20));
                    Ok(None)
                }
            }
        }
    }

    #[test]
    fn test_beacon_relays_readings() {
        let receiver = BeaconReceiver::bind("127.0.0.1:0").unwrap();
        let endpoint = format!("127.0.0.1:{}", receiver.local_port().unwrap());

        let readings = Arc::new(Mutex::new(vec![12.5f32]));
        let readings_for_factory = readings.clone();

        let mut beacon = VoltageBeacon::new(
            &endpoint,
            Box::new(move || -> Result<Box<dyn VoltageSource>, SerialError> {
                Ok(Box::new(ScriptedSource {
                    readings: readings_for_factory.lock().unwrap().clone(),
                }))
            }),
        );

        beacon.start().unwrap();

        let mut got = None;
        for _ in 0..10 {
            if let Some(text) = receiver.recv().unwrap() {
                got = Some(text);
                break;
            }
        }

        beacon.stop();

        assert_eq!(got.as_deref(), Some("12.50"));
        let _ = readings;
    }

    #[test]
    fn test_start_twice_is_noop() {
        let receiver = BeaconReceiver::bind("127.0.0.1:0").unwrap();
        let endpoint = format!("127.0.0.1:{}", receiver.local_port().unwrap());

        let mut beacon = VoltageBeacon::new(
            &endpoint,
            Box::new(|| Ok(Box::new(ScriptedSource { readings: vec![] }) as Box<dyn VoltageSource>)),
        );

        beacon.start().unwrap();
        beacon.start().unwrap();
        assert!(beacon.is_running());
        beacon.stop();
        assert!(!beacon.is_running());
    }
}
