//! # Telemetry stream servers
//!
//! One server thread per sensor stream. Each thread owns its listener,
//! accepts one surface client at a time and pushes encoded records at the
//! sensor's native cadence. A client dropping out returns the thread to
//! accepting; sampling carries on regardless so the cadence never drifts
//! with connection state.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{info, warn};
use thiserror::Error;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

// Internal
use comms_if::net::tm::{TmStreamServer, TmStreamSession};
use comms_if::net::ChannelError;
use comms_if::tm::{ExtPressureTm, ImuTm, IntHealthTm};

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// One sensor sampled by a telemetry server thread.
pub trait TmSource: Send {
    /// Sample the sensor and encode the reading as one wire record.
    fn sample(&mut self) -> Vec<u8>;
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Handle on one running telemetry server thread.
pub struct TmServerHandle {
    name: &'static str,
    run: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

/// Simulated IMU, for bench runs without the sensor head attached.
pub struct SimImuSource {
    t: f32,
}

/// Simulated external pressure sensor.
pub struct SimExtPressureSource {
    depth_m: f32,
}

/// Simulated internal health sensor.
pub struct SimIntHealthSource;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum TmServerError {
    #[error("Could not bind the {0} telemetry stream: {1}")]
    BindError(&'static str, ChannelError),
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Spawn one telemetry server thread for the given source.
pub fn spawn(
    name: &'static str,
    endpoint: &str,
    period: Duration,
    mut source: Box<dyn TmSource>,
) -> Result<TmServerHandle, TmServerError> {
    let server = TmStreamServer::bind(endpoint).map_err(|e| TmServerError::BindError(name, e))?;

    let run = Arc::new(AtomicBool::new(true));
    let run_in_thread = run.clone();

    info!("{} telemetry stream bound on {}", name, endpoint);

    let thread = std::thread::spawn(move || {
        let mut session: Option<TmStreamSession> = None;
        let mut next_sample = Instant::now();

        while run_in_thread.load(Ordering::SeqCst) {
            // Accept a waiting client if we have none
            if session.is_none() {
                match server.accept() {
                    Ok(Some(s)) => session = Some(s),
                    Ok(None) => (),
                    Err(e) => warn!("{} telemetry accept failed: {}", name, e),
                }
            }

            if Instant::now() >= next_sample {
                next_sample += period;

                let record = source.sample();

                if let Some(ref mut s) = session {
                    match s.send_record(&record) {
                        Ok(()) => (),
                        Err(ChannelError::Disconnected) => {
                            info!("{} telemetry client disconnected", name);
                            session = None;
                        }
                        Err(e) => {
                            warn!("{} telemetry send failed: {}", name, e);
                            session = None;
                        }
                    }
                }
            }

            std::thread::sleep(Duration::from_millis(10));
        }
    });

    Ok(TmServerHandle {
        name,
        run,
        thread: Some(thread),
    })
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl TmServerHandle {
    /// Stop the server thread, blocking until it has exited.
    pub fn stop(&mut self) {
        self.run.store(false, Ordering::SeqCst);

        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("{} telemetry thread panicked", self.name);
            }
        }
    }
}

impl Drop for TmServerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

impl SimImuSource {
    pub fn new() -> Self {
        Self { t: 0.0 }
    }
}

impl TmSource for SimImuSource {
    fn sample(&mut self) -> Vec<u8> {
        self.t += 1.0;

        // Gentle oscillation, gravity on the accelerometer z axis
        ImuTm {
            gyro_x: 0.1 * self.t.sin(),
            gyro_y: 0.1 * (self.t * 0.7).cos(),
            gyro_z: 0.05 * self.t.cos(),
            accel_x: 0.02 * self.t.sin(),
            accel_y: 0.02 * self.t.cos(),
            accel_z: 9.81,
        }
        .encode()
    }
}

impl TmSource for SimExtPressureSource {
    fn sample(&mut self) -> Vec<u8> {
        // Slow descent
        self.depth_m += 0.001;

        // 100 mbar per metre of water on top of one atmosphere
        let pressure_mbar =
            util::maths::lin_map((0.0f32, 100.0), (1013.25, 11013.25), self.depth_m);

        ExtPressureTm {
            depth_m: self.depth_m,
            pressure_mbar,
            pressure_psi: pressure_mbar * 0.0145,
            temp_c: 12.0,
            temp_f: 12.0 * 1.8 + 32.0,
        }
        .encode()
    }
}

impl SimExtPressureSource {
    pub fn new() -> Self {
        Self { depth_m: 0.0 }
    }
}

impl TmSource for SimIntHealthSource {
    fn sample(&mut self) -> Vec<u8> {
        IntHealthTm {
            temp_c: 28.5,
            pressure_hpa: 1010.0,
            humidity_pct: 35.0,
        }
        .encode()
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use comms_if::net::tm::TmStreamClient;

    /// Source counting its samples.
    struct CountingSource {
        samples: usize,
    }

    impl TmSource for CountingSource {
        fn sample(&mut self) -> Vec<u8> {
            self.samples += 1;
            IntHealthTm {
                temp_c: self.samples as f32,
                pressure_hpa: 0.0,
                humidity_pct: 0.0,
            }
            .encode()
        }
    }

    #[test]
    fn test_server_pushes_records_to_client() {
        let server = TmStreamServer::bind("127.0.0.1:0").unwrap();
        let port = server.local_port().unwrap();
        drop(server);

        let endpoint = format!("127.0.0.1:{}", port);
        let mut handle = spawn(
            "test",
            &endpoint,
            Duration::from_millis(20),
            Box::new(CountingSource { samples: 0 }),
        )
        .unwrap();

        let mut client = TmStreamClient::connect(&endpoint, IntHealthTm::SIZE).unwrap();

        let mut record = None;
        for _ in 0..20 {
            match client.recv_record().unwrap() {
                Some(r) => {
                    record = Some(r);
                    break;
                }
                None => std::thread::sleep(Duration::from_millis(10)),
            }
        }

        handle.stop();

        let record = record.expect("no record arrived");
        let tm = IntHealthTm::decode(&record).unwrap();
        assert!(tm.temp_c >= 1.0);
    }

    #[test]
    fn test_sim_sources_encode_fixed_sizes() {
        assert_eq!(SimImuSource::new().sample().len(), ImuTm::SIZE);
        assert_eq!(SimExtPressureSource::new().sample().len(), ExtPressureTm::SIZE);
        assert_eq!(SimIntHealthSource.sample().len(), IntHealthTm::SIZE);
    }
}
