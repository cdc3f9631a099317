//! # Supervisor-side interlock gate
//!
//! Entry actions for the vehicle supervisor's interlock: swap the board
//! serial line between the voltage beacon and the consumer process, keep the
//! consumer's lifecycle in step with the interlock state, and report each
//! edge to the surface over the beacon channel.
//!
//! The beacon and notice sides sit behind traits so the composition can be
//! exercised without a serial port or a real child process.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::warn;
use thiserror::Error;

// Internal
use crate::beacon::{BeaconError, VoltageBeacon};
use crate::interlock::InterlockObserver;
use crate::supervisor::{Spawner, Supervisor, SupervisorError};
use comms_if::net::beacon::BeaconSender;
use comms_if::net::ChannelError;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Beacon text sent when the interlock enables.
pub const ENABLE_NOTICE: &str = "Enable Received";

/// Beacon text sent when the interlock disables.
pub const DISABLE_NOTICE: &str = "Soft Disable On";

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// Control over the voltage beacon's hold on the serial line.
pub trait BeaconControl {
    /// Start the beacon. A no-op if already running.
    fn start(&mut self) -> Result<(), BeaconError>;

    /// Stop the beacon, releasing the serial line.
    fn stop(&mut self);

    /// Restart the beacon after the guard delay.
    fn restart_after_guard(&mut self) -> Result<(), BeaconError>;
}

/// Sink for the gate's state-change notices.
pub trait NoticeSink {
    fn send_notice(&self, text: &str) -> Result<(), ChannelError>;
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The interlock's entry actions at the supervisor.
///
/// On enable the beacon releases the serial line before the consumer is
/// spawned; on disable the consumer is stopped and reaped before the beacon
/// takes the line back. A failed spawn restores the beacon and refuses the
/// transition, so the interlock state never claims a consumer that is not
/// there.
pub struct SupervisorGate<'a, S: Spawner, B: BeaconControl, N: NoticeSink> {
    pub supervisor: &'a mut Supervisor<S>,
    pub beacon: &'a mut B,
    pub notice: &'a N,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum GateError {
    #[error("Consumer lifecycle failed: {0}")]
    Supervisor(#[from] SupervisorError),

    #[error("Voltage beacon failed: {0}")]
    Beacon(#[from] BeaconError),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl BeaconControl for VoltageBeacon {
    fn start(&mut self) -> Result<(), BeaconError> {
        VoltageBeacon::start(self)
    }

    fn stop(&mut self) {
        VoltageBeacon::stop(self)
    }

    fn restart_after_guard(&mut self) -> Result<(), BeaconError> {
        VoltageBeacon::restart_after_guard(self)
    }
}

impl NoticeSink for BeaconSender {
    fn send_notice(&self, text: &str) -> Result<(), ChannelError> {
        self.send(text)
    }
}

impl<'a, S, B, N> InterlockObserver for SupervisorGate<'a, S, B, N>
where
    S: Spawner,
    B: BeaconControl,
    N: NoticeSink,
{
    type Error = GateError;

    fn on_enable(&mut self) -> Result<(), GateError> {
        // The consumer needs the serial line, so the beacon goes first
        self.beacon.stop();

        if let Err(e) = self.supervisor.start() {
            // Failed to come up: put the beacon back so voltage keeps
            // flowing, and refuse the transition
            if let Err(be) = self.beacon.start() {
                warn!("Beacon restart after failed enable also failed: {}", be);
            }
            return Err(e.into());
        }

        if let Err(e) = self.notice.send_notice(ENABLE_NOTICE) {
            warn!("Could not send the enable notice: {}", e);
        }

        Ok(())
    }

    fn on_disable(&mut self) -> Result<(), GateError> {
        self.supervisor.stop()?;
        self.beacon.restart_after_guard()?;

        if let Err(e) = self.notice.send_notice(DISABLE_NOTICE) {
            warn!("Could not send the disable notice: {}", e);
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
