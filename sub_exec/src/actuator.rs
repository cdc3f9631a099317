//! # Actuator demand sink
//!
//! The output side of the actuation chain: thruster and light duty demands
//! in the 0-100 range, written down the board serial line as plain-text
//! key:value lines. The sink trait lets the translation layer be tested
//! without hardware.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::trace;
use serialport::SerialPort;

use std::io::Write;

// Internal
use crate::serial::SerialError;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Duty at which a thruster is stationary.
pub const THRUSTER_NEUTRAL: u8 = 50;

/// Duty at which the light is off.
pub const LIGHT_OFF: u8 = 0;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// The four thrusters.
///
/// One and Four are the horizontal pair (surge and yaw), Two and Three the
/// vertical pair (heave and roll).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Thruster {
    One,
    Two,
    Three,
    Four,
}

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// Sink for actuator demands.
pub trait ActuatorSink {
    /// Apply a set of thruster duty demands.
    fn set_thrusters(&mut self, dems: &[(Thruster, u8)]) -> Result<(), SerialError>;

    /// Apply a light duty demand.
    fn set_light(&mut self, duty: u8) -> Result<(), SerialError>;

    /// Park everything: all thrusters neutral, light off.
    fn safe_idle(&mut self) -> Result<(), SerialError> {
        self.set_thrusters(&[
            (Thruster::One, THRUSTER_NEUTRAL),
            (Thruster::Two, THRUSTER_NEUTRAL),
            (Thruster::Three, THRUSTER_NEUTRAL),
            (Thruster::Four, THRUSTER_NEUTRAL),
        ])?;
        self.set_light(LIGHT_OFF)
    }
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Sink writing demands down the board serial line.
pub struct SerialActuatorSink {
    port: Box<dyn SerialPort>,
}

/// Wrapper which parks the actuators when dropped.
///
/// Covers exit paths that never reach the explicit parking call, panics
/// included.
pub struct ParkOnDrop<S: ActuatorSink> {
    inner: S,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Thruster {
    /// The demand line key for this thruster.
    pub fn wire_name(&self) -> &'static str {
        match self {
            Thruster::One => "pwm1",
            Thruster::Two => "pwm2",
            Thruster::Three => "pwm3",
            Thruster::Four => "pwm4",
        }
    }
}

impl SerialActuatorSink {
    pub fn new(port: Box<dyn SerialPort>) -> Self {
        Self { port }
    }
}

impl ActuatorSink for SerialActuatorSink {
    fn set_thrusters(&mut self, dems: &[(Thruster, u8)]) -> Result<(), SerialError> {
        if dems.is_empty() {
            return Ok(());
        }

        // One line per demand set, e.g. "pwm1:62,pwm4:38\n"
        let line = dems
            .iter()
            .map(|(t, duty)| format!("{}:{}", t.wire_name(), duty))
            .collect::<Vec<_>>()
            .join(",");

        trace!("Thruster demand: {}", line);

        self.port
            .write_all(format!("{}\n", line).as_bytes())
            .map_err(SerialError::WriteError)
    }

    fn set_light(&mut self, duty: u8) -> Result<(), SerialError> {
        trace!("Light demand: {}", duty);

        self.port
            .write_all(format!("light:{}\n", duty).as_bytes())
            .map_err(SerialError::WriteError)
    }
}

impl<S: ActuatorSink> ParkOnDrop<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

impl<S: ActuatorSink> std::ops::Deref for ParkOnDrop<S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.inner
    }
}

impl<S: ActuatorSink> std::ops::DerefMut for ParkOnDrop<S> {
    fn deref_mut(&mut self) -> &mut S {
        &mut self.inner
    }
}

impl<S: ActuatorSink> Drop for ParkOnDrop<S> {
    fn drop(&mut self) {
        // Nothing sensible to do with a failure here, the process is going
        // away either way
        let _ = self.inner.safe_idle();
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
