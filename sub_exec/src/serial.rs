//! # Serial line to the power/actuation board
//!
//! One physical serial device carries both directions of the board
//! interface: actuator demand lines go down it and battery voltage report
//! lines come back up. Exactly one process may hold the port at a time,
//! which is why the supervisor's beacon releases it before the consumer is
//! spawned.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use conquer_once::Lazy;
use log::{trace, warn};
use regex::Regex;
use serde::Deserialize;
use serialport::SerialPort;
use thiserror::Error;

use std::io::Read;
use std::time::Duration;

// ---------------------------------------------------------------------------
// STATICS
// ---------------------------------------------------------------------------

/// Pattern of the board's battery report lines. Anchorless, the board
/// occasionally prefixes status noise.
static VOLTAGE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Battery Voltage: ([0-9]+\.?[0-9]*)").unwrap());

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Read timeout on the port, bounding one poll for a voltage line.
const PORT_TIMEOUT: Duration = Duration::from_millis(500);

/// Cap on the line reassembly buffer, in case the board streams garbage.
const MAX_LINE_LEN: usize = 256;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for the board serial line.
#[derive(Clone, Deserialize)]
pub struct SerialParams {
    /// Device path, e.g. `/dev/ttyACM0`.
    pub port: String,

    /// Baud rate.
    pub baud: u32,
}

/// Battery voltage reports read off the serial line.
pub struct SerialVoltageSource {
    port: Box<dyn SerialPort>,
    line_buf: Vec<u8>,
}

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// Source of battery voltage readings.
pub trait VoltageSource: Send {
    /// Poll for the next reading. `Ok(None)` if no complete report arrived
    /// within the poll timeout.
    fn read_voltage(&mut self) -> Result<Option<f32>, SerialError>;
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum SerialError {
    #[error("Could not open serial port {0}: {1}")]
    OpenError(String, serialport::Error),

    #[error("Could not clone the serial port handle: {0}")]
    CloneError(serialport::Error),

    #[error("Serial read failed: {0}")]
    ReadError(std::io::Error),

    #[error("Serial write failed: {0}")]
    WriteError(std::io::Error),
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Open the board serial port.
pub fn open(params: &SerialParams) -> Result<Box<dyn SerialPort>, SerialError> {
    serialport::new(&params.port, params.baud)
        .timeout(PORT_TIMEOUT)
        .open()
        .map_err(|e| SerialError::OpenError(params.port.clone(), e))
}

/// Extract the voltage from one board report line.
///
/// The board reports in the form `Battery Voltage: 12.34`; anything else on
/// the line is ignored.
pub fn parse_voltage(line: &str) -> Option<f32> {
    VOLTAGE_RE
        .captures(line)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<f32>().ok())
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl SerialVoltageSource {
    /// Wrap an open port as a voltage source.
    pub fn new(port: Box<dyn SerialPort>) -> Self {
        Self {
            port,
            line_buf: Vec::new(),
        }
    }

    /// Pull the next complete line out of the reassembly buffer.
    fn take_line(&mut self) -> Option<String> {
        let newline = self.line_buf.iter().position(|&b| b == b'\n')?;

        let line: Vec<u8> = self.line_buf.drain(..=newline).collect();
        Some(String::from_utf8_lossy(&line).trim().to_string())
    }
}

impl VoltageSource for SerialVoltageSource {
    fn read_voltage(&mut self) -> Result<Option<f32>, SerialError> {
        let mut buf = [0u8; 64];

        match self.port.read(&mut buf) {
            Ok(n) => self.line_buf.extend_from_slice(&buf[..n]),
            Err(ref e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut => {}
            Err(e) => return Err(SerialError::ReadError(e)),
        }

        if self.line_buf.len() > MAX_LINE_LEN {
            warn!("Serial line buffer overran without a newline, flushing");
            self.line_buf.clear();
        }

        while let Some(line) = self.take_line() {
            trace!("Board line: {:?}", line);

            if let Some(v) = parse_voltage(&line) {
                return Ok(Some(v));
            }
        }

        Ok(None)
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_voltage_plain() {
        assert_eq!(parse_voltage("Battery Voltage: 12.61"), Some(12.61));
    }

    #[test]
    fn test_parse_voltage_integer() {
        assert_eq!(parse_voltage("Battery Voltage: 12"), Some(12.0));
    }

    #[test]
    fn test_parse_voltage_with_prefix_noise() {
        assert_eq!(parse_voltage("[INFO] Battery Voltage: 11.9"), Some(11.9));
    }

    #[test]
    fn test_parse_voltage_rejects_other_lines() {
        assert_eq!(parse_voltage("Thruster demand applied"), None);
        assert_eq!(parse_voltage("Battery Voltage: n/a"), None);
        assert_eq!(parse_voltage(""), None);
    }
}
