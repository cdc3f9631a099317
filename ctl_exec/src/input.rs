//! # Input mapper
//!
//! Reads the operator's control device through the kernel event interface
//! and maps each raw event onto the wire event record. The mapping is
//! deliberately dumb: codes go out as opaque strings and the vehicle's
//! parameter file decides what they mean, so rebinding a button never
//! touches this side.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use evdev::{Device, InputEventKind};
use log::{debug, info, trace};
use thiserror::Error;

// Internal
use comms_if::event::{ControlEvent, EventKind};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The operator's control device.
pub struct InputMapper {
    device: Device,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum InputError {
    #[error("No input device matching {0:?} was found (available: {1:?})")]
    DeviceUnavailable(String, Vec<String>),

    #[error("Could not read from the input device: {0}")]
    ReadError(std::io::Error),

    #[error("Operator declined to select an input device")]
    NoDeviceSelected,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl InputMapper {
    /// Open the first device whose name contains the given fragment.
    pub fn open(name_fragment: &str) -> Result<Self, InputError> {
        let mut available = Vec::new();

        for (path, device) in evdev::enumerate() {
            let name = device.name().unwrap_or("<unnamed>").to_string();
            debug!("Input device {:?}: {}", path, name);

            if name.contains(name_fragment) {
                info!("Using input device {:?} ({})", path, name);
                return Ok(Self { device });
            }

            available.push(name);
        }

        Err(InputError::DeviceUnavailable(
            name_fragment.to_string(),
            available,
        ))
    }

    /// Open the configured device, falling back to an interactive prompt.
    ///
    /// If the configured name matches nothing, the available device names
    /// are printed and the operator may type another name fragment. This is
    /// a startup-only concern: once running, a lost device ends the pump.
    pub fn open_or_prompt(name_fragment: &str) -> Result<Self, InputError> {
        let mut fragment = name_fragment.to_string();

        loop {
            let available = match Self::open(&fragment) {
                Ok(mapper) => return Ok(mapper),
                Err(InputError::DeviceUnavailable(_, available)) => available,
                Err(e) => return Err(e),
            };

            eprintln!("No input device matching {:?}. Available devices:", fragment);
            for name in &available {
                eprintln!("    {}", name);
            }
            eprintln!("Enter a device name fragment (empty to abort):");

            let mut line = String::new();
            std::io::stdin()
                .read_line(&mut line)
                .map_err(InputError::ReadError)?;

            fragment = line.trim().to_string();
            if fragment.is_empty() {
                return Err(InputError::NoDeviceSelected);
            }
        }
    }

    /// Block for the next batch of device events, mapped onto wire records.
    ///
    /// Sync and miscellaneous events are dropped here; only axis deflections
    /// and button edges go to the vehicle.
    pub fn next_events(&mut self) -> Result<Vec<ControlEvent>, InputError> {
        let mut out = Vec::new();

        for ev in self.device.fetch_events().map_err(InputError::ReadError)? {
            let mapped = match ev.kind() {
                InputEventKind::Key(key) => Some(ControlEvent {
                    kind: EventKind::Button,
                    code: format!("{:?}", key),
                    value: ev.value(),
                }),
                InputEventKind::AbsAxis(axis) => Some(ControlEvent {
                    kind: EventKind::Axis,
                    code: axis.0.to_string(),
                    value: ev.value(),
                }),
                _ => None,
            };

            if let Some(event) = mapped {
                trace!("Input event: {}", event.to_record());
                out.push(event);
            }
        }

        Ok(out)
    }
}
