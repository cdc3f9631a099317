//! Actuation control module
//!
//! Translates control intents (stick deflections and button presses) into
//! thruster and light duty demands, gated on the enable interlock.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod calc_mix;
mod intent;
mod params;
mod state;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// Internal
pub use calc_mix::*;
pub use intent::*;
pub use params::*;
pub use state::*;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Lowest raw axis deflection the input device can report.
pub const AXIS_RAW_MIN: i64 = -32768;

/// Highest raw axis deflection the input device can report.
pub const AXIS_RAW_MAX: i64 = 32767;

/// Lowest duty demand.
pub const DUTY_MIN: i64 = 0;

/// Highest duty demand.
pub const DUTY_MAX: i64 = 100;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Possible errors that can occur during ActCtrl operation.
#[derive(Debug, thiserror::Error)]
pub enum ActCtrlError {
    #[error("Received a raw axis value outside the device range: {0}")]
    AxisOutOfRange(i32),
}
