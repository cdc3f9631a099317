//! # Vehicle-side library
//!
//! Shared between the two vehicle executables:
//!
//! - `sub_exec`, the supervisor: owns the control channel, the enable
//!   interlock, the subordinate consumer process and the battery voltage
//!   beacon.
//! - `sub_ctl`, the consumer: reads the event stream, translates control
//!   intents into actuator demands and relays the battery voltage while it
//!   holds the serial line.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod act_ctrl;
pub mod actuator;
pub mod beacon;
pub mod gate;
pub mod interlock;
pub mod serial;
pub mod supervisor;
pub mod tm_server;
