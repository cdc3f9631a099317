//! # Communications interface crate.
//!
//! Provides all common communications interfaces for the software: the wire
//! formats exchanged between the control station and the vehicle, and the
//! session-link channels which carry them.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Controller event records (event stream wire format)
pub mod event;

/// Control messages (enable/disable/liveness probe)
pub mod ctl;

/// Telemetry records (fixed-layout binary sensor data)
pub mod tm;

/// Network module
pub mod net;
