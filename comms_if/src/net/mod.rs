//! # Network Module
//!
//! This module provides the session-link channels between the control station
//! and the vehicle. All channels run over the trusted tether LAN:
//!
//! - the event stream, a long-lived TCP stream of ASCII event records
//!   (control station → vehicle),
//! - the control channel, one short TCP connection per message
//!   (bidirectional),
//! - the telemetry streams, one TCP stream of fixed-size binary records per
//!   sensor (vehicle → control station),
//! - the voltage beacon, connectionless UDP datagrams (vehicle → control
//!   station).

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

pub mod beacon;
pub mod ctl;
pub mod event;
pub mod tm;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use std::net::{SocketAddr, ToSocketAddrs};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Network addressing parameters.
///
/// Two fixed hosts on a private subnet, with a distinct fixed port per
/// channel. These are configuration, not protocol: loaded from `net.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetParams {
    /// Address of the surface control station.
    pub ctl_host: String,

    /// Address of the vehicle.
    pub sub_host: String,

    /// Event stream port (bound on the control station).
    pub event_port: u16,

    /// Control message channel port (bound on the vehicle).
    pub ctl_port: u16,

    /// Voltage beacon UDP port (bound on the control station).
    pub voltage_port: u16,

    /// IMU telemetry stream port (bound on the vehicle).
    pub imu_port: u16,

    /// External pressure telemetry stream port (bound on the vehicle).
    pub ext_pressure_port: u16,

    /// Internal health telemetry stream port (bound on the vehicle).
    pub int_health_port: u16,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Errors raised by the session-link channels.
///
/// All variants except `Bind` are channel-local: the owning loop recovers in
/// place (reconnect or skip) rather than propagating them to the process
/// level.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Could not bind the channel endpoint: {0}")]
    Bind(std::io::Error),

    #[error("Could not connect to the channel endpoint: {0}")]
    Connect(std::io::Error),

    #[error("Endpoint {0:?} is not a valid address")]
    InvalidEndpoint(String),

    #[error("The peer has closed the channel")]
    Disconnected,

    #[error("Could not send on the channel: {0}")]
    SendError(std::io::Error),

    #[error("Could not receive from the channel: {0}")]
    RecvError(std::io::Error),

    #[error("The peer sent a message which was not valid UTF-8")]
    NotUtf8,

    #[error("The peer sent an invalid message: {0}")]
    InvalidMessage(String),

    #[error("Could not set a socket option: {0}")]
    SocketOptionError(std::io::Error),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl NetParams {
    /// Event stream endpoint, on the control station.
    pub fn event_endpoint(&self) -> String {
        format!("{}:{}", self.ctl_host, self.event_port)
    }

    /// Control channel endpoint, on the vehicle.
    pub fn ctl_endpoint(&self) -> String {
        format!("{}:{}", self.sub_host, self.ctl_port)
    }

    /// Voltage beacon endpoint, on the control station.
    pub fn voltage_endpoint(&self) -> String {
        format!("{}:{}", self.ctl_host, self.voltage_port)
    }

    /// IMU telemetry endpoint, on the vehicle.
    pub fn imu_endpoint(&self) -> String {
        format!("{}:{}", self.sub_host, self.imu_port)
    }

    /// External pressure telemetry endpoint, on the vehicle.
    pub fn ext_pressure_endpoint(&self) -> String {
        format!("{}:{}", self.sub_host, self.ext_pressure_port)
    }

    /// Internal health telemetry endpoint, on the vehicle.
    pub fn int_health_endpoint(&self) -> String {
        format!("{}:{}", self.sub_host, self.int_health_port)
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Resolve an endpoint string into a socket address.
pub(crate) fn resolve(endpoint: &str) -> Result<SocketAddr, ChannelError> {
    endpoint
        .to_socket_addrs()
        .map_err(|_| ChannelError::InvalidEndpoint(endpoint.into()))?
        .next()
        .ok_or_else(|| ChannelError::InvalidEndpoint(endpoint.into()))
}
