//! # Voltage beacon channel
//!
//! Connectionless UDP datagrams from the vehicle to the control station. The
//! beacon carries the battery voltage as a UTF-8 decimal string, and also the
//! interlock's state-change notifications ("Enable Received", "Soft Disable
//! On"). Delivery is best effort, last value wins at the consumer.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use super::{resolve, ChannelError};

use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Read timeout for one poll of the receiving side.
const RECV_TIMEOUT: Duration = Duration::from_millis(500);

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// The sending end of the beacon, on the vehicle.
pub struct BeaconSender {
    socket: UdpSocket,
    target: SocketAddr,
}

/// The receiving end of the beacon, on the control station.
pub struct BeaconReceiver {
    socket: UdpSocket,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl BeaconSender {
    /// Create a sender targeting the given endpoint.
    pub fn new(endpoint: &str) -> Result<Self, ChannelError> {
        let target = resolve(endpoint)?;
        let socket = UdpSocket::bind("0.0.0.0:0").map_err(ChannelError::Bind)?;

        Ok(Self { socket, target })
    }

    /// Send one beacon message.
    pub fn send(&self, text: &str) -> Result<(), ChannelError> {
        self.socket
            .send_to(text.as_bytes(), self.target)
            .map_err(ChannelError::SendError)?;

        Ok(())
    }
}

impl BeaconReceiver {
    /// Bind the receiving socket on the given endpoint.
    pub fn bind(endpoint: &str) -> Result<Self, ChannelError> {
        let socket = UdpSocket::bind(endpoint).map_err(ChannelError::Bind)?;
        socket
            .set_read_timeout(Some(RECV_TIMEOUT))
            .map_err(ChannelError::SocketOptionError)?;

        Ok(Self { socket })
    }

    /// The locally bound port, for tests binding port 0.
    pub fn local_port(&self) -> Result<u16, ChannelError> {
        self.socket
            .local_addr()
            .map(|a| a.port())
            .map_err(ChannelError::SocketOptionError)
    }

    /// Receive one beacon message, waiting at most one receive timeout.
    pub fn recv(&self) -> Result<Option<String>, ChannelError> {
        let mut buf = [0u8; 1024];

        match self.socket.recv_from(&mut buf) {
            Ok((n, _)) => match std::str::from_utf8(&buf[..n]) {
                Ok(s) => Ok(Some(s.to_string())),
                Err(_) => Err(ChannelError::NotUtf8),
            },
            Err(ref e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                Ok(None)
            }
            Err(e) => Err(ChannelError::RecvError(e)),
        }
    }
}
