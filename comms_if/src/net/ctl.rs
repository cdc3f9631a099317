//! # Control message channel
//!
//! One short TCP connection per message: open, send a single ASCII token,
//! optionally read an acknowledgement, close. The server side lives on the
//! vehicle; senders are the control station's operator command and the
//! vehicle's own consumer process (local enable toggle).

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use log::debug;

// Internal
use super::{resolve, ChannelError};
use crate::ctl::{CtlMsg, PING_ACK};

use std::io::{Read, Write};
use std::net::{Shutdown, TcpListener, TcpStream};
use std::time::Duration;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Connection timeout for one-shot sends.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// Per-connection IO timeout on both ends.
const IO_TIMEOUT: Duration = Duration::from_millis(500);

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// The control channel's listening end, bound on the vehicle.
pub struct CtlServer {
    listener: TcpListener,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl CtlServer {
    /// Bind the control channel listener on the given endpoint.
    pub fn bind(endpoint: &str) -> Result<Self, ChannelError> {
        let listener = TcpListener::bind(endpoint).map_err(ChannelError::Bind)?;
        listener
            .set_nonblocking(true)
            .map_err(ChannelError::SocketOptionError)?;

        Ok(Self { listener })
    }

    /// The locally bound port, for tests binding port 0.
    pub fn local_port(&self) -> Result<u16, ChannelError> {
        self.listener
            .local_addr()
            .map(|a| a.port())
            .map_err(ChannelError::SocketOptionError)
    }

    /// Receive one pending control message, if a sender is waiting.
    ///
    /// Returns `Ok(None)` when no connection is pending. Liveness probes are
    /// acknowledged here and returned to the caller like any other message.
    pub fn recv_msg(&self) -> Result<Option<CtlMsg>, ChannelError> {
        let (mut stream, peer) = match self.listener.accept() {
            Ok(s) => s,
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => return Ok(None),
            Err(e) => return Err(ChannelError::RecvError(e)),
        };

        stream
            .set_nonblocking(false)
            .map_err(ChannelError::SocketOptionError)?;
        stream
            .set_read_timeout(Some(IO_TIMEOUT))
            .map_err(ChannelError::SocketOptionError)?;
        stream
            .set_write_timeout(Some(IO_TIMEOUT))
            .map_err(ChannelError::SocketOptionError)?;

        // The whole payload is one short token
        let mut buf = [0u8; 64];
        let n = match stream.read(&mut buf) {
            Ok(n) => n,
            Err(e) => return Err(ChannelError::RecvError(e)),
        };

        let token = std::str::from_utf8(&buf[..n]).map_err(|_| ChannelError::NotUtf8)?;

        let msg =
            CtlMsg::from_token(token).map_err(|e| ChannelError::InvalidMessage(e.to_string()))?;

        debug!("Control message {:?} received from {}", msg, peer);

        if let CtlMsg::Ping = msg {
            // Best effort ack, the connect itself is the probe
            stream.write_all(PING_ACK.as_bytes()).ok();
        }

        stream.shutdown(Shutdown::Both).ok();

        Ok(Some(msg))
    }
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Send a single control message to the given endpoint.
///
/// Opens a fresh connection, writes the token, reads an optional ack and
/// closes. Returns the ack text if the server sent one.
pub fn send_msg(endpoint: &str, msg: CtlMsg) -> Result<Option<String>, ChannelError> {
    let addr = resolve(endpoint)?;

    let mut stream =
        TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT).map_err(ChannelError::Connect)?;
    stream
        .set_read_timeout(Some(IO_TIMEOUT))
        .map_err(ChannelError::SocketOptionError)?;
    stream
        .set_write_timeout(Some(IO_TIMEOUT))
        .map_err(ChannelError::SocketOptionError)?;

    stream
        .write_all(msg.as_token().as_bytes())
        .map_err(ChannelError::SendError)?;
    stream.shutdown(Shutdown::Write).ok();

    // Read the optional ack
    let mut buf = [0u8; 64];
    match stream.read(&mut buf) {
        Ok(0) => Ok(None),
        Ok(n) => match std::str::from_utf8(&buf[..n]) {
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
