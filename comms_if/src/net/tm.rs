//! # Telemetry stream channels
//!
//! Each sensor pushes fixed-size binary records down its own TCP stream at
//! its native cadence. The server (vehicle side) accepts one client at a
//! time and writes records as they are sampled; the client (surface side)
//! reads opportunistically and keeps only the latest record.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use log::debug;

// Internal
use super::{resolve, ChannelError};

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::time::Duration;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Bound on how long a record write may block before the session is dropped.
const SEND_TIMEOUT: Duration = Duration::from_millis(500);

/// Read timeout for one poll of the client side.
const RECV_TIMEOUT: Duration = Duration::from_millis(500);

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// The listening end of one telemetry stream, bound on the vehicle.
pub struct TmStreamServer {
    listener: TcpListener,
}

/// One accepted telemetry session.
pub struct TmStreamSession {
    stream: TcpStream,
}

/// The consuming end of one telemetry stream, connected from the surface.
pub struct TmStreamClient {
    stream: TcpStream,

    /// Fixed record size for this stream.
    record_size: usize,

    /// Partially received record carried across read timeouts.
    partial: Vec<u8>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl TmStreamServer {
    /// Bind the telemetry stream listener on the given endpoint.
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

    /// Accept a pending client, if one is waiting.
    pub fn accept(&self) -> Result<Option<TmStreamSession>, ChannelError> {
        match self.listener.accept() {
            Ok((stream, peer)) => {
                stream
                    .set_nonblocking(false)
                    .map_err(ChannelError::SocketOptionError)?;
                stream
                    .set_write_timeout(Some(SEND_TIMEOUT))
                    .map_err(ChannelError::SocketOptionError)?;

                debug!("Telemetry client connected from {}", peer);

                Ok(Some(TmStreamSession { stream }))
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(ChannelError::RecvError(e)),
        }
    }
}

impl TmStreamSession {
    /// Push one encoded record to the client.
    ///
    /// `Err(Disconnected)` ends the session; the server returns to accepting.
    pub fn send_record(&mut self, record: &[u8]) -> Result<(), ChannelError> {
        match self.stream.write_all(record) {
            Ok(()) => Ok(()),
            Err(ref e)
                if e.kind() == std::io::ErrorKind::BrokenPipe
                    || e.kind() == std::io::ErrorKind::ConnectionReset =>
            {
                Err(ChannelError::Disconnected)
            }
            Err(e) => Err(ChannelError::SendError(e)),
        }
    }
}

impl TmStreamClient {
    /// Connect to a telemetry stream pushing records of the given fixed size.
    pub fn connect(endpoint: &str, record_size: usize) -> Result<Self, ChannelError> {
        let addr = resolve(endpoint)?;

        let stream = TcpStream::connect_timeout(&addr, Duration::from_secs(2))
            .map_err(ChannelError::Connect)?;
        stream
            .set_read_timeout(Some(RECV_TIMEOUT))
            .map_err(ChannelError::SocketOptionError)?;

        Ok(Self {
            stream,
            record_size,
            partial: Vec::new(),
        })
    }

    /// Receive the next full record, waiting at most one receive timeout.
    ///
    /// Returns `Ok(None)` if a full record has not yet arrived. A record
    /// split across reads is reassembled, never torn.
    pub fn recv_record(&mut self) -> Result<Option<Vec<u8>>, ChannelError> {
        let mut buf = vec![0u8; self.record_size - self.partial.len()];

        match self.stream.read(&mut buf) {
            Ok(0) => Err(ChannelError::Disconnected),
            Ok(n) => {
                self.partial.extend_from_slice(&buf[..n]);

                if self.partial.len() == self.record_size {
                    Ok(Some(std::mem::take(&mut self.partial)))
                } else {
                    Ok(None)
                }
            }
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
