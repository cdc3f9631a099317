//! # Event stream channel
//!
//! A long-lived TCP stream carrying newline-delimited event records from the
//! control station to the vehicle's consumer process. The server (control
//! station side) accepts one client per session and never blocks on a slow or
//! absent consumer: sends carry a bounded timeout and events are dropped on
//! failure. The consumer writes `PING` probes back up the same stream; the
//! server drains and discards them, using the read side only to detect that
//! the peer has gone.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use log::{debug, trace};

// Internal
use super::{resolve, ChannelError};
use crate::event::{ControlEvent, EventParseError};

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::time::Duration;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Bound on how long a send may block before the event is dropped.
const SEND_TIMEOUT: Duration = Duration::from_millis(250);

/// Read timeout on the client side. Chosen below the liveness probe interval
/// so the consumer's read loop can always tick its probe.
const CLIENT_RECV_TIMEOUT: Duration = Duration::from_millis(500);

/// Timeout used when draining probe bytes on the server side.
const DRAIN_TIMEOUT: Duration = Duration::from_millis(1);

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// The event stream's listening end, bound on the control station.
pub struct EventStreamServer {
    listener: TcpListener,
}

/// One accepted event stream session.
pub struct EventStreamSession {
    stream: TcpStream,
    peer: SocketAddr,

    /// Tail of a record whose send timed out part way through. Flushed ahead
    /// of the next record, so the newline framing is never torn.
    backlog: Vec<u8>,
}

/// The event stream's consuming end, connected from the vehicle.
pub struct EventStreamClient {
    reader: BufReader<TcpStream>,
    writer: TcpStream,

    /// Partial record carried over a receive timeout, so a record split
    /// across reads is never torn.
    pending: String,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Result of receiving from the event stream.
#[derive(Debug)]
pub enum EventRecv {
    /// A well-formed event record.
    Event(ControlEvent),

    /// A record arrived but could not be parsed. The stream stays open.
    Malformed(EventParseError),

    /// Nothing arrived within the receive timeout.
    None,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl EventStreamServer {
    /// Bind the event stream listener on the given endpoint.
    pub fn bind(endpoint: &str) -> Result<Self, ChannelError> {
        let listener = TcpListener::bind(endpoint).map_err(ChannelError::Bind)?;

        // Non-blocking so the accept loop can watch the shutdown flag
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
    ///
    /// Returns `Ok(None)` when no client is waiting, the caller is expected
    /// to poll. One session is accepted at a time: exactly one consumer per
    /// event stream.
    pub fn accept(&self) -> Result<Option<EventStreamSession>, ChannelError> {
        match self.listener.accept() {
            Ok((stream, peer)) => {
                stream
                    .set_nonblocking(false)
                    .map_err(ChannelError::SocketOptionError)?;
                stream
                    .set_write_timeout(Some(SEND_TIMEOUT))
                    .map_err(ChannelError::SocketOptionError)?;
                stream
                    .set_read_timeout(Some(DRAIN_TIMEOUT))
                    .map_err(ChannelError::SocketOptionError)?;

                debug!("Event stream client connected from {}", peer);

                Ok(Some(EventStreamSession {
                    stream,
                    peer,
                    backlog: Vec::new(),
                }))
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(ChannelError::RecvError(e)),
        }
    }
}

impl EventStreamSession {
    /// The connected peer's address.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Send one event down the stream.
    ///
    /// Returns `Ok(true)` if the event is committed to the wire, `Ok(false)`
    /// if it was dropped because the consumer is not keeping up.
    /// `Err(Disconnected)` means the session is over and the caller should
    /// return to accepting.
    ///
    /// A send that times out mid-record keeps the unsent tail and flushes it
    /// ahead of the next event, so a record is either dropped whole or
    /// delivered whole.
    pub fn send_event(&mut self, event: &ControlEvent) -> Result<bool, ChannelError> {
        if !self.flush_backlog()? {
            // The wire is still jammed with an earlier record's tail
            return Ok(false);
        }

        let record = format!("{}\n", event.to_record());
        let buf = record.as_bytes();
        let mut written = 0;

        while written < buf.len() {
            match self.stream.write(&buf[written..]) {
                Ok(0) => return Err(ChannelError::Disconnected),
                Ok(n) => written += n,
                Err(ref e)
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut =>
                {
                    if written == 0 {
                        // Nothing went out, drop the whole record
                        return Ok(false);
                    }

                    // Part of the record is on the wire, keep the tail so
                    // the framing holds
                    self.backlog.extend_from_slice(&buf[written..]);
                    return Ok(true);
                }
                Err(ref e)
                    if e.kind() == std::io::ErrorKind::BrokenPipe
                        || e.kind() == std::io::ErrorKind::ConnectionReset =>
                {
                    return Err(ChannelError::Disconnected)
                }
                Err(e) => return Err(ChannelError::SendError(e)),
            }
        }

        trace!("Event sent to {}: {}", self.peer, event.to_record());
        Ok(true)
    }

    /// Push any pending record tail, returning whether the wire is clear for
    /// a new record.
    fn flush_backlog(&mut self) -> Result<bool, ChannelError> {
        while !self.backlog.is_empty() {
            match self.stream.write(&self.backlog) {
                Ok(0) => return Err(ChannelError::Disconnected),
                Ok(n) => {
                    self.backlog.drain(..n);
                }
                Err(ref e)
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut =>
                {
                    return Ok(false)
                }
                Err(ref e)
                    if e.kind() == std::io::ErrorKind::BrokenPipe
                        || e.kind() == std::io::ErrorKind::ConnectionReset =>
                {
                    return Err(ChannelError::Disconnected)
                }
                Err(e) => return Err(ChannelError::SendError(e)),
            }
        }

        Ok(true)
    }

    /// Drain any probe bytes the consumer has written up the stream.
    ///
    /// Returns `Err(Disconnected)` if the peer has closed its end.
    pub fn drain_incoming(&mut self) -> Result<(), ChannelError> {
        let mut buf = [0u8; 64];
        loop {
            match self.stream.read(&mut buf) {
                // Zero-length read is end of stream
                Ok(0) => return Err(ChannelError::Disconnected),
                Ok(_) => continue,
                Err(ref e)
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut =>
                {
                    return Ok(())
                }
                Err(e) => return Err(ChannelError::RecvError(e)),
            }
        }
    }
}

impl EventStreamClient {
    /// Connect to the event stream on the control station.
    pub fn connect(endpoint: &str) -> Result<Self, ChannelError> {
        let addr = resolve(endpoint)?;

        let stream = TcpStream::connect_timeout(&addr, Duration::from_secs(2))
            .map_err(ChannelError::Connect)?;
        stream
            .set_read_timeout(Some(CLIENT_RECV_TIMEOUT))
            .map_err(ChannelError::SocketOptionError)?;
        stream
            .set_write_timeout(Some(SEND_TIMEOUT))
            .map_err(ChannelError::SocketOptionError)?;

        let writer = stream.try_clone().map_err(ChannelError::Connect)?;

        Ok(Self {
            reader: BufReader::new(stream),
            writer,
            pending: String::new(),
        })
    }

    /// Receive the next event record, waiting at most the receive timeout.
    ///
    /// `Err(Disconnected)` means the station has closed the stream: the
    /// consumer must treat this as loss of the link and deactivate.
    pub fn recv_event(&mut self) -> Result<EventRecv, ChannelError> {
        let mut line = std::mem::take(&mut self.pending);

        match self.reader.read_line(&mut line) {
            Ok(0) => Err(ChannelError::Disconnected),
            Ok(_) if !line.ends_with('\n') => {
                // Stream ended mid-record
                Err(ChannelError::Disconnected)
            }
            Ok(_) => match ControlEvent::from_record(line.trim_end()) {
                Ok(ev) => Ok(EventRecv::Event(ev)),
                Err(e) => Ok(EventRecv::Malformed(e)),
            },
            Err(ref e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                // Keep any partial record for the next call
                self.pending = line;
                Ok(EventRecv::None)
            }
            Err(e) => Err(ChannelError::RecvError(e)),
        }
    }

    /// Send a liveness probe up the stream.
    ///
    /// A failed probe means the station is gone: `Err(Disconnected)`.
    pub fn send_ping(&mut self) -> Result<(), ChannelError> {
        match self.writer.write_all(b"PING\n") {
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
