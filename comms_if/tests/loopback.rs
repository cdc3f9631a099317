//! Loopback tests for the session-link channels.
//!
//! Each test binds its channel on an ephemeral localhost port and runs both
//! ends in one process.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use comms_if::ctl::CtlMsg;
use comms_if::event::{ControlEvent, EventKind};
use comms_if::net::beacon::{BeaconReceiver, BeaconSender};
use comms_if::net::ctl::{send_msg, CtlServer};
use comms_if::net::event::{EventRecv, EventStreamClient, EventStreamServer, EventStreamSession};
use comms_if::net::tm::{TmStreamClient, TmStreamServer, TmStreamSession};
use comms_if::net::ChannelError;
use comms_if::tm::IntHealthTm;

use std::time::{Duration, Instant};

// ---------------------------------------------------------------------------
// HELPERS
// ---------------------------------------------------------------------------

/// Poll a nonblocking accept until a session arrives.
fn accept_event_session(server: &EventStreamServer) -> EventStreamSession {
    let deadline = Instant::now() + Duration::from_secs(2);
    loop {
        if let Some(s) = server.accept().unwrap() {
            return s;
        }
        assert!(Instant::now() < deadline, "no client connected");
        std::thread::sleep(Duration::from_millis(10));
    }
}

fn accept_tm_session(server: &TmStreamServer) -> TmStreamSession {
    let deadline = Instant::now() + Duration::from_secs(2);
    loop {
        if let Some(s) = server.accept().unwrap() {
            return s;
        }
        assert!(Instant::now() < deadline, "no client connected");
        std::thread::sleep(Duration::from_millis(10));
    }
}

// ---------------------------------------------------------------------------
// EVENT STREAM
// ---------------------------------------------------------------------------

#[test]
fn event_stream_roundtrip() {
    let server = EventStreamServer::bind("127.0.0.1:0").unwrap();
    let endpoint = format!("127.0.0.1:{}", server.local_port().unwrap());

    let mut client = EventStreamClient::connect(&endpoint).unwrap();
    let mut session = accept_event_session(&server);

    let event = ControlEvent {
        kind: EventKind::Axis,
        code: "1".to_string(),
        value: -32768,
    };

    assert!(session.send_event(&event).unwrap());

    let deadline = Instant::now() + Duration::from_secs(2);
    loop {
        match client.recv_event().unwrap() {
            EventRecv::Event(ev) => {
                assert_eq!(ev, event);
                break;
            }
            EventRecv::None => assert!(Instant::now() < deadline, "event never arrived"),
            EventRecv::Malformed(e) => panic!("unexpected malformed record: {}", e),
        }
    }
}

#[test]
fn event_stream_probes_are_drained() {
    let server = EventStreamServer::bind("127.0.0.1:0").unwrap();
    let endpoint = format!("127.0.0.1:{}", server.local_port().unwrap());

    let mut client = EventStreamClient::connect(&endpoint).unwrap();
    let mut session = accept_event_session(&server);

    client.send_ping().unwrap();

    // Give the probe time to land, then drain: still connected
    std::thread::sleep(Duration::from_millis(50));
    session.drain_incoming().unwrap();
}

#[test]
fn event_stream_detects_client_gone() {
    let server = EventStreamServer::bind("127.0.0.1:0").unwrap();
    let endpoint = format!("127.0.0.1:{}", server.local_port().unwrap());

    let client = EventStreamClient::connect(&endpoint).unwrap();
    let mut session = accept_event_session(&server);

    drop(client);
    std::thread::sleep(Duration::from_millis(50));

    match session.drain_incoming() {
        Err(ChannelError::Disconnected) => (),
        other => panic!("expected Disconnected, got {:?}", other.err()),
    }
}

#[test]
fn event_stream_detects_server_gone() {
    let server = EventStreamServer::bind("127.0.0.1:0").unwrap();
    let endpoint = format!("127.0.0.1:{}", server.local_port().unwrap());

    let mut client = EventStreamClient::connect(&endpoint).unwrap();
    let session = accept_event_session(&server);

    drop(session);
    std::thread::sleep(Duration::from_millis(50));

    match client.recv_event() {
        Err(ChannelError::Disconnected) => (),
        other => panic!("expected Disconnected, got {:?}", other.err()),
    }
}

#[test]
fn event_stream_backpressure_never_tears_records() {
    let server = EventStreamServer::bind("127.0.0.1:0").unwrap();
    let endpoint = format!("127.0.0.1:{}", server.local_port().unwrap());

    let mut client = EventStreamClient::connect(&endpoint).unwrap();
    let mut session = accept_event_session(&server);

    let event = ControlEvent {
        kind: EventKind::Axis,
        code: "3".to_string(),
        value: 12345,
    };

    // Fill the socket buffers while the consumer reads nothing, until the
    // session starts dropping events
    let mut sent = 0usize;
    let mut saturated = false;
    for _ in 0..2_000_000 {
        match session.send_event(&event).unwrap() {
            true => sent += 1,
            false => {
                saturated = true;
                break;
            }
        }
    }
    assert!(saturated, "the send side never hit backpressure");
    assert!(sent > 0);

    // A few more sends while saturated must not tear what is in flight
    for _ in 0..3 {
        if session.send_event(&event).unwrap() {
            sent += 1;
        }
    }

    drop(session);

    // Every record that arrives must parse cleanly; a tail cut off by the
    // close shows up as the disconnect, never as a malformed record
    let mut received = 0usize;
    loop {
        match client.recv_event() {
            Ok(EventRecv::Event(ev)) => {
                assert_eq!(ev, event);
                received += 1;
            }
            Ok(EventRecv::Malformed(e)) => panic!("torn record on the wire: {}", e),
            Ok(EventRecv::None) => (),
            Err(ChannelError::Disconnected) => break,
            Err(e) => panic!("receive failed: {}", e),
        }
    }

    assert!(received > 0);
    assert!(received <= sent);
}

// ---------------------------------------------------------------------------
// CONTROL CHANNEL
// ---------------------------------------------------------------------------

#[test]
fn ctl_channel_delivers_messages() {
    let server = CtlServer::bind("127.0.0.1:0").unwrap();
    let endpoint = format!("127.0.0.1:{}", server.local_port().unwrap());

    send_msg(&endpoint, CtlMsg::Enable).unwrap();

    let deadline = Instant::now() + Duration::from_secs(2);
    loop {
        match server.recv_msg().unwrap() {
            Some(msg) => {
                assert_eq!(msg, CtlMsg::Enable);
                break;
            }
            None => {
                assert!(Instant::now() < deadline, "message never arrived");
                std::thread::sleep(Duration::from_millis(10));
            }
        }
    }
}

#[test]
fn ctl_channel_acks_pings() {
    let server = CtlServer::bind("127.0.0.1:0").unwrap();
    let endpoint = format!("127.0.0.1:{}", server.local_port().unwrap());

    // The server side is polled from another thread while the sender blocks
    // on the ack
    let server_thread = std::thread::spawn(move || {
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            match server.recv_msg().unwrap() {
                Some(msg) => return msg,
                None => {
                    assert!(Instant::now() < deadline, "ping never arrived");
                    std::thread::sleep(Duration::from_millis(10));
                }
            }
        }
    });

    let ack = send_msg(&endpoint, CtlMsg::Ping).unwrap();

    assert_eq!(server_thread.join().unwrap(), CtlMsg::Ping);
    assert_eq!(ack.as_deref(), Some("pong"));
}

// ---------------------------------------------------------------------------
// TELEMETRY STREAMS
// ---------------------------------------------------------------------------

#[test]
fn tm_stream_delivers_records() {
    let server = TmStreamServer::bind("127.0.0.1:0").unwrap();
    let endpoint = format!("127.0.0.1:{}", server.local_port().unwrap());

    let mut client = TmStreamClient::connect(&endpoint, IntHealthTm::SIZE).unwrap();
    let mut session = accept_tm_session(&server);

    let tm = IntHealthTm {
        temp_c: 28.5,
        pressure_hpa: 1010.0,
        humidity_pct: 35.0,
    };

    session.send_record(&tm.encode()).unwrap();

    let deadline = Instant::now() + Duration::from_secs(2);
    let record = loop {
        match client.recv_record().unwrap() {
            Some(r) => break r,
            None => assert!(Instant::now() < deadline, "record never arrived"),
        }
    };

    let decoded = IntHealthTm::decode(&record).unwrap();
    assert_eq!(decoded.temp_c, 28.5);
    assert_eq!(decoded.humidity_pct, 35.0);
}

#[test]
fn tm_stream_detects_server_gone() {
    let server = TmStreamServer::bind("127.0.0.1:0").unwrap();
    let endpoint = format!("127.0.0.1:{}", server.local_port().unwrap());

    let mut client = TmStreamClient::connect(&endpoint, IntHealthTm::SIZE).unwrap();
    let session = accept_tm_session(&server);

    drop(session);
    std::thread::sleep(Duration::from_millis(50));

    let deadline = Instant::now() + Duration::from_secs(2);
    loop {
        match client.recv_record() {
            Err(ChannelError::Disconnected) => break,
            Ok(None) => assert!(Instant::now() < deadline, "disconnect never noticed"),
            other => panic!("expected Disconnected, got {:?}", other),
        }
    }
}

// ---------------------------------------------------------------------------
// VOLTAGE BEACON
// ---------------------------------------------------------------------------

#[test]
fn beacon_delivers_datagrams() {
    let receiver = BeaconReceiver::bind("127.0.0.1:0").unwrap();
    let endpoint = format!("127.0.0.1:{}", receiver.local_port().unwrap());

    let sender = BeaconSender::new(&endpoint).unwrap();
    sender.send("12.61").unwrap();

    let deadline = Instant::now() + Duration::from_secs(2);
    loop {
        match receiver.recv().unwrap() {
            Some(text) => {
                assert_eq!(text, "12.61");
                break;
            }
            None => assert!(Instant::now() < deadline, "datagram never arrived"),
        }
    }
}
