//! Lifecycle and failure-path tests for the serial echo transport.

use echowire_core::sim::SimulatedEcho;
use echowire_core::transport::{Channel, Connection, ConnectionConfig, ConnectionState, TransportError};
use std::io::{self, Read, Write};
use std::time::Duration;

/// Channel that fails every write, as if the device was unplugged
struct FailingChannel;

impl Read for FailingChannel {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::Other, "read after unplug"))
    }
}

impl Write for FailingChannel {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "device unplugged"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "device unplugged"))
    }
}

impl Channel for FailingChannel {
    fn set_timeout(&mut self, _timeout: Duration) -> io::Result<()> {
        Ok(())
    }

    fn clear_input_buffer(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn bytes_to_read(&mut self) -> io::Result<u32> {
        Ok(0)
    }
}

fn sim_config() -> ConnectionConfig {
    ConnectionConfig {
        port_name: "sim".to_string(),
        timeout_ms: 100,
        settle_ms: 0,
        inter_send_delay_ms: 5,
        ..Default::default()
    }
}

#[test]
fn open_nonexistent_path_fails_before_any_send() {
    let config = ConnectionConfig {
        port_name: "/dev/echowire-no-such-device".to_string(),
        settle_ms: 0,
        ..Default::default()
    };

    let mut conn = Connection::new(config);
    let err = conn.open().expect_err("open of a missing path must fail");
    assert!(err.is_connect_error(), "wrong class: {err}");

    // No partial-open state exists
    assert_eq!(conn.state(), ConnectionState::Unopened);
    assert!(matches!(conn.send(b"A"), Err(TransportError::NotOpen)));
}

#[test]
fn open_then_close_without_sends() {
    let mut conn = Connection::from_channel(Box::new(SimulatedEcho::new()), sim_config());
    assert_eq!(conn.state(), ConnectionState::Open);
    conn.close();
    assert_eq!(conn.state(), ConnectionState::Closed);
}

#[test]
fn send_after_close_is_a_defined_error() {
    let mut conn = Connection::from_channel(Box::new(SimulatedEcho::new()), sim_config());
    conn.close();

    match conn.send(b"A") {
        Err(TransportError::NotOpen) => {}
        other => panic!("expected NotOpen, got {:?}", other),
    }
}

#[test]
fn write_failure_is_fatal_to_the_connection() {
    let mut conn = Connection::from_channel(Box::new(FailingChannel), sim_config());

    match conn.send(b"A") {
        Err(TransportError::Serial(reason)) => assert!(reason.contains("unplugged")),
        other => panic!("expected Serial error, got {:?}", other),
    }

    // Fatal: the connection is closed, not retried
    assert_eq!(conn.state(), ConnectionState::Closed);
    assert!(matches!(conn.send(b"B"), Err(TransportError::NotOpen)));
}

#[test]
fn sequence_stops_after_fatal_error() {
    let mut conn = Connection::from_channel(Box::new(FailingChannel), sim_config());

    let results: Vec<_> = conn.send_sequence([b"a", b"b", b"c"]).collect();
    assert_eq!(results.len(), 1, "sequence must end at the fatal error");
    assert!(results[0].is_err());
}

#[test]
fn counters_track_traffic() {
    let mut conn = Connection::from_channel(Box::new(SimulatedEcho::new()), sim_config());

    conn.send(b"hi").expect("send");
    conn.send(b"!").expect("send");

    let (tx, rx, sends) = conn.counters();
    assert_eq!(tx, 3);
    assert_eq!(rx, 3);
    assert_eq!(sends, 2);
}

#[test]
fn config_serde_round_trip() {
    let config = ConnectionConfig {
        port_name: "/dev/ttyACM0".to_string(),
        baud_rate: 9600,
        timeout_ms: 1000,
        settle_ms: 2000,
        inter_send_delay_ms: 50,
    };

    let json = serde_json::to_string(&config).expect("serialize");
    let back: ConnectionConfig = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(back.port_name, config.port_name);
    assert_eq!(back.baud_rate, config.baud_rate);
    assert_eq!(back.timeout_ms, config.timeout_ms);
    assert_eq!(back.settle_ms, config.settle_ms);
    assert_eq!(back.inter_send_delay_ms, config.inter_send_delay_ms);
}

#[test]
fn state_serde_round_trip() {
    let json = serde_json::to_string(&ConnectionState::Open).expect("serialize");
    let back: ConnectionState = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(back, ConnectionState::Open);
}
