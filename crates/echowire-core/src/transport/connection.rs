//! Connection management
//!
//! Handles the connection lifecycle and the send/ack exchange with the echo
//! device. The lifecycle is strictly forward-only: `Unopened -> Open ->
//! Closed`, with no reconnect path. A fatal I/O error during a send closes
//! the connection.

use serde::{Deserialize, Serialize};
use std::io;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::channel::{Channel, SerialChannel};
use super::serial::{clear_buffers, configure_port, open_port};
use super::{
    TransportError, DEFAULT_BAUD_RATE, DEFAULT_INTER_SEND_DELAY_MS, DEFAULT_SETTLE_MS,
    DEFAULT_TIMEOUT_MS,
};

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// Created but never opened
    Unopened,
    /// Open and ready to send
    Open,
    /// Released; no transition back
    Closed,
}

/// Connection configuration
///
/// The device path, baud rate and read timeout are the complete connection
/// surface of the wire protocol; the settle and inter-send delays are
/// timing characteristics of the device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Serial device path (e.g. "/dev/ttyACM0")
    pub port_name: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Bound on the per-send read window, in milliseconds
    pub timeout_ms: u64,
    /// Settle period after port open, in milliseconds. The device resets
    /// on connect and discards writes that arrive before the reset cycle
    /// completes.
    pub settle_ms: u64,
    /// Delay between items of a send sequence, in milliseconds
    pub inter_send_delay_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            port_name: String::new(),
            baud_rate: DEFAULT_BAUD_RATE,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            settle_ms: DEFAULT_SETTLE_MS,
            inter_send_delay_ms: DEFAULT_INTER_SEND_DELAY_MS,
        }
    }
}

/// The bytes (possibly none) read back from the device within the timeout
/// window after a send.
///
/// An empty ack means the window elapsed with nothing received; that is a
/// normal outcome, not a failure. Acks carry no correlation with the
/// request that triggered them.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Ack {
    bytes: Vec<u8>,
}

impl Ack {
    fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Raw bytes read back
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consume the ack, returning the raw bytes
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// True if nothing arrived before the timeout elapsed
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Number of bytes read back
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Decode the ack as text. Invalid UTF-8 is replaced, never raised;
    /// use [`bytes`](Self::bytes) for the raw data.
    pub fn to_text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

/// Write bytes to the channel and ensure they are transmitted.
/// flush() on a serial port calls tcdrain, which can block indefinitely on
/// some USB CDC drivers; write_all puts the data in the kernel tty buffer,
/// so waiting out the hardware transmission time is sufficient.
#[cfg(target_family = "unix")]
fn write_and_wait(channel: &mut dyn Channel, data: &[u8], baud_rate: u32) -> io::Result<()> {
    channel.write_all(data)?;

    let safe_baud = if baud_rate == 0 {
        warn!("write_and_wait: baud rate is 0, assuming {}", DEFAULT_BAUD_RATE);
        DEFAULT_BAUD_RATE
    } else {
        baud_rate
    };

    // Each byte on the wire is 10 bits (1 start + 8 data + 1 stop)
    let bits = (data.len() * 10) as u64;
    let transmit_ms = bits * 1_000 / safe_baud as u64;
    let wait_ms = std::cmp::max(10, transmit_ms + 5);

    thread::sleep(Duration::from_millis(wait_ms));
    Ok(())
}

/// Non-Unix systems: use write_all with flush
#[cfg(not(target_family = "unix"))]
fn write_and_wait(channel: &mut dyn Channel, data: &[u8], _baud_rate: u32) -> io::Result<()> {
    channel.write_all(data)?;
    channel.flush()
}

/// Inter-character grace: once data has started arriving, how long the read
/// window waits for more before treating the ack as complete.
fn inter_char_grace(timeout_ms: u64) -> Duration {
    Duration::from_millis((timeout_ms / 4).clamp(25, 100))
}

/// One write followed by exactly one bounded read window.
/// Returns whatever arrived before the window closed (possibly nothing).
fn exchange(
    channel: &mut dyn Channel,
    data: &[u8],
    baud_rate: u32,
    timeout: Duration,
    quiet: Duration,
) -> Result<Vec<u8>, TransportError> {
    write_and_wait(channel, data, baud_rate).map_err(|e| TransportError::Serial(e.to_string()))?;

    let mut response = Vec::new();
    let mut buffer = [0u8; 512];
    let start = Instant::now();
    let mut last_data = Instant::now();

    loop {
        if start.elapsed() > timeout {
            debug!(received = response.len(), "exchange: read window closed on timeout");
            break;
        }

        // Check how many bytes are available without blocking
        let available = channel
            .bytes_to_read()
            .map_err(|e| TransportError::Serial(e.to_string()))?;

        if available > 0 {
            let to_read = std::cmp::min(available as usize, buffer.len());
            match channel.read(&mut buffer[..to_read]) {
                Ok(0) => break,
                Ok(n) => {
                    response.extend_from_slice(&buffer[..n]);
                    last_data = Instant::now();
                }
                Err(ref e)
                    if e.kind() == io::ErrorKind::TimedOut
                        || e.kind() == io::ErrorKind::WouldBlock =>
                {
                    // Non-blocking, keep polling
                }
                Err(e) => return Err(TransportError::Serial(e.to_string())),
            }
        } else if response.is_empty() {
            thread::sleep(Duration::from_millis(2));
        } else {
            // Some data arrived; treat a quiet line as end of ack
            if last_data.elapsed() > quiet {
                break;
            }
            thread::sleep(Duration::from_millis(2));
        }
    }

    Ok(response)
}

/// A serial connection to one echo device.
///
/// The connection exclusively owns its channel for its lifetime; `&mut self`
/// on the send methods enforces one in-flight request at a time. The
/// serialport crate claims the device exclusively at the OS level, so at
/// most one open connection per device path exists within a process.
pub struct Connection {
    /// Wire handle; None outside the Open state
    channel: Option<Box<dyn Channel>>,
    /// Current lifecycle state
    state: ConnectionState,
    /// Connection configuration
    config: ConnectionConfig,
    /// Metrics: cumulative bytes sent/received and send count
    tx_bytes: u64,
    rx_bytes: u64,
    sends: u64,
}

impl Connection {
    /// Create a new connection (not yet opened)
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            channel: None,
            state: ConnectionState::Unopened,
            config,
            tx_bytes: 0,
            rx_bytes: 0,
            sends: 0,
        }
    }

    /// Wrap an already-established channel (a simulated peer or test
    /// double). The connection starts Open; no settle period applies.
    pub fn from_channel(channel: Box<dyn Channel>, config: ConnectionConfig) -> Self {
        Self {
            channel: Some(channel),
            state: ConnectionState::Open,
            config,
            tx_bytes: 0,
            rx_bytes: 0,
            sends: 0,
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Connection configuration
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Cumulative (tx bytes, rx bytes, sends) counters
    pub fn counters(&self) -> (u64, u64, u64) {
        (self.tx_bytes, self.rx_bytes, self.sends)
    }

    /// Open the serial line.
    ///
    /// Opens and configures the port, then waits out the settle period:
    /// the device resets when the port is opened and discards writes that
    /// arrive before its reset cycle completes. Garbage received during
    /// the reset is cleared before the connection becomes usable.
    ///
    /// Fails with a connect-phase error if the device path does not exist
    /// or cannot be claimed. Valid only in the Unopened state.
    pub fn open(&mut self) -> Result<(), TransportError> {
        if self.state != ConnectionState::Unopened {
            return Err(TransportError::AlreadyOpened);
        }

        let mut port = open_port(&self.config.port_name, self.config.baud_rate)?;
        configure_port(port.as_mut())?;
        clear_buffers(port.as_mut()).map_err(|e| self.as_open_failure(e))?;

        debug!(
            port = %self.config.port_name,
            settle_ms = self.config.settle_ms,
            "open: waiting for device reset cycle"
        );
        thread::sleep(Duration::from_millis(self.config.settle_ms));

        // Drop anything the device emitted while resetting
        clear_buffers(port.as_mut()).map_err(|e| self.as_open_failure(e))?;

        self.channel = Some(Box::new(SerialChannel::new(port)));
        self.state = ConnectionState::Open;
        debug!(port = %self.config.port_name, "open: connection ready");
        Ok(())
    }

    /// Reclassify a send-phase error raised while still opening
    fn as_open_failure(&self, e: TransportError) -> TransportError {
        match e {
            TransportError::Serial(reason) => TransportError::ConnectionFailed {
                port: self.config.port_name.clone(),
                reason,
            },
            other => other,
        }
    }

    /// Write `data`, then perform exactly one read window bounded by the
    /// configured timeout.
    ///
    /// Returns the bytes read back (possibly empty if nothing arrived in
    /// time — a normal outcome, not a failure). No retries, and no check
    /// that the ack matches the request: the device protocol has no
    /// framing. An I/O failure is fatal and closes the connection.
    pub fn send(&mut self, data: &[u8]) -> Result<Ack, TransportError> {
        if self.state != ConnectionState::Open {
            return Err(TransportError::NotOpen);
        }

        let baud_rate = self.config.baud_rate;
        let timeout = Duration::from_millis(self.config.timeout_ms);
        let quiet = inter_char_grace(self.config.timeout_ms);

        let result = {
            let channel = self.channel.as_mut().ok_or(TransportError::NotOpen)?;
            exchange(channel.as_mut(), data, baud_rate, timeout, quiet)
        };

        match result {
            Ok(bytes) => {
                self.tx_bytes = self.tx_bytes.saturating_add(data.len() as u64);
                self.rx_bytes = self.rx_bytes.saturating_add(bytes.len() as u64);
                self.sends = self.sends.saturating_add(1);
                Ok(Ack::new(bytes))
            }
            Err(e) => {
                warn!("send: fatal I/O error, closing connection: {e}");
                self.channel = None;
                self.state = ConnectionState::Closed;
                Err(e)
            }
        }
    }

    /// Apply [`send`](Self::send) to each item in order, sleeping the
    /// configured inter-send delay between items to avoid overrunning the
    /// device's receive buffer.
    ///
    /// The returned iterator is lazy and yields one ack per item, in input
    /// order. It borrows the connection mutably, so it is not restartable.
    /// A transport error ends the sequence (the connection is closed at
    /// that point).
    pub fn send_sequence<I>(&mut self, items: I) -> SendSequence<'_, I::IntoIter>
    where
        I: IntoIterator,
        I::Item: AsRef<[u8]>,
    {
        let delay = Duration::from_millis(self.config.inter_send_delay_ms);
        SendSequence {
            conn: self,
            items: items.into_iter(),
            delay,
            first: true,
            dead: false,
        }
    }

    /// Forward a text chunk through [`send_sequence`](Self::send_sequence),
    /// one character per transmission unit.
    ///
    /// This is the surface upstream character sources feed: a keystroke
    /// source passes one-character chunks, a streamed text source passes
    /// whole chunks.
    pub fn send_str(&mut self, text: &str) -> SendSequence<'_, std::vec::IntoIter<Vec<u8>>> {
        let units: Vec<Vec<u8>> = text
            .chars()
            .map(|c| {
                let mut buf = [0u8; 4];
                c.encode_utf8(&mut buf).as_bytes().to_vec()
            })
            .collect();
        self.send_sequence(units)
    }

    /// Release the serial handle.
    ///
    /// Closing an already-closed (or never-opened) connection is a no-op.
    /// There is no transition back: a closed connection cannot be reopened.
    pub fn close(&mut self) {
        if self.state == ConnectionState::Closed {
            return;
        }
        if self.state == ConnectionState::Open {
            debug!(port = %self.config.port_name, "close: releasing serial handle");
        }
        self.channel = None;
        self.state = ConnectionState::Closed;
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

/// Lazy iterator over the acks of a send sequence.
///
/// Produced by [`Connection::send_sequence`] and [`Connection::send_str`].
pub struct SendSequence<'a, I> {
    conn: &'a mut Connection,
    items: I,
    delay: Duration,
    first: bool,
    dead: bool,
}

impl<I> Iterator for SendSequence<'_, I>
where
    I: Iterator,
    I::Item: AsRef<[u8]>,
{
    type Item = Result<Ack, TransportError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.dead {
            return None;
        }
        let item = self.items.next()?;
        if self.first {
            self.first = false;
        } else {
            thread::sleep(self.delay);
        }
        let result = self.conn.send(item.as_ref());
        if result.is_err() {
            // Fatal to the connection; nothing more will be sent
            self.dead = true;
        }
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimulatedEcho;

    fn test_config() -> ConnectionConfig {
        ConnectionConfig {
            port_name: "sim".to_string(),
            timeout_ms: 100,
            settle_ms: 0,
            inter_send_delay_ms: 5,
            ..Default::default()
        }
    }

    #[test]
    fn test_connection_config_default() {
        let config = ConnectionConfig::default();
        assert_eq!(config.baud_rate, DEFAULT_BAUD_RATE);
        assert_eq!(config.timeout_ms, DEFAULT_TIMEOUT_MS);
        assert_eq!(config.settle_ms, DEFAULT_SETTLE_MS);
        assert_eq!(config.inter_send_delay_ms, DEFAULT_INTER_SEND_DELAY_MS);
    }

    #[test]
    fn test_new_connection_is_unopened() {
        let conn = Connection::new(ConnectionConfig::default());
        assert_eq!(conn.state(), ConnectionState::Unopened);
    }

    #[test]
    fn test_send_before_open_fails() {
        let mut conn = Connection::new(ConnectionConfig::default());
        match conn.send(b"A") {
            Err(TransportError::NotOpen) => {}
            other => panic!("expected NotOpen, got {:?}", other),
        }
    }

    #[test]
    fn test_open_twice_fails() {
        let mut conn =
            Connection::from_channel(Box::new(SimulatedEcho::new()), test_config());
        match conn.open() {
            Err(TransportError::AlreadyOpened) => {}
            other => panic!("expected AlreadyOpened, got {:?}", other),
        }
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut conn =
            Connection::from_channel(Box::new(SimulatedEcho::new()), test_config());
        conn.close();
        assert_eq!(conn.state(), ConnectionState::Closed);
        conn.close();
        assert_eq!(conn.state(), ConnectionState::Closed);
    }

    #[test]
    fn test_ack_accessors() {
        let ack = Ack::new(b"hi".to_vec());
        assert!(!ack.is_empty());
        assert_eq!(ack.len(), 2);
        assert_eq!(ack.bytes(), b"hi");
        assert_eq!(ack.to_text(), "hi");
        assert_eq!(ack.into_bytes(), b"hi".to_vec());
    }

    #[test]
    fn test_ack_lossy_text_decode() {
        let ack = Ack::new(vec![0x68, 0xFF, 0x69]);
        let text = ack.to_text();
        assert!(text.starts_with('h'));
        assert!(text.ends_with('i'));
        assert!(text.contains('\u{FFFD}'));
    }

    #[test]
    fn test_inter_char_grace_bounds() {
        assert_eq!(inter_char_grace(1000), Duration::from_millis(100));
        assert_eq!(inter_char_grace(40), Duration::from_millis(25));
        assert_eq!(inter_char_grace(200), Duration::from_millis(50));
    }
}
