//! Serial Echo Transport
//!
//! Provides a blocking request/response primitive over a serial line: a
//! request is an outbound byte sequence, a response is whatever the device
//! echoes back within a bounded timeout window.
//!
//! The device protocol carries no framing and no sequence numbers, so acks
//! are not correlated with requests. Callers that need correlation must
//! layer a framing protocol above this transport.

mod channel;
mod connection;
mod error;
pub mod serial;

pub use channel::{Channel, SerialChannel};
pub use connection::{Ack, Connection, ConnectionConfig, ConnectionState, SendSequence};
pub use error::TransportError;
pub use serial::{clear_buffers, configure_port, list_ports, open_port, PortInfo};

/// Default baud rate for echo devices
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Default timeout for the per-send read window in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 1000;

/// Default settle period after port open in milliseconds.
/// The device resets on connect and discards writes arriving before the
/// reset cycle completes.
pub const DEFAULT_SETTLE_MS: u64 = 2000;

/// Default delay between items of a send sequence in milliseconds, to avoid
/// overrunning the device's receive buffer.
pub const DEFAULT_INTER_SEND_DELAY_MS: u64 = 50;
