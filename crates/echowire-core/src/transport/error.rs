//! Transport errors
//!
//! A read window that elapses with nothing received is NOT an error: `send`
//! returns an empty [`Ack`](super::Ack) in that case. Every variant here is
//! fatal to its phase — open-phase failures mean no connection was
//! established, send-phase failures close the connection.

use thiserror::Error;

/// Errors that can occur on the serial echo transport
#[derive(Error, Debug)]
pub enum TransportError {
    /// The device path could not be opened or claimed.
    #[error("failed to open port {port}: {reason}")]
    ConnectionFailed {
        /// Device path that was attempted
        port: String,
        /// Driver-level reason
        reason: String,
    },

    /// The device path does not exist.
    #[error("port not found: {0}")]
    PortNotFound(String),

    /// I/O failure on an already-open connection. Fatal: the connection
    /// transitions to Closed and no recovery is attempted.
    #[error("serial I/O error during send: {0}")]
    Serial(String),

    /// `send` or `send_sequence` was called outside the Open state.
    #[error("connection is not open")]
    NotOpen,

    /// `open` was called on a connection that already left the unopened
    /// state. There is no reopen path.
    #[error("connection was already opened")]
    AlreadyOpened,
}

impl TransportError {
    /// True for failures of the open phase (no connection was established).
    pub fn is_connect_error(&self) -> bool {
        matches!(
            self,
            TransportError::ConnectionFailed { .. } | TransportError::PortNotFound(_)
        )
    }
}
