//! # EchoWire Core Library
//!
//! Blocking serial transport for microcontroller echo devices.
//!
//! ## Example
//!
//! ```rust,ignore
//! use echowire_core::transport::{Connection, ConnectionConfig};
//!
//! let config = ConnectionConfig {
//!     port_name: "/dev/ttyACM0".to_string(),
//!     ..Default::default()
//! };
//!
//! let mut conn = Connection::new(config);
//! conn.open()?;
//! for ack in conn.send_str("hi") {
//!     println!("echoed back: {}", ack?.to_text());
//! }
//! conn.close();
//! ```

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod sim;
pub mod transport;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::sim::{PeerBehavior, SimulatedEcho};
    pub use crate::transport::{
        Ack, Connection, ConnectionConfig, ConnectionState, TransportError,
    };
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
