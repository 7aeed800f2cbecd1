//! Dumper-device discovery over serial ports.
//!
//! A discovery pass enumerates the host's candidate ports, sends the
//! `flash\n` handshake to each one in turn and keeps a persistent connection
//! to every port that echoes it back.
//!
//! - [`enumerate`]: per-platform candidate port listing
//! - [`link`]: the byte-stream abstraction over a serial port
//! - [`handshake`]: the probe exchange
//! - [`transport`]: the discovery state machine and confirmed-device map
//! - [`discovery`]: running a pass on a background thread

pub mod discovery;
pub mod enumerate;
pub mod handshake;
pub mod link;
pub mod transport;

pub use discovery::{DiscoveryEvent, DiscoveryTask, SharedTransport};
pub use enumerate::{Enumerator, Platform};
pub use link::{Connector, Link, LinkSettings, SystemConnector};
pub use transport::{
    DiscoveryReport, DiscoveryState, Rejection, SerialDevice, SerialTransport, TransportConfig,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SerialError {
    #[error("unsupported platform: {0}")]
    UnsupportedPlatform(String),
    #[error("bad port pattern: {0}")]
    Pattern(#[from] glob::PatternError),
    #[error("failed to open {port}: {source}")]
    Open {
        port: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{port}: no handshake response before timeout")]
    HandshakeTimeout { port: String },
    #[error("{port}: unexpected handshake response {response:?}")]
    HandshakeMismatch { port: String, response: String },
    #[error("a discovery pass is already running")]
    DiscoveryInProgress,
    #[error("discovery worker stopped without reporting")]
    WorkerGone,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl SerialError {
    /// Per-port failures that a scan skips over.
    pub fn is_port_local(&self) -> bool {
        matches!(
            self,
            SerialError::Open { .. }
                | SerialError::HandshakeTimeout { .. }
                | SerialError::HandshakeMismatch { .. }
                | SerialError::Io(_)
        )
    }
}
