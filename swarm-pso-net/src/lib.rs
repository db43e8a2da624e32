//! # SwarmPSO Network
//!
//! The coordinator/worker message contract and the transports that carry it.
//!
//! This crate provides:
//! - Request/response shapes for `GetWork` and `ReportResult`
//! - A versioned, postcard-encoded `MessageEnvelope` for byte transports
//! - `CoordinatorService` (server seam) and `CoordinatorClient` (client seam)
//! - An in-process client, a channel transport and a fault-injecting mock

#![forbid(unsafe_code)]

pub mod local;
pub mod protocol;
pub mod traits;

#[cfg(feature = "channel-transport")]
pub mod channel;

mod mock;
pub use mock::FlakyClient;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::local::LocalClient;
    pub use crate::protocol::*;
    pub use crate::traits::*;

    #[cfg(feature = "channel-transport")]
    pub use crate::channel::{channel, ChannelClient, ChannelServer};
}

/// Result type for network operations
pub type Result<T> = core::result::Result<T, Error>;

/// Transport error types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Connection failed
    ConnectionFailed,
    /// Send failed
    SendFailed,
    /// Receive failed
    ReceiveFailed,
    /// Timeout
    Timeout,
    /// The coordinator end is gone for good
    Disconnected,
    /// Serialization error
    Serialization,
    /// Invalid message format
    InvalidMessage,
    /// Peer speaks an incompatible protocol version
    VersionMismatch { expected: (u8, u8), found: (u8, u8) },
}

impl Error {
    /// Whether a worker should retry after this error
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Error::Disconnected | Error::VersionMismatch { .. })
    }
}

impl std::error::Error for Error {}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::ConnectionFailed => write!(f, "connection failed"),
            Error::SendFailed => write!(f, "send failed"),
            Error::ReceiveFailed => write!(f, "receive failed"),
            Error::Timeout => write!(f, "timeout"),
            Error::Disconnected => write!(f, "coordinator disconnected"),
            Error::Serialization => write!(f, "serialization error"),
            Error::InvalidMessage => write!(f, "invalid message format"),
            Error::VersionMismatch { expected, found } => write!(
                f,
                "protocol version mismatch: expected {}.{}, found {}.{}",
                expected.0, expected.1, found.0, found.1
            ),
        }
    }
}

impl From<postcard::Error> for Error {
    fn from(_: postcard::Error) -> Self {
        Error::Serialization
    }
}
