//! Server error types.
//!
//! Two layers: [`DriverError`] for internal invariant violations inside the
//! relay driver (caller faults never land here; those become `Rejected`
//! events on the wire), and [`ServerError`] for the production runtime.

use std::fmt;

use keyrelay_crypto::CryptoError;

/// Errors from relay driver processing.
///
/// Every variant indicates a relay-side bug or misconfiguration, not a
/// misbehaving party. Party mistakes are answered with
/// `Event::Rejected` actions instead.
#[derive(Debug)]
pub enum DriverError {
    /// A frame or close event referenced a session the driver never
    /// accepted. Runtime bookkeeping bug.
    SessionNotFound(u64),

    /// The runtime accepted the same session ID twice. Session IDs must be
    /// unique for the process lifetime.
    SessionAlreadyExists(u64),

    /// A relay-key operation failed (signing with the relay's own key).
    /// The relay keypair is validated at startup, so this should not occur.
    Crypto(CryptoError),
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SessionNotFound(id) => write!(f, "session not found: {id}"),
            Self::SessionAlreadyExists(id) => write!(f, "session already exists: {id}"),
            Self::Crypto(err) => write!(f, "relay key operation failed: {err}"),
        }
    }
}

impl std::error::Error for DriverError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Crypto(err) => Some(err),
            _ => None,
        }
    }
}

impl From<CryptoError> for DriverError {
    fn from(err: CryptoError) -> Self {
        Self::Crypto(err)
    }
}

/// Errors that can occur in the production server runtime.
#[derive(Debug)]
pub enum ServerError {
    /// Configuration error (invalid bind address, missing or unparseable
    /// relay key). Fatal at startup; fix configuration and restart.
    Config(String),

    /// Transport/network error (bind failure, I/O error). May be transient
    /// or fatal; check the message.
    Transport(String),

    /// Protocol error (malformed frame from a client). Fatal for that
    /// connection only.
    Protocol(String),

    /// Driver error. See [`DriverError`].
    Driver(DriverError),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {msg}"),
            Self::Transport(msg) => write!(f, "transport error: {msg}"),
            Self::Protocol(msg) => write!(f, "protocol error: {msg}"),
            Self::Driver(err) => write!(f, "driver error: {err}"),
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Driver(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DriverError> for ServerError {
    fn from(err: DriverError) -> Self {
        Self::Driver(err)
    }
}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<keyrelay_proto::ProtocolError> for ServerError {
    fn from(err: keyrelay_proto::ProtocolError) -> Self {
        Self::Protocol(err.to_string())
    }
}
