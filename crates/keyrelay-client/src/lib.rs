//! Party-side handshake protocol for the keyrelay system.
//!
//! [`HandshakeClient`] is a pure state machine: feed it relay [`Event`]s,
//! send the [`Request`]s it hands back, and read the established session
//! key once the exchange completes. It performs the party's half of the
//! double-envelope exchange and verifies every relay signature before
//! trusting forwarded key material.
//!
//! [`Event`]: keyrelay_proto::Event
//! [`Request`]: keyrelay_proto::Request

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod error;
mod handshake;

pub use error::ClientError;
pub use handshake::{HandshakeClient, SESSION_KEY_LEN};
