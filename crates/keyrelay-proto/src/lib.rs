//! Keyrelay wire protocol.
//!
//! Defines what travels on the ordered, reliable channel between a party
//! and the relay: [`Request`] frames inbound, [`Event`] frames outbound,
//! both CBOR-encoded behind a 4-byte length prefix.
//!
//! # Invariants
//!
//! - Round-trip encoding must produce identical values (verified by
//!   property tests)
//! - A frame body never exceeds [`MAX_FRAME_SIZE`]; the prefix is checked
//!   before the body is read
//! - [`RejectReason`] is the only failure detail that crosses the wire

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod error;
mod payloads;
mod wire;

pub use error::{ProtocolError, Result};
pub use payloads::{Event, RejectReason, Request};
pub use wire::{LEN_PREFIX_SIZE, MAX_FRAME_SIZE, body_len, decode_body, encode_frame};
