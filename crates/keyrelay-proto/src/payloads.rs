//! CBOR-encoded protocol messages.
//!
//! Two directions, one enum each: [`Request`] travels party → relay,
//! [`Event`] travels relay → party. CBOR was kept over a hand-rolled binary
//! layout because it is self-describing and compact, and the relay decodes
//! every frame anyway; there is no opaque-routing fast path to optimize.
//!
//! All key material and ciphertext fields are raw bytes. The relay forwards
//! what it signs and signs what it forwards; a signature always covers the
//! ciphertext bytes in the same message, nothing else.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Messages a connected party sends to the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Request {
    /// Binds this connection to a party identity. Must be the first request
    /// on every connection; identity verification itself is the transport
    /// operator's concern, not the relay's.
    Hello {
        /// The party's stable handle
        party: String,
    },

    /// The party's public key PEM, encrypted under the relay's public key.
    SubmitPublicKey {
        /// Chunked-RSA ciphertext of the SPKI PEM
        key_for_relay: Vec<u8>,
    },

    /// Ask the relay to introduce the caller to `peer`.
    StartHandshake {
        /// The responder's handle
        peer: String,
    },

    /// Deliver the double-enveloped symmetric session key to `peer`.
    ///
    /// The inner layer is encrypted under the peer's public key, the outer
    /// layer under the relay's. The relay strips only the outer layer.
    SubmitSessionKey {
        /// The responder's handle
        peer: String,
        /// Outer envelope: relay-encrypted(peer-encrypted(session key))
        sealed_key: Vec<u8>,
    },

    /// Forward an opaque chat payload to `peer`. The relay never inspects
    /// the ciphertext; the session cipher lives entirely on the parties.
    RelayMessage {
        /// The recipient's handle
        peer: String,
        /// Session-cipher ciphertext
        ciphertext: Vec<u8>,
    },
}

/// Messages the relay pushes to a connected party.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    /// Snapshot of currently present parties, sent to a party right after
    /// its `Hello`.
    PeerList {
        /// Present party handles, sorted
        parties: Vec<String>,
    },

    /// A party's first connection arrived.
    PeerConnected {
        /// The arriving party
        party: String,
    },

    /// A party's last connection closed.
    PeerDisconnected {
        /// The departing party
        party: String,
    },

    /// Synchronous result of `StartHandshake`: the peer's public key,
    /// encrypted for the caller and signed by the relay.
    HandshakeReply {
        /// The responder's handle
        peer: String,
        /// Peer's public key PEM encrypted under the caller's public key
        key_for_caller: Vec<u8>,
        /// Relay signature over `key_for_caller`
        signature: Vec<u8>,
    },

    /// An initiator asked to be introduced to the receiving party.
    HandshakeRequested {
        /// The initiator's handle
        from: String,
        /// Initiator's public key PEM encrypted under the recipient's key
        key_for_peer: Vec<u8>,
        /// Relay signature over `key_for_peer`
        signature: Vec<u8>,
    },

    /// The initiator's session key, still encrypted for the recipient,
    /// re-signed by the relay after the outer envelope was stripped.
    SessionKeySet {
        /// The initiator's handle
        from: String,
        /// Session key encrypted under the recipient's public key
        key_for_peer: Vec<u8>,
        /// Relay signature over `key_for_peer`
        signature: Vec<u8>,
    },

    /// An opaque chat payload forwarded from another party.
    MessageReceived {
        /// The sender's handle
        from: String,
        /// Session-cipher ciphertext, untouched by the relay
        ciphertext: Vec<u8>,
    },

    /// The previous request was rejected. The reason is the entire failure
    /// surface; no additional detail crosses the wire.
    Rejected {
        /// Why the request was refused
        reason: RejectReason,
    },
}

/// The complete wire-visible failure taxonomy.
///
/// Cryptographic failures stay deliberately coarse so the error channel
/// cannot be used as an oracle. `PeerNotConnected` and `PeerKeyMissing` are
/// expected conditions, retryable once the peer shows up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    /// Key material did not parse
    InvalidKey,
    /// An encryption step failed
    EncryptionFailure,
    /// A decryption step failed (bad length or bad padding, undistinguished)
    DecryptionFailure,
    /// The named peer has no active connection
    PeerNotConnected,
    /// The peer (or the caller) has not submitted a public key yet
    PeerKeyMissing,
    /// Protocol violation: missing `Hello`, repeated `Hello`, or an
    /// otherwise malformed request
    MalformedRequest,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::InvalidKey => "invalid key",
            Self::EncryptionFailure => "encryption failure",
            Self::DecryptionFailure => "decryption failure",
            Self::PeerNotConnected => "peer not connected",
            Self::PeerKeyMissing => "peer key missing",
            Self::MalformedRequest => "malformed request",
        };
        f.write_str(name)
    }
}
