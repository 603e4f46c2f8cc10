//! Client error types.

use keyrelay_crypto::CryptoError;
use keyrelay_proto::RejectReason;
use thiserror::Error;

/// Errors from the party-side handshake state machine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// The relay signature on forwarded key material did not verify.
    /// The material must be discarded; trusting it would let anyone
    /// impersonate the relay.
    #[error("relay signature rejected for material from {from}")]
    SignatureRejected {
        /// Claimed sender of the material
        from: String,
    },

    /// Decrypted key material was not a parseable public key
    #[error("malformed key material from {from}")]
    MalformedPeerKey {
        /// Claimed sender of the material
        from: String,
    },

    /// A local cryptographic operation failed
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// The relay rejected our previous request
    #[error("request rejected by relay: {reason}")]
    Rejected {
        /// The relay's stated reason
        reason: RejectReason,
    },
}
