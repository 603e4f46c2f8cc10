//! Error types for RSA operations.

use thiserror::Error;

/// Errors from key parsing and cipher operations.
///
/// Encryption and decryption failures are deliberately opaque: a failed
/// PKCS#1 unpadding must not reveal which byte was malformed, otherwise the
/// error channel becomes a padding oracle. Key parsing errors may carry
/// detail since key material is not secret.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Key material could not be parsed or is unusable
    #[error("invalid key material: {reason}")]
    InvalidKey {
        /// What was wrong with the key
        reason: String,
    },

    /// A per-chunk encryption call failed
    #[error("encryption failed")]
    EncryptionFailure,

    /// Ciphertext length or unpadding failure. Single opaque category
    #[error("decryption failed")]
    DecryptionFailure,

    /// Signature generation failed
    #[error("signing failed")]
    SigningFailure,
}
