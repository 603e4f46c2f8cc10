//! RSA key containers and PEM parsing.
//!
//! Public keys travel as SubjectPublicKeyInfo PEM (what browsers and most
//! tooling export); private keys load from either PKCS#1 (`RSA PRIVATE KEY`)
//! or PKCS#8 (`PRIVATE KEY`) containers. Parsing happens once at
//! construction, so every later cipher call operates on a validated key.

use rsa::{
    RsaPrivateKey, RsaPublicKey,
    pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey},
    pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePublicKey, LineEnding},
    rand_core::CryptoRngCore,
    traits::PublicKeyParts,
};

use crate::error::CryptoError;

/// PKCS#1 v1.5 padding overhead per encrypted block, in bytes.
pub const PKCS1_PADDING_OVERHEAD: usize = 11;

/// A parsed RSA public key.
///
/// Construction validates the key material; `InvalidKey` is only possible
/// here, never in the cipher operations that consume the parsed key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey {
    key: RsaPublicKey,
}

impl PublicKey {
    /// Parse a public key from PEM.
    ///
    /// Accepts SubjectPublicKeyInfo (`BEGIN PUBLIC KEY`) with a PKCS#1
    /// (`BEGIN RSA PUBLIC KEY`) fallback.
    ///
    /// # Errors
    ///
    /// - `InvalidKey` if neither container parses or the modulus is too
    ///   small to hold a single padded byte
    pub fn from_pem(pem: &str) -> Result<Self, CryptoError> {
        let key = RsaPublicKey::from_public_key_pem(pem)
            .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
            .map_err(|e| CryptoError::InvalidKey { reason: e.to_string() })?;

        Self::from_rsa(key)
    }

    /// Encode as SubjectPublicKeyInfo PEM.
    pub fn to_pem(&self) -> Result<String, CryptoError> {
        self.key
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| CryptoError::InvalidKey { reason: e.to_string() })
    }

    /// Modulus length in bytes. One ciphertext block per modulus length.
    pub fn modulus_len(&self) -> usize {
        self.key.size()
    }

    /// Largest plaintext chunk a single PKCS#1 v1.5 block can carry.
    pub fn max_chunk_len(&self) -> usize {
        self.modulus_len().saturating_sub(PKCS1_PADDING_OVERHEAD)
    }

    pub(crate) fn from_rsa(key: RsaPublicKey) -> Result<Self, CryptoError> {
        if key.size() <= PKCS1_PADDING_OVERHEAD {
            return Err(CryptoError::InvalidKey {
                reason: format!("modulus too small: {} bytes", key.size()),
            });
        }
        Ok(Self { key })
    }

    pub(crate) fn as_rsa(&self) -> &RsaPublicKey {
        &self.key
    }
}

/// An RSA keypair. The private half never leaves this struct.
#[derive(Debug, Clone)]
pub struct Keypair {
    private: RsaPrivateKey,
    public: PublicKey,
}

impl Keypair {
    /// Generate a fresh keypair.
    ///
    /// The caller supplies the RNG so tests can run seeded and production
    /// code passes an OS-backed one.
    ///
    /// # Errors
    ///
    /// - `InvalidKey` if `bits` is not a valid RSA key size
    pub fn generate<R: CryptoRngCore>(rng: &mut R, bits: usize) -> Result<Self, CryptoError> {
        let private = RsaPrivateKey::new(rng, bits)
            .map_err(|e| CryptoError::InvalidKey { reason: e.to_string() })?;
        Self::from_rsa(private)
    }

    /// Parse a private key from PEM.
    ///
    /// Accepts PKCS#1 (`BEGIN RSA PRIVATE KEY`) with a PKCS#8
    /// (`BEGIN PRIVATE KEY`) fallback.
    ///
    /// # Errors
    ///
    /// - `InvalidKey` if neither container parses
    pub fn from_private_key_pem(pem: &str) -> Result<Self, CryptoError> {
        let private = RsaPrivateKey::from_pkcs1_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs8_pem(pem))
            .map_err(|e| CryptoError::InvalidKey { reason: e.to_string() })?;
        Self::from_rsa(private)
    }

    /// The public half of this keypair.
    pub fn public(&self) -> &PublicKey {
        &self.public
    }

    fn from_rsa(private: RsaPrivateKey) -> Result<Self, CryptoError> {
        let public = PublicKey::from_rsa(private.to_public_key())?;
        Ok(Self { private, public })
    }

    pub(crate) fn as_rsa(&self) -> &RsaPrivateKey {
        &self.private
    }
}
