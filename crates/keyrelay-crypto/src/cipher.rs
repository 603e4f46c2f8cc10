//! Chunked RSA PKCS#1 v1.5 encryption and SHA-256 signatures.
//!
//! A single PKCS#1 v1.5 block carries at most `modulus_len - 11` bytes, so
//! payloads above that (a PEM-encoded public key already is) are split into
//! maximum-length chunks, each encrypted independently, and the fixed-size
//! ciphertext blocks concatenated in order. The block boundary is derived
//! from the key's modulus length on both sides; decryption consumes exact
//! `modulus_len` blocks rather than guessing a boundary from the plaintext.

use rsa::{Pkcs1v15Encrypt, Pkcs1v15Sign, rand_core::CryptoRngCore};
use sha2::{Digest, Sha256};

use crate::{
    error::CryptoError,
    keys::{Keypair, PublicKey},
};

/// Encrypt `plaintext` for `recipient`, chunking as needed.
///
/// Output length is always a multiple of the recipient's modulus length;
/// empty plaintext produces empty ciphertext.
///
/// # Errors
///
/// - `EncryptionFailure` if any per-chunk encryption fails
pub fn encrypt<R: CryptoRngCore>(
    rng: &mut R,
    recipient: &PublicKey,
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let block_len = recipient.modulus_len();
    let chunk_len = recipient.max_chunk_len();

    let mut ciphertext = Vec::with_capacity(plaintext.len().div_ceil(chunk_len.max(1)) * block_len);

    for chunk in plaintext.chunks(chunk_len) {
        let block = recipient
            .as_rsa()
            .encrypt(rng, Pkcs1v15Encrypt, chunk)
            .map_err(|_| CryptoError::EncryptionFailure)?;

        debug_assert_eq!(block.len(), block_len);
        ciphertext.extend_from_slice(&block);
    }

    Ok(ciphertext)
}

/// Decrypt ciphertext produced by [`encrypt`] with the matching public key.
///
/// # Errors
///
/// - `DecryptionFailure` if the ciphertext length is not a multiple of the
///   key's modulus length, or any block fails unpadding. One opaque error
///   for every failure mode; nothing about the padding leaks
pub fn decrypt(keypair: &Keypair, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let block_len = keypair.public().modulus_len();

    if !ciphertext.len().is_multiple_of(block_len) {
        return Err(CryptoError::DecryptionFailure);
    }

    let mut plaintext = Vec::with_capacity(ciphertext.len() / block_len * block_len);

    for block in ciphertext.chunks_exact(block_len) {
        let chunk = keypair
            .as_rsa()
            .decrypt(Pkcs1v15Encrypt, block)
            .map_err(|_| CryptoError::DecryptionFailure)?;
        plaintext.extend_from_slice(&chunk);
    }

    Ok(plaintext)
}

/// Sign `data` with the private key: SHA-256 digest, PKCS#1 v1.5 padding.
///
/// Deterministic for a given key and data.
///
/// # Errors
///
/// - `SigningFailure` if the key cannot produce a signature (modulus too
///   small for the digest)
pub fn sign(keypair: &Keypair, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let digest = Sha256::digest(data);

    keypair
        .as_rsa()
        .sign(Pkcs1v15Sign::new::<Sha256>(), &digest)
        .map_err(|_| CryptoError::SigningFailure)
}

/// Verify a signature over `data` against the signer's public key.
///
/// A mismatched signature is `false`, never an error; the key itself was
/// validated at parse time.
pub fn verify(signer: &PublicKey, data: &[u8], signature: &[u8]) -> bool {
    let digest = Sha256::digest(data);

    signer.as_rsa().verify(Pkcs1v15Sign::new::<Sha256>(), &digest, signature).is_ok()
}
