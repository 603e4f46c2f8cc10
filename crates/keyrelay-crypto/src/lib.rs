//! Keyrelay Cryptographic Primitives
//!
//! RSA building blocks for the keyrelay handshake: chunked PKCS#1 v1.5
//! encryption for arbitrary-length payloads and SHA-256 PKCS#1 v1.5
//! signatures. Pure transforms with no I/O; callers provide the RNG, which
//! keeps tests deterministic.
//!
//! # Chunking
//!
//! PKCS#1 v1.5 cannot encrypt more than `modulus_len - 11` bytes in one
//! call, and the key material exchanged during a handshake (PEM-encoded
//! public keys) is longer than that. The cipher therefore splits plaintext
//! into maximum-length chunks and concatenates the fixed-size ciphertext
//! blocks:
//!
//! ```text
//! plaintext:  [chunk 0][chunk 1][tail]          chunks of modulus_len - 11
//!                 │        │      │
//!                 ▼        ▼      ▼
//! ciphertext: [block 0][block 1][block 2]       blocks of modulus_len
//! ```
//!
//! The inverse reads exact `modulus_len` blocks, so both sides derive the
//! boundary from the key alone.
//!
//! # Security
//!
//! - Decryption failures are a single opaque error. Distinguishing bad
//!   lengths from bad padding would hand an attacker a padding oracle
//! - Signatures cover exactly the bytes given; the relay signs forwarded
//!   ciphertext, never its own identity
//! - `verify` returns `false` on mismatch instead of erroring, so callers
//!   cannot accidentally treat a forged signature as an infrastructure
//!   fault

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod cipher;
mod error;
mod keys;

pub use cipher::{decrypt, encrypt, sign, verify};
pub use error::CryptoError;
pub use keys::{Keypair, PKCS1_PADDING_OVERHEAD, PublicKey};
// Re-exported so callers can name the RNG bound without depending on `rsa`
pub use rsa::rand_core::CryptoRngCore;
