//! Cryptographic primitives for the encryption handshake and service channel.
//!
//! Provides a thin, pure contract over X25519 key agreement and NaCl `box`
//! authenticated encryption (X25519 + XSalsa20-Poly1305), plus SHA3-256
//! hashing for the challenge/response confirmation.
//!
//! Keypairs are managed via x25519-dalek for explicit key control; sealing
//! and opening go through `crypto_box`, which implements the same
//! `crypto_box_easy`/`crypto_box_open_easy` construction as libsodium.
//!
//! All key material derives ZeroizeOnDrop — wiped from memory when dropped.
//! There is no unsafe code in this module.

use crypto_box::aead::{Aead, AeadCore, OsRng};
use crypto_box::{PublicKey as BoxPublicKey, SalsaBox, SecretKey as BoxSecretKey};
use rand::RngCore;
use sha3::{Digest, Sha3_256};
use thiserror::Error;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Length in bytes of a NaCl box nonce.
pub const NONCE_LEN: usize = 24;
/// Length in bytes of the Poly1305 authentication tag appended by `seal`.
pub const TAG_LEN: usize = 16;
/// Length in bytes of a SHA3-256 digest.
pub const HASH_LEN: usize = 32;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    #[error("peer public key is malformed")]
    MalformedPublicKey,
    #[error("nonce must be exactly {NONCE_LEN} bytes")]
    InvalidNonceLength,
    #[error("authentication failed")]
    AuthenticationFailed,
}

/// A freshly generated X25519 keypair.
///
/// The private half is zeroized on drop and never exposed outside this
/// struct except as raw bytes handed to `crypto_box` at seal/open time.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct Keypair {
    private: Zeroizing<[u8; 32]>,
    pub public: [u8; 32],
}

impl Keypair {
    /// Generate a new uniformly random X25519 keypair.
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(rand::thread_rng());
        let public = PublicKey::from(&secret);
        Self {
            private: Zeroizing::new(secret.to_bytes()),
            public: *public.as_bytes(),
        }
    }

    pub fn private_bytes(&self) -> &[u8; 32] {
        &self.private
    }
}

/// X25519 + HSalsa20 shared-key derivation, the "beforenm" phase of NaCl
/// box. The returned value is the precomputed box used for all subsequent
/// seal/open calls under this keypair/peer-key pair.
pub fn derive_shared(local_sk: &[u8; 32], peer_pk: &[u8; 32]) -> Result<SalsaBox, CryptoError> {
    let secret = BoxSecretKey::from(*local_sk);
    let public = BoxPublicKey::from(*peer_pk);
    Ok(SalsaBox::new(&public, &secret))
}

/// Authenticated box seal: `crypto_box_easy`. `nonce` must be 24 bytes.
pub fn seal(shared: &SalsaBox, nonce: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let nonce = to_nonce(nonce)?;
    shared
        .encrypt(&nonce, plaintext)
        .map_err(|_| CryptoError::AuthenticationFailed)
}

/// Authenticated box open: `crypto_box_open_easy`. Rejects any tampered
/// ciphertext, truncated MAC, or wrong nonce with a single error variant —
/// it never reveals which check failed.
pub fn open(shared: &SalsaBox, nonce: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let nonce = to_nonce(nonce)?;
    shared
        .decrypt(&nonce, ciphertext)
        .map_err(|_| CryptoError::AuthenticationFailed)
}

fn to_nonce(bytes: &[u8]) -> Result<crypto_box::Nonce, CryptoError> {
    if bytes.len() != NONCE_LEN {
        return Err(CryptoError::InvalidNonceLength);
    }
    Ok(*crypto_box::Nonce::from_slice(bytes))
}

/// A cryptographically random nonce of the given length (24 for box nonces).
pub fn random_nonce(len: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

/// Generate a fresh random NaCl box nonce via `AeadCore`, matching the
/// RNG `crypto_box` itself uses for encryption nonces.
pub fn random_box_nonce() -> crypto_box::Nonce {
    SalsaBox::generate_nonce(&mut OsRng)
}

/// SHA3-256 digest of `data`.
pub fn sha3_256(data: &[u8]) -> [u8; HASH_LEN] {
    let mut hasher = Sha3_256::new();
    hasher.update(data);
    hasher.finalize().into()
}
