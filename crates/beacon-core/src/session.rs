//! Per-connection encryption session: key agreement plus challenge/response.
//!
//! Mirrors the handshake state machine described for the Encryption
//! service: `Idle -> KeysGenerated -> SharedDerived -> ChallengeIssued ->
//! Ready`, with `reset()` dropping back to `Idle` from any state and
//! wiping key material.

use crypto_box::SalsaBox;
use subtle::ConstantTimeEq;
use thiserror::Error;
use tokio::sync::watch;

use crate::crypto::{self, Keypair, CryptoError, HASH_LEN, NONCE_LEN};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    KeysGenerated,
    SharedDerived,
    ChallengeIssued,
    Ready,
}

#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("local keys are not initialised")]
    KeysNotReady,
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error("no challenge has been issued")]
    NoChallengeIssued,
}

/// Holds per-connection key material and drives the handshake to `Ready`.
///
/// Not `Sync`-guarded: per the single-threaded cooperative event loop,
/// only one event is processed at a time, so an `Rc`/plain ownership
/// model (wrapped by the caller as needed) is sufficient.
pub struct EncryptionSession {
    state: SessionState,
    local: Option<Keypair>,
    client_public: Option<[u8; 32]>,
    shared: Option<SalsaBox>,
    expected_confirmation: Option<[u8; HASH_LEN]>,
    ready_tx: watch::Sender<bool>,
}

impl EncryptionSession {
    /// Create a new session in `Idle` state with no key material.
    pub fn new() -> Self {
        let (ready_tx, _) = watch::channel(false);
        Self {
            state: SessionState::Idle,
            local: None,
            client_public: None,
            shared: None,
            expected_confirmation: None,
            ready_tx,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == SessionState::Ready
    }

    /// Subscribe to `ready` transitions. Data handlers hold a receiver and
    /// poll it (or watch it) to gate encrypted transmission.
    pub fn subscribe_ready(&self) -> watch::Receiver<bool> {
        self.ready_tx.subscribe()
    }

    pub fn local_public_key(&self) -> Option<[u8; 32]> {
        self.local.as_ref().map(|k| k.public)
    }

    /// Zero-fill and drop all key material; transition to `Idle`.
    pub fn reset(&mut self) {
        self.local = None;
        self.client_public = None;
        self.shared = None;
        self.expected_confirmation = None;
        self.state = SessionState::Idle;
        let _ = self.ready_tx.send(false);
    }

    /// Populate a fresh local keypair. Calls `reset()` first, so this is
    /// idempotent from any state.
    pub fn generate_keypair(&mut self) {
        self.reset();
        self.local = Some(Keypair::generate());
        self.state = SessionState::KeysGenerated;
    }

    /// Store the client's public key and derive the shared box. Auto-
    /// generates local keys if they are missing (server-side convenience);
    /// `Ready` is explicitly NOT set here — only `verify_challenge` sets it.
    pub fn calculate_shared(&mut self, client_pk: [u8; 32]) -> Result<(), HandshakeError> {
        if self.local.is_none() {
            self.generate_keypair();
        }
        let local = self.local.as_ref().expect("generated above");
        let shared = crypto::derive_shared(local.private_bytes(), &client_pk)?;
        self.client_public = Some(client_pk);
        self.shared = Some(shared);
        self.state = SessionState::SharedDerived;
        Ok(())
    }

    /// Produce a random 24-byte challenge, store its SHA3-256 as the
    /// expected confirmation, and return the raw challenge bytes.
    pub fn generate_challenge(&mut self) -> Result<Vec<u8>, HandshakeError> {
        if self.shared.is_none() {
            return Err(HandshakeError::KeysNotReady);
        }
        let challenge = crypto::random_nonce(NONCE_LEN);
        self.expected_confirmation = Some(crypto::sha3_256(&challenge));
        self.state = SessionState::ChallengeIssued;
        Ok(challenge)
    }

    /// Constant-time compare `candidate` against the stored expected
    /// confirmation. On success transitions to `Ready` and emits
    /// `ready_changed(true)`. On failure, state is unchanged.
    pub fn verify_challenge(&mut self, candidate: &[u8]) -> bool {
        let Some(expected) = self.expected_confirmation else {
            return false;
        };
        if candidate.len() != HASH_LEN {
            return false;
        }
        let matches: bool = candidate.ct_eq(&expected).into();
        if matches {
            self.state = SessionState::Ready;
            let _ = self.ready_tx.send(true);
        }
        matches
    }

    /// `generate_nonce(24)` convenience wrapper, used for every encrypted
    /// envelope produced on this session.
    pub fn generate_nonce(&self) -> Vec<u8> {
        crypto::random_nonce(NONCE_LEN)
    }

    pub fn encrypt(&self, plaintext: &[u8], nonce: &[u8]) -> Result<Vec<u8>, HandshakeError> {
        let shared = self.shared.as_ref().ok_or(HandshakeError::KeysNotReady)?;
        Ok(crypto::seal(shared, nonce, plaintext)?)
    }

    pub fn decrypt(&self, ciphertext: &[u8], nonce: &[u8]) -> Result<Vec<u8>, HandshakeError> {
        let shared = self.shared.as_ref().ok_or(HandshakeError::KeysNotReady)?;
        Ok(crypto::open(shared, nonce, ciphertext)?)
    }
}

impl Default for EncryptionSession {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handshake_to_ready(server: &mut EncryptionSession, client: &mut EncryptionSession) {
        server.generate_keypair();
        client.generate_keypair();

        let client_pk = client.local_public_key().unwrap();
        server.calculate_shared(client_pk).unwrap();
        assert_eq!(server.state(), SessionState::SharedDerived);

        let server_pk = server.local_public_key().unwrap();
        client.calculate_shared(server_pk).unwrap();

        let challenge = server.generate_challenge().unwrap();
        assert_eq!(server.state(), SessionState::ChallengeIssued);

        let n1 = server.generate_nonce();
        let ct1 = server.encrypt(&challenge, &n1).unwrap();
        let decrypted_challenge = client.decrypt(&ct1, &n1).unwrap();
        assert_eq!(decrypted_challenge, challenge);

        let confirmation = crate::crypto::sha3_256(&decrypted_challenge);
        let n2 = client.generate_nonce();
        let ct2 = client.encrypt(&confirmation, &n2).unwrap();

        let reopened = server.decrypt(&ct2, &n2).unwrap();
        assert!(server.verify_challenge(&reopened));
    }

    #[test]
    fn full_handshake_reaches_ready() {
        let mut server = EncryptionSession::new();
        let mut client = EncryptionSession::new();
        handshake_to_ready(&mut server, &mut client);
        assert!(server.is_ready());
        assert!(*server.subscribe_ready().borrow());
    }

    #[test]
    fn wrong_confirmation_does_not_advance() {
        let mut server = EncryptionSession::new();
        let mut client = EncryptionSession::new();
        server.generate_keypair();
        client.generate_keypair();
        server
            .calculate_shared(client.local_public_key().unwrap())
            .unwrap();
        let _challenge = server.generate_challenge().unwrap();

        assert!(!server.verify_challenge(&[0u8; HASH_LEN]));
        assert_eq!(server.state(), SessionState::ChallengeIssued);
        assert!(!server.is_ready());
    }

    #[test]
    fn reset_clears_everything() {
        let mut server = EncryptionSession::new();
        let mut client = EncryptionSession::new();
        handshake_to_ready(&mut server, &mut client);
        assert!(server.is_ready());

        server.reset();
        assert_eq!(server.state(), SessionState::Idle);
        assert!(!server.is_ready());
        assert!(server.local_public_key().is_none());
        assert!(server.encrypt(b"x", &[0u8; NONCE_LEN]).is_err());
    }

    #[test]
    fn ready_only_via_documented_path() {
        let mut server = EncryptionSession::new();
        // Calling verify_challenge before any challenge was issued must fail.
        assert!(!server.verify_challenge(&[0u8; HASH_LEN]));
        assert_eq!(server.state(), SessionState::Idle);
    }
}
