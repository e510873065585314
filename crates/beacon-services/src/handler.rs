//! Service data handler (C5): couples the frame codec, the encryption
//! session, and a service implementation. One instance per registered
//! service, created at server start and destroyed at stop.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use beacon_core::crypto::{NONCE_LEN, TAG_LEN};
use beacon_core::frame::{self, FrameDecoder};
use beacon_core::session::EncryptionSession;
use beacon_core::wire::MAX_CHUNK_LEN;

use crate::service::BleService;

/// Bytes a service wants to emit, queued until the handler drains them.
///
/// Cloning shares the same underlying queue — one clone goes to the
/// service implementation (so it can call `push` from `receive`), the
/// other stays with the handler that drains it after each inbound event.
#[derive(Clone)]
pub struct OutboundQueue(Rc<RefCell<VecDeque<Vec<u8>>>>);

impl OutboundQueue {
    pub fn new() -> Self {
        Self(Rc::new(RefCell::new(VecDeque::new())))
    }

    pub fn push(&self, bytes: Vec<u8>) {
        self.0.borrow_mut().push_back(bytes);
    }

    pub fn drain(&self) -> Vec<Vec<u8>> {
        self.0.borrow_mut().drain(..).collect()
    }
}

impl Default for OutboundQueue {
    fn default() -> Self {
        Self::new()
    }
}

pub struct ServiceDataHandler {
    service: Rc<dyn BleService>,
    session: Rc<RefCell<EncryptionSession>>,
    decoder: FrameDecoder,
    outbound: OutboundQueue,
}

impl ServiceDataHandler {
    pub fn new(
        service: Rc<dyn BleService>,
        session: Rc<RefCell<EncryptionSession>>,
        outbound: OutboundQueue,
    ) -> Self {
        Self {
            service,
            session,
            decoder: FrameDecoder::new(),
            outbound,
        }
    }

    pub fn service(&self) -> &Rc<dyn BleService> {
        &self.service
    }

    /// Handle bytes written to this service's receiver characteristic.
    /// Returns the GATT-notification chunks to write to the sender
    /// characteristic, in order, including any chunks produced by the
    /// service's own reaction to this event.
    pub fn on_characteristic_write(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        for packet in self.decoder.feed(chunk) {
            self.handle_packet(packet);
        }
        self.drain_outbound_chunks()
    }

    /// `packet` arrives already unescaped: `FrameDecoder::feed` performs the
    /// ESC/ESC_END/ESC_ESC substitution itself while reassembling a packet
    /// across chunks, so unescaping it again here would corrupt (or drop,
    /// as a false "malformed escape") any payload whose raw bytes happen to
    /// contain a literal `ESC` byte — which an encrypted nonce‖ciphertext
    /// envelope routinely does.
    fn handle_packet(&self, unescaped: Vec<u8>) {
        if unescaped.is_empty() {
            return;
        }

        let use_encryption = self.service.use_encryption();
        let ready = self.session.borrow().is_ready();

        let plaintext = if use_encryption && ready {
            if unescaped.len() < NONCE_LEN + TAG_LEN {
                tracing::warn!(service = self.service.name(), "encrypted packet too short, dropping");
                return;
            }
            let (nonce, ciphertext) = unescaped.split_at(NONCE_LEN);
            match self.session.borrow().decrypt(ciphertext, nonce) {
                Ok(plaintext) => plaintext,
                Err(e) => {
                    tracing::warn!(service = self.service.name(), error = %e, "decrypt failed, dropping packet");
                    return;
                }
            }
        } else if use_encryption {
            // Not ready: the service must not be reachable in the clear.
            tracing::warn!(service = self.service.name(), "ciphertext on not-ready service, dropping");
            return;
        } else {
            unescaped
        };

        self.service.receive(&plaintext);
    }

    /// Drain whatever the service pushed (directly, or as a side effect of
    /// the packet just handled) and encode it for transmission.
    fn drain_outbound_chunks(&self) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        for payload in self.outbound.drain() {
            out.extend(self.encode_outbound(payload));
        }
        out
    }

    fn encode_outbound(&self, payload: Vec<u8>) -> Vec<Vec<u8>> {
        let use_encryption = self.service.use_encryption();
        let ready = self.session.borrow().is_ready();

        let wire_bytes = if use_encryption && ready {
            let session = self.session.borrow();
            let nonce = session.generate_nonce();
            match session.encrypt(&payload, &nonce) {
                Ok(ciphertext) => {
                    let mut envelope = nonce;
                    envelope.extend(ciphertext);
                    envelope
                }
                Err(e) => {
                    tracing::warn!(service = self.service.name(), error = %e, "encrypt failed, dropping outbound packet");
                    return Vec::new();
                }
            }
        } else {
            payload
        };

        let mut framed = frame::escape(&wire_bytes);
        framed.push(frame::END);
        framed.chunks(MAX_CHUNK_LEN).map(|c| c.to_vec()).collect()
    }

    /// Clear decoder state on connect/disconnect.
    pub fn reset(&mut self) {
        self.decoder.clear();
    }
}
