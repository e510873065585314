//! The capability a concrete application service exposes to the server.
//!
//! Every service speaks through exactly one pair of GATT characteristics
//! (write in, notify out) and opts in or out of the shared encryption
//! session. This trait is intentionally minimal — request/response framing
//! on top of raw bytes is an application concern handled inside each
//! concrete service (see `encryption_service`).

pub trait BleService {
    fn name(&self) -> &'static str;
    fn service_uuid(&self) -> &'static str;
    fn receiver_characteristic_uuid(&self) -> &'static str;
    fn sender_characteristic_uuid(&self) -> &'static str;

    /// Whether this service requires the shared encryption session to be
    /// `Ready` before it may send or accept application bytes.
    fn use_encryption(&self) -> bool;

    /// Called with a decoded, and — if `use_encryption()` — already
    /// decrypted application packet.
    fn receive(&self, data: &[u8]);
}
