//! beacon-services — the service abstraction, the per-service data
//! handler, the handshake (Encryption) service, and the NetworkManager
//! service stub.
//!
//! Nothing here touches a concrete GATT/D-Bus stack; `beacond` wires these
//! types to `bluer`.

pub mod encryption_service;
pub mod handler;
pub mod network_manager_service;
pub mod registry;
pub mod service;
