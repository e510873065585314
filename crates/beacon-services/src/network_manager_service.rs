//! NetworkManager application service.
//!
//! The concrete Wi-Fi configuration payloads are an external collaborator
//! (see the system's purpose and scope); this is the minimal stub that
//! establishes the encrypted channel and logs what it receives, matching
//! the reference implementation's own minimal `receiveData` handler.

use beacon_core::wire::{
    NETWORK_MANAGER_RECEIVER_CHAR_UUID, NETWORK_MANAGER_SENDER_CHAR_UUID,
    NETWORK_MANAGER_SERVICE_UUID,
};

use crate::service::BleService;

pub struct NetworkManagerService;

impl NetworkManagerService {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NetworkManagerService {
    fn default() -> Self {
        Self::new()
    }
}

impl BleService for NetworkManagerService {
    fn name(&self) -> &'static str {
        "NetworkManager"
    }

    fn service_uuid(&self) -> &'static str {
        NETWORK_MANAGER_SERVICE_UUID
    }

    fn receiver_characteristic_uuid(&self) -> &'static str {
        NETWORK_MANAGER_RECEIVER_CHAR_UUID
    }

    fn sender_characteristic_uuid(&self) -> &'static str {
        NETWORK_MANAGER_SENDER_CHAR_UUID
    }

    fn use_encryption(&self) -> bool {
        true
    }

    fn receive(&self, data: &[u8]) {
        tracing::debug!(bytes = data.len(), "NetworkManager service received data");
    }
}
