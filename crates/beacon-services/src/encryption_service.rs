//! The Encryption service (C6): drives the shared session from `Idle`
//! through to `Ready` by speaking the JSON handshake protocol over its
//! own unencrypted write/notify characteristic pair.

use std::cell::RefCell;
use std::rc::Rc;

use beacon_core::session::EncryptionSession;
use beacon_core::wire::{
    HandshakeMethod, HandshakeResponse, ResponseCode, ENCRYPTION_RECEIVER_CHAR_UUID,
    ENCRYPTION_SENDER_CHAR_UUID, ENCRYPTION_SERVICE_UUID, METHOD_UNKNOWN,
};

use crate::handler::OutboundQueue;
use crate::service::BleService;

pub struct EncryptionService {
    session: Rc<RefCell<EncryptionSession>>,
    outbound: OutboundQueue,
}

impl EncryptionService {
    pub fn new(session: Rc<RefCell<EncryptionSession>>, outbound: OutboundQueue) -> Self {
        Self { session, outbound }
    }

    fn respond(&self, method_code: i32, code: ResponseCode) {
        self.outbound
            .push(HandshakeResponse::new(method_code, code).to_json_bytes());
    }

    fn respond_with(
        &self,
        method_code: i32,
        code: ResponseCode,
        params: serde_json::Map<String, serde_json::Value>,
    ) {
        self.outbound
            .push(HandshakeResponse::with_params(method_code, code, params).to_json_bytes());
    }

    fn handle_initiate_encryption(&self, method_code: i32, params: &serde_json::Map<String, serde_json::Value>) {
        let Some(client_pk_hex) = params.get("pk").and_then(|v| v.as_str()) else {
            tracing::warn!("INITIATE_ENCRYPTION missing \"pk\" param");
            self.respond(method_code, ResponseCode::InvalidParams);
            return;
        };

        let Ok(client_pk_bytes) = hex::decode(client_pk_hex) else {
            self.respond(method_code, ResponseCode::InvalidKeyFormat);
            return;
        };
        let Ok(client_pk): Result<[u8; 32], _> = client_pk_bytes.try_into() else {
            self.respond(method_code, ResponseCode::InvalidKeyFormat);
            return;
        };

        let mut session = self.session.borrow_mut();
        if session.calculate_shared(client_pk).is_err() {
            tracing::warn!("failed to derive shared key for client public key");
            drop(session);
            self.respond(method_code, ResponseCode::EncryptionFailed);
            return;
        }

        let challenge = match session.generate_challenge() {
            Ok(c) => c,
            Err(_) => {
                drop(session);
                self.respond(method_code, ResponseCode::EncryptionFailed);
                return;
            }
        };
        let nonce = session.generate_nonce();
        let ciphertext = match session.encrypt(&challenge, &nonce) {
            Ok(ct) => ct,
            Err(_) => {
                drop(session);
                self.respond(method_code, ResponseCode::EncryptionFailed);
                return;
            }
        };
        let local_pk = session.local_public_key().expect("keys generated above");
        drop(session);

        let mut response_params = serde_json::Map::new();
        response_params.insert("pk".into(), hex::encode(local_pk).into());
        response_params.insert("n".into(), hex::encode(&nonce).into());
        response_params.insert("c".into(), hex::encode(&ciphertext).into());
        self.respond_with(method_code, ResponseCode::Success, response_params);
    }

    fn handle_confirm_challenge(&self, method_code: i32, params: &serde_json::Map<String, serde_json::Value>) {
        let (Some(nonce_hex), Some(ct_hex)) = (
            params.get("n").and_then(|v| v.as_str()),
            params.get("c").and_then(|v| v.as_str()),
        ) else {
            self.respond(method_code, ResponseCode::InvalidParams);
            return;
        };

        let (Ok(nonce), Ok(ciphertext)) = (hex::decode(nonce_hex), hex::decode(ct_hex)) else {
            self.respond(method_code, ResponseCode::EncryptionFailed);
            return;
        };

        let mut session = self.session.borrow_mut();
        let plaintext = match session.decrypt(&ciphertext, &nonce) {
            Ok(p) => p,
            Err(_) => {
                drop(session);
                self.respond(method_code, ResponseCode::EncryptionFailed);
                return;
            }
        };

        if session.verify_challenge(&plaintext) {
            drop(session);
            tracing::info!("encryption established successfully");
            self.respond(method_code, ResponseCode::Success);
        } else {
            drop(session);
            tracing::warn!("challenge confirmation does not match the expected value");
            self.respond(method_code, ResponseCode::EncryptionFailed);
        }
    }
}

impl BleService for EncryptionService {
    fn name(&self) -> &'static str {
        "Encryption"
    }

    fn service_uuid(&self) -> &'static str {
        ENCRYPTION_SERVICE_UUID
    }

    fn receiver_characteristic_uuid(&self) -> &'static str {
        ENCRYPTION_RECEIVER_CHAR_UUID
    }

    fn sender_characteristic_uuid(&self) -> &'static str {
        ENCRYPTION_SENDER_CHAR_UUID
    }

    fn use_encryption(&self) -> bool {
        false
    }

    fn receive(&self, data: &[u8]) {
        let value: serde_json::Value = match serde_json::from_slice(data) {
            Ok(v) => v,
            Err(_) => {
                tracing::warn!("received invalid json data");
                self.respond(METHOD_UNKNOWN, ResponseCode::InvalidProtocol);
                return;
            }
        };

        let Some(method_code) = value.get("c").and_then(|v| v.as_i64()) else {
            tracing::warn!("received request without a \"c\" method field");
            self.respond(METHOD_UNKNOWN, ResponseCode::InvalidProtocol);
            return;
        };
        let method_code = method_code as i32;

        let empty_params = serde_json::Map::new();
        let params = value
            .get("p")
            .and_then(|v| v.as_object())
            .unwrap_or(&empty_params);

        match HandshakeMethod::from_code(method_code) {
            Some(HandshakeMethod::InitiateEncryption) => {
                self.handle_initiate_encryption(method_code, params)
            }
            Some(HandshakeMethod::ConfirmChallenge) => {
                self.handle_confirm_challenge(method_code, params)
            }
            None => {
                tracing::warn!(method_code, "no method with this id");
                self.respond(method_code, ResponseCode::InvalidMethod);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_core::crypto;

    fn new_service() -> (EncryptionService, OutboundQueue) {
        let session = Rc::new(RefCell::new(EncryptionSession::new()));
        let outbound = OutboundQueue::new();
        (EncryptionService::new(session, outbound.clone()), outbound)
    }

    fn pop_json(outbound: &OutboundQueue) -> serde_json::Value {
        let bytes = outbound.drain();
        serde_json::from_slice(&bytes[0]).unwrap()
    }

    #[test]
    fn full_handshake_happy_path() {
        let (service, outbound) = new_service();
        let client_keys = crypto::Keypair::generate();

        let request = serde_json::json!({"c": 0, "p": {"pk": hex::encode(client_keys.public)}});
        service.receive(serde_json::to_vec(&request).unwrap().as_slice());

        let response = pop_json(&outbound);
        assert_eq!(response["c"], 0);
        assert_eq!(response["r"], 0);
        let server_pk: [u8; 32] = hex::decode(response["p"]["pk"].as_str().unwrap())
            .unwrap()
            .try_into()
            .unwrap();
        let nonce = hex::decode(response["p"]["n"].as_str().unwrap()).unwrap();
        let ct = hex::decode(response["p"]["c"].as_str().unwrap()).unwrap();

        let client_box = crypto::derive_shared(client_keys.private_bytes(), &server_pk).unwrap();
        let challenge = crypto::open(&client_box, &nonce, &ct).unwrap();
        let confirmation = crypto::sha3_256(&challenge);
        let n2 = crypto::random_nonce(crypto::NONCE_LEN);
        let ct2 = crypto::seal(&client_box, &n2, &confirmation).unwrap();

        let confirm_request = serde_json::json!({"c": 1, "p": {"n": hex::encode(&n2), "c": hex::encode(&ct2)}});
        service.receive(serde_json::to_vec(&confirm_request).unwrap().as_slice());

        let response = pop_json(&outbound);
        assert_eq!(response["c"], 1);
        assert_eq!(response["r"], 0);
        assert!(response.get("p").is_none());
    }

    #[test]
    fn unknown_method_yields_invalid_method() {
        let (service, outbound) = new_service();
        service.receive(br#"{"c":99}"#);
        let response = pop_json(&outbound);
        assert_eq!(response["c"], 99);
        assert_eq!(response["r"], 2);
    }

    #[test]
    fn malformed_json_yields_invalid_protocol() {
        let (service, outbound) = new_service();
        service.receive(b"not json");
        let response = pop_json(&outbound);
        assert_eq!(response["c"], -1);
        assert_eq!(response["r"], 1);
    }

    #[test]
    fn wrong_confirmation_is_rejected() {
        let (service, outbound) = new_service();
        let client_keys = crypto::Keypair::generate();
        let request = serde_json::json!({"c": 0, "p": {"pk": hex::encode(client_keys.public)}});
        service.receive(serde_json::to_vec(&request).unwrap().as_slice());
        let response = pop_json(&outbound);

        let server_pk: [u8; 32] = hex::decode(response["p"]["pk"].as_str().unwrap())
            .unwrap()
            .try_into()
            .unwrap();
        let client_box = crypto::derive_shared(client_keys.private_bytes(), &server_pk).unwrap();
        let n2 = crypto::random_nonce(crypto::NONCE_LEN);
        let wrong_confirmation = [0u8; 32];
        let ct2 = crypto::seal(&client_box, &n2, &wrong_confirmation).unwrap();

        let confirm_request = serde_json::json!({"c": 1, "p": {"n": hex::encode(&n2), "c": hex::encode(&ct2)}});
        service.receive(serde_json::to_vec(&confirm_request).unwrap().as_slice());

        let response = pop_json(&outbound);
        assert_eq!(response["c"], 1);
        assert_eq!(response["r"], 6);
    }
}
