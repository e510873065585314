//! End-to-end scenarios across the frame codec, crypto session, and
//! handshake/application services — no Bluetooth adapter, no D-Bus.

use std::cell::RefCell;
use std::rc::Rc;

use beacon_core::crypto;
use beacon_core::frame::{self, FrameDecoder};
use beacon_core::session::EncryptionSession;
use beacon_services::encryption_service::EncryptionService;
use beacon_services::handler::{OutboundQueue, ServiceDataHandler};
use beacon_services::network_manager_service::NetworkManagerService;
use beacon_services::service::BleService;

fn framed(payload: &[u8]) -> Vec<u8> {
    let mut out = frame::escape(payload);
    out.push(frame::END);
    out
}

fn new_encryption_handler() -> (ServiceDataHandler, Rc<RefCell<EncryptionSession>>, OutboundQueue) {
    let session = Rc::new(RefCell::new(EncryptionSession::new()));
    let outbound = OutboundQueue::new();
    let service = Rc::new(EncryptionService::new(session.clone(), outbound.clone()));
    let handler = ServiceDataHandler::new(service, session.clone(), outbound.clone());
    (handler, session, outbound)
}

fn reassemble(chunks: &[Vec<u8>]) -> serde_json::Value {
    let mut bytes = Vec::new();
    for chunk in chunks {
        bytes.extend_from_slice(chunk);
    }
    let unescaped = frame::unescape(&bytes[..bytes.len() - 1]).unwrap();
    serde_json::from_slice(&unescaped).unwrap()
}

/// S1 Handshake happy path.
#[test]
fn s1_handshake_happy_path() {
    let (mut handler, session, _outbound) = new_encryption_handler();
    let client = crypto::Keypair::generate();

    let initiate = serde_json::json!({"c": 0, "p": {"pk": hex::encode(client.public)}});
    let notifications = handler.on_characteristic_write(&framed(&serde_json::to_vec(&initiate).unwrap()));
    let response = reassemble(&notifications);
    assert_eq!(response["c"], 0);
    assert_eq!(response["r"], 0);

    let server_pk: [u8; 32] = hex::decode(response["p"]["pk"].as_str().unwrap())
        .unwrap()
        .try_into()
        .unwrap();
    let n1 = hex::decode(response["p"]["n"].as_str().unwrap()).unwrap();
    let ct1 = hex::decode(response["p"]["c"].as_str().unwrap()).unwrap();

    let client_box = crypto::derive_shared(client.private_bytes(), &server_pk).unwrap();
    let challenge = crypto::open(&client_box, &n1, &ct1).unwrap();
    let confirmation = crypto::sha3_256(&challenge);
    let n2 = crypto::random_nonce(crypto::NONCE_LEN);
    let ct2 = crypto::seal(&client_box, &n2, &confirmation).unwrap();

    let confirm = serde_json::json!({"c": 1, "p": {"n": hex::encode(&n2), "c": hex::encode(&ct2)}});
    let notifications = handler.on_characteristic_write(&framed(&serde_json::to_vec(&confirm).unwrap()));
    let response = reassemble(&notifications);
    assert_eq!(response["c"], 1);
    assert_eq!(response["r"], 0);

    assert!(session.borrow().is_ready());
}

/// S2 Wrong confirmation.
#[test]
fn s2_wrong_confirmation_keeps_session_not_ready() {
    let (mut handler, session, _outbound) = new_encryption_handler();
    let client = crypto::Keypair::generate();

    let initiate = serde_json::json!({"c": 0, "p": {"pk": hex::encode(client.public)}});
    let notifications = handler.on_characteristic_write(&framed(&serde_json::to_vec(&initiate).unwrap()));
    let response = reassemble(&notifications);
    let server_pk: [u8; 32] = hex::decode(response["p"]["pk"].as_str().unwrap())
        .unwrap()
        .try_into()
        .unwrap();

    let client_box = crypto::derive_shared(client.private_bytes(), &server_pk).unwrap();
    let n2 = crypto::random_nonce(crypto::NONCE_LEN);
    let wrong = [0xAAu8; 32];
    let ct2 = crypto::seal(&client_box, &n2, &wrong).unwrap();

    let confirm = serde_json::json!({"c": 1, "p": {"n": hex::encode(&n2), "c": hex::encode(&ct2)}});
    let notifications = handler.on_characteristic_write(&framed(&serde_json::to_vec(&confirm).unwrap()));
    let response = reassemble(&notifications);
    assert_eq!(response["r"], 6);
    assert!(!session.borrow().is_ready());
}

/// S3 Unknown method.
#[test]
fn s3_unknown_method() {
    let (mut handler, _session, _outbound) = new_encryption_handler();
    let notifications = handler.on_characteristic_write(&framed(br#"{"c":99}"#));
    let response = reassemble(&notifications);
    assert_eq!(response["c"], 99);
    assert_eq!(response["r"], 2);
}

/// S4 Malformed JSON.
#[test]
fn s4_malformed_json() {
    let (mut handler, _session, _outbound) = new_encryption_handler();
    let notifications = handler.on_characteristic_write(&framed(b"not json"));
    let response = reassemble(&notifications);
    assert_eq!(response["c"], -1);
    assert_eq!(response["r"], 1);
}

/// S5 Framing across chunks, on a plain decoder (no service attached).
#[test]
fn s5_framing_across_chunks() {
    let mut decoder = FrameDecoder::new();
    let mut packets = decoder.feed(&[frame::END]);
    packets.extend(decoder.feed(&[0x01, frame::ESC, frame::ESC_END, 0x02]));
    packets.extend(decoder.feed(&[frame::END]));
    assert_eq!(packets, vec![vec![0x01, frame::END, 0x02]]);
}

/// S6 Encrypted service before Ready: server drops the packet and does
/// not respond.
#[test]
fn s6_encrypted_service_before_ready_drops_silently() {
    let session = Rc::new(RefCell::new(EncryptionSession::new()));
    let outbound = OutboundQueue::new();
    let service = Rc::new(NetworkManagerService::new());
    assert!(service.use_encryption());
    let mut handler = ServiceDataHandler::new(service, session, outbound);

    let fake_envelope = vec![0x42u8; crypto::NONCE_LEN + crypto::TAG_LEN + 8];
    let notifications = handler.on_characteristic_write(&framed(&fake_envelope));
    assert!(notifications.is_empty());
}

/// Property: reset() clears key material and ready flag from any state.
#[test]
fn reset_from_ready_clears_everything() {
    let mut server = EncryptionSession::new();
    let mut client = EncryptionSession::new();
    server.generate_keypair();
    client.generate_keypair();
    server.calculate_shared(client.local_public_key().unwrap()).unwrap();
    let challenge = server.generate_challenge().unwrap();
    let confirmation = crypto::sha3_256(&challenge);
    assert!(server.verify_challenge(&confirmation));
    assert!(server.is_ready());

    server.reset();
    assert!(!server.is_ready());
    assert!(server.local_public_key().is_none());
}

/// Property: escape/unescape round-trips for arbitrary byte content,
/// including runs of the delimiter bytes themselves.
#[test]
fn escape_unescape_roundtrip_property() {
    let samples: Vec<Vec<u8>> = vec![
        vec![],
        vec![0xC0, 0xC0, 0xC0],
        vec![0xDB, 0xDB, 0xC0, 0xDB],
        (0u8..=255).collect(),
    ];
    for sample in samples {
        let escaped = frame::escape(&sample);
        assert_eq!(frame::unescape(&escaped).unwrap(), sample);
        assert!(!escaped.contains(&frame::END));
    }
}

/// Property: tampering with either the ciphertext or the nonce causes
/// `open` to fail, never silently succeed with different plaintext.
#[test]
fn seal_open_rejects_any_single_byte_flip() {
    let server = crypto::Keypair::generate();
    let client = crypto::Keypair::generate();
    let server_box = crypto::derive_shared(server.private_bytes(), &client.public).unwrap();
    let client_box = crypto::derive_shared(client.private_bytes(), &server.public).unwrap();

    let nonce = crypto::random_nonce(crypto::NONCE_LEN);
    let ct = crypto::seal(&server_box, &nonce, b"payload").unwrap();

    for i in 0..ct.len() {
        let mut tampered = ct.clone();
        tampered[i] ^= 0x01;
        assert!(crypto::open(&client_box, &nonce, &tampered).is_err());
    }

    for i in 0..nonce.len() {
        let mut tampered_nonce = nonce.clone();
        tampered_nonce[i] ^= 0x01;
        assert!(crypto::open(&client_box, &tampered_nonce, &ct).is_err());
    }
}
