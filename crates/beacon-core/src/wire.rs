//! Wire-level constants and the JSON handshake envelope.
//!
//! UUIDs are string constants rather than a `Uuid` newtype: the concrete
//! GATT stack (in `beacond`) owns UUID parsing for whichever crate it
//! uses, so this module stays free of that dependency.

use serde::{Deserialize, Serialize};

pub const ENCRYPTION_SERVICE_UUID: &str = "56c8ae10-def5-4d9c-8233-795a32d01cd2";
pub const ENCRYPTION_RECEIVER_CHAR_UUID: &str = "56c8ae11-def5-4d9c-8233-795a32d01cd2";
pub const ENCRYPTION_SENDER_CHAR_UUID: &str = "56c8ae12-def5-4d9c-8233-795a32d01cd2";

pub const NETWORK_MANAGER_SERVICE_UUID: &str = "d918edd0-bdb8-4b4b-b7e1-b15d50d361a2";
pub const NETWORK_MANAGER_RECEIVER_CHAR_UUID: &str = "d918edd1-bdb8-4b4b-b7e1-b15d50d361a2";
pub const NETWORK_MANAGER_SENDER_CHAR_UUID: &str = "d918edd2-bdb8-4b4b-b7e1-b15d50d361a2";

/// Maximum plaintext payload accepted by the frame/encryption pipeline.
/// Nothing in the protocol requires packets larger than a small multiple
/// of the BLE MTU; larger packets are rejected rather than VLA-allocated.
pub const MAX_PLAINTEXT_LEN: usize = 4096;

/// Maximum bytes written per GATT notification/write.
pub const MAX_CHUNK_LEN: usize = 20;

/// Handshake method codes, carried in the `c` field of every request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeMethod {
    InitiateEncryption,
    ConfirmChallenge,
}

impl HandshakeMethod {
    pub fn code(self) -> i32 {
        match self {
            HandshakeMethod::InitiateEncryption => 0,
            HandshakeMethod::ConfirmChallenge => 1,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(HandshakeMethod::InitiateEncryption),
            1 => Some(HandshakeMethod::ConfirmChallenge),
            _ => None,
        }
    }
}

/// Response codes for the handshake service, per the error taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseCode {
    Success = 0,
    InvalidProtocol = 1,
    InvalidMethod = 2,
    InvalidParams = 3,
    InvalidKeyFormat = 4,
    AlreadyEncrypted = 5,
    EncryptionFailed = 6,
}

/// A parsed handshake request: `{"c":<method>,"p":{...}}`.
#[derive(Debug, Deserialize)]
pub struct HandshakeRequest {
    pub c: i32,
    #[serde(default)]
    pub p: serde_json::Map<String, serde_json::Value>,
}

/// A handshake response: `{"c":<method>,"r":<code>,"p":{...}}`. `p` is
/// omitted entirely (not serialized as an empty object) when there are no
/// response parameters, matching the source protocol's `sendResponse`.
#[derive(Debug, Serialize)]
pub struct HandshakeResponse {
    pub c: i32,
    pub r: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub p: Option<serde_json::Map<String, serde_json::Value>>,
}

impl HandshakeResponse {
    pub fn new(method_code: i32, code: ResponseCode) -> Self {
        Self {
            c: method_code,
            r: code as i32,
            p: None,
        }
    }

    pub fn with_params(
        method_code: i32,
        code: ResponseCode,
        params: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        Self {
            c: method_code,
            r: code as i32,
            p: Some(params),
        }
    }

    pub fn to_json_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("HandshakeResponse always serializes")
    }
}

/// Method code used on responses to a request that could not even be
/// parsed (malformed JSON). The source protocol has no real method in
/// this case; `-1` is the sentinel used for `InvalidProtocol`.
pub const METHOD_UNKNOWN: i32 = -1;
