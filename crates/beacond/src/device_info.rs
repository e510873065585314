//! Mandatory GATT services: Device Information, Generic Access, and
//! Generic Attribute. Static read-only (and one indicate) characteristics
//! built once from config at server construction — no application logic
//! here, matching the source's `deviceInformationServiceData()` and its
//! neighbours.

use bluer::gatt::local::{
    Characteristic, CharacteristicNotify, CharacteristicRead, CharacteristicWrite,
    CharacteristicWriteMethod, Service,
};
use uuid::Uuid;

use beacon_core::config::DeviceConfig;

const DEVICE_INFORMATION_SERVICE: u16 = 0x180A;
const MODEL_NUMBER: u16 = 0x2A24;
const SERIAL_NUMBER: u16 = 0x2A25;
const FIRMWARE_REVISION: u16 = 0x2A26;
const HARDWARE_REVISION: u16 = 0x2A27;
const SOFTWARE_REVISION: u16 = 0x2A28;
const MANUFACTURER_NAME: u16 = 0x2A29;

const GENERIC_ACCESS_SERVICE: u16 = 0x1800;
const DEVICE_NAME: u16 = 0x2A00;
const APPEARANCE: u16 = 0x2A01;
const PERIPHERAL_PRIVACY_FLAG: u16 = 0x2A02;
const RECONNECTION_ADDRESS: u16 = 0x2A03;

const GENERIC_ATTRIBUTE_SERVICE: u16 = 0x1801;
const SERVICE_CHANGED: u16 = 0x2A05;

fn short_uuid(id: u16) -> Uuid {
    Uuid::parse_str(&format!("0000{id:04x}-0000-1000-8000-00805f9b34fb"))
        .expect("16-bit Bluetooth UUIDs always parse")
}

fn static_read_characteristic(uuid: Uuid, value: Vec<u8>) -> Characteristic {
    Characteristic {
        uuid,
        read: Some(CharacteristicRead {
            read: true,
            fun: Box::new(move |_req| {
                let value = value.clone();
                Box::pin(async move { Ok(value) })
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Read/write characteristic that just echoes back whatever was last
/// written, starting from `initial`. Used for Peripheral Privacy Flag,
/// which the original exposes as a live read/write toggle rather than a
/// fixed constant.
fn read_write_characteristic(uuid: Uuid, initial: Vec<u8>) -> Characteristic {
    let stored = std::sync::Arc::new(std::sync::Mutex::new(initial));
    let read_stored = stored.clone();
    let write_stored = stored;
    Characteristic {
        uuid,
        read: Some(CharacteristicRead {
            read: true,
            fun: Box::new(move |_req| {
                let value = read_stored.lock().unwrap().clone();
                Box::pin(async move { Ok(value) })
            }),
            ..Default::default()
        }),
        write: Some(CharacteristicWrite {
            write: true,
            method: CharacteristicWriteMethod::Fun(Box::new(move |value, _req| {
                *write_stored.lock().unwrap() = value;
                Box::pin(async move { Ok(()) })
            })),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Write-only characteristic with no read property. Used for Reconnection
/// Address, which the original only ever accepts writes to; its value is
/// never surfaced back over GATT.
fn write_only_characteristic(uuid: Uuid) -> Characteristic {
    Characteristic {
        uuid,
        write: Some(CharacteristicWrite {
            write: true,
            method: CharacteristicWriteMethod::Fun(Box::new(|_value, _req| {
                Box::pin(async move { Ok(()) })
            })),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Build the Device Information service from config.
pub fn device_information_service(config: &DeviceConfig) -> Service {
    Service {
        uuid: short_uuid(DEVICE_INFORMATION_SERVICE),
        primary: true,
        characteristics: vec![
            static_read_characteristic(short_uuid(MODEL_NUMBER), config.model_name.clone().into_bytes()),
            static_read_characteristic(
                short_uuid(SERIAL_NUMBER),
                config.serial_number.clone().into_bytes(),
            ),
            static_read_characteristic(
                short_uuid(FIRMWARE_REVISION),
                config.firmware_revision.clone().into_bytes(),
            ),
            static_read_characteristic(
                short_uuid(HARDWARE_REVISION),
                config.hardware_revision.clone().into_bytes(),
            ),
            static_read_characteristic(
                short_uuid(SOFTWARE_REVISION),
                config.software_revision.clone().into_bytes(),
            ),
            static_read_characteristic(
                short_uuid(MANUFACTURER_NAME),
                config.manufacturer_name.clone().into_bytes(),
            ),
        ],
        ..Default::default()
    }
}

/// Build the Generic Access service from config.
pub fn generic_access_service(config: &DeviceConfig) -> Service {
    Service {
        uuid: short_uuid(GENERIC_ACCESS_SERVICE),
        primary: true,
        characteristics: vec![
            static_read_characteristic(short_uuid(DEVICE_NAME), config.advertise_name.clone().into_bytes()),
            static_read_characteristic(short_uuid(APPEARANCE), vec![0u8; 4]),
            read_write_characteristic(short_uuid(PERIPHERAL_PRIVACY_FLAG), vec![0u8; 2]),
            write_only_characteristic(short_uuid(RECONNECTION_ADDRESS)),
        ],
        ..Default::default()
    }
}

/// Build the Generic Attribute service (just Service Changed, indicate-only).
pub fn generic_attribute_service() -> Service {
    Service {
        uuid: short_uuid(GENERIC_ATTRIBUTE_SERVICE),
        primary: true,
        characteristics: vec![Characteristic {
            uuid: short_uuid(SERVICE_CHANGED),
            notify: Some(CharacteristicNotify {
                indicate: true,
                ..Default::default()
            }),
            ..Default::default()
        }],
        ..Default::default()
    }
}
