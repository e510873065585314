//! The concrete GATT/BlueZ transport. Everything in this module is the
//! external collaborator the rest of the daemon is deliberately decoupled
//! from: `GattTransport` is the seam, `BluerTransport` is the only
//! implementation that touches a real Bluetooth adapter. Tests exercise
//! the protocol logic against an in-memory transport instead.

use std::collections::HashMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use bluer::adv::Advertisement;
use bluer::gatt::local::{
    Application, ApplicationHandle, Characteristic, CharacteristicNotify,
    CharacteristicNotifyMethod, CharacteristicWrite, CharacteristicWriteMethod, Service,
};
use tokio::sync::mpsc;
use uuid::Uuid;

use beacon_core::config::DeviceConfig;

use crate::device_info;

/// A service's GATT shape, independent of any particular service's
/// business logic.
#[derive(Debug, Clone)]
pub struct ServiceDef {
    pub name: &'static str,
    pub service_uuid: String,
    pub receiver_characteristic_uuid: String,
    pub sender_characteristic_uuid: String,
}

#[derive(Debug, Clone)]
pub enum GattEvent {
    CharacteristicWrite {
        receiver_characteristic_uuid: String,
        data: Vec<u8>,
    },
    CentralConnected,
    CentralDisconnected,
}

/// The seam between protocol logic and the concrete BLE/GATT stack.
#[async_trait]
pub trait GattTransport {
    async fn advertise(&mut self, local_name: &str, service_uuid: &str) -> Result<()>;
    /// Stop advertising. Called on disconnect, per the single-peer
    /// teardown sequence — the peripheral does not accept a new central
    /// until the next connect cycle re-advertises.
    async fn stop_advertising(&mut self) -> Result<()>;
    /// Queue the read-only Device Information / Generic Access / Generic
    /// Attribute services. Must be called before `register_services`.
    async fn register_mandatory_services(&mut self, config: &DeviceConfig) -> Result<()>;
    async fn register_services(&mut self, defs: &[ServiceDef]) -> Result<()>;
    async fn notify(&mut self, sender_characteristic_uuid: &str, value: Vec<u8>) -> Result<()>;
    async fn next_event(&mut self) -> Option<GattEvent>;
}

fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).with_context(|| format!("invalid characteristic/service uuid: {s}"))
}

/// BlueZ-backed transport via `bluer`'s D-Bus GATT application API.
pub struct BluerTransport {
    adapter: bluer::Adapter,
    app_handle: Option<ApplicationHandle>,
    adv_handle: Option<bluer::adv::AdvertisementHandle>,
    mandatory_services: Vec<Service>,
    notify_senders: HashMap<String, mpsc::Sender<Vec<u8>>>,
    events_tx: mpsc::UnboundedSender<GattEvent>,
    events_rx: mpsc::UnboundedReceiver<GattEvent>,
}

impl BluerTransport {
    pub async fn new() -> Result<Self> {
        let session = bluer::Session::new().await?;
        let adapter = session.default_adapter().await?;
        adapter.set_powered(true).await?;
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Ok(Self {
            adapter,
            app_handle: None,
            adv_handle: None,
            mandatory_services: Vec::new(),
            notify_senders: HashMap::new(),
            events_tx,
            events_rx,
        })
    }
}

#[async_trait]
impl GattTransport for BluerTransport {
    async fn advertise(&mut self, local_name: &str, service_uuid: &str) -> Result<()> {
        let uuid = parse_uuid(service_uuid)?;
        let advertisement = Advertisement {
            advertisement_type: bluer::adv::Type::Peripheral,
            service_uuids: vec![uuid].into_iter().collect(),
            discoverable: Some(true),
            local_name: Some(local_name.to_string()),
            // GAP_DISCOVERABLE_GENERAL, TX power included, 100-100 ms interval.
            system_includes: [bluer::adv::Feature::TxPower].into_iter().collect(),
            min_interval: Some(std::time::Duration::from_millis(100)),
            max_interval: Some(std::time::Duration::from_millis(100)),
            ..Default::default()
        };
        let handle = self.adapter.advertise(advertisement).await?;
        self.adv_handle = Some(handle);
        Ok(())
    }

    /// Dropping the handle is what actually tells BlueZ to stop; `bluer`
    /// has no separate "stop" call.
    async fn stop_advertising(&mut self) -> Result<()> {
        self.adv_handle = None;
        Ok(())
    }

    async fn register_mandatory_services(&mut self, config: &DeviceConfig) -> Result<()> {
        self.mandatory_services = vec![
            device_info::device_information_service(config),
            device_info::generic_access_service(config),
            device_info::generic_attribute_service(),
        ];
        Ok(())
    }

    async fn register_services(&mut self, defs: &[ServiceDef]) -> Result<()> {
        let mut services = std::mem::take(&mut self.mandatory_services);
        for def in defs {
            let service_uuid = parse_uuid(&def.service_uuid)?;
            let receiver_uuid = parse_uuid(&def.receiver_characteristic_uuid)?;
            let sender_uuid = parse_uuid(&def.sender_characteristic_uuid)?;

            let events_tx = self.events_tx.clone();
            let receiver_uuid_str = def.receiver_characteristic_uuid.clone();
            let write_characteristic = Characteristic {
                uuid: receiver_uuid,
                write: Some(CharacteristicWrite {
                    write: true,
                    write_without_response: true,
                    method: CharacteristicWriteMethod::Fun(Box::new(move |value, _req| {
                        let events_tx = events_tx.clone();
                        let receiver_uuid_str = receiver_uuid_str.clone();
                        Box::pin(async move {
                            let _ = events_tx.send(GattEvent::CharacteristicWrite {
                                receiver_characteristic_uuid: receiver_uuid_str,
                                data: value,
                            });
                            Ok(())
                        })
                    })),
                    ..Default::default()
                }),
                ..Default::default()
            };

            let (notify_tx, notify_rx) = mpsc::channel::<Vec<u8>>(32);
            self.notify_senders
                .insert(def.sender_characteristic_uuid.clone(), notify_tx);
            let notify_rx = std::sync::Arc::new(tokio::sync::Mutex::new(notify_rx));
            let notify_characteristic = Characteristic {
                uuid: sender_uuid,
                notify: Some(CharacteristicNotify {
                    notify: true,
                    method: CharacteristicNotifyMethod::Fun(Box::new(move |mut notifier| {
                        let notify_rx = notify_rx.clone();
                        Box::pin(async move {
                            let mut notify_rx = notify_rx.lock().await;
                            while let Some(value) = notify_rx.recv().await {
                                if notifier.notify(value).await.is_err() {
                                    break;
                                }
                            }
                        })
                    })),
                    ..Default::default()
                }),
                ..Default::default()
            };

            services.push(Service {
                uuid: service_uuid,
                primary: true,
                characteristics: vec![write_characteristic, notify_characteristic],
                ..Default::default()
            });
        }

        let app = Application {
            services,
            ..Default::default()
        };
        let handle = self.adapter.serve_gatt_application(app).await?;
        self.app_handle = Some(handle);
        Ok(())
    }

    async fn notify(&mut self, sender_characteristic_uuid: &str, value: Vec<u8>) -> Result<()> {
        if let Some(tx) = self.notify_senders.get(sender_characteristic_uuid) {
            tx.send(value)
                .await
                .context("notify channel closed; central likely disconnected")?;
        }
        Ok(())
    }

    async fn next_event(&mut self) -> Option<GattEvent> {
        self.events_rx.recv().await
    }
}
