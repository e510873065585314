//! Server orchestrator (C7): configures advertising, registers services,
//! and watches the single-peer connection lifecycle.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use anyhow::Result;

use beacon_core::config::BeaconConfig;
use beacon_core::session::EncryptionSession;
use beacon_core::wire::ENCRYPTION_SERVICE_UUID;
use beacon_services::encryption_service::EncryptionService;
use beacon_services::handler::{OutboundQueue, ServiceDataHandler};
use beacon_services::network_manager_service::NetworkManagerService;
use beacon_services::registry::ServiceRegistry;
use beacon_services::service::BleService;

use crate::gatt::{GattEvent, GattTransport, ServiceDef};

pub struct BeaconServer<T: GattTransport> {
    transport: T,
    config: BeaconConfig,
    session: Rc<RefCell<EncryptionSession>>,
    registry: ServiceRegistry,
    service_defs: Vec<ServiceDef>,
    sender_for_receiver: HashMap<String, String>,
    connected: bool,
}

impl<T: GattTransport> BeaconServer<T> {
    pub fn new(transport: T, config: BeaconConfig) -> Self {
        let session = Rc::new(RefCell::new(EncryptionSession::new()));
        // A keypair is ready before the first request arrives, per the
        // reference implementation's constructor behaviour.
        session.borrow_mut().generate_keypair();

        let mut registry = ServiceRegistry::new();
        let mut service_defs = Vec::new();
        let mut sender_for_receiver = HashMap::new();

        register(
            &mut registry,
            &mut service_defs,
            &mut sender_for_receiver,
            Rc::new(EncryptionService::new(session.clone(), OutboundQueue::new())),
            session.clone(),
        );

        if config.services.network_manager {
            register(
                &mut registry,
                &mut service_defs,
                &mut sender_for_receiver,
                Rc::new(NetworkManagerService::new()),
                session.clone(),
            );
        }

        Self {
            transport,
            config,
            session,
            registry,
            service_defs,
            sender_for_receiver,
            connected: false,
        }
    }

    pub async fn run(&mut self) -> Result<()> {
        self.transport
            .register_mandatory_services(&self.config.device)
            .await?;
        self.transport.register_services(&self.service_defs).await?;
        self.transport
            .advertise(&self.config.device.advertise_name, ENCRYPTION_SERVICE_UUID)
            .await?;

        tracing::info!(
            name = %self.config.device.advertise_name,
            services = self.registry.len(),
            "advertising"
        );

        while let Some(event) = self.transport.next_event().await {
            match event {
                GattEvent::CharacteristicWrite {
                    receiver_characteristic_uuid,
                    data,
                } => self.handle_write(&receiver_characteristic_uuid, data).await?,
                GattEvent::CentralConnected => self.on_connect(),
                GattEvent::CentralDisconnected => self.on_disconnect().await?,
            }
        }
        Ok(())
    }

    async fn handle_write(&mut self, receiver_uuid: &str, data: Vec<u8>) -> Result<()> {
        let Some(chunks) = self.registry.dispatch_write(receiver_uuid, &data) else {
            tracing::warn!(receiver_uuid, "write to unregistered characteristic");
            return Ok(());
        };
        if chunks.is_empty() {
            return Ok(());
        }
        let Some(sender_uuid) = self.sender_for_receiver.get(receiver_uuid).cloned() else {
            return Ok(());
        };
        for chunk in chunks {
            self.transport.notify(&sender_uuid, chunk).await?;
        }
        Ok(())
    }

    /// Only one central may be connected at a time; a second connection
    /// tears down the first by resetting the session before taking over.
    fn on_connect(&mut self) {
        if self.connected {
            tracing::warn!("second central connected, resetting session for new peer");
        }
        self.connected = true;
        self.registry.reset_all();
        self.session.borrow_mut().generate_keypair();
        tracing::info!("central connected");
    }

    async fn on_disconnect(&mut self) -> Result<()> {
        self.transport.stop_advertising().await?;
        self.connected = false;
        self.registry.reset_all();
        self.session.borrow_mut().reset();
        tracing::info!("central disconnected, advertising stopped, session reset");
        Ok(())
    }
}

fn register(
    registry: &mut ServiceRegistry,
    service_defs: &mut Vec<ServiceDef>,
    sender_for_receiver: &mut HashMap<String, String>,
    service: Rc<dyn BleService>,
    session: Rc<RefCell<EncryptionSession>>,
) {
    let outbound = OutboundQueue::new();
    service_defs.push(ServiceDef {
        name: service.name(),
        service_uuid: service.service_uuid().to_string(),
        receiver_characteristic_uuid: service.receiver_characteristic_uuid().to_string(),
        sender_characteristic_uuid: service.sender_characteristic_uuid().to_string(),
    });
    sender_for_receiver.insert(
        service.receiver_characteristic_uuid().to_string(),
        service.sender_characteristic_uuid().to_string(),
    );
    registry.register(ServiceDataHandler::new(service, session, outbound));
}
