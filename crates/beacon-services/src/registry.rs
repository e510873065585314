//! Ordered registry of application services and their data handlers.
//!
//! Dispatches an inbound characteristic write to the handler whose
//! receiver characteristic UUID matches, and hands back the outbound
//! notification chunks for that same service's sender characteristic.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::handler::ServiceDataHandler;

pub struct ServiceRegistry {
    by_receiver_uuid: HashMap<&'static str, Rc<RefCell<ServiceDataHandler>>>,
    handlers: Vec<Rc<RefCell<ServiceDataHandler>>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self {
            by_receiver_uuid: HashMap::new(),
            handlers: Vec::new(),
        }
    }

    /// Register a service's handler. Service UUIDs (and thus receiver
    /// characteristic UUIDs) must be unique.
    pub fn register(&mut self, handler: ServiceDataHandler) {
        let handler = Rc::new(RefCell::new(handler));
        let uuid = handler.borrow().service().receiver_characteristic_uuid();
        self.by_receiver_uuid.insert(uuid, handler.clone());
        self.handlers.push(handler);
    }

    /// Route a write on `receiver_uuid` to its handler, returning the
    /// resulting outbound notification chunks for the matching sender
    /// characteristic. `None` if no service owns this characteristic.
    pub fn dispatch_write(&self, receiver_uuid: &str, bytes: &[u8]) -> Option<Vec<Vec<u8>>> {
        let handler = self.by_receiver_uuid.get(receiver_uuid)?;
        Some(handler.borrow_mut().on_characteristic_write(bytes))
    }

    /// Clear every handler's decoder buffer — called on connect/disconnect.
    pub fn reset_all(&self) {
        for handler in &self.handlers {
            handler.borrow_mut().reset();
        }
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
