//! Device directory: who wears a device, who guards it.
//!
//! The lifecycle manager consults this for every authorization decision.
//! Registration itself happens at the provisioning boundary, which is a
//! collaborator's concern; the engine only needs the lookup.

use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

use super::{Actor, Role};

/// One registered device
#[derive(Debug, Clone)]
pub struct DeviceRecord {
    pub device_id: String,
    pub wearer: Uuid,
    pub guardians: Vec<Uuid>,
}

/// In-memory device directory
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: RwLock<HashMap<String, DeviceRecord>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, record: DeviceRecord) {
        let mut devices = match self.devices.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        devices.insert(record.device_id.clone(), record);
    }

    pub fn contains(&self, device_id: &str) -> bool {
        self.read().contains_key(device_id)
    }

    /// Is this actor a registered guardian of the device?
    pub fn is_guardian(&self, device_id: &str, actor_id: Uuid) -> bool {
        self.read()
            .get(device_id)
            .map(|r| r.guardians.contains(&actor_id))
            .unwrap_or(false)
    }

    /// Visibility rule shared by alert reads and evidence listing:
    /// elevated roles see everything, otherwise the actor must be the
    /// device's wearer or one of its guardians.
    pub fn can_view(&self, device_id: &str, actor: &Actor) -> bool {
        if actor.role.is_elevated() {
            return true;
        }
        self.read()
            .get(device_id)
            .map(|r| r.wearer == actor.id || r.guardians.contains(&actor.id))
            .unwrap_or(false)
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, DeviceRecord>> {
        match self.devices.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Convenience for tests and fixtures
impl DeviceRegistry {
    pub fn with_device(device_id: &str, wearer: Uuid, guardians: &[Uuid]) -> Self {
        let registry = Self::new();
        registry.register(DeviceRecord {
            device_id: device_id.to_string(),
            wearer,
            guardians: guardians.to_vec(),
        });
        registry
    }
}
