//! Device registry — the authoritative, versioned view of configured devices.
//!
//! A registry is immutable once built. Configuration changes build a new one
//! and swap it into a [`SnapshotCell`], so readers always see either the old
//! or the new set of devices in full.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use relayhub_domain::config::AgentConfig;
use relayhub_domain::device::Device;
use relayhub_domain::id::DeviceId;
use relayhub_domain::polarity::Polarity;

/// Atomically replaceable shared snapshot.
pub struct SnapshotCell<T> {
    current: RwLock<Arc<T>>,
}

impl<T> SnapshotCell<T> {
    #[must_use]
    pub fn new(value: T) -> Self {
        Self {
            current: RwLock::new(Arc::new(value)),
        }
    }

    /// The snapshot in effect right now.
    #[must_use]
    pub fn load(&self) -> Arc<T> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Install `value`, returning the snapshot it replaced.
    pub fn replace(&self, value: T) -> Arc<T> {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, Arc::new(value))
    }
}

/// One consistent generation of the device set.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceRegistry {
    version: u64,
    polarity: Polarity,
    devices: BTreeMap<DeviceId, Device>,
}

impl DeviceRegistry {
    /// Registry with no devices, used before any configuration is loaded.
    #[must_use]
    pub fn empty(polarity: Polarity) -> Self {
        Self {
            version: 0,
            polarity,
            devices: BTreeMap::new(),
        }
    }

    /// Build generation `version` from a persisted configuration.
    #[must_use]
    pub fn from_config(version: u64, config: &AgentConfig) -> Self {
        Self {
            version,
            polarity: config.polarity(),
            devices: config
                .devices
                .iter()
                .map(|device| (device.id, device.clone()))
                .collect(),
        }
    }

    /// Turn the registry back into its persisted form.
    #[must_use]
    pub fn to_config(&self) -> AgentConfig {
        AgentConfig {
            active_low: self.polarity.active_low,
            devices: self.devices.values().cloned().collect(),
        }
    }

    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    #[must_use]
    pub fn polarity(&self) -> Polarity {
        self.polarity
    }

    #[must_use]
    pub fn get(&self, id: DeviceId) -> Option<&Device> {
        self.devices.get(&id)
    }

    #[must_use]
    pub fn contains(&self, id: DeviceId) -> bool {
        self.devices.contains_key(&id)
    }

    /// Devices ordered by id.
    pub fn devices(&self) -> impl Iterator<Item = &Device> {
        self.devices.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}
