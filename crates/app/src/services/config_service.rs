//! Config service — create, update and delete devices in the stored configuration.
//!
//! Every change produces a complete new [`AgentConfig`], validates it as a
//! whole and persists it before anyone sees it. Applying it to the pins is
//! the caller's job (see [`Agent`](crate::agent::Agent)).

use relayhub_domain::command::{DeviceCreated, DeviceDeleted, DeviceUpdated};
use relayhub_domain::config::{AgentConfig, PinMapping};
use relayhub_domain::device::Device;
use relayhub_domain::error::{NotFoundError, RelayError, ValidationError};

use crate::ports::ConfigStore;

/// Application service for device configuration changes.
pub struct ConfigService<S> {
    store: S,
    mapping: PinMapping,
}

impl<S: ConfigStore> ConfigService<S> {
    /// Create a new service backed by `store`, resolving pins through `mapping`.
    pub fn new(store: S, mapping: PinMapping) -> Self {
        Self { store, mapping }
    }

    #[must_use]
    pub fn mapping(&self) -> &PinMapping {
        &self.mapping
    }

    /// Load the stored configuration.
    ///
    /// With nothing stored yet, an empty configuration using the pin-mapping
    /// table's polarity is returned. A stored file without polarity takes the
    /// table's as well, and gets it written on the next save.
    ///
    /// # Errors
    ///
    /// Returns a storage error from the store, or [`RelayError::Validation`]
    /// if the stored devices share ids or pins.
    #[tracing::instrument(skip(self))]
    pub async fn load(&self) -> Result<AgentConfig, RelayError> {
        let config = match self.store.load().await? {
            Some(stored) => {
                if stored.active_low.is_none() {
                    tracing::info!(
                        active_low = self.mapping.active_low,
                        "stored configuration has no polarity, using the pin mapping's"
                    );
                }
                stored.resolve(self.mapping.active_low)
            }
            None => {
                tracing::info!("no stored configuration, starting empty");
                AgentConfig::empty(self.mapping.active_low)
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Add a device, resolving its pin from the device number.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::UnmappedPin`] for an unknown device number,
    /// [`RelayError::Validation`] if invariants fail, or a storage error.
    #[tracing::instrument(skip(self, current, created), fields(device_id = %created.device_id))]
    pub async fn create(
        &self,
        current: &AgentConfig,
        created: &DeviceCreated,
    ) -> Result<AgentConfig, RelayError> {
        if current.find(created.device_id).is_some() {
            return Err(ValidationError::DuplicateDevice(created.device_id).into());
        }
        let number = created
            .device_number
            .ok_or(ValidationError::MissingField("device_number"))?;
        let pin = self.mapping.pin_for(number)?;
        let device = Device::builder()
            .id(created.device_id)
            .pin(pin)
            .mode(created.mode)
            .power_threshold(created.threshold)
            .build()?;

        let mut next = current.clone();
        next.devices.push(device);
        self.persist(next).await
    }

    /// Change mode and threshold of an existing device.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::NotFound`] if the device does not exist,
    /// [`RelayError::Validation`] if invariants fail, or a storage error.
    #[tracing::instrument(skip(self, current, updated), fields(device_id = %updated.device_id))]
    pub async fn update(
        &self,
        current: &AgentConfig,
        updated: &DeviceUpdated,
    ) -> Result<AgentConfig, RelayError> {
        let mut next = current.clone();
        let device = next
            .devices
            .iter_mut()
            .find(|d| d.id == updated.device_id)
            .ok_or_else(|| NotFoundError::device(updated.device_id))?;
        device.mode = updated.mode;
        device.power_threshold = updated.threshold;
        device.validate()?;
        self.persist(next).await
    }

    /// Remove a device.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::NotFound`] if the device does not exist, or a
    /// storage error.
    #[tracing::instrument(skip(self, current, deleted), fields(device_id = %deleted.device_id))]
    pub async fn delete(
        &self,
        current: &AgentConfig,
        deleted: &DeviceDeleted,
    ) -> Result<AgentConfig, RelayError> {
        if current.find(deleted.device_id).is_none() {
            return Err(NotFoundError::device(deleted.device_id).into());
        }
        let mut next = current.clone();
        next.devices.retain(|d| d.id != deleted.device_id);
        self.persist(next).await
    }

    async fn persist(&self, next: AgentConfig) -> Result<AgentConfig, RelayError> {
        next.validate()?;
        self.store.save(&next).await?;
        Ok(next)
    }
}
