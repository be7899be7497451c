//! Device — a logical switch bound to exactly one relay pin.

use serde::{Deserialize, Serialize};

use crate::error::{RelayError, ValidationError};
use crate::id::{DeviceId, PinNumber};
use crate::power::Watts;

/// How a device's desired state is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeviceMode {
    /// Driven only by `SET_STATE` commands.
    #[default]
    Manual,
    /// Driven by power readings against a threshold.
    AutoPower,
    /// Accepted for compatibility with backend configuration; never actuated.
    Schedule,
}

impl std::fmt::Display for DeviceMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Manual => f.write_str("MANUAL"),
            Self::AutoPower => f.write_str("AUTO_POWER"),
            Self::Schedule => f.write_str("SCHEDULE"),
        }
    }
}

/// A configured device, as persisted in `config.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    #[serde(rename = "device_id")]
    pub id: DeviceId,
    #[serde(rename = "pin_number")]
    pub pin: PinNumber,
    #[serde(default)]
    pub mode: DeviceMode,
    #[serde(default, alias = "power_threshold_w")]
    pub power_threshold: Option<Watts>,
}

impl Device {
    /// Create a builder for constructing a [`Device`].
    #[must_use]
    pub fn builder() -> DeviceBuilder {
        DeviceBuilder::default()
    }

    /// Check domain invariants.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Validation`] when an `AUTO_POWER` device has no
    /// threshold, or when a threshold is negative or not finite.
    pub fn validate(&self) -> Result<(), RelayError> {
        match self.power_threshold {
            None if self.mode == DeviceMode::AutoPower => {
                Err(ValidationError::MissingThreshold(self.id).into())
            }
            Some(threshold) if !threshold.is_valid_threshold() => {
                Err(ValidationError::InvalidThreshold {
                    device_id: self.id,
                    value: threshold.get(),
                }
                .into())
            }
            _ => Ok(()),
        }
    }

    #[must_use]
    pub fn is_manual(&self) -> bool {
        self.mode == DeviceMode::Manual
    }

    #[must_use]
    pub fn is_auto_power(&self) -> bool {
        self.mode == DeviceMode::AutoPower
    }
}

/// Step-by-step builder for [`Device`].
#[derive(Debug, Default)]
pub struct DeviceBuilder {
    id: Option<DeviceId>,
    pin: Option<PinNumber>,
    mode: DeviceMode,
    power_threshold: Option<Watts>,
}

impl DeviceBuilder {
    #[must_use]
    pub fn id(mut self, id: DeviceId) -> Self {
        self.id = Some(id);
        self
    }

    #[must_use]
    pub fn pin(mut self, pin: PinNumber) -> Self {
        self.pin = Some(pin);
        self
    }

    #[must_use]
    pub fn mode(mut self, mode: DeviceMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn power_threshold(mut self, threshold: Option<Watts>) -> Self {
        self.power_threshold = threshold;
        self
    }

    /// Consume the builder, validate, and return a [`Device`].
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Validation`] if the id or pin is missing, or if
    /// [`Device::validate`] fails.
    pub fn build(self) -> Result<Device, RelayError> {
        let device = Device {
            id: self.id.ok_or(ValidationError::MissingField("device_id"))?,
            pin: self.pin.ok_or(ValidationError::MissingField("pin_number"))?,
            mode: self.mode,
            power_threshold: self.power_threshold,
        };
        device.validate()?;
        Ok(device)
    }
}
