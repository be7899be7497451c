//! Persisted agent configuration and the static device-number → pin table.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::device::Device;
use crate::error::{RelayError, ValidationError};
use crate::id::{DeviceId, DeviceNumber, PinNumber};
use crate::polarity::Polarity;

/// Everything the agent persists between restarts (`config.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub active_low: bool,
    #[serde(default, alias = "pins")]
    pub devices: Vec<Device>,
}

impl AgentConfig {
    /// A configuration without devices.
    #[must_use]
    pub fn empty(active_low: bool) -> Self {
        Self {
            active_low,
            devices: Vec::new(),
        }
    }

    #[must_use]
    pub fn polarity(&self) -> Polarity {
        Polarity::new(self.active_low)
    }

    #[must_use]
    pub fn find(&self, id: DeviceId) -> Option<&Device> {
        self.devices.iter().find(|d| d.id == id)
    }

    /// Check registry-wide invariants: unique ids and unique pins.
    ///
    /// Per-device threshold problems are not checked here; they surface as
    /// configuration inconsistencies when the device is acted on.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::DuplicateDevice`] or
    /// [`ValidationError::PinInUse`].
    pub fn validate(&self) -> Result<(), RelayError> {
        let mut ids = HashSet::with_capacity(self.devices.len());
        let mut pins: BTreeMap<PinNumber, DeviceId> = BTreeMap::new();
        for device in &self.devices {
            if !ids.insert(device.id) {
                return Err(ValidationError::DuplicateDevice(device.id).into());
            }
            if let Some(owner) = pins.insert(device.pin, device.id) {
                return Err(ValidationError::PinInUse {
                    pin: device.pin,
                    device_id: owner,
                }
                .into());
            }
        }
        Ok(())
    }
}

/// `config.json` as found on disk.
///
/// Files written by older agents hold only a `pins` list and no polarity;
/// [`resolve`](Self::resolve) fills the polarity in from the pin-mapping
/// table. Saving the resolved [`AgentConfig`] writes the complete layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_low: Option<bool>,
    #[serde(default, alias = "pins")]
    pub devices: Vec<Device>,
}

impl StoredConfig {
    /// Complete the record, using `fallback_active_low` when the file had no
    /// polarity.
    #[must_use]
    pub fn resolve(self, fallback_active_low: bool) -> AgentConfig {
        AgentConfig {
            active_low: self.active_low.unwrap_or(fallback_active_low),
            devices: self.devices,
        }
    }
}

impl From<AgentConfig> for StoredConfig {
    fn from(config: AgentConfig) -> Self {
        Self {
            active_low: Some(config.active_low),
            devices: config.devices,
        }
    }
}

/// Board wiring (`gpio_mapping.json`), provisioned once and read-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinMapping {
    pub active_low: bool,
    pub device_pin_map: BTreeMap<DeviceNumber, PinNumber>,
}

impl PinMapping {
    /// Resolve a device number to its pin.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::UnmappedPin`] when the number is not wired.
    pub fn pin_for(&self, number: DeviceNumber) -> Result<PinNumber, RelayError> {
        self.device_pin_map
            .get(&number)
            .copied()
            .ok_or(RelayError::UnmappedPin(number))
    }

    /// Number of provisioned relay pins.
    #[must_use]
    pub fn gpio_count(&self) -> usize {
        self.device_pin_map.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceMode;
    use crate::power::Watts;

    fn device(id: u32, pin: u16) -> Device {
        Device::builder()
            .id(DeviceId::new(id))
            .pin(PinNumber::new(pin))
            .build()
            .unwrap()
    }

    #[test]
    fn should_roundtrip_losslessly_through_json() {
        let config = AgentConfig {
            active_low: true,
            devices: vec![
                device(1, 17),
                Device::builder()
                    .id(DeviceId::new(2))
                    .pin(PinNumber::new(27))
                    .mode(DeviceMode::AutoPower)
                    .power_threshold(Some(Watts::new(1200.5)))
                    .build()
                    .unwrap(),
            ],
        };
        let json = serde_json::to_string_pretty(&config).unwrap();
        let parsed: AgentConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn should_accept_legacy_pins_key() {
        let parsed: AgentConfig = serde_json::from_str(
            r#"{"active_low": false, "pins": [{"device_id": 1, "pin_number": 17, "mode": "MANUAL", "power_threshold_w": null}]}"#,
        )
        .unwrap();
        assert_eq!(parsed.devices.len(), 1);
        assert!(!parsed.active_low);
    }

    #[test]
    fn should_take_polarity_from_fallback_for_legacy_file() {
        let stored: StoredConfig = serde_json::from_str(
            r#"{"pins": [{"device_id": 4, "pin_number": 22, "mode": "AUTO_POWER", "power_threshold_w": 300}]}"#,
        )
        .unwrap();
        assert!(stored.active_low.is_none());

        let config = stored.resolve(false);
        assert!(!config.active_low);
        assert_eq!(config.devices[0].id, DeviceId::new(4));
        assert_eq!(config.devices[0].power_threshold, Some(Watts::new(300.0)));
    }

    #[test]
    fn should_keep_stored_polarity_over_fallback() {
        let stored: StoredConfig =
            serde_json::from_str(r#"{"active_low": true, "devices": []}"#).unwrap();
        assert!(stored.resolve(false).active_low);
    }

    #[test]
    fn should_reject_shared_pin() {
        let config = AgentConfig {
            active_low: true,
            devices: vec![device(1, 17), device(2, 17)],
        };
        assert!(matches!(
            config.validate(),
            Err(RelayError::Validation(ValidationError::PinInUse { .. }))
        ));
    }

    #[test]
    fn should_reject_duplicate_device_id() {
        let config = AgentConfig {
            active_low: true,
            devices: vec![device(1, 17), device(1, 27)],
        };
        assert!(matches!(
            config.validate(),
            Err(RelayError::Validation(ValidationError::DuplicateDevice(_)))
        ));
    }

    #[test]
    fn should_resolve_pin_from_mapping_table() {
        let mapping: PinMapping = serde_json::from_str(
            r#"{"active_low": true, "device_pin_map": {"1": 17, "2": 27, "3": 22}}"#,
        )
        .unwrap();
        assert_eq!(mapping.pin_for(DeviceNumber::new(2)).unwrap(), PinNumber::new(27));
        assert_eq!(mapping.gpio_count(), 3);
        assert!(matches!(
            mapping.pin_for(DeviceNumber::new(9)),
            Err(RelayError::UnmappedPin(_))
        ));
    }

    #[test]
    fn should_require_active_low_in_mapping_table() {
        let result: Result<PinMapping, _> =
            serde_json::from_str(r#"{"device_pin_map": {"1": 17}}"#);
        assert!(result.is_err());
    }
}
