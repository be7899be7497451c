//! Inbound bus envelopes.
//!
//! Every message on the agent's event subject is wrapped as
//! `{"event_type": "...", "payload": {...}}`. Field aliases keep older
//! backend payloads (`threshold_w`, `power_w`, ...) decodable.

use serde::Deserialize;

use crate::error::CommandError;
use crate::device::DeviceMode;
use crate::id::{DeviceId, DeviceNumber};
use crate::power::{PowerReading, PowerUnit, Watts};

/// The only manual command the agent understands.
pub const SET_STATE: &str = "SET_STATE";

/// A decoded inbound message.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event_type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InboundEvent {
    DeviceCreated(DeviceCreated),
    DeviceUpdated(DeviceUpdated),
    DeviceDeleted(DeviceDeleted),
    PowerReading(PowerReadingPayload),
    DeviceCommand(DeviceCommand),
}

impl InboundEvent {
    /// Decode an envelope from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::Invalid`] for malformed JSON, unknown event
    /// types or missing fields.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CommandError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Register a new device on a provisioned socket.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DeviceCreated {
    pub device_id: DeviceId,
    #[serde(default)]
    pub device_number: Option<DeviceNumber>,
    #[serde(default)]
    pub mode: DeviceMode,
    #[serde(default, alias = "threshold_w")]
    pub threshold: Option<Watts>,
}

/// Change mode and threshold of an existing device.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DeviceUpdated {
    pub device_id: DeviceId,
    pub mode: DeviceMode,
    #[serde(default, alias = "threshold_w")]
    pub threshold: Option<Watts>,
}

/// Remove a device.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DeviceDeleted {
    pub device_id: DeviceId,
}

/// A power measurement as sent on the bus.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PowerReadingPayload {
    #[serde(default, alias = "power_w", alias = "active_power")]
    pub power: Option<f64>,
    #[serde(default)]
    pub unit: PowerUnit,
    #[serde(default)]
    pub device_ids: Option<Vec<DeviceId>>,
}

impl PowerReadingPayload {
    /// Normalise to watts.
    #[must_use]
    pub fn normalize(self) -> PowerReading {
        PowerReading {
            power: self.power.map(|value| self.unit.to_watts(value)),
            device_ids: self.device_ids,
        }
    }
}

/// A direct on/off command for a `MANUAL` device.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DeviceCommand {
    pub device_id: DeviceId,
    pub command: String,
    pub is_on: bool,
    /// Correlation id echoed in the resulting state-change cause.
    #[serde(default)]
    pub command_id: Option<String>,
}

impl DeviceCommand {
    /// The requested logical state.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::UnknownCommand`] for anything but `SET_STATE`.
    pub fn requested_state(&self) -> Result<bool, CommandError> {
        if self.command == SET_STATE {
            Ok(self.is_on)
        } else {
            Err(CommandError::UnknownCommand(self.command.clone()))
        }
    }
}
