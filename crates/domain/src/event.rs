//! Outbound events — what the agent reports to the bus.

use serde::{Deserialize, Serialize};

use crate::device::DeviceMode;
use crate::id::{AgentId, DeviceId, PinNumber};
use crate::power::Watts;
use crate::time::Timestamp;

/// Why a device changed state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Cause {
    /// A `SET_STATE` command.
    Manual {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        command_id: Option<String>,
    },
    /// A power reading crossed the device's threshold.
    AutoTrigger { power: Watts },
    /// A power reading arrived without a value; forced OFF.
    PowerMissing,
    /// Fail-safe OFF applied while the agent was starting.
    Startup,
}

/// A device reached a new logical state through one of our own writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateChange {
    pub device_id: DeviceId,
    pub is_on: bool,
    pub cause: Cause,
}

/// A pin changed level without the agent writing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriftEvent {
    pub pin: PinNumber,
    pub is_on: bool,
}

/// One device row in a heartbeat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceStatus {
    pub device_id: DeviceId,
    pub pin: PinNumber,
    pub is_on: bool,
    pub mode: DeviceMode,
    pub threshold: Option<Watts>,
}

/// Periodic liveness report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Heartbeat {
    pub uuid: AgentId,
    pub status: String,
    pub devices: Vec<DeviceStatus>,
    pub gpio_count: usize,
    pub device_count: usize,
    pub timestamp: Timestamp,
}

/// Outcome of a command or configuration change, echoed to the sender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub device_id: DeviceId,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Ack {
    #[must_use]
    pub fn ok(device_id: DeviceId) -> Self {
        Self {
            device_id,
            ok: true,
            error: None,
        }
    }

    #[must_use]
    pub fn failed(device_id: DeviceId, error: &impl std::fmt::Display) -> Self {
        Self {
            device_id,
            ok: false,
            error: Some(error.to_string()),
        }
    }
}

/// Discriminant of an [`OutboundEvent`], used to pick a bus subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    StateChange,
    GpioChange,
    Heartbeat,
    CommandAck,
    ConfigAck,
}

impl EventKind {
    /// Trailing topic segment for this kind.
    #[must_use]
    pub const fn subject(self) -> &'static str {
        match self {
            Self::StateChange => "state_change",
            Self::GpioChange => "gpio_change",
            Self::Heartbeat => "heartbeat",
            Self::CommandAck => "command_ack",
            Self::ConfigAck => "config_ack",
        }
    }
}

/// Anything the agent publishes.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundEvent {
    StateChanged(StateChange),
    Drift(DriftEvent),
    Heartbeat(Heartbeat),
    CommandAck(Ack),
    ConfigAck(Ack),
}

impl OutboundEvent {
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::StateChanged(_) => EventKind::StateChange,
            Self::Drift(_) => EventKind::GpioChange,
            Self::Heartbeat(_) => EventKind::Heartbeat,
            Self::CommandAck(_) => EventKind::CommandAck,
            Self::ConfigAck(_) => EventKind::ConfigAck,
        }
    }

    /// Serialise the event body (without any envelope).
    ///
    /// # Errors
    ///
    /// Returns a [`serde_json::Error`] if serialisation fails.
    pub fn to_payload(&self) -> Result<Vec<u8>, serde_json::Error> {
        match self {
            Self::StateChanged(e) => serde_json::to_vec(e),
            Self::Drift(e) => serde_json::to_vec(e),
            Self::Heartbeat(e) => serde_json::to_vec(e),
            Self::CommandAck(e) | Self::ConfigAck(e) => serde_json::to_vec(e),
        }
    }
}
